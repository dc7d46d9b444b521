//! In-memory model of the LDML keyboard subset this crate reads and writes

use super::modifiers::ModifierSet;

/// Form id of touch layer sets.
pub const TOUCH_FORM: &str = "touch";

/// Minimum device width that separates tablet from phone touch layers.
pub const TABLET_MIN_WIDTH: u32 = 400;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlKeyboard {
    pub locale: String,
    pub conforms_to: String,
    pub name: String,
    pub author: Option<String>,
    pub version: Option<String>,
    pub keys: Vec<LdmlKey>,
    pub flicks: Vec<LdmlFlick>,
    pub layers: Vec<LdmlLayers>,
    pub variables: Vec<LdmlVariable>,
    pub transforms: Vec<LdmlTransforms>,
    /// `path` attributes of `<import>` elements.
    pub imports: Vec<String>,
    /// Names of elements the reader did not recognise.
    pub unsupported: Vec<String>,
}

impl LdmlKeyboard {
    pub fn key(&self, id: &str) -> Option<&LdmlKey> {
        self.keys.iter().find(|k| k.id == id)
    }

    pub fn flick(&self, id: &str) -> Option<&LdmlFlick> {
        self.flicks.iter().find(|f| f.id == id)
    }

    pub fn variable(&self, id: &str) -> Option<&LdmlVariable> {
        self.variables.iter().find(|v| v.id == id)
    }

    pub fn hardware_layers(&self) -> impl Iterator<Item = &LdmlLayers> {
        self.layers.iter().filter(|l| !l.is_touch())
    }

    pub fn touch_layers(&self) -> impl Iterator<Item = &LdmlLayers> {
        self.layers.iter().filter(|l| l.is_touch())
    }

    pub fn has_touch_layers(&self) -> bool {
        self.touch_layers().next().is_some()
    }

    /// Transforms of the given type, if any.
    pub fn transforms_of(&self, kind: TransformType) -> Option<&LdmlTransforms> {
        self.transforms.iter().find(|t| t.kind == kind)
    }
}

/// A `<key>` element. Touch keys use the optional gesture attributes; hardware
/// keys only carry `id` and `output`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlKey {
    pub id: String,
    pub output: String,
    pub gap: bool,
    pub width: Option<f64>,
    pub layer_id: Option<String>,
    pub long_press_key_ids: Option<String>,
    pub long_press_default_key_id: Option<String>,
    pub multi_tap_key_ids: Option<String>,
    pub flick_id: Option<String>,
}

impl LdmlKey {
    pub fn new(id: impl Into<String>, output: impl Into<String>) -> Self {
        LdmlKey {
            id: id.into(),
            output: output.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlFlick {
    pub id: String,
    pub segments: Vec<LdmlFlickSegment>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlFlickSegment {
    /// Space separated direction list, e.g. `n` or `s e`.
    pub directions: String,
    pub key_id: String,
}

/// A `<layers>` element: every layer for one form id and device width.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlLayers {
    pub form_id: String,
    pub min_device_width: Option<u32>,
    pub layers: Vec<LdmlLayer>,
}

impl LdmlLayers {
    pub fn is_touch(&self) -> bool {
        self.form_id == TOUCH_FORM
    }

    pub fn is_tablet(&self) -> bool {
        self.min_device_width.unwrap_or(0) >= TABLET_MIN_WIDTH
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlLayer {
    pub id: Option<String>,
    pub modifiers: Option<String>,
    /// Key ids row by row.
    pub rows: Vec<Vec<String>>,
}

impl LdmlLayer {
    /// The layer's modifier set; `None` when the attribute holds an unknown token.
    pub fn modifier_set(&self) -> Option<ModifierSet> {
        match &self.modifiers {
            Some(m) => ModifierSet::from_ldml(m),
            None => Some(ModifierSet::NONE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    String,
    Set,
    UnicodeSet,
}

impl VariableKind {
    pub fn element_name(&self) -> &'static str {
        match self {
            VariableKind::String => "string",
            VariableKind::Set => "set",
            VariableKind::UnicodeSet => "uset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdmlVariable {
    pub kind: VariableKind,
    pub id: String,
    pub value: String,
}

impl LdmlVariable {
    /// Items of a `<set>` value.
    pub fn set_items(&self) -> Vec<&str> {
        self.value.split_whitespace().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    Simple,
    Backspace,
}

impl TransformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformType::Simple => "simple",
            TransformType::Backspace => "backspace",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdmlTransforms {
    pub kind: TransformType,
    pub groups: Vec<LdmlTransformGroup>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlTransformGroup {
    pub transforms: Vec<LdmlTransform>,
    pub reorders: Vec<LdmlReorder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdmlTransform {
    pub from: String,
    pub to: String,
}

/// A `<reorder>` element, kept only so it can be reported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LdmlReorder {
    pub from: String,
    pub before: Option<String>,
    pub order: Option<String>,
}
