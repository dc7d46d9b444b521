//! Reading and writing the LDML keyboard XML subset

use std::collections::HashMap;
use log::debug;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use kmn_ldml_core::ldml::{
    LdmlFlick, LdmlFlickSegment, LdmlKey, LdmlKeyboard, LdmlLayer, LdmlLayers, LdmlReorder,
    LdmlTransform, LdmlTransformGroup, LdmlTransforms, LdmlVariable, TransformType, VariableKind,
};
use kmn_ldml_core::{KmnError, Result};

pub const ROOT_ELEMENT: &str = "keyboard3";

pub fn namespace(conforms_to: &str) -> String {
    format!("https://schemas.unicode.org/cldr/{}/keyboard3", conforms_to)
}

type XmlWriter = Writer<Vec<u8>>;

fn write_event<'e>(writer: &mut XmlWriter, event: impl Into<Event<'e>>) -> Result<()> {
    writer.write_event(event).map_err(KmnError::xml)?;
    Ok(())
}

fn element<'n>(name: &'n str, attributes: &[(&str, &str)]) -> BytesStart<'n> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    start
}

fn empty(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    write_event(writer, Event::Empty(element(name, attributes)))
}

fn start(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    write_event(writer, Event::Start(element(name, attributes)))
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn format_width(width: f64) -> String {
    format!("{}", width)
}

/// Serialises a keyboard as an LDML `keyboard3` document.
pub fn write_keyboard(keyboard: &LdmlKeyboard) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let xmlns = namespace(&keyboard.conforms_to);
    start(
        &mut writer,
        ROOT_ELEMENT,
        &[
            ("xmlns", xmlns.as_str()),
            ("locale", keyboard.locale.as_str()),
            ("conformsTo", keyboard.conforms_to.as_str()),
        ],
    )?;

    if let Some(version) = &keyboard.version {
        empty(&mut writer, "version", &[("number", version.as_str())])?;
    }

    let mut info = vec![("name", keyboard.name.as_str())];
    if let Some(author) = &keyboard.author {
        info.push(("author", author.as_str()));
    }
    empty(&mut writer, "info", &info)?;

    for import in &keyboard.imports {
        empty(&mut writer, "import", &[("base", "cldr"), ("path", import.as_str())])?;
    }

    if !keyboard.keys.is_empty() {
        start(&mut writer, "keys", &[])?;
        for key in &keyboard.keys {
            write_key(&mut writer, key)?;
        }
        end(&mut writer, "keys")?;
    }

    if !keyboard.flicks.is_empty() {
        start(&mut writer, "flicks", &[])?;
        for flick in &keyboard.flicks {
            start(&mut writer, "flick", &[("id", flick.id.as_str())])?;
            for segment in &flick.segments {
                empty(
                    &mut writer,
                    "flickSegment",
                    &[
                        ("directions", segment.directions.as_str()),
                        ("keyId", segment.key_id.as_str()),
                    ],
                )?;
            }
            end(&mut writer, "flick")?;
        }
        end(&mut writer, "flicks")?;
    }

    for layers in &keyboard.layers {
        let width = layers.min_device_width.map(|w| w.to_string());
        let mut attributes = vec![("formId", layers.form_id.as_str())];
        if let Some(width) = &width {
            attributes.push(("minDeviceWidth", width.as_str()));
        }
        start(&mut writer, "layers", &attributes)?;
        for layer in &layers.layers {
            let mut attributes = Vec::new();
            if let Some(id) = &layer.id {
                attributes.push(("id", id.as_str()));
            }
            if let Some(modifiers) = &layer.modifiers {
                attributes.push(("modifiers", modifiers.as_str()));
            }
            start(&mut writer, "layer", &attributes)?;
            for row in &layer.rows {
                let keys = row.join(" ");
                empty(&mut writer, "row", &[("keys", keys.as_str())])?;
            }
            end(&mut writer, "layer")?;
        }
        end(&mut writer, "layers")?;
    }

    if !keyboard.variables.is_empty() {
        start(&mut writer, "variables", &[])?;
        for variable in &keyboard.variables {
            empty(
                &mut writer,
                variable.kind.element_name(),
                &[("id", variable.id.as_str()), ("value", variable.value.as_str())],
            )?;
        }
        end(&mut writer, "variables")?;
    }

    for transforms in &keyboard.transforms {
        start(&mut writer, "transforms", &[("type", transforms.kind.as_str())])?;
        for group in &transforms.groups {
            start(&mut writer, "transformGroup", &[])?;
            for transform in &group.transforms {
                let mut attributes = vec![("from", transform.from.as_str())];
                if !transform.to.is_empty() {
                    attributes.push(("to", transform.to.as_str()));
                }
                empty(&mut writer, "transform", &attributes)?;
            }
            for reorder in &group.reorders {
                let mut attributes = vec![("from", reorder.from.as_str())];
                if let Some(before) = &reorder.before {
                    attributes.push(("before", before.as_str()));
                }
                if let Some(order) = &reorder.order {
                    attributes.push(("order", order.as_str()));
                }
                empty(&mut writer, "reorder", &attributes)?;
            }
            end(&mut writer, "transformGroup")?;
        }
        end(&mut writer, "transforms")?;
    }

    end(&mut writer, ROOT_ELEMENT)?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(KmnError::xml)?;
    xml.push('\n');
    Ok(xml)
}

fn write_key(writer: &mut XmlWriter, key: &LdmlKey) -> Result<()> {
    let width = key.width.map(format_width);
    let mut attributes = vec![("id", key.id.as_str())];
    if key.gap {
        attributes.push(("gap", "true"));
    } else {
        attributes.push(("output", key.output.as_str()));
    }
    if let Some(width) = &width {
        attributes.push(("width", width.as_str()));
    }
    let optional = [
        ("layerId", &key.layer_id),
        ("longPressKeyIds", &key.long_press_key_ids),
        ("longPressDefaultKeyId", &key.long_press_default_key_id),
        ("multiTapKeyIds", &key.multi_tap_key_ids),
        ("flickId", &key.flick_id),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            attributes.push((name, value.as_str()));
        }
    }
    empty(writer, "key", &attributes)
}

// Elements currently open while reading.
#[derive(Default)]
struct ReadState {
    root_seen: bool,
    flick: Option<LdmlFlick>,
    layers: Option<LdmlLayers>,
    layer: Option<LdmlLayer>,
    transforms: Option<LdmlTransforms>,
    group: Option<LdmlTransformGroup>,
}

struct Attributes {
    element: String,
    values: HashMap<String, String>,
}

impl Attributes {
    fn parse(start: &BytesStart<'_>, element: &str) -> Result<Self> {
        let mut values = HashMap::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(KmnError::xml)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(KmnError::xml)?.into_owned();
            values.insert(key, value);
        }
        Ok(Self {
            element: element.to_string(),
            values,
        })
    }

    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name).ok_or_else(|| {
            KmnError::Xml(format!("<{}> is missing the {} attribute", self.element, name))
        })
    }
}

fn outside(element: &str, parent: &str) -> KmnError {
    KmnError::Xml(format!("<{}> outside <{}>", element, parent))
}

/// Parses an LDML `keyboard3` document.
///
/// `<import>` and `<reorder>` are kept; any other unrecognised element is
/// recorded in [`LdmlKeyboard::unsupported`] and skipped with its children.
pub fn read_keyboard(xml: &str) -> Result<LdmlKeyboard> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut keyboard = LdmlKeyboard::default();
    let mut state = ReadState::default();

    loop {
        match reader.read_event().map_err(KmnError::xml)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if !open_element(&name, &e, &mut keyboard, &mut state)? {
                    let end = e.to_end().into_owned();
                    reader.read_to_end(end.name()).map_err(KmnError::xml)?;
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if open_element(&name, &e, &mut keyboard, &mut state)? {
                    close_element(&name, &mut keyboard, &mut state);
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                close_element(&name, &mut keyboard, &mut state);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !state.root_seen {
        return Err(KmnError::Xml(format!("no <{}> root element", ROOT_ELEMENT)));
    }
    debug!(
        "Read LDML keyboard {} with {} keys and {} layer sets",
        keyboard.name,
        keyboard.keys.len(),
        keyboard.layers.len()
    );
    Ok(keyboard)
}

// Returns false when the element is not recognised and should be skipped.
fn open_element(
    name: &str,
    start: &BytesStart<'_>,
    keyboard: &mut LdmlKeyboard,
    state: &mut ReadState,
) -> Result<bool> {
    let attrs = Attributes::parse(start, name)?;

    if !state.root_seen {
        if name != ROOT_ELEMENT {
            return Err(KmnError::Xml(format!(
                "expected <{}> root element, found <{}>",
                ROOT_ELEMENT, name
            )));
        }
        state.root_seen = true;
        keyboard.locale = attrs.required("locale")?;
        keyboard.conforms_to = attrs.required("conformsTo")?;
        return Ok(true);
    }

    match name {
        "keys" | "flicks" | "variables" => {}
        "version" => keyboard.version = attrs.get("number"),
        "info" => {
            keyboard.name = attrs.get("name").unwrap_or_default();
            keyboard.author = attrs.get("author");
        }
        "import" => {
            let path = attrs.get("path").or_else(|| attrs.get("base")).unwrap_or_default();
            keyboard.imports.push(path);
        }
        "key" => {
            let width = match attrs.get("width") {
                Some(w) => Some(w.trim().parse::<f64>().map_err(|_| {
                    KmnError::Xml(format!("<key> width '{}' is not a number", w))
                })?),
                None => None,
            };
            keyboard.keys.push(LdmlKey {
                id: attrs.required("id")?,
                output: attrs.get("output").unwrap_or_default(),
                gap: attrs.get("gap").as_deref() == Some("true"),
                width,
                layer_id: attrs.get("layerId"),
                long_press_key_ids: attrs.get("longPressKeyIds"),
                long_press_default_key_id: attrs.get("longPressDefaultKeyId"),
                multi_tap_key_ids: attrs.get("multiTapKeyIds"),
                flick_id: attrs.get("flickId"),
            });
        }
        "flick" => {
            state.flick = Some(LdmlFlick {
                id: attrs.required("id")?,
                segments: Vec::new(),
            });
        }
        "flickSegment" => {
            let flick = state.flick.as_mut().ok_or_else(|| outside(name, "flick"))?;
            flick.segments.push(LdmlFlickSegment {
                directions: attrs.required("directions")?,
                key_id: attrs.required("keyId")?,
            });
        }
        "layers" => {
            let min_device_width = match attrs.get("minDeviceWidth") {
                Some(w) => Some(w.trim().parse::<u32>().map_err(|_| {
                    KmnError::Xml(format!("<layers> minDeviceWidth '{}' is not a number", w))
                })?),
                None => None,
            };
            state.layers = Some(LdmlLayers {
                form_id: attrs.get("formId").unwrap_or_else(|| "us".to_string()),
                min_device_width,
                layers: Vec::new(),
            });
        }
        "layer" => {
            if state.layers.is_none() {
                return Err(outside(name, "layers"));
            }
            state.layer = Some(LdmlLayer {
                id: attrs.get("id"),
                modifiers: attrs.get("modifiers"),
                rows: Vec::new(),
            });
        }
        "row" => {
            let layer = state.layer.as_mut().ok_or_else(|| outside(name, "layer"))?;
            let keys = attrs.required("keys")?;
            layer.rows.push(keys.split_whitespace().map(str::to_string).collect());
        }
        "string" | "set" | "uset" => {
            let kind = match name {
                "string" => VariableKind::String,
                "set" => VariableKind::Set,
                _ => VariableKind::UnicodeSet,
            };
            keyboard.variables.push(LdmlVariable {
                kind,
                id: attrs.required("id")?,
                value: attrs.get("value").unwrap_or_default(),
            });
        }
        "transforms" => {
            let kind = match attrs.required("type")?.as_str() {
                "simple" => TransformType::Simple,
                "backspace" => TransformType::Backspace,
                other => {
                    return Err(KmnError::Xml(format!("unknown transforms type '{}'", other)));
                }
            };
            state.transforms = Some(LdmlTransforms {
                kind,
                groups: Vec::new(),
            });
        }
        "transformGroup" => {
            if state.transforms.is_none() {
                return Err(outside(name, "transforms"));
            }
            state.group = Some(LdmlTransformGroup::default());
        }
        "transform" => {
            let group = state.group.as_mut().ok_or_else(|| outside(name, "transformGroup"))?;
            group.transforms.push(LdmlTransform {
                from: attrs.required("from")?,
                to: attrs.get("to").unwrap_or_default(),
            });
        }
        "reorder" => {
            let group = state.group.as_mut().ok_or_else(|| outside(name, "transformGroup"))?;
            group.reorders.push(LdmlReorder {
                from: attrs.required("from")?,
                before: attrs.get("before"),
                order: attrs.get("order"),
            });
        }
        _ => {
            debug!("Unsupported LDML element <{}>", name);
            keyboard.unsupported.push(name.to_string());
            return Ok(false);
        }
    }
    Ok(true)
}

fn close_element(name: &str, keyboard: &mut LdmlKeyboard, state: &mut ReadState) {
    match name {
        "flick" => {
            if let Some(flick) = state.flick.take() {
                keyboard.flicks.push(flick);
            }
        }
        "layer" => {
            if let (Some(layer), Some(layers)) = (state.layer.take(), state.layers.as_mut()) {
                layers.layers.push(layer);
            }
        }
        "layers" => {
            if let Some(layers) = state.layers.take() {
                keyboard.layers.push(layers);
            }
        }
        "transformGroup" => {
            if let (Some(group), Some(transforms)) = (state.group.take(), state.transforms.as_mut()) {
                transforms.groups.push(group);
            }
        }
        "transforms" => {
            if let Some(transforms) = state.transforms.take() {
                keyboard.transforms.push(transforms);
            }
        }
        _ => {}
    }
}
