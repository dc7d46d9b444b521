//! Conversion of a `.keyman-touch-layout` file into LDML touch keys and layers

use log::debug;
use kmn_ldml_core::ldml::{LdmlFlick, LdmlFlickSegment, LdmlKey, LdmlLayer, LdmlLayers, TABLET_MIN_WIDTH, TOUCH_FORM};
use kmn_ldml_core::touch_layout::{
    TouchLayoutFile, TouchLayoutKey, TouchLayoutLayer, TouchLayoutPlatform, TouchLayoutSubKey,
    FLICK_DIRECTIONS,
};
use kmn_ldml_core::ModifierSet;
use crate::ldml::escape::{escape_output, sanitize_id};
use super::expander::VariableExpander;

/// LDML layer id for a touch layer id.
pub fn ldml_layer_id(touch_id: &str) -> String {
    match touch_id {
        "default" => "base".to_string(),
        "rightalt" => "altR".to_string(),
        "rightalt-shift" => "altR-shift".to_string(),
        other => other.to_string(),
    }
}

/// Touch layer id for an LDML layer id. Inverse of [`ldml_layer_id`].
pub fn touch_layer_id(ldml_id: &str) -> String {
    match ldml_id {
        "base" => "default".to_string(),
        "altR" => "rightalt".to_string(),
        "altR-shift" => "rightalt-shift".to_string(),
        other => other.to_string(),
    }
}

/// Modifier set implied by a well-known touch layer id.
pub fn layer_modifiers(touch_id: &str) -> Option<ModifierSet> {
    let mut set = ModifierSet::NONE;
    match touch_id {
        "default" => {}
        "shift" => set.shift = true,
        "caps" => set.caps = true,
        "rightalt" => set.ralt = true,
        "rightalt-shift" => {
            set.shift = true;
            set.ralt = true;
        }
        _ => return None,
    }
    Some(set)
}

/// Touch layer id for a modifier set, the inverse of [`layer_modifiers`].
pub fn touch_layer_id_for(modifiers: ModifierSet) -> String {
    let mut shift_ralt = ModifierSet::NONE;
    shift_ralt.shift = true;
    shift_ralt.ralt = true;

    if modifiers.is_empty() {
        "default".to_string()
    } else if modifiers == shift_ralt {
        "rightalt-shift".to_string()
    } else {
        match modifiers.ldml_tokens().as_slice() {
            ["shift"] => "shift".to_string(),
            ["caps"] => "caps".to_string(),
            ["altR"] => "rightalt".to_string(),
            tokens => tokens.join("-"),
        }
    }
}

/// Text of a `U_XXXX` or `U_XXXX_YYYY` key id.
fn decode_unicode_id(id: &str) -> Option<String> {
    let body = id.strip_prefix("U_").or_else(|| id.strip_prefix("u_"))?;
    body.split('_')
        .map(|hex| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32))
        .collect()
}

/// Keys, flicks and layers produced from a touch layout.
#[derive(Debug, Clone, Default)]
pub struct ConvertedTouchLayout {
    pub keys: Vec<LdmlKey>,
    pub flicks: Vec<LdmlFlick>,
    pub layers: Vec<LdmlLayers>,
}

/// Turns touch layout keys into LDML keys.
///
/// Hardware keys are looked up to supply output; a touch key whose definition
/// matches an existing key reuses its id, otherwise a new key is added under
/// `{id}-{n}`.
pub struct TouchLayoutConverter<'a> {
    hardware: &'a [LdmlKey],
    expander: VariableExpander,
    keys: Vec<LdmlKey>,
    flicks: Vec<LdmlFlick>,
}

impl<'a> TouchLayoutConverter<'a> {
    pub fn new(hardware: &'a [LdmlKey]) -> Self {
        Self {
            hardware,
            expander: VariableExpander::default(),
            keys: Vec::new(),
            flicks: Vec::new(),
        }
    }

    /// Decodes sentinel-encoded markers in display text, as found in layouts
    /// compiled from a keyboard with these markers.
    pub fn with_expander(mut self, expander: VariableExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn convert(mut self, source: &TouchLayoutFile) -> ConvertedTouchLayout {
        let mut layers = Vec::new();
        let platforms = [(&source.phone, None), (&source.tablet, Some(TABLET_MIN_WIDTH))];
        for (platform, min_device_width) in platforms {
            if let Some(platform) = platform {
                layers.push(self.convert_platform(platform, min_device_width));
            }
        }

        debug!(
            "Touch layout converted to {} keys and {} flicks",
            self.keys.len(),
            self.flicks.len()
        );

        ConvertedTouchLayout {
            keys: self.keys,
            flicks: self.flicks,
            layers,
        }
    }

    fn convert_platform(&mut self, platform: &TouchLayoutPlatform, min_device_width: Option<u32>) -> LdmlLayers {
        LdmlLayers {
            form_id: TOUCH_FORM.to_string(),
            min_device_width,
            layers: platform.layer.iter().map(|l| self.convert_layer(l)).collect(),
        }
    }

    fn convert_layer(&mut self, layer: &TouchLayoutLayer) -> LdmlLayer {
        let modifiers = layer_modifiers(&layer.id);
        let set = modifiers.unwrap_or(ModifierSet::NONE);
        let rows = layer
            .row
            .iter()
            .map(|row| row.key.iter().map(|key| self.convert_key(key, set)).collect())
            .collect();

        LdmlLayer {
            id: Some(ldml_layer_id(&layer.id)),
            modifiers: modifiers.filter(|m| !m.is_empty()).map(|m| m.to_ldml()),
            rows,
        }
    }

    fn convert_key(&mut self, key: &TouchLayoutKey, modifiers: ModifierSet) -> String {
        let gap = key.sp.is_some_and(|sp| sp.is_gap());
        let mut ldml = LdmlKey {
            output: if gap {
                String::new()
            } else {
                self.output_for(&key.id, key.text.as_deref(), modifiers)
            },
            gap,
            width: key.width.filter(|w| *w != 100.0).map(|w| w / 100.0),
            layer_id: key.nextlayer.as_deref().map(ldml_layer_id),
            ..Default::default()
        };

        if let Some(sk) = key.sk.as_ref().filter(|sk| !sk.is_empty()) {
            let ids: Vec<String> = sk.iter().map(|s| self.convert_subkey(s, modifiers)).collect();
            ldml.long_press_default_key_id = sk
                .iter()
                .zip(&ids)
                .find(|(s, _)| s.is_default())
                .map(|(_, id)| id.clone());
            ldml.long_press_key_ids = Some(ids.join(" "));
        }

        if let Some(multitap) = key.multitap.as_ref().filter(|m| !m.is_empty()) {
            let ids: Vec<String> = multitap.iter().map(|s| self.convert_subkey(s, modifiers)).collect();
            ldml.multi_tap_key_ids = Some(ids.join(" "));
        }

        let candidate = if key.id.is_empty() {
            if gap { "gap".to_string() } else { "T_blank".to_string() }
        } else {
            modifiers.variant_id(&key.id)
        };

        if let Some(flick) = key.flick.as_ref().filter(|f| !f.is_empty()) {
            let segments = FLICK_DIRECTIONS
                .iter()
                .filter_map(|d| flick.get(d).map(|s| (*d, s)))
                .map(|(direction, subkey)| LdmlFlickSegment {
                    directions: direction.to_string(),
                    key_id: self.convert_subkey(subkey, modifiers),
                })
                .collect();
            ldml.flick_id = Some(self.add_flick(&candidate, segments));
        }

        self.register(candidate, ldml)
    }

    fn convert_subkey(&mut self, subkey: &TouchLayoutSubKey, parent: ModifierSet) -> String {
        let modifiers = subkey
            .layer
            .as_deref()
            .and_then(layer_modifiers)
            .unwrap_or(parent);
        let gap = subkey.sp.is_some_and(|sp| sp.is_gap());
        let ldml = LdmlKey {
            output: self.output_for(&subkey.id, subkey.text.as_deref(), modifiers),
            gap,
            layer_id: subkey.nextlayer.as_deref().map(ldml_layer_id),
            ..Default::default()
        };
        let candidate = if subkey.id.is_empty() {
            "T_blank".to_string()
        } else {
            subkey.id.clone()
        };
        self.register(candidate, ldml)
    }

    // Output of the hardware key with the same id and modifiers, then the
    // text of a U_ id, then the display text.
    fn output_for(&self, id: &str, text: Option<&str>, modifiers: ModifierSet) -> String {
        let variant = modifiers.variant_id(id);
        if let Some(key) = self.hardware.iter().find(|k| k.id == variant) {
            return key.output.clone();
        }
        if let Some(decoded) = decode_unicode_id(id) {
            return escape_output(&decoded);
        }
        text.filter(|t| !t.starts_with('*'))
            .map(|t| self.expander.convert_output_to_markers(t))
            .unwrap_or_default()
    }

    fn find(&self, id: &str) -> Option<&LdmlKey> {
        self.hardware
            .iter()
            .chain(self.keys.iter())
            .find(|k| k.id == id)
    }

    fn register(&mut self, candidate: String, mut key: LdmlKey) -> String {
        let mut n = 0;
        loop {
            let id = if n == 0 {
                candidate.clone()
            } else {
                format!("{}-{}", candidate, n)
            };
            match self.find(&id) {
                Some(existing) if same_definition(existing, &key) => return id,
                Some(_) => n += 1,
                None => {
                    key.id = id.clone();
                    self.keys.push(key);
                    return id;
                }
            }
        }
    }

    fn add_flick(&mut self, key_id: &str, segments: Vec<LdmlFlickSegment>) -> String {
        let base = format!("flick_{}", sanitize_id(key_id));
        if let Some(existing) = self.flicks.iter().find(|f| f.segments == segments) {
            return existing.id.clone();
        }
        let mut id = base.clone();
        let mut n = 0;
        while self.flicks.iter().any(|f| f.id == id) {
            n += 1;
            id = format!("{}-{}", base, n);
        }
        self.flicks.push(LdmlFlick {
            id: id.clone(),
            segments,
        });
        id
    }
}

fn same_definition(existing: &LdmlKey, key: &LdmlKey) -> bool {
    existing.output == key.output
        && existing.gap == key.gap
        && existing.width == key.width
        && existing.layer_id == key.layer_id
        && existing.long_press_key_ids == key.long_press_key_ids
        && existing.long_press_default_key_id == key.long_press_default_key_id
        && existing.multi_tap_key_ids == key.multi_tap_key_ids
        && existing.flick_id == key.flick_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmn_ldml_core::touch_layout::{KeySp, TouchLayoutFlick, TouchLayoutRow};

    fn key(id: &str, text: &str) -> TouchLayoutKey {
        TouchLayoutKey {
            id: id.to_string(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn subkey(id: &str, text: &str) -> TouchLayoutSubKey {
        TouchLayoutSubKey {
            id: id.to_string(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn layout(layers: Vec<TouchLayoutLayer>) -> TouchLayoutFile {
        TouchLayoutFile {
            phone: Some(TouchLayoutPlatform {
                layer: layers,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn layer(id: &str, keys: Vec<TouchLayoutKey>) -> TouchLayoutLayer {
        TouchLayoutLayer {
            id: id.to_string(),
            row: vec![TouchLayoutRow { id: 1, key: keys }],
        }
    }

    #[test]
    fn test_layer_ids() {
        assert_eq!(ldml_layer_id("default"), "base");
        assert_eq!(touch_layer_id(&ldml_layer_id("rightalt-shift")), "rightalt-shift");
        assert_eq!(touch_layer_id("numeric"), "numeric");
        assert_eq!(touch_layer_id_for(layer_modifiers("rightalt").unwrap()), "rightalt");
        assert_eq!(touch_layer_id_for(ModifierSet::NONE), "default");
        assert!(layer_modifiers("numeric").is_none());
    }

    #[test]
    fn test_hardware_keys_are_reused() {
        let hardware = vec![LdmlKey::new("K_A", "a"), LdmlKey::new("K_A_shift", "A")];
        let source = layout(vec![
            layer("default", vec![key("K_A", "a")]),
            layer("shift", vec![key("K_A", "A")]),
        ]);
        let converted = TouchLayoutConverter::new(&hardware).convert(&source);
        assert!(converted.keys.is_empty());

        let layers = &converted.layers[0];
        assert_eq!(layers.form_id, TOUCH_FORM);
        assert_eq!(layers.min_device_width, None);
        assert_eq!(layers.layers[0].id.as_deref(), Some("base"));
        assert_eq!(layers.layers[0].modifiers, None);
        assert_eq!(layers.layers[0].rows[0], vec!["K_A"]);
        assert_eq!(layers.layers[1].modifiers.as_deref(), Some("shift"));
        assert_eq!(layers.layers[1].rows[0], vec!["K_A_shift"]);
    }

    #[test]
    fn test_differing_definition_gets_new_id() {
        let hardware = vec![LdmlKey::new("K_A", "a")];
        let mut wide = key("K_A", "a");
        wide.width = Some(150.0);
        let source = layout(vec![layer("default", vec![wide])]);
        let converted = TouchLayoutConverter::new(&hardware).convert(&source);
        assert_eq!(converted.keys.len(), 1);
        assert_eq!(converted.keys[0].id, "K_A-1");
        assert_eq!(converted.keys[0].width, Some(1.5));
    }

    #[test]
    fn test_gestures() {
        let mut k = key("K_E", "e");
        k.sk = Some(vec![
            subkey("U_00E9", "é"),
            TouchLayoutSubKey {
                default: Some(true),
                ..subkey("U_00E8", "è")
            },
        ]);
        k.multitap = Some(vec![subkey("U_00EB", "ë")]);
        let mut flick = TouchLayoutFlick::default();
        flick.set("s", subkey("U_00EA", "ê"));
        flick.set("n", subkey("U_0113", "ē"));
        k.flick = Some(flick);

        let source = layout(vec![layer("default", vec![k])]);
        let converted = TouchLayoutConverter::new(&[]).convert(&source);
        let e = converted.keys.iter().find(|k| k.id == "K_E").unwrap();
        assert_eq!(e.output, "e");
        assert_eq!(e.long_press_key_ids.as_deref(), Some("U_00E9 U_00E8"));
        assert_eq!(e.long_press_default_key_id.as_deref(), Some("U_00E8"));
        assert_eq!(e.multi_tap_key_ids.as_deref(), Some("U_00EB"));
        assert_eq!(e.flick_id.as_deref(), Some("flick_K_E"));

        let flick = &converted.flicks[0];
        let directions: Vec<_> = flick.segments.iter().map(|s| s.directions.as_str()).collect();
        assert_eq!(directions, vec!["n", "s"]);

        let acute = converted.keys.iter().find(|k| k.id == "U_00E9").unwrap();
        assert_eq!(acute.output, "é");
    }

    #[test]
    fn test_encoded_markers_in_text_are_restored() {
        let hardware = vec![LdmlKey::new("K_QUOTE", "\\m{acute}")];
        let keyboard = kmn_ldml_core::ldml::LdmlKeyboard {
            keys: hardware.clone(),
            ..Default::default()
        };
        let source = layout(vec![layer("default", vec![key("T_acute", "\u{FFFF}\u{0008}\u{0001}$")])]);
        let converted = TouchLayoutConverter::new(&hardware)
            .with_expander(VariableExpander::from_keyboard(&keyboard))
            .convert(&source);
        let acute = converted.keys.iter().find(|k| k.id == "T_acute").unwrap();
        assert_eq!(acute.output, "\\m{acute}\\u{0024}");
    }

    #[test]
    fn test_special_keys() {
        let shift = TouchLayoutKey {
            sp: Some(KeySp::Special),
            nextlayer: Some("shift".to_string()),
            ..key("K_SHIFT", "*Shift*")
        };
        let spacer = TouchLayoutKey {
            sp: Some(KeySp::Spacer),
            width: Some(50.0),
            ..key("T_gap", "")
        };
        let source = TouchLayoutFile {
            tablet: layout(vec![layer("default", vec![shift, spacer])]).phone,
            ..Default::default()
        };
        let converted = TouchLayoutConverter::new(&[]).convert(&source);
        assert_eq!(converted.layers[0].min_device_width, Some(TABLET_MIN_WIDTH));

        let shift = converted.keys.iter().find(|k| k.id == "K_SHIFT").unwrap();
        assert_eq!(shift.output, "");
        assert_eq!(shift.layer_id.as_deref(), Some("shift"));

        let spacer = converted.keys.iter().find(|k| k.id == "T_gap").unwrap();
        assert!(spacer.gap);
        assert_eq!(spacer.width, Some(0.5));
    }
}
