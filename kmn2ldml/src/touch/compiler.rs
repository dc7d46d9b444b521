//! Compilation of LDML touch layers into the touch layout artifact

use log::{debug, warn};
use kmn_ldml_core::ldml::{LdmlKeyboard, LdmlLayer, LdmlLayers};
use kmn_ldml_core::touch_layout::{
    KeySp, TouchLayoutFile, TouchLayoutFlick, TouchLayoutKey, TouchLayoutLayer, TouchLayoutPlatform,
    TouchLayoutRow, TouchLayoutSubKey, FLICK_DIRECTIONS,
};
use kmn_ldml_core::{KeyBag, ModifierSet, Warning};
use super::converter::{touch_layer_id, touch_layer_id_for};
use super::expander::VariableExpander;
use super::key_factory::{format_key_id, KeySubKeyFactory};

pub const DEFAULT_FONT: &str = "Tahoma";
pub const DEFAULT_HINT: &str = "longpress";

// Frame keys a touch layer may name without defining them.
const SPECIAL_KEYS: &[(&str, &str, &str)] = &[
    ("shift", "K_SHIFT", "*Shift*"),
    ("bksp", "K_BKSP", "*BkSp*"),
    ("space", "K_SPACE", ""),
    ("enter", "K_ENTER", "*Enter*"),
    ("numeric", "K_NUMLOCK", "*123*"),
    ("menu", "K_LOPT", "*Menu*"),
];

fn special_key(id: &str) -> Option<TouchLayoutKey> {
    SPECIAL_KEYS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(id))
        .map(|(_, key_id, text)| TouchLayoutKey {
            id: key_id.to_string(),
            text: Some(text.to_string()).filter(|t| !t.is_empty()),
            sp: Some(if text.is_empty() { KeySp::Normal } else { KeySp::Special }),
            ..Default::default()
        })
}

/// Touch key id for an LDML key placed on a layer with `modifiers`: the
/// instance suffix and the variant suffix are removed.
pub fn touch_key_id(ldml_id: &str, modifiers: ModifierSet) -> String {
    let id = match ldml_id.rsplit_once('-') {
        Some((base, n)) if !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) => base,
        _ => ldml_id,
    };
    modifiers.base_id(id).to_string()
}

/// Builds a [`TouchLayoutFile`] from the touch layers of an LDML keyboard, or
/// from its hardware layers when it has none.
pub struct TouchLayoutCompiler<'a> {
    keyboard: &'a LdmlKeyboard,
    key_bag: KeyBag,
    expander: VariableExpander,
}

impl<'a> TouchLayoutCompiler<'a> {
    pub fn new(keyboard: &'a LdmlKeyboard) -> Self {
        Self {
            keyboard,
            key_bag: KeyBag::from_keyboard(keyboard),
            expander: VariableExpander::from_keyboard(keyboard),
        }
    }

    pub fn compile(&self) -> (TouchLayoutFile, Vec<Warning>) {
        let factory = KeySubKeyFactory::new(&self.key_bag, &self.expander);
        let mut warnings = Vec::new();
        let mut file = TouchLayoutFile::default();

        if self.keyboard.has_touch_layers() {
            for layers in self.keyboard.touch_layers() {
                let platform = self.compile_platform(layers, &factory, &mut warnings);
                if layers.is_tablet() {
                    file.tablet = Some(platform);
                } else {
                    file.phone = Some(platform);
                }
            }
            if file.phone.is_none() {
                file.phone = file.tablet.clone();
            } else if file.tablet.is_none() {
                file.tablet = file.phone.clone();
            }
        } else if let Some(hardware) = self.keyboard.hardware_layers().next() {
            debug!("No touch layers, generating tablet layout from hardware layers");
            file.tablet = Some(self.generate_from_hardware(hardware, &factory, &mut warnings));
        }

        warnings.extend(factory.take_warnings());
        (file, warnings)
    }

    fn platform(layers: Vec<TouchLayoutLayer>) -> TouchLayoutPlatform {
        TouchLayoutPlatform {
            font: Some(DEFAULT_FONT.to_string()),
            layer: layers,
            default_hint: Some(DEFAULT_HINT.to_string()),
            ..Default::default()
        }
    }

    fn compile_platform(
        &self,
        layers: &LdmlLayers,
        factory: &KeySubKeyFactory<'_>,
        warnings: &mut Vec<Warning>,
    ) -> TouchLayoutPlatform {
        Self::platform(
            layers
                .layers
                .iter()
                .map(|layer| self.compile_layer(layer, factory, warnings))
                .collect(),
        )
    }

    fn compile_layer(
        &self,
        layer: &LdmlLayer,
        factory: &KeySubKeyFactory<'_>,
        warnings: &mut Vec<Warning>,
    ) -> TouchLayoutLayer {
        let modifiers = layer.modifier_set().unwrap_or(ModifierSet::NONE);
        let id = match &layer.id {
            Some(id) => touch_layer_id(id),
            None => touch_layer_id_for(modifiers),
        };
        TouchLayoutLayer {
            id,
            row: self.compile_rows(&layer.rows, modifiers, factory, warnings),
        }
    }

    fn compile_rows(
        &self,
        rows: &[Vec<String>],
        modifiers: ModifierSet,
        factory: &KeySubKeyFactory<'_>,
        warnings: &mut Vec<Warning>,
    ) -> Vec<TouchLayoutRow> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| TouchLayoutRow {
                id: i as u32 + 1,
                key: row
                    .iter()
                    .map(|id| self.compile_key(id, modifiers, factory, warnings))
                    .collect(),
            })
            .collect()
    }

    fn compile_key(
        &self,
        id: &str,
        modifiers: ModifierSet,
        factory: &KeySubKeyFactory<'_>,
        warnings: &mut Vec<Warning>,
    ) -> TouchLayoutKey {
        let Some(key) = self.key_bag.get(id) else {
            if let Some(special) = special_key(id) {
                return special;
            }
            warn!("Touch layer names undefined key {}", id);
            warnings.push(Warning::LookupMiss {
                key_id: id.to_string(),
            });
            return TouchLayoutKey {
                id: format_key_id(id),
                ..Default::default()
            };
        };

        let mut touch = TouchLayoutKey {
            id: format_key_id(&touch_key_id(&key.id, modifiers)),
            nextlayer: key.layer_id.as_deref().map(touch_layer_id),
            ..Default::default()
        };

        if key.gap {
            touch.sp = Some(KeySp::Spacer);
            touch.width = Some(key.width.unwrap_or(1.0) * 100.0);
        } else {
            touch.text = factory.process_key_output(&key.id).filter(|t| !t.is_empty());
            touch.width = key.width.filter(|w| *w != 1.0).map(|w| w * 100.0);
        }

        if let Some(ids) = &key.long_press_key_ids {
            let subkeys = factory.generate_subkeys(ids, key.long_press_default_key_id.as_deref());
            touch.sk = Some(subkeys.into_iter().map(map_subkey_layer).collect());
        }
        if let Some(ids) = &key.multi_tap_key_ids {
            touch.multitap = Some(factory.generate_multitap(ids).into_iter().map(map_subkey_layer).collect());
        }
        if let Some(flick_id) = &key.flick_id {
            match self.keyboard.flick(flick_id) {
                Some(flick) => {
                    let mut gestures = TouchLayoutFlick::default();
                    for segment in &flick.segments {
                        let direction: String = segment.directions.split_whitespace().collect();
                        if let Some(subkey) = factory.generate_multitap(&segment.key_id).into_iter().next() {
                            if !gestures.set(&direction, map_subkey_layer(subkey)) {
                                debug!("Flick {} has unsupported direction {}", flick_id, direction);
                            }
                        }
                    }
                    if !gestures.is_empty() {
                        touch.flick = Some(gestures);
                    }
                }
                None => {
                    warn!("Key {} refers to missing flick {}", key.id, flick_id);
                    warnings.push(Warning::FlickNotFound {
                        flick_id: flick_id.clone(),
                        key_id: key.id.clone(),
                    });
                }
            }
        }

        touch
    }

    fn generate_from_hardware(
        &self,
        hardware: &LdmlLayers,
        factory: &KeySubKeyFactory<'_>,
        warnings: &mut Vec<Warning>,
    ) -> TouchLayoutPlatform {
        let mut layers: Vec<TouchLayoutLayer> = hardware
            .layers
            .iter()
            .map(|layer| self.compile_layer(layer, factory, warnings))
            .collect();

        let base = hardware
            .layers
            .iter()
            .find(|l| l.modifier_set().is_some_and(|m| m.is_empty()));
        let has_shift = hardware
            .layers
            .iter()
            .any(|l| l.modifier_set().is_some_and(|m| m.is_shift_only()));
        let has_caps = layers.iter().any(|l| l.id == "caps");

        if let (Some(base), true, false) = (base, has_shift, has_caps) {
            layers.push(self.caps_layer(base, factory));
        }

        Self::platform(layers)
    }

    // Caps layer showing shifted output, with a multitap back to the base key.
    fn caps_layer(&self, base: &LdmlLayer, factory: &KeySubKeyFactory<'_>) -> TouchLayoutLayer {
        let mut shift = ModifierSet::NONE;
        shift.shift = true;

        let row = base
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| TouchLayoutRow {
                id: i as u32 + 1,
                key: row
                    .iter()
                    .map(|id| {
                        let Some(key) = self.key_bag.get(id) else {
                            return TouchLayoutKey {
                                id: format_key_id(id),
                                ..Default::default()
                            };
                        };
                        if key.gap {
                            return TouchLayoutKey {
                                id: format_key_id(&key.id),
                                sp: Some(KeySp::Spacer),
                                width: Some(key.width.unwrap_or(1.0) * 100.0),
                                ..Default::default()
                            };
                        }
                        let shifted = shift.variant_id(id);
                        let mut touch = TouchLayoutKey {
                            id: format_key_id(&touch_key_id(&key.id, ModifierSet::NONE)),
                            ..Default::default()
                        };
                        if self.key_bag.contains(&shifted) {
                            touch.text = factory.process_key_output(&shifted).filter(|t| !t.is_empty());
                            let mut taps = factory.generate_multitap(&format!("{} {}", shifted, id));
                            for (tap, layer) in taps.iter_mut().zip(["shift", "default"]) {
                                tap.id = format_key_id(id);
                                tap.layer = Some(layer.to_string());
                            }
                            touch.multitap = Some(taps);
                        } else {
                            touch.text = factory.process_key_output(id).filter(|t| !t.is_empty());
                        }
                        touch
                    })
                    .collect(),
            })
            .collect();

        TouchLayoutLayer {
            id: "caps".to_string(),
            row,
        }
    }
}

fn map_subkey_layer(mut subkey: TouchLayoutSubKey) -> TouchLayoutSubKey {
    subkey.nextlayer = subkey.nextlayer.as_deref().map(touch_layer_id);
    subkey
}

/// Copies the touch-only fields of `source` onto `target`, matching layers,
/// rows and keys by position.
pub fn restore_touch_only_fields(target: &mut TouchLayoutFile, source: &TouchLayoutFile) {
    if let (Some(t), Some(s)) = (&mut target.tablet, source.tablet.as_ref().or(source.phone.as_ref())) {
        restore_platform(t, s);
    }
    if let (Some(t), Some(s)) = (&mut target.phone, source.phone.as_ref().or(source.tablet.as_ref())) {
        restore_platform(t, s);
    }
    if source.display_underlying.is_some() {
        target.display_underlying = source.display_underlying;
    }
}

fn restore_platform(target: &mut TouchLayoutPlatform, source: &TouchLayoutPlatform) {
    if source.font.is_some() {
        target.font = source.font.clone();
    }
    if source.fontsize.is_some() {
        target.fontsize = source.fontsize.clone();
    }
    if source.display_underlying.is_some() {
        target.display_underlying = source.display_underlying;
    }
    if source.default_hint.is_some() {
        target.default_hint = source.default_hint.clone();
    }
    for (t_layer, s_layer) in target.layer.iter_mut().zip(&source.layer) {
        for (t_row, s_row) in t_layer.row.iter_mut().zip(&s_layer.row) {
            for (t_key, s_key) in t_row.key.iter_mut().zip(&s_row.key) {
                restore_key(t_key, s_key);
            }
        }
    }
}

fn restore_key(target: &mut TouchLayoutKey, source: &TouchLayoutKey) {
    if source.font.is_some() {
        target.font = source.font.clone();
    }
    if source.fontsize.is_some() {
        target.fontsize = source.fontsize.clone();
    }
    if source.layer.is_some() {
        target.layer = source.layer.clone();
    }
    if source.sp.is_some() {
        target.sp = source.sp;
    }
    if source.text.is_some() {
        target.text = source.text.clone();
    }
    if source.pad.is_some() {
        target.pad = source.pad;
    }

    if let (Some(t), Some(s)) = (&mut target.sk, &source.sk) {
        t.iter_mut().zip(s).for_each(|(t, s)| restore_subkey(t, s));
    }
    if let (Some(t), Some(s)) = (&mut target.multitap, &source.multitap) {
        t.iter_mut().zip(s).for_each(|(t, s)| restore_subkey(t, s));
    }
    if let (Some(t), Some(s)) = (&mut target.flick, &source.flick) {
        for direction in FLICK_DIRECTIONS {
            if let (Some(mut subkey), Some(s)) = (t.get(direction).cloned(), s.get(direction)) {
                restore_subkey(&mut subkey, s);
                t.set(direction, subkey);
            }
        }
    }
}

fn restore_subkey(target: &mut TouchLayoutSubKey, source: &TouchLayoutSubKey) {
    if source.font.is_some() {
        target.font = source.font.clone();
    }
    if source.fontsize.is_some() {
        target.fontsize = source.fontsize.clone();
    }
    if source.layer.is_some() {
        target.layer = source.layer.clone();
    }
    if source.sp.is_some() {
        target.sp = source.sp;
    }
    if source.text.is_some() {
        target.text = source.text.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmn_ldml_core::ldml::{LdmlFlick, LdmlFlickSegment, LdmlKey, TABLET_MIN_WIDTH, TOUCH_FORM};

    fn hardware_keyboard() -> LdmlKeyboard {
        LdmlKeyboard {
            keys: vec![
                LdmlKey::new("K_A", "a"),
                LdmlKey::new("K_A_shift", "A"),
                LdmlKey::new("K_B", "b"),
            ],
            layers: vec![LdmlLayers {
                form_id: "us".to_string(),
                min_device_width: None,
                layers: vec![
                    LdmlLayer {
                        id: None,
                        modifiers: Some("none".to_string()),
                        rows: vec![vec!["K_A".to_string(), "K_B".to_string()]],
                    },
                    LdmlLayer {
                        id: None,
                        modifiers: Some("shift".to_string()),
                        rows: vec![vec!["K_A_shift".to_string()]],
                    },
                ],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_touch_key_id() {
        let mut shift = ModifierSet::NONE;
        shift.shift = true;
        assert_eq!(touch_key_id("K_A_shift", shift), "K_A");
        assert_eq!(touch_key_id("K_A-2", ModifierSet::NONE), "K_A");
        assert_eq!(touch_key_id("T_new-key", ModifierSet::NONE), "T_new-key");
    }

    #[test]
    fn test_generated_from_hardware() {
        let keyboard = hardware_keyboard();
        let (file, warnings) = TouchLayoutCompiler::new(&keyboard).compile();
        assert!(warnings.is_empty());
        assert!(file.phone.is_none());

        let tablet = file.tablet.unwrap();
        assert_eq!(tablet.font.as_deref(), Some(DEFAULT_FONT));
        let ids: Vec<_> = tablet.layer.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["default", "shift", "caps"]);

        let shifted = &tablet.layer[1].row[0].key[0];
        assert_eq!(shifted.id, "K_A");
        assert_eq!(shifted.text.as_deref(), Some("A"));

        let caps = &tablet.layer[2].row[0].key;
        assert_eq!(caps[0].text.as_deref(), Some("A"));
        let multitap: Vec<_> = caps[0]
            .multitap
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| (s.id.as_str(), s.layer.as_deref()))
            .collect();
        assert_eq!(multitap, vec![("K_A", Some("shift")), ("K_A", Some("default"))]);
        assert_eq!(caps[1].text.as_deref(), Some("b"));
        assert!(caps[1].multitap.is_none());
    }

    #[test]
    fn test_every_touch_key_id_is_canonical() {
        let mut keyboard = hardware_keyboard();
        keyboard.keys.push(LdmlKey {
            gap: true,
            ..LdmlKey::new("gap", "")
        });
        keyboard.keys.push(LdmlKey::new("T_new-1", "n"));
        keyboard.layers[0].layers[0].rows.push(vec!["gap".to_string(), "T_new-1".to_string()]);

        let (file, _) = TouchLayoutCompiler::new(&keyboard).compile();
        let tablet = file.tablet.unwrap();
        let keys: Vec<(&str, &str)> = tablet
            .layer
            .iter()
            .flat_map(|l| l.row.iter().flat_map(move |r| r.key.iter().map(move |k| (l.id.as_str(), k.id.as_str()))))
            .collect();
        let non_canonical: Vec<_> = keys.iter().filter(|(_, id)| format_key_id(id) != *id).collect();
        assert!(non_canonical.is_empty(), "Non-canonical ids: {:?}", non_canonical);
        assert!(keys.contains(&("default", "K_GAP")));
        assert!(keys.contains(&("caps", "K_GAP")));
        assert!(keys.contains(&("default", "K_T_NEW")));
    }

    #[test]
    fn test_touch_layers_compiled() {
        let keyboard = LdmlKeyboard {
            keys: vec![
                LdmlKey {
                    long_press_key_ids: Some("U_00E9 U_00E8".to_string()),
                    long_press_default_key_id: Some("U_00E8".to_string()),
                    flick_id: Some("flick_K_E".to_string()),
                    width: Some(1.5),
                    ..LdmlKey::new("K_E", "e")
                },
                LdmlKey::new("U_00E9", "é"),
                LdmlKey::new("U_00E8", "è"),
                LdmlKey {
                    flick_id: Some("missing".to_string()),
                    ..LdmlKey::new("K_X", "x")
                },
            ],
            flicks: vec![LdmlFlick {
                id: "flick_K_E".to_string(),
                segments: vec![LdmlFlickSegment {
                    directions: "s e".to_string(),
                    key_id: "U_00E9".to_string(),
                }],
            }],
            layers: vec![LdmlLayers {
                form_id: TOUCH_FORM.to_string(),
                min_device_width: Some(TABLET_MIN_WIDTH),
                layers: vec![LdmlLayer {
                    id: Some("base".to_string()),
                    modifiers: None,
                    rows: vec![vec!["K_E".to_string(), "K_X".to_string(), "bksp".to_string(), "K_Q".to_string()]],
                }],
            }],
            ..Default::default()
        };

        let (file, warnings) = TouchLayoutCompiler::new(&keyboard).compile();
        assert!(warnings.contains(&Warning::FlickNotFound {
            flick_id: "missing".to_string(),
            key_id: "K_X".to_string()
        }));
        assert!(warnings.contains(&Warning::LookupMiss {
            key_id: "K_Q".to_string()
        }));

        let tablet = file.tablet.as_ref().unwrap();
        assert_eq!(file.phone.as_ref(), Some(tablet));
        assert_eq!(tablet.layer[0].id, "default");

        let keys = &tablet.layer[0].row[0].key;
        assert_eq!(keys[0].width, Some(150.0));
        let sk = keys[0].sk.as_ref().unwrap();
        assert_eq!(sk[0].text.as_deref(), Some("é"));
        assert!(!sk[0].is_default());
        assert!(sk[1].is_default());
        let flick = keys[0].flick.as_ref().unwrap();
        assert_eq!(flick.se.as_ref().map(|s| s.id.as_str()), Some("U_00E9"));
        assert_eq!(keys[2].id, "K_BKSP");
        assert_eq!(keys[2].sp, Some(KeySp::Special));
        assert_eq!(keys[3].id, "K_Q");
        assert!(keys[3].text.is_none());
    }

    #[test]
    fn test_restore_touch_only_fields() {
        let source = TouchLayoutFile {
            phone: Some(TouchLayoutPlatform {
                font: Some("Padauk".to_string()),
                layer: vec![TouchLayoutLayer {
                    id: "default".to_string(),
                    row: vec![TouchLayoutRow {
                        id: 1,
                        key: vec![TouchLayoutKey {
                            id: "K_A".to_string(),
                            text: Some(" က".to_string()),
                            sp: Some(KeySp::Deadkey),
                            fontsize: Some("1.2em".to_string()),
                            ..Default::default()
                        }],
                    }],
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut target = TouchLayoutFile {
            tablet: Some(TouchLayoutCompiler::platform(vec![TouchLayoutLayer {
                id: "default".to_string(),
                row: vec![TouchLayoutRow {
                    id: 1,
                    key: vec![TouchLayoutKey {
                        id: "K_A".to_string(),
                        ..Default::default()
                    }],
                }],
            }])),
            ..Default::default()
        };

        restore_touch_only_fields(&mut target, &source);
        let tablet = target.tablet.unwrap();
        assert_eq!(tablet.font.as_deref(), Some("Padauk"));
        let key = &tablet.layer[0].row[0].key[0];
        assert_eq!(key.text.as_deref(), Some(" က"));
        assert_eq!(key.sp, Some(KeySp::Deadkey));
        assert_eq!(key.fontsize.as_deref(), Some("1.2em"));
    }
}
