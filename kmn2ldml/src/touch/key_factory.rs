use std::cell::RefCell;
use log::debug;
use kmn_ldml_core::touch_layout::TouchLayoutSubKey;
use kmn_ldml_core::{KeyBag, Warning};
use super::expander::VariableExpander;

/// Canonical touch-layout key id.
///
/// `K_`/`U_` ids (any case) are upper-cased; a single character becomes
/// `U_` plus its code point in at least four upper-case hex digits; anything
/// else gets a `K_` prefix. Applying it twice gives the same id.
pub fn format_key_id(id: &str) -> String {
    let mut chars = id.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return format!("U_{:04X}", c as u32);
    }

    let upper = id.to_uppercase();
    if upper.starts_with("K_") || upper.starts_with("U_") {
        upper
    } else {
        format!("K_{}", upper)
    }
}

/// Builds ordered subkey lists from space separated key id lists.
pub struct KeySubKeyFactory<'a> {
    key_bag: &'a KeyBag,
    expander: &'a VariableExpander,
    warnings: RefCell<Vec<Warning>>,
}

impl<'a> KeySubKeyFactory<'a> {
    pub fn new(key_bag: &'a KeyBag, expander: &'a VariableExpander) -> Self {
        Self {
            key_bag,
            expander,
            warnings: RefCell::new(Vec::new()),
        }
    }

    /// Long-press subkeys, in list order. Only the first entry whose id equals
    /// `default_key_id` is flagged; an id missing from the list flags nothing.
    pub fn generate_subkeys(
        &self,
        key_ids: &str,
        default_key_id: Option<&str>,
    ) -> Vec<TouchLayoutSubKey> {
        let mut default_marked = false;
        key_ids
            .split_whitespace()
            .map(|id| {
                let mut subkey = self.build_subkey(id);
                if !default_marked && default_key_id == Some(id) {
                    subkey.default = Some(true);
                    default_marked = true;
                }
                subkey
            })
            .collect()
    }

    pub fn generate_multitap(&self, key_ids: &str) -> Vec<TouchLayoutSubKey> {
        key_ids
            .split_whitespace()
            .map(|id| self.build_subkey(id))
            .collect()
    }

    /// Display text for a key, or `None` when the key bag has no such key.
    pub fn process_key_output(&self, key_id: &str) -> Option<String> {
        match self.key_bag.get(key_id) {
            Some(key) => Some(self.expander.convert_markers_to_output(&key.output)),
            None => {
                debug!("Key {} not found in key bag", key_id);
                self.warnings.borrow_mut().push(Warning::LookupMiss {
                    key_id: key_id.to_string(),
                });
                None
            }
        }
    }

    pub fn take_warnings(&self) -> Vec<Warning> {
        self.warnings.take()
    }

    fn build_subkey(&self, id: &str) -> TouchLayoutSubKey {
        let text = self.process_key_output(id).filter(|t| !t.is_empty());
        let nextlayer = self.key_bag.get(id).and_then(|k| k.layer_id.clone());
        TouchLayoutSubKey {
            id: format_key_id(id),
            text,
            nextlayer,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kmn_ldml_core::ldml::LdmlKey;

    fn bag() -> KeyBag {
        KeyBag::new(vec![
            LdmlKey::new("a", "a"),
            LdmlKey::new("b", "b"),
            LdmlKey::new("c", "c"),
        ])
    }

    #[test]
    fn test_format_key_id() {
        assert_eq!(format_key_id("a"), "U_0061");
        assert_eq!(format_key_id("k_a"), "K_A");
        assert_eq!(format_key_id("u_00e9"), "U_00E9");
        assert_eq!(format_key_id("shift"), "K_SHIFT");
        assert_eq!(format_key_id("\u{1F600}"), "U_1F600");
    }

    #[test]
    fn test_format_key_id_is_idempotent() {
        for id in ["a", "k_a", "shift", "T_menu", "é", "\u{1F600}"] {
            let once = format_key_id(id);
            assert_eq!(format_key_id(&once), once);
        }
    }

    #[test]
    fn test_subkey_order_preserved() {
        let bag = bag();
        let expander = VariableExpander::default();
        let factory = KeySubKeyFactory::new(&bag, &expander);

        let subkeys = factory.generate_subkeys("  a   b c ", None);
        let ids: Vec<_> = subkeys.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["U_0061", "U_0062", "U_0063"]);
        assert!(subkeys.iter().all(|s| !s.is_default()));
    }

    #[test]
    fn test_default_flagging() {
        let bag = bag();
        let expander = VariableExpander::default();
        let factory = KeySubKeyFactory::new(&bag, &expander);

        let subkeys = factory.generate_subkeys("a b", Some("b"));
        let defaults: Vec<_> = subkeys.iter().filter(|s| s.is_default()).map(|s| s.id.as_str()).collect();
        assert_eq!(defaults, vec!["U_0062"]);

        let none = factory.generate_subkeys("a b", Some("z"));
        assert!(none.iter().all(|s| !s.is_default()));
    }

    #[test]
    fn test_lookup_miss_degrades() {
        let bag = bag();
        let expander = VariableExpander::default();
        let factory = KeySubKeyFactory::new(&bag, &expander);

        let subkeys = factory.generate_multitap("a q");
        assert_eq!(subkeys[1].id, "U_0071");
        assert_eq!(subkeys[1].text, None);
        assert_eq!(subkeys[0].text.as_deref(), Some("a"));
        assert_eq!(
            factory.take_warnings(),
            vec![Warning::LookupMiss { key_id: "q".to_string() }]
        );
    }
}
