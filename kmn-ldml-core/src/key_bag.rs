use std::collections::HashMap;

use crate::types::ldml::{LdmlKey, LdmlKeyboard};

/// Read-only lookup from key id to key definition.
///
/// Built once per compilation and shared by reference; there is no way to
/// mutate it after construction. When ids repeat, the first definition wins,
/// matching the order an LDML processor resolves `<key>` elements in.
#[derive(Debug, Clone, Default)]
pub struct KeyBag {
    keys: HashMap<String, LdmlKey>,
}

impl KeyBag {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = LdmlKey>,
    {
        let mut map = HashMap::new();
        for key in keys {
            map.entry(key.id.clone()).or_insert(key);
        }
        KeyBag { keys: map }
    }

    pub fn from_keyboard(keyboard: &LdmlKeyboard) -> Self {
        KeyBag::new(keyboard.keys.iter().cloned())
    }

    pub fn get(&self, id: &str) -> Option<&LdmlKey> {
        self.keys.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }
}
