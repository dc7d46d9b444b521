use kmn_ldml_core::ModifierSet;
use kmn_ldml_core::system_stores::system_store_name;

// AST nodes for KMN parsing
#[derive(Debug, Clone, Default)]
pub struct KmnDocument {
    pub path: String,
    pub begins: Vec<Begin>,
    pub stores: Vec<Store>,
    pub groups: Vec<Group>,
}

impl KmnDocument {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// The last store declared under `name`; later declarations win.
    pub fn store(&self, name: &str) -> Option<&Store> {
        let name = system_store_name(name).unwrap_or(name);
        self.stores.iter().rev().find(|s| s.name == name)
    }

    /// Text value of a System Store such as `NAME` or `&VERSION`.
    pub fn system_value(&self, name: &str) -> Option<String> {
        let canonical = system_store_name(name)?;
        self.stores
            .iter()
            .rev()
            .find(|s| s.kind.reserved && s.name == canonical)
            .map(|s| s.value())
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every deadkey name used in rules and stores, with repeats.
    pub fn deadkey_names(&self) -> impl Iterator<Item = &str> {
        let in_rules = self
            .groups
            .iter()
            .flat_map(|g| g.rules.iter())
            .flat_map(|r| r.context.iter().chain(&r.output))
            .filter_map(|element| match element {
                Element::Deadkey(name) => Some(name.as_str()),
                _ => None,
            });
        let in_stores = self
            .stores
            .iter()
            .flat_map(|s| s.items.iter())
            .filter_map(|item| match item {
                StoreItem::Deadkey(name) => Some(name.as_str()),
                _ => None,
            });
        in_rules.chain(in_stores)
    }
}

/// Store kind flags. A store with no flag set is a normal store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreKind {
    pub reserved: bool,
    pub option: bool,
    pub debug: bool,
    pub call: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub name: String,
    pub kind: StoreKind,
    pub items: Vec<StoreItem>,
    pub line: usize,
}

impl Store {
    /// Character content of the store. Deadkeys, keys and `nul` contribute nothing.
    pub fn value(&self) -> String {
        self.items
            .iter()
            .filter_map(|item| match item {
                StoreItem::Char(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn is_key_store(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| matches!(i, StoreItem::Key(_)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreItem {
    Char(char),
    Deadkey(String),
    Key(KeySpec),
    Nul,
}

/// A key with its modifier context, e.g. `[SHIFT RALT K_1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub modifiers: ModifierSet,
    pub key: String,
}

impl KeySpec {
    pub fn new(modifiers: ModifierSet, key: impl Into<String>) -> Self {
        Self {
            modifiers,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginMode {
    Unicode,
    Ansi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Begin {
    pub mode: BeginMode,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub using_keys: bool,
    pub readonly: bool,
    pub rules: Vec<Rule>,
    pub match_output: Option<Vec<Element>>,
    pub nomatch_output: Option<Vec<Element>>,
    pub line: usize,
}

impl Group {
    pub fn new(name: impl Into<String>, using_keys: bool, line: usize) -> Self {
        Self {
            name: name.into(),
            using_keys,
            readonly: false,
            rules: Vec::new(),
            match_output: None,
            nomatch_output: None,
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub line: usize,
    pub context: Vec<Element>,
    pub key: Option<KeyPattern>,
    pub output: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyPattern {
    Key(KeySpec),
    AnyStore(String), // any(keystore)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(String),
    Deadkey(String),
    Any(String),
    NotAny(String),
    Index { store: String, offset: usize },
    Outs(String),
    Context(Option<usize>),
    Use(String),
    Call(String),
    Set { option: String, value: String },
    Save(String),
    Reset(String),
    If { store: String, negated: bool, value: String },
    Platform(String),
    BaseLayout(String),
    Layer(String),
    Beep,
    Nul,
}

