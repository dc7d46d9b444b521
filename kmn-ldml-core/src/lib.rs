pub mod types;
pub mod key_bag;

pub use types::*;

// Re-export commonly used types
pub use types::errors::{KmnError, Result, Warning};
pub use types::ldml::LdmlKeyboard;
pub use types::modifiers::ModifierSet;
pub use types::touch_layout::TouchLayoutFile;
pub use key_bag::KeyBag;
