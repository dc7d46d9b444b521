pub mod errors;
pub mod ldml;
pub mod modifiers;
pub mod system_stores;
pub mod touch_layout;
pub mod virtual_keys;

pub use errors::*;
pub use ldml::*;
pub use modifiers::*;
pub use system_stores::*;
pub use touch_layout::*;
pub use virtual_keys::*;
