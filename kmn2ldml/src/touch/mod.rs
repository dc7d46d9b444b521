pub mod compiler;
pub mod converter;
pub mod expander;
pub mod key_factory;

pub use compiler::{restore_touch_only_fields, TouchLayoutCompiler};
pub use converter::{ConvertedTouchLayout, TouchLayoutConverter};
pub use expander::{MarkerMap, VariableExpander};
pub use key_factory::{format_key_id, KeySubKeyFactory};
