pub mod translation_preferences;

pub use translation_preferences::*;
