pub mod auth;
pub mod dao;

pub use auth::{AuthError, AuthService, Claims};
pub use dao::settings::TranslationSettingsDao;
