pub mod base;
pub mod settings;

pub use base::BaseDao;
