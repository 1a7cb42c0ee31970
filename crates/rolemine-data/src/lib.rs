pub mod catalog;
pub mod export;
pub mod loader;
pub mod store;

pub use catalog::DataCatalog;
pub use loader::FileKind;
pub use store::{OptionStore, RoleStore};
