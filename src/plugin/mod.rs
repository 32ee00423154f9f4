pub mod installer;
pub mod manager;
pub mod manifest;
pub mod registry;

pub use installer::PluginInstaller;
pub use manager::PluginManager;
pub use registry::{NpmRegistry, Registry};
