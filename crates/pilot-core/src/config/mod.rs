mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{DEFAULT_LISTEN_ADDRESS, DEFAULT_SERVER_EXECUTABLE, ProcessSettings, Settings};
pub use validation::warn_unknown_fields;
