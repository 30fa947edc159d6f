/// Notifier configuration loading and validation
pub mod settings;

pub use settings::{NotifierConfig, DEFAULT_SERVER_URI};
