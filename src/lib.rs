//! Exception reporting client
//!
//! Builds an XML notice from an error and its causes, then POSTs it to an
//! error-tracking service in the background. Reporting never blocks on the
//! network and never hands a second error back to the caller.

/// Error types for the notifier
pub mod error;

/// Configuration management
pub mod config;

/// Notice model and builder
pub mod notice;

/// Wire document encoding
pub mod serialization;

/// Asynchronous delivery
pub mod delivery;

/// Extension trait for reporting errors directly
pub mod extensions;

// Re-export commonly used types
pub use config::NotifierConfig;
pub use delivery::{NoticeClient, RequestEnded, SendOutcome};
pub use error::{ConfigError, DeliveryError, SerializationError};
pub use extensions::SendToNotifier;
pub use notice::{Captured, Exception, KeyValuePair, Notice, NoticeBuilder};
