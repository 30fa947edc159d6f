/// Delivery client, transports and completion events
pub mod client;
pub mod events;
pub mod transport;

pub use client::{NoticeClient, SendOutcome};
pub use events::{OutboundRequest, RequestEnded, ResponseInfo};
pub use transport::{HttpTransport, MockTransport, Transport, TransportResponse};
