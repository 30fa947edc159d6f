//! Request and completion types shared by the client and transports

use crate::error::DeliveryError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Url};
use std::borrow::Cow;

/// Timestamp type for consistent time handling across the crate
pub type Timestamp = DateTime<Utc>;

/// Media type of the wire document
pub const XML_MEDIA_TYPE: &str = "text/xml";

/// A fully prepared notice POST
///
/// The body is already serialized when this value exists; transports only
/// move bytes.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl OutboundRequest {
    /// Build a POST of `document` to `server_uri`
    ///
    /// Sets `Content-Type` and `Accept` to `text/xml`, `Connection: close`
    /// and a `Content-Length` equal to the UTF-8 byte count of the document.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::InvalidUri` if `server_uri` is not an absolute URL.
    pub fn post_xml(server_uri: &str, document: String) -> Result<Self, DeliveryError> {
        let url = Url::parse(server_uri)
            .map_err(|e| DeliveryError::InvalidUri(server_uri.to_string(), e.to_string()))?;

        let body = document.into_bytes();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML_MEDIA_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(XML_MEDIA_TYPE));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

        Ok(Self {
            method: Method::POST,
            url,
            headers,
            body,
        })
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// The body as text, for logging
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Status line and headers of a received response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseInfo {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Published once per dispatched notice when the exchange is over
///
/// `response` is `None` when no response could be obtained at all (for
/// example the server was unreachable); `response_body` is then empty.
#[derive(Debug, Clone)]
pub struct RequestEnded {
    pub request: OutboundRequest,
    pub response: Option<ResponseInfo>,
    pub response_body: String,
    pub timestamp: Timestamp,
}
