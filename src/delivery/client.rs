use crate::config::NotifierConfig;
use crate::delivery::events::{OutboundRequest, RequestEnded};
use crate::delivery::transport::{HttpTransport, Transport, TransportResponse};
use crate::error::DeliveryError;
use crate::notice::{Exception, Notice, NoticeBuilder};
use crate::serialization;
use chrono::Utc;
use log::{debug, error, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the `RequestEnded` channel; slow subscribers miss old events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What `send` did with a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport; completion is reported through `RequestEnded`
    Dispatched,
    /// Not sent because the environment is a development environment
    Suppressed,
    /// Not sent because the notice carries no error
    Invalid,
    /// Not sent because neither the notice nor the configuration has an API key
    MissingApiKey,
    /// Not sent because the request could not be prepared or dispatched
    Failed,
}

/// Sends notices to the error-tracking service
///
/// Sending is fire-and-forget: `send` prepares and serializes the request on
/// the caller's thread, hands it to a background task and returns. Failures
/// never reach the caller; they are logged and, once a request was
/// dispatched, reported through [`RequestEnded`] events.
///
/// # Example
/// ```no_run
/// use faultpost::config::NotifierConfig;
/// use faultpost::delivery::NoticeClient;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = NoticeClient::new(NotifierConfig {
///     api_key: "my-project-key".to_string(),
///     ..NotifierConfig::default()
/// })?;
/// let mut ended = client.subscribe();
///
/// client.send_exception(&anyhow::anyhow!("payment gateway timed out"));
/// let event = ended.recv().await?;
/// println!("status: {:?}", event.response.map(|r| r.status));
/// # Ok(())
/// # }
/// ```
pub struct NoticeClient {
    config: Arc<NotifierConfig>,
    builder: NoticeBuilder,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<RequestEnded>,
}

impl NoticeClient {
    /// Create a client that delivers over HTTP
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ClientBuild` if the HTTP client cannot be created.
    pub fn new(config: NotifierConfig) -> Result<Self, DeliveryError> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client with a specific transport
    pub fn with_transport(config: NotifierConfig, transport: Arc<dyn Transport>) -> Self {
        let config = Arc::new(config);
        let builder = NoticeBuilder::new(Arc::clone(&config));
        Self::with_parts(config, builder, transport)
    }

    /// Create a client from a prepared builder and transport
    pub fn with_parts(
        config: Arc<NotifierConfig>,
        builder: NoticeBuilder,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            builder,
            transport,
            events,
        }
    }

    /// The builder this client uses for `send_exception`
    pub fn builder(&self) -> &NoticeBuilder {
        &self.builder
    }

    /// Receive a `RequestEnded` event for every exchange finished from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEnded> {
        self.events.subscribe()
    }

    /// Build a notice for `exception` and send it
    pub fn send_exception<E: Exception + ?Sized>(&self, exception: &E) -> SendOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.builder.notice(exception))) {
            Ok(notice) => self.send(notice),
            Err(panic) => {
                error!(
                    "Panic while building notice: {}",
                    panic_message(panic.as_ref())
                );
                SendOutcome::Failed
            }
        }
    }

    /// Send a notice
    ///
    /// Returns once the request body is serialized and the exchange has been
    /// handed off. Never panics and never returns an error.
    pub fn send(&self, notice: Notice) -> SendOutcome {
        debug!("NoticeClient.send({})", notice);

        match catch_unwind(AssertUnwindSafe(|| self.try_send(notice))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("An error occurred while trying to send notice: {}", e);
                SendOutcome::Failed
            }
            Err(panic) => {
                error!(
                    "Panic while trying to send notice: {}",
                    panic_message(panic.as_ref())
                );
                SendOutcome::Failed
            }
        }
    }

    fn try_send(&self, mut notice: Notice) -> Result<SendOutcome, DeliveryError> {
        if notice.errors.is_empty() {
            error!("Not sending notice without an error entry");
            return Ok(SendOutcome::Invalid);
        }

        if notice.api_key.is_empty() {
            // The caller is already handling an error; another one would not help
            if self.config.api_key.is_empty() {
                error!("No API key found. Please configure 'api_key' or FAULTPOST_API_KEY.");
                return Ok(SendOutcome::MissingApiKey);
            }
            notice.api_key = self.config.api_key.clone();
        }

        let environment_name = &notice.server_environment.environment_name;
        if self.config.is_development_environment(environment_name) {
            warn!(
                "Not sending notice since [{}] is configured as a development environment",
                environment_name
            );
            return Ok(SendOutcome::Suppressed);
        }

        let document = serialization::to_xml(&notice);
        let request = OutboundRequest::post_xml(&self.config.server_uri, document)?;
        debug!(
            "Sending the following to '{}':\n{}",
            request.url,
            request.body_text()
        );

        self.dispatch(request)?;
        Ok(SendOutcome::Dispatched)
    }

    /// Run the exchange on the current tokio runtime, or on a helper thread
    /// with its own runtime when the caller is not inside one
    fn dispatch(&self, request: OutboundRequest) -> Result<(), DeliveryError> {
        let exchange = complete_exchange(
            Arc::clone(&self.transport),
            self.events.clone(),
            request,
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(exchange);
                Ok(())
            }
            Err(_) => std::thread::Builder::new()
                .name("faultpost-delivery".to_string())
                .spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(exchange),
                        Err(e) => error!("Failed to start delivery runtime: {}", e),
                    }
                })
                .map(|_| ())
                .map_err(|e| DeliveryError::Dispatch(e.to_string())),
        }
    }
}

/// Perform one exchange and publish its `RequestEnded` event
async fn complete_exchange(
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<RequestEnded>,
    request: OutboundRequest,
) {
    let (response, response_body) = match transport.execute(&request).await {
        Ok(TransportResponse { info, body }) => {
            if info.is_success() {
                debug!("Received from notice service.\n{}", body);
            } else {
                error!(
                    "Notice service at '{}' answered {}: {}",
                    request.url, info.status, body
                );
            }
            (Some(info), body)
        }
        Err(e) => {
            error!("An error occurred while retrieving the web response: {}", e);
            (None, String::new())
        }
    };

    let event = RequestEnded {
        request,
        response,
        response_body,
        timestamp: Utc::now(),
    };

    if events.send(event).is_err() {
        debug!("No RequestEnded subscribers");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::transport::MockTransport;
    use crate::notice::host::MockHostResolver;
    use crate::notice::{ErrorEntry, KeyValuePair, IP_ADDRESS_KEY};
    use crate::serialization::from_xml;
    use reqwest::header::{ACCEPT, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
    use std::fmt;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::sync::broadcast::Receiver;

    #[derive(Debug)]
    struct PaymentDeclined;

    impl fmt::Display for PaymentDeclined {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "payment declined")
        }
    }

    impl std::error::Error for PaymentDeclined {}

    /// Exception whose message formatting panics
    struct Explosive;

    impl Exception for Explosive {
        fn type_name(&self) -> String {
            "Explosive".to_string()
        }

        fn message(&self) -> String {
            panic!("message formatting failed")
        }

        fn cause(&self) -> Option<&(dyn std::error::Error + 'static)> {
            None
        }
    }

    fn test_config() -> NotifierConfig {
        NotifierConfig {
            api_key: "configured-key".to_string(),
            server_uri: "http://notices.test/notifier_api/v2/notices".to_string(),
            environment_name: "production".to_string(),
            development_environments: vec!["Development".to_string(), "test".to_string()],
            ..NotifierConfig::default()
        }
    }

    fn client_with(config: NotifierConfig, transport: Arc<MockTransport>) -> NoticeClient {
        let mut resolver = MockHostResolver::new();
        resolver
            .expect_hostname()
            .returning(|| Some("worker-7".to_string()));
        resolver
            .expect_addresses()
            .returning(|| vec![IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))]);

        let config = Arc::new(config);
        let builder = NoticeBuilder::with_resolver(Arc::clone(&config), Arc::new(resolver));
        NoticeClient::with_parts(config, builder, transport)
    }

    async fn next_event(events: &mut Receiver<RequestEnded>) -> RequestEnded {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for RequestEnded")
            .expect("event channel closed")
    }

    fn notice_in(environment_name: &str, api_key: &str) -> Notice {
        let mut notice = Notice::default().with_api_key(api_key);
        notice.errors.push(ErrorEntry {
            class: "PaymentDeclined".to_string(),
            message: "payment declined".to_string(),
            ..ErrorEntry::default()
        });
        notice.server_environment.environment_name = environment_name.to_string();
        notice
    }

    #[tokio::test]
    async fn test_send_dispatches_and_publishes_request_ended() {
        let transport = Arc::new(MockTransport::with_response(200, "<notice><id>7</id></notice>"));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        let outcome = client.send_exception(&anyhow::Error::new(PaymentDeclined));
        assert_eq!(outcome, SendOutcome::Dispatched);

        let event = next_event(&mut events).await;
        assert_eq!(event.response.as_ref().map(|r| r.status), Some(200));
        assert_eq!(event.response_body, "<notice><id>7</id></notice>");
        assert_eq!(transport.call_count(), 1);

        let sent = from_xml(&event.request.body_text()).unwrap();
        assert_eq!(sent.api_key, "configured-key");
        assert_eq!(sent.errors[0].message, "payment declined");
        assert_eq!(sent.request.cgi_data.get(IP_ADDRESS_KEY), Some("10.1.2.3"));
        assert_eq!(sent.server_environment.hostname, "worker-7");
    }

    #[tokio::test]
    async fn test_request_headers_and_length() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        client.send(notice_in("production", "notice-key"));
        next_event(&mut events).await;

        let request = transport.last_request().unwrap();
        assert_eq!(request.method, reqwest::Method::POST);
        assert_eq!(
            request.url.as_str(),
            "http://notices.test/notifier_api/v2/notices"
        );
        assert_eq!(request.headers[CONTENT_TYPE], "text/xml");
        assert_eq!(request.headers[ACCEPT], "text/xml");
        assert_eq!(request.headers[CONNECTION], "close");
        assert_eq!(
            request.headers[CONTENT_LENGTH],
            request.body.len().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_notice_api_key_wins_over_configuration() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        client.send(notice_in("production", "notice-key"));
        let event = next_event(&mut events).await;

        assert_eq!(from_xml(&event.request.body_text()).unwrap().api_key, "notice-key");
    }

    #[tokio::test]
    async fn test_configured_api_key_is_adopted() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        assert_eq!(client.send(notice_in("production", "")), SendOutcome::Dispatched);
        let event = next_event(&mut events).await;

        assert_eq!(
            from_xml(&event.request.body_text()).unwrap().api_key,
            "configured-key"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_aborts_without_dispatch() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let config = NotifierConfig {
            api_key: String::new(),
            ..test_config()
        };
        let client = client_with(config, Arc::clone(&transport));

        let outcome = client.send(notice_in("production", ""));
        assert_eq!(outcome, SendOutcome::MissingApiKey);

        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_notice_without_errors_is_not_sent() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        assert_eq!(client.send(Notice::default()), SendOutcome::Invalid);

        let mut notice = notice_in("production", "key");
        notice.errors.clear();
        assert_eq!(client.send(notice), SendOutcome::Invalid);

        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_development_environment_is_suppressed() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));

        assert_eq!(
            client.send(notice_in("development", "key")),
            SendOutcome::Suppressed
        );
        assert_eq!(client.send(notice_in("TEST", "key")), SendOutcome::Suppressed);

        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_builder_environment_is_checked_for_exceptions() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let config = NotifierConfig {
            environment_name: "Development".to_string(),
            ..test_config()
        };
        let client = client_with(config, Arc::clone(&transport));

        let outcome = client.send_exception(&anyhow::Error::new(PaymentDeclined));
        assert_eq!(outcome, SendOutcome::Suppressed);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_server_uri_fails_without_dispatch() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let config = NotifierConfig {
            server_uri: "not a uri".to_string(),
            ..test_config()
        };
        let client = client_with(config, Arc::clone(&transport));

        assert_eq!(client.send(notice_in("production", "key")), SendOutcome::Failed);
        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_publishes_event_without_response() {
        let transport = Arc::new(MockTransport::failing("connection reset"));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        assert_eq!(
            client.send(notice_in("production", "key")),
            SendOutcome::Dispatched
        );

        let event = next_event(&mut events).await;
        assert!(event.response.is_none());
        assert!(event.response_body.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_forwarded() {
        let transport = Arc::new(MockTransport::with_response(422, "Invalid API key"));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        client.send(notice_in("production", "key"));

        let event = next_event(&mut events).await;
        assert_eq!(event.response.map(|r| r.status), Some(422));
        assert_eq!(event.response_body, "Invalid API key");
    }

    #[tokio::test]
    async fn test_every_subscriber_is_notified() {
        let transport = Arc::new(MockTransport::with_response(200, "ok"));
        let client = client_with(test_config(), transport);
        let mut first = client.subscribe();
        let mut second = client.subscribe();

        client.send(notice_in("production", "key"));

        assert_eq!(next_event(&mut first).await.response_body, "ok");
        assert_eq!(next_event(&mut second).await.response_body, "ok");
    }

    #[tokio::test]
    async fn test_panicking_exception_is_contained() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));

        assert_eq!(client.send_exception(&Explosive), SendOutcome::Failed);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cgi_data_reaches_the_wire() {
        let transport = Arc::new(MockTransport::with_response(200, ""));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        let cgi = KeyValuePair::from_pairs([("key1", "value1"), ("key2", "value2")]);
        let notice =
            client
                .builder()
                .build_notice(&anyhow::Error::new(PaymentDeclined), Some(&cgi), None);
        client.send(notice);

        let event = next_event(&mut events).await;
        let sent = from_xml(&event.request.body_text()).unwrap();
        let keys: Vec<&str> = sent
            .request
            .cgi_data
            .vars
            .iter()
            .map(|pair| pair.key.as_str())
            .collect();
        assert_eq!(keys, vec!["key1", "key2", IP_ADDRESS_KEY]);
    }

    #[tokio::test]
    async fn test_send_exception_to_unreachable_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = NotifierConfig {
            server_uri: format!("http://127.0.0.1:{}/notices", port),
            ..test_config()
        };
        let client = NoticeClient::new(config).unwrap();
        let mut events = client.subscribe();

        let outcome = client.send_exception(&anyhow::Error::new(PaymentDeclined));
        assert_eq!(outcome, SendOutcome::Dispatched);

        let event = next_event(&mut events).await;
        assert!(event.response.is_none());
    }

    #[test]
    fn test_send_outside_runtime_uses_helper_thread() {
        let transport = Arc::new(MockTransport::with_response(200, "threaded"));
        let client = client_with(test_config(), Arc::clone(&transport));
        let mut events = client.subscribe();

        assert_eq!(
            client.send(notice_in("production", "key")),
            SendOutcome::Dispatched
        );

        let mut received = None;
        for _ in 0..100 {
            match events.try_recv() {
                Ok(event) => {
                    received = Some(event);
                    break;
                }
                Err(_) => std::thread::sleep(Duration::from_millis(50)),
            }
        }

        let event = received.expect("no RequestEnded from helper thread");
        assert_eq!(event.response_body, "threaded");
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
