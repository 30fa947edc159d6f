use crate::config::NotifierConfig;
use crate::notice::exception::{error_chain, Exception};
use crate::notice::host::{select_address, HostResolver, SystemResolver};
use crate::notice::model::{
    BacktraceLine, KeyValuePair, Notice, RequestContext, ServerEnvironment, VarList,
    IP_ADDRESS_KEY, NOTICE_SCHEMA_VERSION,
};
use log::debug;
use std::sync::Arc;

/// Turns exceptions into populated notices
///
/// Building never fails: anything that cannot be determined (host address,
/// frames, hostname) is simply left out of the notice.
pub struct NoticeBuilder {
    config: Arc<NotifierConfig>,
    resolver: Arc<dyn HostResolver>,
}

impl NoticeBuilder {
    /// Create a builder that resolves host details through the OS
    pub fn new(config: Arc<NotifierConfig>) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Create a builder with a specific host resolver
    pub fn with_resolver(config: Arc<NotifierConfig>, resolver: Arc<dyn HostResolver>) -> Self {
        Self { config, resolver }
    }

    pub fn configuration(&self) -> &NotifierConfig {
        &self.config
    }

    /// Build a notice with no CGI or session data
    pub fn notice<E: Exception + ?Sized>(&self, exception: &E) -> Notice {
        self.build_notice(exception, None, None)
    }

    /// Build a notice for `exception`
    ///
    /// CGI and session data are copied in the order given. The host address
    /// is appended to the CGI data under `Environment.IpAddress` unless the
    /// caller already supplied that key.
    ///
    /// # Example
    /// ```
    /// use faultpost::config::NotifierConfig;
    /// use faultpost::notice::{KeyValuePair, NoticeBuilder};
    /// use std::sync::Arc;
    ///
    /// let builder = NoticeBuilder::new(Arc::new(NotifierConfig::default()));
    /// let error = anyhow::anyhow!("payment declined");
    /// let cgi = KeyValuePair::from_pairs([("REQUEST_METHOD", "POST")]);
    ///
    /// let notice = builder.build_notice(&error, Some(&cgi), None);
    /// assert_eq!(notice.errors[0].message, "payment declined");
    /// assert_eq!(notice.request.cgi_data.vars[0].key, "REQUEST_METHOD");
    /// ```
    pub fn build_notice<E: Exception + ?Sized>(
        &self,
        exception: &E,
        cgi_data: Option<&[KeyValuePair]>,
        session_data: Option<&[KeyValuePair]>,
    ) -> Notice {
        let errors = error_chain(exception);
        let (component, action) = errors
            .first()
            .and_then(|entry| entry.backtrace.lines.first())
            .map(locate_frame)
            .unwrap_or_default();

        let request = RequestContext {
            url: String::new(),
            component,
            action,
            params: VarList::default(),
            session: VarList::from(session_data.map(<[_]>::to_vec).unwrap_or_default()),
            cgi_data: self.cgi_data(cgi_data),
        };

        Notice {
            version: NOTICE_SCHEMA_VERSION.to_string(),
            api_key: self.config.api_key.clone(),
            notifier: self.config.notifier.clone(),
            errors,
            request,
            server_environment: self.server_environment(),
        }
    }

    /// Server environment block from configuration and the local hostname
    pub fn server_environment(&self) -> ServerEnvironment {
        ServerEnvironment {
            project_root: self.config.project_root.clone(),
            environment_name: self.config.environment_name.clone(),
            app_version: self.config.app_version.clone(),
            hostname: self.resolver.hostname().unwrap_or_default(),
        }
    }

    fn cgi_data(&self, supplied: Option<&[KeyValuePair]>) -> VarList {
        let mut cgi_data = VarList::from(supplied.map(<[_]>::to_vec).unwrap_or_default());

        if !cgi_data.contains_key(IP_ADDRESS_KEY) {
            match select_address(&self.resolver.addresses()) {
                Some(address) => cgi_data
                    .vars
                    .push(KeyValuePair::new(IP_ADDRESS_KEY, address.to_string())),
                None => debug!("No host address resolved, omitting {}", IP_ADDRESS_KEY),
            }
        }

        cgi_data
    }
}

/// Split a frame's method into (component, action)
fn locate_frame(frame: &BacktraceLine) -> (String, String) {
    match frame.method.rsplit_once("::") {
        Some((component, action)) => (component.to_string(), action.to_string()),
        None => (String::new(), frame.method.clone()),
    }
}
