//! Reporting straight from an error value

use crate::delivery::{NoticeClient, SendOutcome};
use crate::notice::{Exception, KeyValuePair};

/// Send any reportable error with `error.send_to(&client)`
pub trait SendToNotifier {
    /// Send this error with no CGI data
    fn send_to(&self, client: &NoticeClient) -> SendOutcome;

    /// Send this error with CGI data, kept in the given order
    fn send_to_with_cgi(&self, cgi_data: &[KeyValuePair], client: &NoticeClient) -> SendOutcome;
}

impl<T: Exception + ?Sized> SendToNotifier for T {
    fn send_to(&self, client: &NoticeClient) -> SendOutcome {
        client.send_exception(self)
    }

    fn send_to_with_cgi(&self, cgi_data: &[KeyValuePair], client: &NoticeClient) -> SendOutcome {
        let notice = client.builder().build_notice(self, Some(cgi_data), None);
        client.send(notice)
    }
}
