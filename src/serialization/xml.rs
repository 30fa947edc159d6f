//! XML wire document for notices
//!
//! Element order follows the field order of the model types. Empty leaves
//! are skipped by the model's serde attributes; [`clean`] removes what the
//! XML 1.0 character set cannot carry before encoding.

use crate::error::SerializationError;
use crate::notice::model::{
    Backtrace, BacktraceLine, ErrorEntry, KeyValuePair, Notice, NotifierInfo, RequestContext,
    ServerEnvironment, VarList, NOTICE_SCHEMA_VERSION,
};
use log::error;

/// Prefix written before the root element
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Render a notice as an XML document
///
/// Never fails. If the cleaned notice still cannot be encoded, a reduced
/// document holding the API key, notifier and error classes/messages is
/// returned instead, and as a last resort an empty `<notice/>`.
pub fn to_xml(notice: &Notice) -> String {
    match try_to_xml(notice) {
        Ok(xml) => xml,
        Err(e) => {
            error!("Failed to serialize {}, sending reduced notice: {}", notice, e);
            try_to_xml(&reduce(notice)).unwrap_or_else(|e| {
                error!("Failed to serialize reduced notice: {}", e);
                format!(
                    "{}<notice version=\"{}\"/>",
                    XML_DECLARATION, NOTICE_SCHEMA_VERSION
                )
            })
        }
    }
}

/// Clean and encode a notice, reporting encoder failures
pub fn try_to_xml(notice: &Notice) -> Result<String, SerializationError> {
    let body = quick_xml::se::to_string(&clean(notice))
        .map_err(|e| SerializationError::Encode(e.to_string()))?;
    Ok(format!("{}{}", XML_DECLARATION, body))
}

/// Parse a notice document
///
/// Elements omitted on the wire come back as empty strings and lists.
/// Leading and trailing whitespace of text content is trimmed by the
/// reader; whitespace inside the text is kept.
pub fn from_xml(document: &str) -> Result<Notice, SerializationError> {
    quick_xml::de::from_str(document).map_err(|e| SerializationError::Decode(e.to_string()))
}

/// Copy of `notice` that only holds XML-representable content
///
/// Strips characters outside the XML 1.0 `Char` production, and drops
/// backtrace lines with no content and vars with no key.
pub fn clean(notice: &Notice) -> Notice {
    Notice {
        version: clean_text(&notice.version),
        api_key: clean_text(&notice.api_key),
        notifier: clean_notifier(&notice.notifier),
        errors: notice.errors.iter().map(clean_error).collect(),
        request: RequestContext {
            url: clean_text(&notice.request.url),
            component: clean_text(&notice.request.component),
            action: clean_text(&notice.request.action),
            params: clean_vars(&notice.request.params),
            session: clean_vars(&notice.request.session),
            cgi_data: clean_vars(&notice.request.cgi_data),
        },
        server_environment: ServerEnvironment {
            project_root: clean_text(&notice.server_environment.project_root),
            environment_name: clean_text(&notice.server_environment.environment_name),
            app_version: clean_text(&notice.server_environment.app_version),
            hostname: clean_text(&notice.server_environment.hostname),
        },
    }
}

fn clean_notifier(notifier: &NotifierInfo) -> NotifierInfo {
    NotifierInfo {
        name: clean_text(&notifier.name),
        version: clean_text(&notifier.version),
        url: clean_text(&notifier.url),
    }
}

fn clean_error(entry: &ErrorEntry) -> ErrorEntry {
    ErrorEntry {
        class: clean_text(&entry.class),
        message: clean_text(&entry.message),
        backtrace: Backtrace {
            lines: entry
                .backtrace
                .lines
                .iter()
                .map(|line| BacktraceLine {
                    file: clean_text(&line.file),
                    number: line.number,
                    method: clean_text(&line.method),
                })
                .filter(|line| !line.is_empty())
                .collect(),
        },
    }
}

fn clean_vars(list: &VarList) -> VarList {
    VarList {
        vars: list
            .vars
            .iter()
            .map(|pair| KeyValuePair::new(clean_text(&pair.key), clean_text(&pair.value)))
            .filter(|pair| !pair.key.is_empty())
            .collect(),
    }
}

fn clean_text(text: &str) -> String {
    text.chars().filter(|&c| is_xml_char(c)).collect()
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// The smallest notice that still identifies the error
fn reduce(notice: &Notice) -> Notice {
    Notice {
        version: NOTICE_SCHEMA_VERSION.to_string(),
        api_key: clean_text(&notice.api_key),
        notifier: clean_notifier(&notice.notifier),
        errors: notice
            .errors
            .iter()
            .map(|entry| ErrorEntry {
                class: clean_text(&entry.class),
                message: clean_text(&entry.message),
                backtrace: Backtrace::default(),
            })
            .collect(),
        request: RequestContext::default(),
        server_environment: ServerEnvironment::default(),
    }
}
