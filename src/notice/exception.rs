//! The "has type name / has message / has frames / has cause" capability
//!
//! The builder never looks at concrete error types. Anything implementing
//! [`Exception`] can be reported; its causes are walked through
//! `std::error::Error::source`.

use crate::notice::model::{Backtrace, BacktraceLine, ErrorEntry};
use std::error::Error as StdError;

/// Upper bound on the number of chain links walked, guarding against
/// `source()` implementations that loop
pub const MAX_CHAIN_DEPTH: usize = 256;

/// Method prefixes that belong to backtrace capture rather than the caller
const RUNTIME_FRAME_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "anyhow::",
    "<anyhow::",
    "faultpost::notice::exception::",
    "<faultpost::notice::exception::",
];

/// A reportable error
pub trait Exception {
    /// Name of the error's type
    fn type_name(&self) -> String;

    /// Human readable message of this link only
    fn message(&self) -> String;

    /// Stack frames captured with this error, in reporting order
    fn frames(&self) -> Vec<BacktraceLine> {
        Vec::new()
    }

    /// The next link of the chain
    fn cause(&self) -> Option<&(dyn StdError + 'static)>;
}

/// A std error together with the backtrace captured when it was wrapped
///
/// Capture follows `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`; use
/// [`Captured::force`] to capture regardless.
#[derive(Debug)]
pub struct Captured<E> {
    error: E,
    backtrace: std::backtrace::Backtrace,
}

impl<E: StdError + 'static> Captured<E> {
    pub fn new(error: E) -> Self {
        Self {
            error,
            backtrace: std::backtrace::Backtrace::capture(),
        }
    }

    pub fn force(error: E) -> Self {
        Self {
            error,
            backtrace: std::backtrace::Backtrace::force_capture(),
        }
    }

    pub fn error(&self) -> &E {
        &self.error
    }

    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: StdError + 'static> From<E> for Captured<E> {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl<E: StdError + 'static> Exception for Captured<E> {
    fn type_name(&self) -> String {
        std::any::type_name::<E>().to_string()
    }

    fn message(&self) -> String {
        self.error.to_string()
    }

    fn frames(&self) -> Vec<BacktraceLine> {
        caller_frames(parse_backtrace(&self.backtrace.to_string()))
    }

    fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl Exception for anyhow::Error {
    /// Class of the wrapped error; ad-hoc messages and context layers have
    /// none and report as `anyhow::Error`
    fn type_name(&self) -> String {
        let inner: &(dyn StdError + 'static) = self.as_ref();
        match infer_type_name(inner) {
            name if name == "Error" => "anyhow::Error".to_string(),
            name => name,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn frames(&self) -> Vec<BacktraceLine> {
        caller_frames(parse_backtrace(&self.backtrace().to_string()))
    }

    fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.chain().nth(1)
    }
}

impl Exception for dyn StdError + 'static {
    fn type_name(&self) -> String {
        infer_type_name(self)
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.source()
    }
}

impl Exception for dyn StdError + Send + Sync + 'static {
    fn type_name(&self) -> String {
        infer_type_name(self)
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.source()
    }
}

impl<T: Exception + ?Sized> Exception for Box<T> {
    fn type_name(&self) -> String {
        (**self).type_name()
    }

    fn message(&self) -> String {
        (**self).message()
    }

    fn frames(&self) -> Vec<BacktraceLine> {
        (**self).frames()
    }

    fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        (**self).cause()
    }
}

/// Walk an exception and all of its causes, outermost first
pub fn error_chain<E: Exception + ?Sized>(exception: &E) -> Vec<ErrorEntry> {
    let mut chain = vec![ErrorEntry {
        class: exception.type_name(),
        message: exception.message(),
        backtrace: Backtrace {
            lines: exception.frames(),
        },
    }];

    let mut next = exception.cause();
    while let Some(cause) = next {
        if chain.len() >= MAX_CHAIN_DEPTH {
            log::warn!(
                "Error chain longer than {} links, truncating",
                MAX_CHAIN_DEPTH
            );
            break;
        }
        chain.push(ErrorEntry {
            class: infer_type_name(cause),
            message: cause.to_string(),
            backtrace: Backtrace::default(),
        });
        next = cause.source();
    }

    chain
}

/// Best-effort type name of a type-erased error
///
/// Derived `Debug` output starts with the type or variant name, which is the
/// closest thing a `dyn Error` exposes. Falls back to `Error`.
pub fn infer_type_name(error: &(dyn StdError + 'static)) -> String {
    let debug = format!("{:?}", error);
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    let name = name.trim_end_matches(':');

    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        "Error".to_string()
    } else {
        name.to_string()
    }
}

/// Parse the text rendering of a `std::backtrace::Backtrace`
///
/// Frames look like `  3: crate::module::function` optionally followed by a
/// line `at ./src/file.rs:12:5`. Anything else (including the `disabled
/// backtrace` placeholder) yields no frames.
pub fn parse_backtrace(text: &str) -> Vec<BacktraceLine> {
    let mut frames: Vec<BacktraceLine> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                if frame.file.is_empty() {
                    let (file, number) = split_location(location);
                    frame.file = file;
                    frame.number = number;
                }
            }
            continue;
        }

        if let Some((index, method)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(BacktraceLine {
                    file: String::new(),
                    number: 0,
                    method: strip_symbol_hash(method.trim()).to_string(),
                });
            }
        }
    }

    frames
}

/// Drop leading frames that belong to the capture machinery
fn caller_frames(frames: Vec<BacktraceLine>) -> Vec<BacktraceLine> {
    let first_caller = frames
        .iter()
        .position(|frame| {
            !RUNTIME_FRAME_PREFIXES
                .iter()
                .any(|prefix| frame.method.starts_with(prefix))
        })
        .unwrap_or(frames.len());

    frames.into_iter().skip(first_caller).collect()
}

/// Split `file:line:column` (column optional) into file and line number
fn split_location(location: &str) -> (String, u32) {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next().unwrap_or_default();
    let middle = parts.next();
    let rest = parts.next();

    match (rest, middle) {
        (Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
            (file.to_string(), line.parse().unwrap_or(0))
        }
        (_, Some(file)) if last.parse::<u32>().is_ok() => {
            let file = match rest {
                Some(prefix) => format!("{}:{}", prefix, file),
                None => file.to_string(),
            };
            (file, last.parse().unwrap_or(0))
        }
        _ => (location.to_string(), 0),
    }
}

/// Remove a trailing `::h0123456789abcdef` legacy mangling hash
fn strip_symbol_hash(method: &str) -> &str {
    match method.rsplit_once("::") {
        Some((path, hash))
            if hash.len() == 17
                && hash.starts_with('h')
                && hash[1..].chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            path
        }
        _ => method,
    }
}
