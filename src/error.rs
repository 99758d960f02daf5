use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a browser [`Session`](crate::browser::Session).
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("element not interactable: {reason}")]
    ElementNotInteractable { reason: String },

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    #[error("no open browser tab with id {id}")]
    ContextNotFound { id: String },

    #[error("browser session already released")]
    SessionReleased,

    #[error("browser protocol error: {detail}")]
    Protocol { detail: String },

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl BrowserError {
    /// True for the "could not find / could not use" family, which callers
    /// treat as a normal miss rather than a broken session.
    pub fn is_locate_miss(&self) -> bool {
        matches!(
            self,
            BrowserError::ElementNotFound { .. } | BrowserError::ElementNotInteractable { .. }
        )
    }
}

/// Classified reasons a registration never reached its status page.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("search control not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("search for {registration} failed: {reason}")]
    SearchFailed { registration: String, reason: String },

    #[error("no project status control found")]
    StatusControlNotFound,

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no construction status table found")]
    NoTableFound,

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("failed to write status row: {0}")]
    Ledger(#[from] csv::Error),
}

/// Run-level errors. Only these ever abort a batch.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("cannot read input {path:?}: {reason}")]
    InputUnreadable { path: PathBuf, reason: String },

    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
