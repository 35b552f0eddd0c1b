//! Typed errors for the browser session and the action interpreter.

use crate::config::ActionKind;
use thiserror::Error;

/// Failures reported by a browser session.
///
/// The first four variants are ordinary interaction outcomes the action
/// interpreter knows how to retry or recover from. `Driver` means the
/// session itself has become unusable and a fresh one is needed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no such element: {0}")]
    NotFound(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("stale element reference")]
    Stale,

    #[error("no dialog present")]
    NoDialog,

    #[error("driver fault: {0}")]
    Driver(String),
}

impl SessionError {
    pub fn is_driver_fault(&self) -> bool {
        matches!(self, SessionError::Driver(_))
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Driver(err.to_string())
    }
}

/// Failures of a single scripted action, after local retries are spent.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no element found for selector `{0}`")]
    MissingElement(String),

    #[error("element `{0}` never became interactable")]
    NeverInteractable(String),

    #[error("action requires an element selector")]
    MissingSelector,

    #[error("dismiss is only meaningful for dialogs, set `dialog = true`")]
    DialogRequired,

    #[error("{0:?} actions cannot target a dialog")]
    DialogUnsupported(ActionKind),

    #[error("invalid extraction regex: {0}")]
    BadRegex(#[from] regex::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}
