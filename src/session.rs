//! Abstract browser-session capability used by the action interpreter.
//!
//! The interpreter only ever talks to this trait; the concrete wire
//! protocol lives in `webdriver.rs`. Keeping the seam here lets tests
//! drive the interpreter with a scripted session.

use crate::config::Driver;
use crate::error::SessionError;
use async_trait::async_trait;
use serde_json::Value;

/// Opaque handle to an element inside a session. Handles can go stale
/// when the page rerenders; the interpreter re-resolves and rebinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

#[async_trait]
pub trait Session: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;
    async fn current_url(&mut self) -> Result<String, SessionError>;

    async fn find_element(&mut self, selector: &str) -> Result<Element, SessionError>;
    async fn click(&mut self, element: &Element) -> Result<(), SessionError>;
    async fn submit(&mut self, element: &Element) -> Result<(), SessionError>;
    async fn send_keys(&mut self, element: &Element, text: &str) -> Result<(), SessionError>;
    async fn element_text(&mut self, element: &Element) -> Result<String, SessionError>;
    async fn scroll_into_view(&mut self, element: &Element) -> Result<(), SessionError>;

    async fn execute_script(&mut self, body: &str) -> Result<Value, SessionError>;

    /// Serialized page content, compared across settle probes.
    async fn page_snapshot(&mut self) -> Result<String, SessionError>;
    async fn ready_state(&mut self) -> Result<ReadyState, SessionError>;
    /// Number of page resource requests still in flight.
    async fn pending_requests(&mut self) -> Result<u64, SessionError>;

    async fn alert_accept(&mut self) -> Result<(), SessionError>;
    async fn alert_dismiss(&mut self) -> Result<(), SessionError>;
    async fn alert_send_keys(&mut self, text: &str) -> Result<(), SessionError>;

    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Creates sessions for a preferred browser engine.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn create(&self, driver: Driver) -> Result<Box<dyn Session>, SessionError>;
}
