//! W3C WebDriver session provider
//!
//! Talks the WebDriver wire protocol over HTTP to a remote end
//! (geckodriver, chromedriver, or a Selenium grid) configured under
//! `[webdriver]`. Wire-level error strings are mapped onto the session
//! error taxonomy so the interpreter can retry what is retryable.

use crate::config::Driver;
use crate::error::SessionError;
use crate::session::{Element, ReadyState, Session, SessionProvider};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// W3C element identifier key in wire responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Requests the remote end reports as started but not yet answered.
const PENDING_REQUESTS_SCRIPT: &str = "return window.performance.getEntriesByType('resource')\
    .filter(function (e) { return e.responseEnd === 0; }).length;";

const WIRE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct WebDriverProvider {
    remote: String,
    http: reqwest::Client,
}

impl WebDriverProvider {
    pub fn new(remote: &str) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(WIRE_TIMEOUT)
            .build()?;

        Ok(Self {
            remote: remote.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn capabilities(driver: Driver) -> Value {
        let always_match = match driver {
            Driver::Auto => json!({}),
            Driver::Chrome => json!({
                "browserName": "chrome",
                "goog:chromeOptions": { "args": ["--headless=new", "--disable-gpu"] },
            }),
            Driver::Firefox => json!({
                "browserName": "firefox",
                "moz:firefoxOptions": { "args": ["-headless"] },
            }),
            Driver::Edge => json!({
                "browserName": "MicrosoftEdge",
                "ms:edgeOptions": { "args": ["--headless=new", "--disable-gpu"] },
            }),
        };

        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

#[async_trait]
impl SessionProvider for WebDriverProvider {
    async fn create(&self, driver: Driver) -> Result<Box<dyn Session>, SessionError> {
        let value = wire_request(
            &self.http,
            Method::POST,
            format!("{}/session", self.remote),
            Some(Self::capabilities(driver)),
        )
        .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Driver("no session id in response".to_string()))?;

        tracing::debug!("Created webdriver session {}", session_id);

        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.remote, session_id),
        }))
    }
}

pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
}

impl WebDriverSession {
    async fn get(&self, path: &str) -> Result<Value, SessionError> {
        wire_request(&self.http, Method::GET, format!("{}{}", self.base, path), None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, SessionError> {
        wire_request(
            &self.http,
            Method::POST,
            format!("{}{}", self.base, path),
            Some(body),
        )
        .await
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, SessionError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    fn wire_element(element: &Element) -> Value {
        json!({ ELEMENT_KEY: element.0 })
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.post("/url", json!({ "url": url })).await.map(drop)
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        as_string(self.get("/url").await?)
    }

    async fn find_element(&mut self, selector: &str) -> Result<Element, SessionError> {
        let value = self
            .post("/element", json!({ "using": "css selector", "value": selector }))
            .await?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Element(id.to_string()))
            .ok_or_else(|| SessionError::Driver("malformed element response".to_string()))
    }

    async fn click(&mut self, element: &Element) -> Result<(), SessionError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await
            .map(drop)
    }

    async fn submit(&mut self, element: &Element) -> Result<(), SessionError> {
        // The wire protocol has no submit endpoint; go through the form.
        self.execute(
            "var el = arguments[0]; if (el.form) { el.form.submit(); } else { el.submit(); }",
            json!([Self::wire_element(element)]),
        )
        .await
        .map(drop)
    }

    async fn send_keys(&mut self, element: &Element, text: &str) -> Result<(), SessionError> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await
            .map(drop)
    }

    async fn element_text(&mut self, element: &Element) -> Result<String, SessionError> {
        as_string(self.get(&format!("/element/{}/text", element.0)).await?)
    }

    async fn scroll_into_view(&mut self, element: &Element) -> Result<(), SessionError> {
        self.execute(
            "arguments[0].scrollIntoView();",
            json!([Self::wire_element(element)]),
        )
        .await
        .map(drop)
    }

    async fn execute_script(&mut self, body: &str) -> Result<Value, SessionError> {
        self.execute(body, json!([])).await
    }

    async fn page_snapshot(&mut self) -> Result<String, SessionError> {
        as_string(self.get("/source").await?)
    }

    async fn ready_state(&mut self) -> Result<ReadyState, SessionError> {
        let value = self.execute("return document.readyState;", json!([])).await?;
        Ok(match value.as_str() {
            Some("complete") => ReadyState::Complete,
            Some("interactive") => ReadyState::Interactive,
            _ => ReadyState::Loading,
        })
    }

    async fn pending_requests(&mut self) -> Result<u64, SessionError> {
        let value = self.execute(PENDING_REQUESTS_SCRIPT, json!([])).await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn alert_accept(&mut self) -> Result<(), SessionError> {
        self.post("/alert/accept", json!({})).await.map(drop)
    }

    async fn alert_dismiss(&mut self) -> Result<(), SessionError> {
        self.post("/alert/dismiss", json!({})).await.map(drop)
    }

    async fn alert_send_keys(&mut self, text: &str) -> Result<(), SessionError> {
        self.post("/alert/text", json!({ "text": text })).await.map(drop)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        wire_request(&self.http, Method::DELETE, self.base.clone(), None)
            .await
            .map(drop)
    }
}

async fn wire_request(
    http: &reqwest::Client,
    method: Method,
    url: String,
    body: Option<Value>,
) -> Result<Value, SessionError> {
    let mut request = http.request(method, &url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    Err(wire_error(&value))
}

/// Map a wire-level error payload onto the session error taxonomy.
fn wire_error(value: &Value) -> SessionError {
    let code = value.get("error").and_then(Value::as_str).unwrap_or("");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");

    match code {
        "no such element" => SessionError::NotFound(message.to_string()),
        "element not interactable" | "invalid element state" => {
            SessionError::NotInteractable(message.to_string())
        }
        "stale element reference" => SessionError::Stale,
        "no such alert" => SessionError::NoDialog,
        "" => SessionError::Driver("unrecognized webdriver error".to_string()),
        other => SessionError::Driver(format!("{other}: {message}")),
    }
}

fn as_string(value: Value) -> Result<String, SessionError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SessionError::Driver("expected string response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_for(code: &str) -> SessionError {
        wire_error(&json!({ "error": code, "message": "details" }))
    }

    #[test]
    fn wire_errors_map_to_session_errors() {
        assert!(matches!(error_for("no such element"), SessionError::NotFound(_)));
        assert!(matches!(
            error_for("element not interactable"),
            SessionError::NotInteractable(_)
        ));
        assert!(matches!(error_for("stale element reference"), SessionError::Stale));
        assert!(matches!(error_for("no such alert"), SessionError::NoDialog));
        assert!(error_for("session not created").is_driver_fault());
        assert!(wire_error(&Value::Null).is_driver_fault());
    }

    #[test]
    fn capabilities_request_headless_engines() {
        let caps = WebDriverProvider::capabilities(Driver::Firefox);
        assert_eq!(
            caps["capabilities"]["alwaysMatch"]["browserName"],
            json!("firefox")
        );

        let caps = WebDriverProvider::capabilities(Driver::Auto);
        assert_eq!(caps["capabilities"]["alwaysMatch"], json!({}));
    }
}
