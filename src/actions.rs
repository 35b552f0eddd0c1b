//! Scripted-action interpreter
//!
//! Executes an ordered action list against a browser session. All
//! retry, staleness-recovery, and idle-settle heuristics live here:
//! element lookups poll until the per-action deadline, interactions
//! retry on not-yet-interactable elements, and stale handles are
//! re-resolved and rebound in place. Timeouts are soft wall-clock
//! deadlines; a primitive call already in flight is allowed to finish.

use crate::config::{Action, ActionKind};
use crate::data::NetworkData;
use crate::error::{ActionError, SessionError};
use crate::session::{Element, ReadyState, Session};
use regex::Regex;
use std::time::{Duration, Instant};

/// Delay between element lookup / interaction retries.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Delay between settle probes.
const SETTLE_PROBE_DELAY: Duration = Duration::from_millis(500);

pub struct Interpreter<'a> {
    session: &'a mut dyn Session,
    data: NetworkData,
}

impl<'a> Interpreter<'a> {
    pub fn new(session: &'a mut dyn Session) -> Self {
        Self {
            session,
            data: NetworkData::default(),
        }
    }

    /// Figures accumulated by `acquire` actions so far.
    pub fn into_data(self) -> NetworkData {
        self.data
    }

    /// Run a full action script in order. The first action failure
    /// aborts the remainder of the script.
    pub async fn run(&mut self, actions: &[Action]) -> Result<(), ActionError> {
        for action in actions {
            let begin = Instant::now();
            tracing::debug!("- {:?} {}", action.kind(), action.element().unwrap_or(""));
            self.dispatch(action, begin).await?;
        }

        Ok(())
    }

    async fn dispatch(&mut self, action: &Action, begin: Instant) -> Result<(), ActionError> {
        if action.dialog() {
            return self.act_on_dialog(action).await;
        }

        match action.kind() {
            ActionKind::Click | ActionKind::Input | ActionKind::Submit | ActionKind::Acquire => {
                let selector = action.element().ok_or(ActionError::MissingSelector)?;
                let element = self.find_element(selector, action.timeout(), begin).await?;
                self.act_on_element(element, action, begin).await
            }
            ActionKind::Dismiss => Err(ActionError::DialogRequired),
            ActionKind::Script => {
                self.session
                    .execute_script(action.script().unwrap_or_default())
                    .await?;
                Ok(())
            }
            ActionKind::Sleep => {
                tokio::time::sleep(action.sleep_duration()).await;
                Ok(())
            }
            ActionKind::Settle => {
                self.settle(action.timeout(), begin).await;
                Ok(())
            }
        }
    }

    /// Poll for an element until it exists or the deadline passes.
    async fn find_element(
        &mut self,
        selector: &str,
        timeout: Duration,
        begin: Instant,
    ) -> Result<Element, ActionError> {
        loop {
            match self.session.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(SessionError::NotFound(_)) => {
                    if begin.elapsed() > timeout {
                        return Err(ActionError::MissingElement(selector.to_string()));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn act_on_element(
        &mut self,
        mut element: Element,
        action: &Action,
        begin: Instant,
    ) -> Result<(), ActionError> {
        let timeout = action.timeout();

        loop {
            let result = match action.kind() {
                ActionKind::Click => self.session.click(&element).await,
                ActionKind::Input => {
                    self.session
                        .send_keys(&element, action.input().unwrap_or_default())
                        .await
                }
                ActionKind::Submit => self.session.submit(&element).await,
                ActionKind::Acquire => self.session.scroll_into_view(&element).await,
                other => unreachable!("{other:?} is not an element action"),
            };

            match result {
                Ok(()) => break,
                Err(SessionError::NotInteractable(_)) => {
                    if begin.elapsed() > timeout {
                        let selector = action.element().unwrap_or_default().to_string();
                        return Err(ActionError::NeverInteractable(selector));
                    }
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(SessionError::Stale) => {
                    // The page rerendered under us; resolve a fresh handle
                    // and rebind, still against the original deadline.
                    if begin.elapsed() > timeout {
                        return Err(SessionError::Stale.into());
                    }
                    let selector = action.element().ok_or(ActionError::MissingSelector)?;
                    element = self.find_element(selector, timeout, begin).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if action.kind() == ActionKind::Acquire {
            if let Some(pattern) = action.regex() {
                let regex = Regex::new(pattern)?;
                let text = self.session.element_text(&element).await?;
                match regex.captures(&text) {
                    Some(caps) => self.data.absorb_captures(&caps),
                    None => tracing::debug!("Extraction regex did not match element text"),
                }
            }
        }

        Ok(())
    }

    async fn act_on_dialog(&mut self, action: &Action) -> Result<(), ActionError> {
        match action.kind() {
            ActionKind::Click | ActionKind::Submit => self.session.alert_accept().await?,
            ActionKind::Input => {
                if let Some(text) = action.input() {
                    self.session.alert_send_keys(text).await?;
                }
                self.session.alert_accept().await?;
            }
            ActionKind::Dismiss => {
                if let Some(text) = action.input() {
                    self.session.alert_send_keys(text).await?;
                }
                self.session.alert_dismiss().await?;
            }
            other => return Err(ActionError::DialogUnsupported(other)),
        }

        Ok(())
    }

    /// Wait for the page to stop changing: document fully loaded, no
    /// requests in flight, and an unchanged snapshot since the last
    /// probe. The deadline is soft; expiry logs and proceeds.
    pub async fn settle(&mut self, timeout: Duration, begin: Instant) {
        let mut snapshot = match self.session.page_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::debug!("Settle snapshot failed, continuing: {}", err);
                return;
            }
        };

        loop {
            tokio::time::sleep(SETTLE_PROBE_DELAY).await;

            if begin.elapsed() > timeout {
                tracing::debug!("Page never settled within {:?}, continuing", timeout);
                return;
            }

            match self.probe_settled(&snapshot).await {
                Ok(None) => return,
                Ok(Some(next)) => snapshot = next,
                Err(err) => {
                    tracing::debug!("Settle probe failed, continuing: {}", err);
                    return;
                }
            }
        }
    }

    /// One settle probe. `Ok(None)` means the page is idle; otherwise the
    /// fresh snapshot to compare against next round.
    async fn probe_settled(&mut self, last: &str) -> Result<Option<String>, SessionError> {
        let ready = self.session.ready_state().await? == ReadyState::Complete;
        let pending = self.session.pending_requests().await?;
        let snapshot = self.session.page_snapshot().await?;

        if ready && pending == 0 && snapshot == last {
            return Ok(None);
        }

        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionSpec;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;

    /// Session double with scripted responses per primitive. Empty
    /// queues fall back to a benign default; every call is recorded.
    #[derive(Default)]
    struct MockSession {
        find: VecDeque<Result<Element, SessionError>>,
        interact: VecDeque<Result<(), SessionError>>,
        text: String,
        snapshots: VecDeque<String>,
        pending: u64,
        calls: Vec<String>,
    }

    impl MockSession {
        fn log(&mut self, call: &str) {
            self.calls.push(call.to_string());
        }
    }

    #[async_trait]
    impl Session for MockSession {
        async fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
            self.log("navigate");
            Ok(())
        }

        async fn current_url(&mut self) -> Result<String, SessionError> {
            Ok(String::new())
        }

        async fn find_element(&mut self, selector: &str) -> Result<Element, SessionError> {
            self.log("find");
            self.find
                .pop_front()
                .unwrap_or_else(|| Err(SessionError::NotFound(selector.to_string())))
        }

        async fn click(&mut self, _element: &Element) -> Result<(), SessionError> {
            self.log("click");
            self.interact.pop_front().unwrap_or(Ok(()))
        }

        async fn submit(&mut self, _element: &Element) -> Result<(), SessionError> {
            self.log("submit");
            self.interact.pop_front().unwrap_or(Ok(()))
        }

        async fn send_keys(&mut self, _element: &Element, text: &str) -> Result<(), SessionError> {
            self.calls.push(format!("send_keys:{text}"));
            self.interact.pop_front().unwrap_or(Ok(()))
        }

        async fn element_text(&mut self, _element: &Element) -> Result<String, SessionError> {
            Ok(self.text.clone())
        }

        async fn scroll_into_view(&mut self, _element: &Element) -> Result<(), SessionError> {
            self.log("scroll");
            self.interact.pop_front().unwrap_or(Ok(()))
        }

        async fn execute_script(&mut self, _body: &str) -> Result<Value, SessionError> {
            self.log("script");
            Ok(Value::Null)
        }

        async fn page_snapshot(&mut self) -> Result<String, SessionError> {
            Ok(self.snapshots.pop_front().unwrap_or_default())
        }

        async fn ready_state(&mut self) -> Result<ReadyState, SessionError> {
            Ok(ReadyState::Complete)
        }

        async fn pending_requests(&mut self) -> Result<u64, SessionError> {
            Ok(self.pending)
        }

        async fn alert_accept(&mut self) -> Result<(), SessionError> {
            self.log("alert_accept");
            Ok(())
        }

        async fn alert_dismiss(&mut self) -> Result<(), SessionError> {
            self.log("alert_dismiss");
            Ok(())
        }

        async fn alert_send_keys(&mut self, text: &str) -> Result<(), SessionError> {
            self.calls.push(format!("alert_send_keys:{text}"));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn action(toml_src: &str) -> Action {
        Action::Detailed(toml::from_str::<ActionSpec>(toml_src).unwrap())
    }

    #[tokio::test]
    async fn missing_element_fails_after_deadline() {
        let mut session = MockSession::default();
        let mut interpreter = Interpreter::new(&mut session);

        let result = interpreter
            .run(&[action(r##"element = "#gone"
                            timeout = 0.3"##)])
            .await;

        assert!(matches!(result, Err(ActionError::MissingElement(sel)) if sel == "#gone"));
        // Initial attempt plus at least one retry before giving up.
        assert!(session.calls.iter().filter(|c| *c == "find").count() >= 2);
    }

    #[tokio::test]
    async fn stale_element_is_reresolved_and_rebound() {
        let mut session = MockSession {
            find: VecDeque::from([Ok(Element("first".into())), Ok(Element("second".into()))]),
            interact: VecDeque::from([Err(SessionError::Stale), Ok(())]),
            ..Default::default()
        };

        let mut interpreter = Interpreter::new(&mut session);
        interpreter
            .run(&[action(r##"element = "#button""##)])
            .await
            .unwrap();

        assert_eq!(
            session.calls,
            vec!["find", "click", "find", "click"],
            "stale handle must be re-resolved, then the click retried"
        );
    }

    #[tokio::test]
    async fn not_interactable_retries_until_success() {
        let mut session = MockSession {
            find: VecDeque::from([Ok(Element("el".into()))]),
            interact: VecDeque::from([
                Err(SessionError::NotInteractable("hidden".into())),
                Ok(()),
            ]),
            ..Default::default()
        };

        let mut interpreter = Interpreter::new(&mut session);
        interpreter
            .run(&[action(r##"element = "#button""##)])
            .await
            .unwrap();

        assert_eq!(session.calls.iter().filter(|c| *c == "click").count(), 2);
    }

    #[tokio::test]
    async fn acquire_extracts_quota_figures() {
        let mut session = MockSession {
            find: VecDeque::from([Ok(Element("quota".into()))]),
            text: "You have 2048 kB remaining of 1 GB".to_string(),
            ..Default::default()
        };

        let mut interpreter = Interpreter::new(&mut session);
        interpreter
            .run(&[action(
                r##"element = "#quota"
                   regex = '(?P<avail_kb>\d+) kB remaining of (?P<total_gb>\d+) GB'"##,
            )])
            .await
            .unwrap();

        let data = interpreter.into_data();
        assert_eq!(data.available_mb, Some(2.0));
        assert_eq!(data.total_mb, Some(1024.0));
        assert!(session.calls.contains(&"scroll".to_string()));
    }

    #[tokio::test]
    async fn settle_returns_promptly_on_an_idle_page() {
        let mut session = MockSession {
            snapshots: VecDeque::from(["<p>done</p>".to_string(), "<p>done</p>".to_string()]),
            ..Default::default()
        };

        let begin = Instant::now();
        let mut interpreter = Interpreter::new(&mut session);
        interpreter.settle(Duration::from_secs(5), begin).await;

        // One probe after the initial 500ms pause, well before expiry.
        assert!(begin.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn settle_gives_up_softly_on_a_busy_page() {
        let mut session = MockSession {
            pending: 3,
            ..Default::default()
        };

        let begin = Instant::now();
        let mut interpreter = Interpreter::new(&mut session);
        interpreter.settle(Duration::from_millis(700), begin).await;

        // Soft expiry: returns shortly after the deadline, no error.
        assert!(begin.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn dialog_input_sends_text_then_accepts() {
        let mut session = MockSession::default();
        let mut interpreter = Interpreter::new(&mut session);

        interpreter
            .run(&[action(r#"input = "s3cret"
                            dialog = true"#)])
            .await
            .unwrap();

        assert_eq!(session.calls, vec!["alert_send_keys:s3cret", "alert_accept"]);
    }

    #[tokio::test]
    async fn dismiss_requires_the_dialog_flag() {
        let mut session = MockSession::default();
        let mut interpreter = Interpreter::new(&mut session);

        let result = interpreter.run(&[action(r#"action = "dismiss""#)]).await;
        assert!(matches!(result, Err(ActionError::DialogRequired)));

        let mut session = MockSession::default();
        let mut interpreter = Interpreter::new(&mut session);
        interpreter
            .run(&[action(r#"action = "dismiss"
                            dialog = true"#)])
            .await
            .unwrap();
        assert_eq!(session.calls, vec!["alert_dismiss"]);
    }

    #[tokio::test]
    async fn script_failure_aborts_the_remaining_actions() {
        let mut session = MockSession {
            find: VecDeque::from([Err(SessionError::Driver("session deleted".into()))]),
            ..Default::default()
        };

        let mut interpreter = Interpreter::new(&mut session);
        let result = interpreter
            .run(&[action(r##"element = "#a""##), action(r##"element = "#b""##)])
            .await;

        assert!(matches!(
            result,
            Err(ActionError::Session(SessionError::Driver(_)))
        ));
        assert_eq!(session.calls.iter().filter(|c| *c == "find").count(), 1);
    }
}
