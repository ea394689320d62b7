// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock vendor sender for deterministic testing.
//!
//! `MockSender` implements `MessageSender` with a FIFO script of replies.
//! When the script runs out every send is accepted.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use wacast_core::{
    AdapterType, HealthStatus, MessageSender, PluginAdapter, SendOutcome, TemplateMessage,
    VendorError, WacastError,
};

/// One scripted vendor reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Accept,
    /// Reject with this vendor error code.
    Reject(i64),
    /// Fail at the transport level (connection reset).
    Transport,
}

/// A vendor double that records every call.
#[derive(Default)]
pub struct MockSender {
    script: Mutex<VecDeque<MockReply>>,
    calls: AtomicUsize,
    sent: Mutex<Vec<TemplateMessage>>,
    latency: Option<Duration>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies for the first calls, in order.
    pub fn with_script(script: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Delay every send by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reply to the call numbered `call` (1-based) with `reply`; earlier
    /// calls are accepted.
    pub fn failing_on(call: usize, reply: MockReply) -> Self {
        let mut script: Vec<MockReply> = vec![MockReply::Accept; call.saturating_sub(1)];
        script.push(reply);
        Self::with_script(script)
    }

    /// Append a reply to the end of the script.
    pub fn push(&self, reply: MockReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    /// Number of send attempts so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages handed to the vendor, in call order.
    pub fn sent(&self) -> Vec<TemplateMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Destination phones, in call order.
    pub fn sent_to(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.to).collect()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(MockReply::Accept)
    }
}

#[async_trait]
impl PluginAdapter for MockSender {
    fn name(&self) -> &str {
        "mock-sender"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, WacastError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WacastError> {
        Ok(())
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send_template(
        &self,
        _sender_id: &str,
        message: &TemplateMessage,
    ) -> Result<SendOutcome, WacastError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.next_reply() {
            MockReply::Accept => Ok(SendOutcome::Accepted {
                message_id: format!("wamid.mock.{n}"),
            }),
            MockReply::Reject(code) => Ok(SendOutcome::Rejected(VendorError {
                code,
                title: Some(format!("mock error {code}")),
                fbtrace_id: Some(format!("trace-{n}")),
                ..VendorError::default()
            })),
            MockReply::Transport => Err(WacastError::Vendor {
                message: "mock connection reset".into(),
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> TemplateMessage {
        TemplateMessage {
            to: to.into(),
            template_name: "promo".into(),
            language: "pt_BR".into(),
            components: vec![],
        }
    }

    #[tokio::test]
    async fn script_then_accept() {
        let sender = MockSender::failing_on(2, MockReply::Reject(130_429));
        let first = sender.send_template("pn", &message("1")).await.unwrap();
        let second = sender.send_template("pn", &message("2")).await.unwrap();
        let third = sender.send_template("pn", &message("3")).await.unwrap();

        assert!(matches!(first, SendOutcome::Accepted { .. }));
        assert!(matches!(second, SendOutcome::Rejected(ref e) if e.is_throttle()));
        assert!(matches!(third, SendOutcome::Accepted { .. }));
        assert_eq!(sender.calls(), 3);
        assert_eq!(sender.sent_to(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let sender = MockSender::with_script([MockReply::Transport]);
        assert!(sender.send_template("pn", &message("1")).await.is_err());
    }
}
