//! Scheduler events and the fire-and-forget notification collaborators.
//!
//! The engine emits three event types per execution — fired, succeeded,
//! failed — to whatever sinks were handed to it at construction. Sinks
//! never report back; a lost notification never affects scheduling.

use chrono::{DateTime, Utc};
use octoprompt_core::SlackConfig;
use serde_json::json;
use std::fmt;

/// What happened to a fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Fired,
    Succeeded,
    Failed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Fired => "prompt.fired",
            EventKind::Succeeded => "prompt.succeeded",
            EventKind::Failed => "prompt.failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A side-channel event describing one fire.
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    pub kind: EventKind,
    pub schedule_id: String,
    pub schedule_name: String,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    /// Per-schedule channel override.
    pub channel: Option<String>,
}

impl SchedulerEvent {
    pub fn new(kind: EventKind, schedule_id: &str, schedule_name: &str) -> Self {
        Self {
            kind,
            schedule_id: schedule_id.into(),
            schedule_name: schedule_name.into(),
            timestamp: Utc::now(),
            error: None,
            channel: None,
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_channel(mut self, channel: Option<String>) -> Self {
        self.channel = channel;
        self
    }
}

/// Receives scheduler events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &SchedulerEvent);
}

/// Plain title/body user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notifications via the session notification service.
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }
        let title = title.to_string();
        let body = body.to_string();
        // show() talks to the notification daemon; keep it off the
        // scheduler's tasks.
        tokio::task::spawn_blocking(move || {
            if let Err(e) = notify_rust::Notification::new()
                .summary(&title)
                .body(&body)
                .show()
            {
                tracing::debug!("Desktop notification failed: {e}");
            }
        });
    }
}

/// Posts scheduler events to a Slack-style incoming webhook.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    default_channel: Option<String>,
    notify_on_complete: bool,
    notify_on_failure: bool,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn from_config(config: Option<&SlackConfig>) -> Self {
        let config = config.cloned().unwrap_or_default();
        Self {
            webhook_url: config.webhook_url.filter(|u| !u.is_empty()),
            default_channel: config.default_channel,
            notify_on_complete: config.notify_on_complete,
            notify_on_failure: config.notify_on_failure,
            client: reqwest::Client::new(),
        }
    }

    fn post(&self, payload: serde_json::Value) {
        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();
        // Fire-and-forget: log failures, never propagate.
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&payload)
                .timeout(std::time::Duration::from_secs(10))
                .send()
                .await;
            match result {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!("⚠️ Slack webhook returned {}", resp.status());
                }
                Err(e) => tracing::warn!("⚠️ Slack webhook failed: {e}"),
                _ => {}
            }
        });
    }

    /// Relay an inbound bridge event to the webhook.
    pub fn forward_bridge_event(
        &self,
        event_type: &str,
        data: &serde_json::Value,
        channel: Option<&str>,
    ) {
        let mut payload = json!({
            "type": event_type,
            "data": data,
            "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        });
        if let Some(channel) = channel.or(self.default_channel.as_deref()) {
            payload["channel"] = json!(channel);
        }
        self.post(payload);
    }
}

impl EventSink for SlackNotifier {
    fn on_event(&self, event: &SchedulerEvent) {
        match event.kind {
            EventKind::Succeeded if !self.notify_on_complete => return,
            EventKind::Failed if !self.notify_on_failure => return,
            _ => {}
        }

        let mut payload = json!({
            "type": event.kind.as_str(),
            "scheduleId": event.schedule_id,
            "scheduleName": event.schedule_name,
            "timestamp": event.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if let Some(error) = &event.error {
            payload["error"] = json!(error);
        }
        if let Some(channel) = event.channel.as_deref().or(self.default_channel.as_deref()) {
            payload["channel"] = json!(channel);
        }
        self.post(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::Fired.as_str(), "prompt.fired");
        assert_eq!(EventKind::Succeeded.as_str(), "prompt.succeeded");
        assert_eq!(EventKind::Failed.as_str(), "prompt.failed");
    }

    #[test]
    fn test_event_builder() {
        let event = SchedulerEvent::new(EventKind::Failed, "a", "A")
            .with_error("boom")
            .with_channel(Some("#ops".into()));
        assert_eq!(event.error.as_deref(), Some("boom"));
        assert_eq!(event.channel.as_deref(), Some("#ops"));
    }

    #[tokio::test]
    async fn test_unconfigured_slack_is_noop() {
        // No webhook URL: on_event must not spawn or panic.
        let notifier = SlackNotifier::from_config(None);
        notifier.on_event(&SchedulerEvent::new(EventKind::Fired, "a", "A"));
        notifier.forward_bridge_event("build.finished", &json!({"ok": true}), None);
    }
}
