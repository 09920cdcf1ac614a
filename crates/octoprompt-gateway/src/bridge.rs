//! Inbound bridge-event relay.
//!
//! External tools POST events to `/bridge/events` with an HMAC-SHA256
//! signature over the raw body. Verified events matching the configured
//! filter are forwarded to the Slack notifier; the relay never calls back
//! into the scheduler.

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::http::{self, Request};
use crate::server::GatewayState;

/// Signature header: `sha256=<lowercase hex>` over the raw request body.
pub const SIGNATURE_HEADER: &str = "x-octoprompt-signature";

type HmacSha256 = Hmac<Sha256>;

/// The expected signature value for `body` under `secret`.
pub fn signature_for(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts any key length; unreachable in practice.
        Err(_) => return String::new(),
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256={hex}")
}

pub fn handle_event(state: &GatewayState, request: &Request) -> Vec<u8> {
    let config = state.config.snapshot();
    let Some(bridge) = config.bridge_forward.filter(|b| b.enabled) else {
        // The relay is invisible unless enabled.
        return http::encode_response(404, &json!({"error": "Not found"}));
    };

    if request.body.is_empty() {
        return http::encode_response(400, &json!({"error": "Empty body"}));
    }

    if !bridge.webhook_secret.is_empty() {
        let expected = signature_for(&bridge.webhook_secret, &request.body);
        if request.header(SIGNATURE_HEADER) != Some(expected.as_str()) {
            tracing::warn!("⚠️ Bridge event signature mismatch");
            return http::encode_response(401, &json!({"error": "Invalid signature"}));
        }
    }

    let Ok(event) = serde_json::from_slice::<serde_json::Value>(&request.body) else {
        return http::encode_response(400, &json!({"error": "Invalid JSON"}));
    };

    let event_type = event
        .get("event")
        .or_else(|| event.get("type"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown");

    if let Some(allowed) = &bridge.forward_events {
        if !allowed.iter().any(|e| e == event_type) {
            return http::encode_response(200, &json!({"received": true, "forwarded": false}));
        }
    }

    let data = event
        .get("data")
        .or_else(|| event.get("payload"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    tracing::info!("📥 Bridge event received: {event_type}");
    state
        .slack
        .forward_bridge_event(event_type, &data, bridge.slack_channel.as_deref());

    http::encode_response(200, &json!({"received": true}))
}
