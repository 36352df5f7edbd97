//! Relay to the moderation gateway
//!
//! The embedding extension supplies the transport: a JS function
//! `(endpoint, payloadJson) -> Promise<responseBody>` with the gateway URL
//! and credentials baked in. This module adds what the transport cannot be
//! trusted to do: a hard timeout, and the fail-open conversion of every
//! failure mode. A page must never hang or break because the gateway is
//! slow, down, or returning garbage.
//!
//! The config handshake (device id, enabled flag) is owned by the glue:
//! it fetches both from extension storage before calling `init`, so only
//! moderation calls ever pass through here.

use js_sys::{Array, Function, Promise, Reflect};
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

/// Hard ceiling on one relay round trip, in ms.
pub const RELAY_TIMEOUT_MS: i32 = 12_000;

/// The slice of a gateway response the agent acts on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayVerdict {
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RelayVerdict {
    pub fn fail_open() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }
}

/// A promise that resolves with `undefined` after `ms`. Used as the losing
/// branch of the race; `undefined` is never a valid transport response.
fn timeout_sentinel(ms: i32) -> Promise {
    Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().and_then(|window| {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
                .ok()
        });
        if scheduled.is_none() {
            // No window to schedule on: treat as an immediate timeout.
            let _ = resolve.call0(&JsValue::NULL);
        }
    })
}

fn parse_response(value: JsValue) -> RelayVerdict {
    if let Some(body) = value.as_string() {
        return serde_json::from_str(&body).unwrap_or_else(|_| RelayVerdict::fail_open());
    }

    // Some transports return the already-parsed object.
    if value.is_object() {
        let blocked = Reflect::get(&value, &"blocked".into())
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let reason = Reflect::get(&value, &"reason".into())
            .ok()
            .and_then(|v| v.as_string());
        return RelayVerdict { blocked, reason };
    }

    // Timeout sentinel, or a shape we do not recognize.
    RelayVerdict::fail_open()
}

/// One relay round trip. Never throws and never blocks the page: every
/// failure mode resolves to the fail-open verdict.
pub async fn call(transport: &Function, endpoint: &str, payload: &str) -> RelayVerdict {
    let invoked = transport.call2(
        &JsValue::NULL,
        &JsValue::from_str(endpoint),
        &JsValue::from_str(payload),
    );

    let promise = match invoked {
        Ok(value) => Promise::resolve(&value),
        Err(_) => return RelayVerdict::fail_open(),
    };

    let race = Promise::race(&Array::of2(&promise, &timeout_sentinel(RELAY_TIMEOUT_MS)));

    match JsFuture::from(race).await {
        Ok(value) => parse_response(value),
        Err(_) => RelayVerdict::fail_open(),
    }
}
