//! WebAssembly browser agent for SafeGate
//!
//! The content script side of the pipeline. The JS glue owns the DOM event
//! sources (load, mutation observer, timers); this crate owns everything
//! that can be owned deterministically: the scan state machine, page
//! extraction, the default-safe blur, the block interstitial, and the
//! relay round trips to the gateway.
//!
//! The protocol with the glue is effect-driven: every `handle_*` call
//! feeds one event to the machine and returns an array of effect objects
//! (`{ effect: "scheduleScan", delayMs: 3000, generation: 2 }`, ...) that
//! the glue performs in order.

pub mod relay;

use std::cell::RefCell;

use js_sys::Function;
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use sg_core::extract::{
    collect_text, select_images, should_blur, worth_scanning, ImageCandidate, TextChunk,
    MAX_PAGE_IMAGES,
};
use sg_core::{ScanEffect, ScanEvent, ScanMachine};

struct AgentState {
    machine: ScanMachine,
    page_url: String,
    device_id: String,
    transport: Function,
}

thread_local! {
    static STATE: RefCell<Option<AgentState>> = const { RefCell::new(None) };
}

#[wasm_bindgen]
pub fn init(page_url: &str, device_id: &str, transport: Function) -> Result<(), JsValue> {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.is_some() {
            return Err(JsValue::from_str(
                "Already initialized. Reload the page to reinitialize.",
            ));
        }
        *state = Some(AgentState {
            machine: ScanMachine::new(),
            page_url: page_url.to_string(),
            device_id: device_id.to_string(),
            transport,
        });
        Ok(())
    })
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    STATE.with(|state| state.borrow().is_some())
}

// =============================================================================
// State machine events
// =============================================================================

fn feed(event: ScanEvent) -> JsValue {
    let effects = STATE.with(|state| {
        state
            .borrow_mut()
            .as_mut()
            .map(|s| s.machine.handle(event))
            .unwrap_or_default()
    });
    effects_to_js(&effects)
}

fn effects_to_js(effects: &[ScanEffect]) -> JsValue {
    let array = js_sys::Array::new();
    for effect in effects {
        let obj = js_sys::Object::new();
        match effect {
            ScanEffect::BlurImages => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"blurImages".into());
            }
            ScanEffect::RequestPrecheck => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"requestPrecheck".into());
            }
            ScanEffect::ScheduleScan { delay_ms, generation } => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"scheduleScan".into());
                let _ = js_sys::Reflect::set(&obj, &"delayMs".into(), &JsValue::from(*delay_ms));
                let _ =
                    js_sys::Reflect::set(&obj, &"generation".into(), &JsValue::from(*generation));
            }
            ScanEffect::RequestScan => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"requestScan".into());
            }
            ScanEffect::ShowBlockScreen { reason } => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"showBlockScreen".into());
                let _ = js_sys::Reflect::set(&obj, &"reason".into(), &JsValue::from_str(reason));
            }
            ScanEffect::Unblur => {
                let _ = js_sys::Reflect::set(&obj, &"effect".into(), &"unblur".into());
            }
        }
        array.push(&obj);
    }
    array.into()
}

#[wasm_bindgen]
pub fn handle_page_loaded() -> JsValue {
    feed(ScanEvent::PageLoaded)
}

#[wasm_bindgen]
pub fn handle_precheck_result(blocked: bool, reason: Option<String>) -> JsValue {
    feed(ScanEvent::PrecheckResult { blocked, reason })
}

#[wasm_bindgen]
pub fn handle_debounce_fired(generation: u32) -> JsValue {
    feed(ScanEvent::DebounceFired { generation })
}

#[wasm_bindgen]
pub fn handle_scan_skipped() -> JsValue {
    feed(ScanEvent::ScanSkipped)
}

#[wasm_bindgen]
pub fn handle_scan_result(blocked: bool, reason: Option<String>) -> JsValue {
    feed(ScanEvent::ScanResult { blocked, reason })
}

#[wasm_bindgen]
pub fn handle_dom_mutated() -> JsValue {
    feed(ScanEvent::DomMutated)
}

// =============================================================================
// Relay round trips
// =============================================================================

fn with_transport<T>(build: impl FnOnce(&AgentState) -> T) -> Option<(Function, T)> {
    STATE.with(|state| {
        state
            .borrow()
            .as_ref()
            .map(|s| (s.transport.clone(), build(s)))
    })
}

fn verdict_to_js(verdict: &relay::RelayVerdict) -> JsValue {
    let obj = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&obj, &"blocked".into(), &JsValue::from(verdict.blocked));
    if let Some(reason) = &verdict.reason {
        let _ = js_sys::Reflect::set(&obj, &"reason".into(), &JsValue::from_str(reason));
    }
    obj.into()
}

/// URL-only precheck against the gateway. Resolves fail-open on any
/// failure; the glue feeds the result back via [`handle_precheck_result`].
#[wasm_bindgen]
pub async fn precheck() -> JsValue {
    let Some((transport, payload)) = with_transport(|s| {
        json!({ "url": s.page_url, "deviceId": s.device_id }).to_string()
    }) else {
        return verdict_to_js(&relay::RelayVerdict::fail_open());
    };

    let verdict = relay::call(&transport, "url", &payload).await;
    verdict_to_js(&verdict)
}

/// Combined page scan: extracts bounded content from the live DOM and
/// relays it. Resolves `{ skipped: true }` when the page has nothing worth
/// a round trip.
#[wasm_bindgen]
pub async fn scan_page() -> JsValue {
    let (text, image_urls) = extract_page_content();

    if !worth_scanning(&text, &image_urls) {
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&obj, &"skipped".into(), &JsValue::from(true));
        return obj.into();
    }

    let Some((transport, payload)) = with_transport(|s| {
        json!({
            "url": s.page_url,
            "text": text,
            "imageUrls": image_urls,
            "deviceId": s.device_id,
        })
        .to_string()
    }) else {
        return verdict_to_js(&relay::RelayVerdict::fail_open());
    };

    let verdict = relay::call(&transport, "page", &payload).await;
    verdict_to_js(&verdict)
}

// =============================================================================
// DOM extraction and mutation
// =============================================================================

fn viewport_height() -> f64 {
    web_sys::window()
        .and_then(|w| w.inner_height().ok())
        .and_then(|h| h.as_f64())
        .unwrap_or(800.0)
}

fn image_elements() -> Vec<web_sys::HtmlImageElement> {
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return Vec::new();
    };
    let collection = document.images();
    let mut out = Vec::with_capacity(collection.length() as usize);
    for i in 0..collection.length() {
        if let Some(img) = collection
            .item(i)
            .and_then(|el| el.dyn_into::<web_sys::HtmlImageElement>().ok())
        {
            out.push(img);
        }
    }
    out
}

fn extract_page_content() -> (String, Vec<String>) {
    let viewport = viewport_height();

    let text = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.body())
        .map(|body| {
            let rect = body.get_bounding_client_rect();
            let chunks = [TextChunk {
                text: body.inner_text(),
                top: rect.top(),
                bottom: rect.bottom(),
            }];
            collect_text(&chunks, viewport)
        })
        .unwrap_or_default();

    let candidates: Vec<ImageCandidate> = image_elements()
        .iter()
        .map(|img| {
            let rect = img.get_bounding_client_rect();
            ImageCandidate {
                src: img.src(),
                natural_width: img.natural_width(),
                natural_height: img.natural_height(),
                top: rect.top(),
                bottom: rect.bottom(),
            }
        })
        .collect();

    let image_urls = select_images(&candidates, viewport, MAX_PAGE_IMAGES);
    (text, image_urls)
}

/// Apply the default-safe blur to every image wide enough to matter.
#[wasm_bindgen]
pub fn apply_blur() {
    for img in image_elements() {
        if should_blur(img.natural_width()) {
            let style = img.style();
            let _ = style.set_property("filter", "blur(20px)");
            let _ = style.set_property("transition", "filter 0.2s");
        }
    }
}

/// Reverse [`apply_blur`] once the page is judged safe.
#[wasm_bindgen]
pub fn clear_blur() {
    for img in image_elements() {
        let _ = img.style().remove_property("filter");
    }
}

/// Replace the page with the block interstitial.
#[wasm_bindgen]
pub fn show_block_screen(reason: &str) {
    let Some(body) = web_sys::window().and_then(|w| w.document()).and_then(|d| d.body()) else {
        return;
    };

    let label = reason_label(reason);
    body.set_inner_html(&format!(
        "<div style=\"position:fixed;inset:0;z-index:2147483647;display:flex;\
         flex-direction:column;align-items:center;justify-content:center;\
         background:#1a1a2e;color:#eee;font-family:system-ui,sans-serif;\
         text-align:center;padding:2rem;\">\
         <div style=\"font-size:4rem;\">&#128737;</div>\
         <h1 style=\"margin:0.5rem 0;\">Page blocked</h1>\
         <p style=\"max-width:32rem;color:#aaa;\">{label}</p>\
         </div>"
    ));
}

/// Human-readable label for a block reason tag or classifier category.
#[wasm_bindgen]
pub fn reason_label(reason: &str) -> String {
    match reason {
        "manual_blocklist" => "This site is on your family's blocked list.".to_string(),
        "time_restriction" => "Browsing is not allowed at this time.".to_string(),
        "unsafe_url" => "This site was flagged as unsafe.".to_string(),
        "content_violation" => "This page contains content that is not allowed.".to_string(),
        category => format!("This page was blocked for: {category}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_label_known_tags() {
        assert!(reason_label("manual_blocklist").contains("blocked list"));
        assert!(reason_label("time_restriction").contains("time"));
        assert!(reason_label("unsafe_url").contains("unsafe"));
    }

    #[test]
    fn test_reason_label_falls_back_to_category() {
        assert_eq!(
            reason_label("Violence"),
            "This page was blocked for: Violence."
        );
    }
}
