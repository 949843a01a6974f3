//! Conversions between JS values and `serde_json` values.
//!
//! Everything crosses the boundary as JSON text, so JS `undefined` and
//! functions are dropped the same way `chrome.storage` drops them.

use js_sys::Promise;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

pub fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

pub fn from_js(value: &JsValue) -> Result<Value, JsValue> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text = String::from(js_sys::JSON::stringify(value)?);
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Human-readable form of a thrown JS value.
pub fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", value)
}

/// Await a chrome API promise in the background, logging a rejection.
pub fn settle(call: Result<Promise, JsValue>, what: &'static str) {
    match call {
        Ok(promise) => wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                log::debug!("{} failed: {}", what, describe(&e));
            }
        }),
        Err(e) => log::debug!("{} failed: {}", what, describe(&e)),
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_json_roundtrip() {
        let value = json!({"userRules": {"keywords": [{"value": "a", "enabled": true}]}, "n": 3});
        let js = to_js(&value).unwrap();
        assert_eq!(from_js(&js).unwrap(), value);
        assert_eq!(from_js(&JsValue::UNDEFINED).unwrap(), Value::Null);
    }

    #[wasm_bindgen_test]
    fn test_describe() {
        assert_eq!(describe(&JsValue::from_str("boom")), "boom");
        let error = js_sys::Error::new("Extension context invalidated.");
        assert_eq!(describe(&error.into()), "Extension context invalidated.");
    }
}
