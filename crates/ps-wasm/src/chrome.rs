//! Extension API bindings
//!
//! Raw `chrome.*` imports and the adapters that put them behind the
//! `ps_core` host traits.

use std::collections::BTreeMap;

use js_sys::{Function, Promise, Reflect};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use ps_core::config::BUNDLED_RULES_PATH;
use ps_core::message::{BadgeRenderer, MessageSink, Request};
use ps_core::resolver::{BundledRules, ResourceError};
use ps_core::store::{RuleStore, StorageArea, StorageChanges, StorageError, StorageMap, ValueChange};
use ps_core::types::RuleFile;

use crate::bridge::{describe, from_js, settle, to_js};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn storage_get(keys: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn storage_set(items: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    fn storage_remove(keys: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn storage_on_changed(listener: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    fn runtime_send_message(message: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = getURL)]
    fn runtime_get_url(path: &str) -> String;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onInstalled"], js_name = addListener)]
    fn runtime_on_installed(listener: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn runtime_on_message(listener: &Function);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs", "onUpdated"], js_name = addListener)]
    fn tabs_on_updated(listener: &Function);

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    fn tabs_query(query: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeText)]
    fn action_set_badge_text(details: &JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
    fn action_set_badge_background_color(details: &JsValue) -> Result<Promise, JsValue>;
}

fn storage_error(e: JsValue) -> StorageError {
    StorageError::Unavailable(describe(&e))
}

fn key_array(keys: &[&str]) -> js_sys::Array {
    keys.iter().map(|key| JsValue::from_str(key)).collect()
}

// =============================================================================
// Storage
// =============================================================================

/// `chrome.storage.local`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeStorage;

impl StorageArea for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let promise = storage_get(&key_array(keys)).map_err(storage_error)?;
        let result = JsFuture::from(promise).await.map_err(storage_error)?;
        match from_js(&result).map_err(storage_error)? {
            Value::Object(values) => Ok(values),
            Value::Null => Ok(StorageMap::new()),
            other => Err(StorageError::Unavailable(format!("unexpected storage result: {}", other))),
        }
    }

    async fn set(&self, items: StorageMap) -> Result<(), StorageError> {
        let items = to_js(&items).map_err(storage_error)?;
        let promise = storage_set(&items).map_err(storage_error)?;
        JsFuture::from(promise).await.map_err(storage_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        let promise = storage_remove(&key_array(keys)).map_err(storage_error)?;
        JsFuture::from(promise).await.map_err(storage_error)?;
        Ok(())
    }
}

pub fn local_store() -> RuleStore<ChromeStorage> {
    RuleStore::new(ChromeStorage)
}

/// Decode an `onChanged` payload: `{ key: { oldValue, newValue } }`.
pub fn decode_changes(changes: &JsValue, area: String) -> Result<StorageChanges, JsValue> {
    let Value::Object(entries) = from_js(changes)? else {
        return Err(JsValue::from_str("storage changes must be an object"));
    };
    let changes: BTreeMap<String, ValueChange> = entries
        .into_iter()
        .map(|(key, change)| {
            let value_change = ValueChange {
                old_value: change.get("oldValue").cloned(),
                new_value: change.get("newValue").cloned(),
            };
            (key, value_change)
        })
        .collect();
    Ok(StorageChanges { area, changes })
}

/// Register a storage change listener for the lifetime of the page.
pub fn on_storage_changed(mut handler: impl FnMut(StorageChanges) + 'static) {
    let listener = Closure::<dyn FnMut(JsValue, String)>::new(move |changes: JsValue, area: String| {
        match decode_changes(&changes, area) {
            Ok(changes) => handler(changes),
            Err(e) => log::warn!("Ignoring storage change: {}", describe(&e)),
        }
    });
    storage_on_changed(listener.as_ref().unchecked_ref());
    listener.forget();
}

// =============================================================================
// Messaging
// =============================================================================

/// `chrome.runtime.sendMessage`, fire and forget.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeMessenger;

impl MessageSink for ChromeMessenger {
    fn send(&self, request: Request) {
        match to_js(&request) {
            // Rejects when the background worker is gone; nothing to do then.
            Ok(message) => settle(runtime_send_message(&message), "sendMessage"),
            Err(e) => log::error!("Failed to encode {} message: {}", request.kind(), describe(&e)),
        }
    }
}

pub fn on_installed(mut handler: impl FnMut() + 'static) {
    let listener = Closure::<dyn FnMut()>::new(move || handler());
    runtime_on_installed(listener.as_ref().unchecked_ref());
    listener.forget();
}

/// Register a message listener. The handler returns true when it will call
/// `sendResponse` later.
pub fn on_message(mut handler: impl FnMut(JsValue, Option<i32>, Function) -> bool + 'static) {
    let listener = Closure::<dyn FnMut(JsValue, JsValue, Function) -> bool>::new(
        move |message: JsValue, sender: JsValue, send_response: Function| {
            let tab_id = Reflect::get(&sender, &"tab".into())
                .ok()
                .filter(|tab| tab.is_object())
                .and_then(|tab| Reflect::get(&tab, &"id".into()).ok())
                .and_then(|id| id.as_f64())
                .map(|id| id as i32);
            handler(message, tab_id, send_response)
        },
    );
    runtime_on_message(listener.as_ref().unchecked_ref());
    listener.forget();
}

/// Register a tab update listener, called with the tab id and the new status.
pub fn on_tab_updated(mut handler: impl FnMut(i32, Option<String>) + 'static) {
    let listener = Closure::<dyn FnMut(i32, JsValue)>::new(move |tab_id: i32, change_info: JsValue| {
        let status = Reflect::get(&change_info, &"status".into())
            .ok()
            .and_then(|status| status.as_string());
        handler(tab_id, status);
    });
    tabs_on_updated(listener.as_ref().unchecked_ref());
    listener.forget();
}

/// URL of the active tab in the current window.
pub async fn active_tab_url() -> Option<String> {
    let query = js_sys::Object::new();
    let _ = Reflect::set(&query, &"active".into(), &JsValue::TRUE);
    let _ = Reflect::set(&query, &"currentWindow".into(), &JsValue::TRUE);
    let promise = tabs_query(&query).ok()?;
    let tabs = JsFuture::from(promise).await.ok()?;
    let tab = js_sys::Array::from(&tabs).get(0);
    Reflect::get(&tab, &"url".into()).ok()?.as_string()
}

// =============================================================================
// Badge
// =============================================================================

/// `chrome.action` badge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeBadge;

impl BadgeRenderer for ChromeBadge {
    fn set_badge(&self, text: &str, color: &str, tab_id: Option<i32>) {
        let text_details = js_sys::Object::new();
        let color_details = js_sys::Object::new();
        let _ = Reflect::set(&text_details, &"text".into(), &JsValue::from_str(text));
        let _ = Reflect::set(&color_details, &"color".into(), &JsValue::from_str(color));
        if let Some(tab_id) = tab_id {
            let _ = Reflect::set(&text_details, &"tabId".into(), &JsValue::from(tab_id));
            let _ = Reflect::set(&color_details, &"tabId".into(), &JsValue::from(tab_id));
        }
        settle(action_set_badge_text(&text_details), "setBadgeText");
        settle(
            action_set_badge_background_color(&color_details),
            "setBadgeBackgroundColor",
        );
    }
}

// =============================================================================
// Bundled Rules
// =============================================================================

/// `rules.json` from the extension package.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionRules;

impl BundledRules for ExtensionRules {
    async fn load(&self) -> Result<RuleFile, ResourceError> {
        let window = web_sys::window().ok_or_else(|| ResourceError::Missing("no window".to_string()))?;
        let url = runtime_get_url(BUNDLED_RULES_PATH);
        let fetch_error = |e: JsValue| ResourceError::Fetch(describe(&e));

        let response: web_sys::Response = JsFuture::from(window.fetch_with_str(&url))
            .await
            .map_err(fetch_error)?
            .dyn_into()
            .map_err(fetch_error)?;
        if !response.ok() {
            return Err(ResourceError::Fetch(format!("{} returned {}", url, response.status())));
        }
        let text = JsFuture::from(response.text().map_err(fetch_error)?)
            .await
            .map_err(fetch_error)?
            .as_string()
            .unwrap_or_default();
        Ok(serde_json::from_str(&text)?)
    }
}
