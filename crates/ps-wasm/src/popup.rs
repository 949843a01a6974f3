//! Popup bindings.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;

use ps_rules::popup::NO_ITEMS_LABEL;
use ps_rules::{toggle_protection, PopupView};

use crate::bridge::describe;
use crate::chrome::{self, ChromeBadge};

fn view_to_js(view: &PopupView) -> JsValue {
    let result = js_sys::Object::new();
    let domain = view.domain.as_deref().map_or(JsValue::NULL, JsValue::from_str);
    let badge = view.domain_badge().map_or(JsValue::NULL, JsValue::from_str);
    let items: js_sys::Array = view.hidden_items.iter().map(|item| JsValue::from_str(item)).collect();

    let _ = Reflect::set(&result, &"domain".into(), &domain);
    let _ = Reflect::set(&result, &"displayName".into(), &JsValue::from_str(&view.display_name));
    let _ = Reflect::set(&result, &"supported".into(), &JsValue::from(view.supported));
    let _ = Reflect::set(&result, &"domainBadge".into(), &badge);
    let _ = Reflect::set(&result, &"active".into(), &JsValue::from(view.active));
    let _ = Reflect::set(&result, &"statusText".into(), &JsValue::from_str(view.status_text()));
    let _ = Reflect::set(&result, &"hiddenCount".into(), &JsValue::from(view.hidden_count as u32));
    let _ = Reflect::set(&result, &"hiddenItems".into(), &items);
    let _ = Reflect::set(&result, &"emptyText".into(), &JsValue::from_str(NO_ITEMS_LABEL));
    result.into()
}

/// Load the popup state for the active tab and call `on_update` with a fresh
/// view whenever the hidden items change.
#[wasm_bindgen]
pub async fn watch_popup(on_update: Function) -> Result<JsValue, JsValue> {
    let tab_url = chrome::active_tab_url().await;
    let view = PopupView::load(&chrome::local_store(), tab_url.as_deref()).await;
    let initial = view_to_js(&view);

    let view = Rc::new(RefCell::new(view));
    chrome::on_storage_changed(move |changes| {
        let mut view = view.borrow_mut();
        if view.apply_change(&changes) {
            if let Err(e) = on_update.call1(&JsValue::NULL, &view_to_js(&view)) {
                log::warn!("Popup update failed: {}", describe(&e));
            }
        }
    });
    Ok(initial)
}

/// Protection switch handler. Resolves to false if the flag was not saved.
#[wasm_bindgen]
pub async fn set_protection(active: bool) -> Result<JsValue, JsValue> {
    let saved = toggle_protection(&chrome::local_store(), &ChromeBadge, active).await;
    Ok(JsValue::from(saved))
}
