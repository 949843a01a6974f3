//! Background service worker entry point.

use std::rc::Rc;

use js_sys::Function;
use wasm_bindgen::prelude::*;

use ps_core::message::{BackgroundService, MessageError, Request};

use crate::bridge::{describe, from_js, to_js};
use crate::chrome::{self, ChromeBadge};

/// True if the sender of `message` waits for a reply.
fn wants_reply(message: &serde_json::Value) -> bool {
    match Request::parse(message.clone()) {
        Ok(request) => request.expects_response(),
        Err(MessageError::Malformed { .. }) => true,
        Err(_) => false,
    }
}

/// Register the install, message and tab listeners.
#[wasm_bindgen]
pub fn start_background() {
    let service = Rc::new(BackgroundService::new(chrome::local_store(), ChromeBadge));

    let installed = service.clone();
    chrome::on_installed(move || {
        let service = installed.clone();
        wasm_bindgen_futures::spawn_local(async move {
            service.on_installed().await;
        });
    });

    let messages = service.clone();
    chrome::on_message(move |message: JsValue, sender_tab: Option<i32>, send_response: Function| {
        let message = match from_js(&message) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Ignoring undecodable message: {}", describe(&e));
                return false;
            }
        };
        let keep_open = wants_reply(&message);
        let service = messages.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let Some(reply) = service.handle_raw(message, sender_tab).await else {
                return;
            };
            match to_js(&reply) {
                Ok(reply) => {
                    if let Err(e) = send_response.call1(&JsValue::NULL, &reply) {
                        log::warn!("Failed to send response: {}", describe(&e));
                    }
                }
                Err(e) => log::error!("Failed to encode response: {}", describe(&e)),
            }
        });
        keep_open
    });

    let tabs = service;
    chrome::on_tab_updated(move |tab_id, status| {
        tabs.on_tab_updated(tab_id, status.as_deref());
    });
}
