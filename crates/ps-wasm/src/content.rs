//! Content script worker
//!
//! Store notifications, DOM mutations and timer ticks are queued on one
//! channel and drained by a single task that owns the [`PageSession`], so
//! scans never interleave.

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MutationObserver, MutationObserverInit, Window};

use ps_core::resolver::Resolver;
use ps_core::session::PageSession;
use ps_core::store::StorageChanges;

use crate::bridge::{describe, now_ms};
use crate::chrome::{self, ChromeMessenger, ExtensionRules};
use crate::page::WebDocument;

type ContentSession = PageSession<WebDocument, chrome::ChromeStorage, ExtensionRules, ChromeMessenger>;

enum PageEvent {
    Storage(StorageChanges),
    Mutation,
    Tick,
}

/// One pending `setTimeout` that wakes the worker at the session's next
/// deadline.
struct Ticker {
    window: Window,
    events: UnboundedSender<PageEvent>,
    armed: Option<(u64, i32)>,
}

impl Ticker {
    fn arm(&mut self, deadline: Option<u64>, now: u64) {
        if self.armed.map(|(at, _)| at) == deadline {
            return;
        }
        if let Some((_, handle)) = self.armed.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        let Some(deadline) = deadline else {
            return;
        };

        let events = self.events.clone();
        let wake = Closure::once_into_js(move || {
            let _ = events.unbounded_send(PageEvent::Tick);
        });
        let delay = deadline.saturating_sub(now).min(i32::MAX as u64) as i32;
        match self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(wake.unchecked_ref(), delay)
        {
            Ok(handle) => self.armed = Some((deadline, handle)),
            Err(e) => log::error!("Failed to schedule timer: {}", describe(&e)),
        }
    }

    fn fired(&mut self) {
        self.armed = None;
    }
}

async fn run(mut session: ContentSession, mut events: UnboundedReceiver<PageEvent>, mut ticker: Ticker) {
    let report = session.start(now_ms()).await;
    log::debug!("Initial scan hid {} element(s)", report.total());
    ticker.arm(session.next_deadline(), now_ms());

    let mut pending = None;
    loop {
        let event = match pending.take() {
            Some(event) => event,
            None => match events.next().await {
                Some(event) => event,
                None => break,
            },
        };
        let now = now_ms();
        match event {
            PageEvent::Storage(changes) => session.handle_storage_change(&changes, now).await,
            PageEvent::Mutation => {
                let (folded, next) = drain_mutations(&mut events);
                if folded > 0 {
                    log::debug!("Coalesced {} queued mutation(s)", folded);
                }
                pending = next;
                session.handle_mutation(now);
            }
            PageEvent::Tick => {
                ticker.fired();
                session.tick(now).await;
            }
        }
        ticker.arm(session.next_deadline(), now_ms());
    }
}

/// Pull the mutation notifications already queued behind one being handled.
/// Returns how many were folded and the first other event, which must run
/// next.
fn drain_mutations(events: &mut UnboundedReceiver<PageEvent>) -> (usize, Option<PageEvent>) {
    let mut folded = 0;
    while let Ok(Some(event)) = events.try_next() {
        match event {
            PageEvent::Mutation => folded += 1,
            other => return (folded, Some(other)),
        }
    }
    (folded, None)
}

fn observe_mutations(body: &web_sys::HtmlElement, events: UnboundedSender<PageEvent>) -> Result<(), JsValue> {
    let callback = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |_records: JsValue, _observer: JsValue| {
        let _ = events.unbounded_send(PageEvent::Mutation);
    });
    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    observer.observe_with_options(body, &options)?;
    callback.forget();
    Ok(())
}

/// Entry point for the content script.
#[wasm_bindgen]
pub fn start_content_script() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let hostname = window.location().hostname()?;
    let document = window.document().ok_or_else(|| JsValue::from_str("No document"))?;
    let body = document.body().ok_or_else(|| JsValue::from_str("No document body"))?;

    let (sender, receiver) = unbounded();

    let storage_events = sender.clone();
    chrome::on_storage_changed(move |changes| {
        let _ = storage_events.unbounded_send(PageEvent::Storage(changes));
    });
    observe_mutations(&body, sender.clone())?;

    let session = PageSession::new(
        hostname,
        WebDocument::new(document),
        chrome::local_store(),
        Resolver::new(ExtensionRules),
        ChromeMessenger,
    );
    let ticker = Ticker {
        window,
        events: sender,
        armed: None,
    };
    wasm_bindgen_futures::spawn_local(run(session, receiver, ticker));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_drain_folds_queued_mutations() {
        let (sender, mut receiver) = unbounded();
        for _ in 0..5 {
            sender.unbounded_send(PageEvent::Mutation).unwrap();
        }
        sender.unbounded_send(PageEvent::Tick).unwrap();
        sender.unbounded_send(PageEvent::Mutation).unwrap();

        let (folded, next) = drain_mutations(&mut receiver);
        assert_eq!(folded, 5);
        assert!(matches!(next, Some(PageEvent::Tick)));

        let (folded, next) = drain_mutations(&mut receiver);
        assert_eq!(folded, 1);
        assert!(next.is_none());
    }

    #[wasm_bindgen_test]
    fn test_drain_empty_queue() {
        let (_sender, mut receiver) = unbounded::<PageEvent>();
        let (folded, next) = drain_mutations(&mut receiver);
        assert_eq!(folded, 0);
        assert!(next.is_none());
    }
}
