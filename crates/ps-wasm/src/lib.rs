//! WebAssembly bindings for Privacy Shield
//!
//! One module serves every extension context. Each context's loader calls its
//! entry point once:
//!
//! - content script: [`start_content_script`]
//! - background worker: [`start_background`]
//! - popup: [`watch_popup`] and [`set_protection`]
//! - options page: [`load_options`] and the [`OptionsPage`] methods

mod bridge;
mod chrome;
mod console;
mod content;
mod page;

pub mod background;
pub mod options;
pub mod popup;

use wasm_bindgen::prelude::*;

pub use background::start_background;
pub use content::start_content_script;
pub use options::{load_options, OptionsPage};
pub use popup::{set_protection, watch_popup};

#[wasm_bindgen(start)]
pub fn init() {
    console::init(log::LevelFilter::Info);
}

/// Switch console logging to debug output.
#[wasm_bindgen]
pub fn enable_debug_logging() {
    log::set_max_level(log::LevelFilter::Debug);
}
