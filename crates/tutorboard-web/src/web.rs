//! WebAssembly entry point.

use wasm_bindgen::prelude::*;

/// Install the panic hook and the console logger.
#[wasm_bindgen(start)]
pub fn start() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"Tutorboard logger already initialized".into());
    }

    log::info!("Tutorboard {} loaded", env!("CARGO_PKG_VERSION"));
}
