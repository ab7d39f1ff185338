//! Fauna Viewer - browser AR viewer for the anatomy models
//!
//! Shows the model group in a spinning preview and, once the user enters
//! AR, lets them place it on a detected surface with a tap.

mod app;
mod ui;
mod xr;

use wasm_bindgen::prelude::*;

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    let (config, config_error) = app::load_config();

    let level = config.logging.level.parse().unwrap_or(tracing::Level::WARN);
    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(level)
            .build(),
    );

    if let Some(e) = config_error {
        tracing::warn!("Using default configuration: {:#}", e);
    }

    if let Err(e) = app::run(config) {
        tracing::error!("Viewer failed to start: {:#}", e);
    }
}
