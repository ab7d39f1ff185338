//! Bevy application setup

use anyhow::Context;
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::{prelude::MeshPickingPlugin, DefaultPickingPlugins};
use fauna_core::{ArController, ViewerConfig};
use fauna_scene::{FaunaScenePlugin, RenderCamera, SharedController};

use crate::ui::UiPlugin;
use crate::xr::{XrBridge, XrPlugin, CANVAS_SELECTOR};

const EMBEDDED_CONFIG: &str = include_str!("../fauna.toml");

/// Parse the embedded configuration, falling back to defaults.
///
/// The parse error is handed back so it can be reported once logging is up.
pub fn load_config() -> (ViewerConfig, Option<anyhow::Error>) {
    match ViewerConfig::from_toml_str(EMBEDDED_CONFIG).context("embedded fauna.toml") {
        Ok(config) => (config, None),
        Err(e) => (ViewerConfig::default(), Some(e)),
    }
}

pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    let controller = ArController::new(config).context("building AR controller")?;
    let controller = SharedController::new(controller);
    let camera = RenderCamera::default();

    let bridge = XrBridge::new(controller.clone(), camera.clone());
    bridge.start_preview();
    bridge.probe_support();

    App::new()
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Fauna AR".to_string(),
                        canvas: Some(CANVAS_SELECTOR.to_string()),
                        fit_canvas_to_parent: true,
                        prevent_default_event_handling: false,
                        // The camera feed shows through while in AR
                        transparent: true,
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    // Models are served next to the wasm bundle
                    file_path: "".to_string(),
                    meta_check: bevy::asset::AssetMetaCheck::Never,
                    ..default()
                }),
        )
        // Picking must be registered before EguiPlugin so it can detect it
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(MeshPickingPlugin)
        .add_plugins(EguiPlugin::default())
        .insert_non_send_resource(bridge)
        .add_plugins(FaunaScenePlugin { controller, camera })
        .add_plugins(XrPlugin)
        .add_plugins(UiPlugin)
        .run();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let (config, error) = load_config();
        assert!(error.is_none(), "{:?}", error);
        assert_eq!(config.placement.debounce_ms, 160);
        assert_eq!(config.session.overlay_root, "overlayRoot");
    }

    #[test]
    fn test_embedded_config_matches_builtin_registry() {
        let (config, _) = load_config();
        assert_eq!(config.registry().unwrap(), ViewerConfig::default().registry().unwrap());
        assert_eq!(config, ViewerConfig::default());
    }
}
