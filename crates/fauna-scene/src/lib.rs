//! Fauna Scene - Bevy mirror of the AR controller
//!
//! The controller in `fauna-core` is the source of truth. This crate copies
//! its state into entities every frame (prefab, session root, placed
//! instance, reticle, camera) and provides the egui control widgets.

pub mod camera;
pub mod models;
pub mod scene;
pub mod types;
pub mod ui;

use bevy::prelude::*;

/// Plugin that sets up the shared scene and mirrors `controller` into it
pub struct FaunaScenePlugin {
    pub controller: SharedController,
    pub camera: RenderCamera,
}

impl Plugin for FaunaScenePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.controller.clone())
            .insert_resource(self.camera.clone())
            .init_resource::<UiLayout>()
            .add_plugins(camera::CameraPlugin)
            .add_plugins(scene::SceneSetupPlugin)
            .add_plugins(models::ModelsPlugin);
    }
}

pub use camera::MainCamera;
pub use types::*;
pub use ui::{apply_action, ControlAction};
