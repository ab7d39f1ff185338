//! Resources shared between the scene systems and the browser adapter

use bevy::prelude::*;
use fauna_core::{ArController, CameraSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The controller, shared between Bevy systems and JS callbacks.
///
/// Everything runs on the browser main thread, so the lock is never
/// contended.
#[derive(Resource, Clone)]
pub struct SharedController(pub Arc<Mutex<ArController>>);

impl SharedController {
    pub fn new(controller: ArController) -> Self {
        Self(Arc::new(Mutex::new(controller)))
    }

    pub fn lock(&self) -> MutexGuard<'_, ArController> {
        // A panic elsewhere must not take the viewer down with it
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Camera source of the last rendered frame, written by whichever loop is
/// active
#[derive(Resource, Clone)]
pub struct RenderCamera(pub Arc<Mutex<CameraSource>>);

impl Default for RenderCamera {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(CameraSource::Fallback)))
    }
}

impl RenderCamera {
    pub fn get(&self) -> CameraSource {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, source: CameraSource) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = source;
    }
}

/// Screen-size dependent layout
#[derive(Debug, Clone, Resource)]
pub struct UiLayout {
    pub is_mobile: bool,
    pub screen_width: f32,
    pub screen_height: f32,
}

impl Default for UiLayout {
    fn default() -> Self {
        Self {
            is_mobile: false,
            screen_width: 1920.0,
            screen_height: 1080.0,
        }
    }
}

impl UiLayout {
    pub fn update_from_window(&mut self, width: f32, height: f32) {
        self.screen_width = width;
        self.screen_height = height;
        // Phones in portrait, or anything narrow
        self.is_mobile = width < 800.0 || (height > width * 1.2);
    }

    pub fn ui_scale(&self) -> f32 {
        if self.is_mobile { 1.4 } else { 1.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::Mat4;

    #[test]
    fn test_layout_detects_portrait_phone() {
        let mut layout = UiLayout::default();
        layout.update_from_window(390.0, 844.0);
        assert!(layout.is_mobile);
        assert!(layout.ui_scale() > 1.0);

        layout.update_from_window(1280.0, 800.0);
        assert!(!layout.is_mobile);
    }

    #[test]
    fn test_render_camera_shared_between_clones() {
        let camera = RenderCamera::default();
        let writer = camera.clone();
        writer.set(CameraSource::Device(Mat4::IDENTITY));
        assert_eq!(camera.get(), CameraSource::Device(Mat4::IDENTITY));
    }
}
