//! Main camera: fixed preview camera or the device viewer pose

use bevy::prelude::*;
use fauna_core::config::CameraConfig;
use fauna_core::CameraSource;

use crate::types::{RenderCamera, SharedController};

/// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

/// Plugin for the main camera
pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera)
            .add_systems(Update, update_camera.after(crate::scene::drive_preview));
    }
}

fn projection(config: &CameraConfig) -> Projection {
    Projection::Perspective(PerspectiveProjection {
        fov: config.fov_degrees.to_radians(),
        near: config.near,
        far: config.far,
        ..default()
    })
}

/// Camera transform for a render source. The preview camera looks down -Z.
pub fn camera_transform(source: CameraSource, config: &CameraConfig) -> Transform {
    match source {
        CameraSource::Fallback => Transform::from_translation(Vec3::from_array(config.position)),
        CameraSource::Device(pose) => Transform::from_matrix(pose),
    }
}

fn spawn_camera(mut commands: Commands, shared: Res<SharedController>) {
    let config = shared.lock().config().camera.clone();
    commands.spawn((
        Camera3d::default(),
        projection(&config),
        camera_transform(CameraSource::Fallback, &config),
        MainCamera,
    ));
}

fn update_camera(
    shared: Res<SharedController>,
    camera: Res<RenderCamera>,
    mut cameras: Query<&mut Transform, With<MainCamera>>,
) {
    let source = camera.get();
    let controller = shared.lock();
    for mut transform in &mut cameras {
        *transform = camera_transform(source, &controller.config().camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_camera_at_configured_position() {
        let config = CameraConfig::default();
        let transform = camera_transform(CameraSource::Fallback, &config);
        assert_eq!(transform.translation, Vec3::new(0.0, 1.6, 0.0));
        assert_eq!(transform.forward(), Dir3::NEG_Z);
    }

    #[test]
    fn test_device_camera_follows_pose() {
        let config = CameraConfig::default();
        let pose = Mat4::from_rotation_translation(Quat::from_rotation_y(0.5), Vec3::new(0.1, 1.4, 0.2));
        let transform = camera_transform(CameraSource::Device(pose), &config);
        assert!((transform.translation - Vec3::new(0.1, 1.4, 0.2)).length() < 1e-5);
        assert!(transform.rotation.angle_between(Quat::from_rotation_y(0.5)) < 1e-4);
    }
}
