//! Scene setup - lights, reticle, preview loop and background

use bevy::prelude::*;
use fauna_core::FrameOutcome;
use std::f32::consts::FRAC_PI_2;

use crate::types::{RenderCamera, SharedController};

/// Background of the preview. Transparent while in AR so the camera feed
/// shows through the overlay canvas.
pub const PREVIEW_CLEAR_COLOR: Color = Color::srgb(0.067, 0.067, 0.067);

/// Marker for the main directional light
#[derive(Component)]
pub struct MainDirectionalLight;

/// Placement indicator root, posed from the latest hit
#[derive(Component)]
pub struct ReticleEntity;

pub struct SceneSetupPlugin;

impl Plugin for SceneSetupPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ClearColor(PREVIEW_CLEAR_COLOR))
            .add_systems(Startup, setup_scene)
            .add_systems(Update, (drive_preview, sync_reticle, update_clear_color));
    }
}

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Soft sky/ground fill
    commands.insert_resource(AmbientLight {
        color: Color::srgb(1.0, 1.0, 0.95),
        brightness: 600.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            illuminance: 4000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(1.0, 1.5, 0.5).looking_at(Vec3::ZERO, Vec3::Y),
        MainDirectionalLight,
    ));

    // Flat ring on the hit surface; the annulus mesh faces +Z so the child
    // is tipped onto the XZ plane
    let ring = meshes.add(Annulus::new(0.08, 0.1));
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        unlit: true,
        double_sided: true,
        cull_mode: None,
        ..default()
    });
    commands
        .spawn((Transform::IDENTITY, Visibility::Hidden, ReticleEntity))
        .with_children(|parent| {
            parent.spawn((
                Mesh3d(ring),
                MeshMaterial3d(material),
                Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            ));
        });
}

/// One fallback-loop tick per Bevy frame. Outside the fallback loop the
/// controller reports `Inactive` and nothing moves.
pub(crate) fn drive_preview(shared: Res<SharedController>, camera: Res<RenderCamera>) {
    let outcome = shared.lock().fallback_tick();
    if let FrameOutcome::Render(source) = outcome {
        camera.set(source);
    }
}

fn sync_reticle(shared: Res<SharedController>, mut reticles: Query<(&mut Transform, &mut Visibility), With<ReticleEntity>>) {
    let controller = shared.lock();
    let reticle = controller.placement().reticle().copied();

    for (mut transform, mut visibility) in &mut reticles {
        match reticle {
            Some(reticle) if reticle.visible => {
                *transform = Transform::from_matrix(reticle.pose);
                *visibility = Visibility::Inherited;
            }
            _ => *visibility = Visibility::Hidden,
        }
    }
}

fn update_clear_color(shared: Res<SharedController>, mut clear_color: ResMut<ClearColor>) {
    let target = if shared.lock().is_session_active() {
        Color::NONE
    } else {
        PREVIEW_CLEAR_COLOR
    };
    if clear_color.0 != target {
        clear_color.0 = target;
    }
}
