//! glTF loading and the prefab / placed-instance entities

use bevy::asset::LoadState;
use bevy::prelude::*;
use fauna_core::{GroupTransform, InstanceId, ModelGroup, ModelRegistry, PlacedInstance, SubModelKind};
use std::collections::{HashMap, HashSet};

use crate::types::SharedController;

/// Which group a sub-model entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOwner {
    Prefab,
    Placed(InstanceId),
}

/// Marker for the prefab group root
#[derive(Component)]
pub struct PrefabRoot;

/// Parent of every entity spawned during one AR session
#[derive(Component)]
pub struct SessionRoot;

/// Root of a placed instance
#[derive(Component)]
pub struct PlacedEntity {
    pub instance: InstanceId,
}

/// One sub-model under a group root
#[derive(Component)]
pub struct SubModelEntity {
    pub owner: GroupOwner,
    pub kind: SubModelKind,
    /// Asset path (for the scene lookup)
    pub path: String,
    /// Scale baked onto the loaded model
    pub model_scale: f32,
}

/// Cache of loaded model scenes, keyed by asset path
#[derive(Resource, Default)]
pub struct ModelCache {
    pub models: HashMap<String, Handle<Scene>>,
    pub loading: HashMap<String, Handle<Gltf>>,
    pub failed: HashSet<String>,
}

pub struct ModelsPlugin;

impl Plugin for ModelsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ModelCache>()
            .add_systems(Startup, spawn_prefab)
            .add_systems(Update, load_models)
            .add_systems(Update, sync_prefab)
            .add_systems(Update, sync_session_entities)
            .add_systems(Update, sync_sub_models.after(sync_prefab).after(sync_session_entities))
            .add_systems(Update, attach_scenes.after(load_models));
    }
}

/// Local transform of a group root
pub fn group_transform(transform: &GroupTransform) -> Transform {
    Transform {
        translation: transform.translation,
        rotation: Quat::from_rotation_y(transform.yaw),
        scale: Vec3::splat(transform.scale),
    }
}

/// Placement pose composed with the instance's own scale/rotation
pub fn placed_transform(instance: &PlacedInstance) -> Transform {
    Transform::from_matrix(instance.world_matrix())
}

fn visibility(visible: bool) -> Visibility {
    if visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

/// Start loading every registry model that isn't known yet
fn request_models(registry: &ModelRegistry, cache: &mut ModelCache, asset_server: &AssetServer) {
    for spec in registry.iter() {
        if cache.models.contains_key(&spec.path)
            || cache.loading.contains_key(&spec.path)
            || cache.failed.contains(&spec.path)
        {
            continue;
        }
        tracing::info!("Starting to load model: {}", spec.path);
        let handle: Handle<Gltf> = asset_server.load(spec.path.clone());
        cache.loading.insert(spec.path.clone(), handle);
    }
}

/// Spawn the sub-model children of a group root
fn spawn_sub_models(commands: &mut Commands, parent: Entity, owner: GroupOwner, registry: &ModelRegistry, group: &ModelGroup) {
    for sub_model in group.sub_models() {
        let spec = registry.get(sub_model.kind);
        let child = commands
            .spawn((
                Transform::from_translation(sub_model.position).with_scale(Vec3::splat(spec.scale)),
                visibility(sub_model.visible),
                SubModelEntity {
                    owner,
                    kind: sub_model.kind,
                    path: spec.path.clone(),
                    model_scale: spec.scale,
                },
            ))
            .id();
        commands.entity(parent).add_child(child);
    }
}

fn spawn_prefab(
    mut commands: Commands,
    shared: Res<SharedController>,
    mut cache: ResMut<ModelCache>,
    asset_server: Res<AssetServer>,
) {
    let controller = shared.lock();
    request_models(controller.registry(), &mut cache, &asset_server);

    let prefab = controller.prefab();
    let root = commands
        .spawn((group_transform(&prefab.transform), visibility(prefab.visible), PrefabRoot))
        .id();
    spawn_sub_models(&mut commands, root, GroupOwner::Prefab, controller.registry(), prefab);
}

/// Check loading state and extract scenes from loaded glTFs
fn load_models(mut cache: ResMut<ModelCache>, asset_server: Res<AssetServer>, gltf_assets: Res<Assets<Gltf>>) {
    let loading_keys: Vec<String> = cache.loading.keys().cloned().collect();
    for key in loading_keys {
        let Some(handle) = cache.loading.get(&key) else {
            continue;
        };

        match asset_server.get_load_state(handle.id()) {
            Some(LoadState::Loaded) => {
                let scene = gltf_assets
                    .get(handle)
                    .and_then(|gltf| gltf.default_scene.clone().or_else(|| gltf.scenes.first().cloned()));
                match scene {
                    Some(scene) => {
                        tracing::info!("Model loaded: {}", key);
                        cache.models.insert(key.clone(), scene);
                    }
                    None => {
                        tracing::warn!("Model {} has no scenes", key);
                        cache.failed.insert(key.clone());
                    }
                }
                cache.loading.remove(&key);
            }
            Some(LoadState::Failed(e)) => {
                // The sub-model stays an empty node
                tracing::error!("Failed to load model {}: {}", key, e);
                cache.loading.remove(&key);
                cache.failed.insert(key);
            }
            _ => {}
        }
    }
}

/// Give sub-model entities their scene once it is loaded
fn attach_scenes(
    mut commands: Commands,
    cache: Res<ModelCache>,
    pending: Query<(Entity, &SubModelEntity), Without<SceneRoot>>,
) {
    for (entity, sub_model) in &pending {
        if let Some(scene) = cache.models.get(&sub_model.path) {
            commands.entity(entity).insert(SceneRoot(scene.clone()));
        }
    }
}

fn sync_prefab(shared: Res<SharedController>, mut roots: Query<(&mut Transform, &mut Visibility), With<PrefabRoot>>) {
    let controller = shared.lock();
    let prefab = controller.prefab();
    for (mut transform, mut vis) in &mut roots {
        *transform = group_transform(&prefab.transform);
        *vis = visibility(prefab.visible);
    }
}

/// Mirror the session container: spawn/despawn the session root and the
/// placed instance under it
fn sync_session_entities(
    mut commands: Commands,
    shared: Res<SharedController>,
    roots: Query<Entity, With<SessionRoot>>,
    mut placed: Query<(Entity, &PlacedEntity, &mut Transform, &mut Visibility)>,
) {
    let controller = shared.lock();

    let Some(container) = controller.placement().container() else {
        for root in &roots {
            // Recursive: takes the placed instances with it
            commands.entity(root).despawn();
        }
        return;
    };

    let root = match roots.iter().next() {
        Some(root) => root,
        None => commands
            .spawn((Transform::IDENTITY, Visibility::default(), SessionRoot))
            .id(),
    };

    let live: HashSet<InstanceId> = container.instances().iter().map(|i| i.id).collect();
    let mut existing = HashSet::new();

    for (entity, placed_entity, mut transform, mut vis) in &mut placed {
        if !live.contains(&placed_entity.instance) {
            tracing::debug!("Despawning placed instance {}", placed_entity.instance.0);
            commands.entity(entity).despawn();
            continue;
        }
        existing.insert(placed_entity.instance);
        if let Some(instance) = container.instances().iter().find(|i| i.id == placed_entity.instance) {
            *transform = placed_transform(instance);
            *vis = visibility(instance.group.visible);
        }
    }

    for instance in container.instances() {
        if existing.contains(&instance.id) {
            continue;
        }
        let entity = commands
            .spawn((
                placed_transform(instance),
                visibility(instance.group.visible),
                PlacedEntity { instance: instance.id },
            ))
            .id();
        commands.entity(root).add_child(entity);
        spawn_sub_models(
            &mut commands,
            entity,
            GroupOwner::Placed(instance.id),
            controller.registry(),
            &instance.group,
        );
    }
}

fn sync_sub_models(shared: Res<SharedController>, mut sub_models: Query<(&SubModelEntity, &mut Transform, &mut Visibility)>) {
    let controller = shared.lock();
    let container = controller.placement().container();

    for (sub_model, mut transform, mut vis) in &mut sub_models {
        let group = match sub_model.owner {
            GroupOwner::Prefab => Some(controller.prefab()),
            GroupOwner::Placed(id) => container
                .and_then(|c| c.instances().iter().find(|i| i.id == id))
                .map(|i| &i.group),
        };
        let Some(group) = group else {
            continue;
        };
        let state = group.sub_model(sub_model.kind);
        transform.translation = state.position;
        transform.scale = Vec3::splat(sub_model.model_scale);
        *vis = visibility(state.visible);
    }
}
