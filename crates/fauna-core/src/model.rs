//! Model registry: the fixed set of sub-models and the group that holds them
//!
//! The viewer places exactly one kind of object: a group of three sub-models
//! (the elephant, its skeleton and its heart) laid out at fixed offsets.
//! Sub-models live in a small array indexed by [`SubModelKind`] so that the
//! "exactly one visible" rule can be checked without walking a scene tree.

use bevy_math::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ConfigError;

/// Identifies one of the three sub-models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubModelKind {
    Primary,
    Alt1,
    Alt2,
}

impl SubModelKind {
    pub const ALL: [SubModelKind; 3] = [SubModelKind::Primary, SubModelKind::Alt1, SubModelKind::Alt2];

    pub fn index(self) -> usize {
        match self {
            SubModelKind::Primary => 0,
            SubModelKind::Alt1 => 1,
            SubModelKind::Alt2 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubModelKind::Primary => "primary",
            SubModelKind::Alt1 => "alt1",
            SubModelKind::Alt2 => "alt2",
        }
    }
}

impl Default for SubModelKind {
    fn default() -> Self {
        SubModelKind::Primary
    }
}

impl fmt::Display for SubModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown sub-model: {0}")]
pub struct UnknownSubModel(pub String);

impl FromStr for SubModelKind {
    type Err = UnknownSubModel;

    /// Accepts the kind names as well as the default labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "elephant" => Ok(SubModelKind::Primary),
            "alt1" | "skeleton" => Ok(SubModelKind::Alt1),
            "alt2" | "heart" => Ok(SubModelKind::Alt2),
            _ => Err(UnknownSubModel(s.to_string())),
        }
    }
}

/// Static description of a sub-model: its asset and where it sits in the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubModelSpec {
    pub kind: SubModelKind,
    /// Button label shown in the UI
    pub label: String,
    /// glTF asset path, relative to the asset root
    pub path: String,
    /// Home offset relative to the group origin
    pub offset: [f32; 3],
    /// Uniform scale baked onto the loaded model
    #[serde(default = "default_model_scale")]
    pub scale: f32,
}

fn default_model_scale() -> f32 {
    0.5
}

impl SubModelSpec {
    pub fn home_offset(&self) -> Vec3 {
        Vec3::from_array(self.offset)
    }
}

/// The elephant in the middle, skeleton to the right, heart to the left
pub fn default_specs() -> Vec<SubModelSpec> {
    default_spec_array().to_vec()
}

fn default_spec_array() -> [SubModelSpec; 3] {
    [
        SubModelSpec {
            kind: SubModelKind::Primary,
            label: "Elephant".to_string(),
            path: "assets/gajah/gajah.glb".to_string(),
            offset: [0.0, 0.0, 0.0],
            scale: default_model_scale(),
        },
        SubModelSpec {
            kind: SubModelKind::Alt1,
            label: "Skeleton".to_string(),
            path: "assets/tulang/tulang_gajah.glb".to_string(),
            offset: [1.5, 0.0, 0.0],
            scale: default_model_scale(),
        },
        SubModelSpec {
            kind: SubModelKind::Alt2,
            label: "Heart".to_string(),
            path: "assets/jantung/jantung.glb".to_string(),
            offset: [-1.5, 0.0, 0.0],
            scale: default_model_scale(),
        },
    ]
}

/// One spec per [`SubModelKind`], stored in kind order
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    specs: [SubModelSpec; 3],
}

impl ModelRegistry {
    /// Build a registry from a list that must name every kind exactly once
    pub fn new(specs: Vec<SubModelSpec>) -> Result<Self, ConfigError> {
        let mut slots: [Option<SubModelSpec>; 3] = [None, None, None];
        for spec in specs {
            let slot = &mut slots[spec.kind.index()];
            if slot.is_some() {
                return Err(ConfigError::Invalid(format!("sub-model {} listed twice", spec.kind)));
            }
            if !spec.scale.is_finite() || spec.scale <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "sub-model {} has invalid scale {}",
                    spec.kind, spec.scale
                )));
            }
            *slot = Some(spec);
        }

        let [primary, alt1, alt2] = slots;
        match (primary, alt1, alt2) {
            (Some(primary), Some(alt1), Some(alt2)) => Ok(Self { specs: [primary, alt1, alt2] }),
            (primary, alt1, _) => {
                let missing = if primary.is_none() {
                    SubModelKind::Primary
                } else if alt1.is_none() {
                    SubModelKind::Alt1
                } else {
                    SubModelKind::Alt2
                };
                Err(ConfigError::Invalid(format!("sub-model {} missing", missing)))
            }
        }
    }

    pub fn get(&self, kind: SubModelKind) -> &SubModelSpec {
        &self.specs[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubModelSpec> {
        self.specs.iter()
    }

    /// Build the authoring-time prefab at its preview position
    pub fn prefab(&self, home: Vec3) -> ModelGroup {
        ModelGroup::from_registry(self, home)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self {
            specs: default_spec_array(),
        }
    }
}

/// Runtime state of one sub-model inside a group
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubModel {
    pub kind: SubModelKind,
    pub home_offset: Vec3,
    pub position: Vec3,
    pub visible: bool,
}

/// Local transform of a group. The UI scale/rotation controls write here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupTransform {
    pub translation: Vec3,
    /// Rotation about the y axis in radians
    pub yaw: f32,
    /// Uniform scale
    pub scale: f32,
}

impl GroupTransform {
    pub const IDENTITY: GroupTransform = GroupTransform {
        translation: Vec3::ZERO,
        yaw: 0.0,
        scale: 1.0,
    };

    pub fn at(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_rotation_y(self.yaw),
            self.translation,
        )
    }
}

impl Default for GroupTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A group of the three sub-models: the prefab or a placed copy of it
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroup {
    pub transform: GroupTransform,
    pub visible: bool,
    sub_models: [SubModel; 3],
}

impl ModelGroup {
    pub fn from_registry(registry: &ModelRegistry, translation: Vec3) -> Self {
        let sub_models = SubModelKind::ALL.map(|kind| {
            let home_offset = registry.get(kind).home_offset();
            SubModel {
                kind,
                home_offset,
                position: home_offset,
                visible: kind == SubModelKind::default(),
            }
        });

        Self {
            transform: GroupTransform::at(translation),
            visible: true,
            sub_models,
        }
    }

    pub fn sub_models(&self) -> &[SubModel; 3] {
        &self.sub_models
    }

    pub fn sub_model(&self, kind: SubModelKind) -> &SubModel {
        &self.sub_models[kind.index()]
    }

    /// Show only `kind` and move every sub-model back to its home offset
    pub fn show(&mut self, kind: SubModelKind) {
        for sub_model in &mut self.sub_models {
            sub_model.visible = sub_model.kind == kind;
            sub_model.position = sub_model.home_offset;
        }
    }

    pub fn visible_sub_model(&self) -> Option<SubModelKind> {
        self.sub_models.iter().find(|s| s.visible).map(|s| s.kind)
    }

    pub fn visible_count(&self) -> usize {
        self.sub_models.iter().filter(|s| s.visible).count()
    }

    /// Back to the default sub-model with an identity transform at `translation`
    pub fn reset(&mut self, translation: Vec3) {
        self.transform = GroupTransform::at(translation);
        self.show(SubModelKind::default());
    }

    /// Deep copy used for a placed instance: identity transform, visible,
    /// default sub-model shown.
    pub fn instantiate(&self) -> ModelGroup {
        let mut instance = self.clone();
        instance.visible = true;
        instance.reset(Vec3::ZERO);
        instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefab() -> ModelGroup {
        ModelRegistry::default().prefab(Vec3::new(0.0, 1.5, -3.0))
    }

    #[test]
    fn test_prefab_shows_primary_only() {
        let group = prefab();
        assert_eq!(group.visible_count(), 1);
        assert_eq!(group.visible_sub_model(), Some(SubModelKind::Primary));
        assert_eq!(group.transform.translation, Vec3::new(0.0, 1.5, -3.0));
        assert!(group.visible);
    }

    #[test]
    fn test_show_is_exclusive_and_restores_offsets() {
        let mut group = prefab();
        // Scramble positions to make sure show() puts them back
        for sub_model in &mut group.sub_models {
            sub_model.position = Vec3::splat(9.0);
        }

        group.show(SubModelKind::Alt1);

        assert_eq!(group.visible_count(), 1);
        assert_eq!(group.visible_sub_model(), Some(SubModelKind::Alt1));
        for sub_model in group.sub_models() {
            assert_eq!(sub_model.position, sub_model.home_offset);
        }
        assert_eq!(group.sub_model(SubModelKind::Alt1).position, Vec3::new(1.5, 0.0, 0.0));
        assert_eq!(group.sub_model(SubModelKind::Alt2).position, Vec3::new(-1.5, 0.0, 0.0));
    }

    #[test]
    fn test_instantiate_resets_copy_not_prefab() {
        let mut group = prefab();
        group.transform.scale = 2.0;
        group.transform.yaw = 1.0;
        group.visible = false;
        group.show(SubModelKind::Alt2);

        let instance = group.instantiate();

        assert_eq!(instance.transform, GroupTransform::IDENTITY);
        assert!(instance.visible);
        assert_eq!(instance.visible_sub_model(), Some(SubModelKind::Primary));
        // The prefab keeps its own state
        assert_eq!(group.transform.scale, 2.0);
        assert_eq!(group.visible_sub_model(), Some(SubModelKind::Alt2));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("primary".parse::<SubModelKind>(), Ok(SubModelKind::Primary));
        assert_eq!("Skeleton".parse::<SubModelKind>(), Ok(SubModelKind::Alt1));
        assert_eq!(" heart ".parse::<SubModelKind>(), Ok(SubModelKind::Alt2));
        assert!("tail".parse::<SubModelKind>().is_err());
    }

    #[test]
    fn test_registry_rejects_duplicates_and_gaps() {
        let mut specs = default_specs();
        specs[2].kind = SubModelKind::Alt1;
        assert!(ModelRegistry::new(specs).is_err());

        let mut specs = default_specs();
        specs.pop();
        assert!(ModelRegistry::new(specs).is_err());

        let mut specs = default_specs();
        specs.reverse();
        let registry = ModelRegistry::new(specs).unwrap();
        assert_eq!(registry.get(SubModelKind::Alt2).label, "Heart");
    }

    #[test]
    fn test_group_matrix() {
        let transform = GroupTransform {
            translation: Vec3::new(1.0, 0.0, 0.0),
            yaw: std::f32::consts::FRAC_PI_2,
            scale: 2.0,
        };
        let p = transform.to_matrix().transform_point3(Vec3::X);
        // x axis rotates onto -z, doubles, then shifts by +x
        assert!((p - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-5);
    }
}
