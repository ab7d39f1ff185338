//! Fauna Core - AR session lifecycle, placement and active-target logic
//!
//! This crate holds the renderer-independent part of the Fauna AR viewer:
//! - Model registry and the prefab group of three sub-models
//! - Placement state machine with debounce and anchor fallback
//! - Active-target resolution for the UI controls
//! - Session lifecycle controller and frame driver
//! - Device port traits implemented by the WebXR adapter
//! - Viewer configuration

pub mod config;
pub mod error;
pub mod frame;
pub mod model;
pub mod placement;
pub mod port;
pub mod session;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::ViewerConfig;
pub use error::{ConfigError, XrError};
pub use frame::{CameraSource, FrameDriver, FrameOutcome};
pub use model::{GroupTransform, ModelGroup, ModelRegistry, SubModelKind, SubModelSpec};
pub use placement::{AnchorBinding, InstanceId, PlacedInstance, RequestOutcome};
pub use port::{AnchorId, FrameLoop, FrameSample, HitSample, InputChannel, PlacementTicket, SessionToken, XrDevice, XrFrame};
pub use session::{ArController, ControlState};
pub use target::{ActiveTarget, SessionPhase};
