//! Contracts consumed from the AR runtime
//!
//! The controller never talks to WebXR directly. It drives an [`XrDevice`]
//! for resource acquisition/release and reads an [`XrFrame`] once per device
//! frame. Asynchronous device calls are fire-and-forget: their results come
//! back through the controller's `on_*` completion methods, tagged with the
//! [`SessionToken`] (and [`PlacementTicket`]) they were issued under.

use bevy_math::Mat4;
use std::collections::HashMap;
use std::fmt;

/// Generation counter identifying one AR session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionToken(pub u64);

/// Identifies one accepted placement request waiting for its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementTicket {
    pub session: SessionToken,
    pub id: u64,
}

/// Device-side anchor handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub u64);

/// Where select events come from. All three feed the same placement funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputChannel {
    /// `selectstart` / `select` on the session itself
    Session,
    /// `selectstart` / `select` on input controller 0
    Controller,
    /// `pointerup` / `click` / `touchend` on the canvas, for devices
    /// without native select events
    Dom,
}

impl InputChannel {
    pub const ALL: [InputChannel; 3] = [InputChannel::Session, InputChannel::Controller, InputChannel::Dom];
}

impl fmt::Display for InputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputChannel::Session => f.write_str("session"),
            InputChannel::Controller => f.write_str("controller"),
            InputChannel::Dom => f.write_str("dom"),
        }
    }
}

/// Which loop drives rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameLoop {
    /// Continuous display-refresh redraw of the preview
    #[default]
    Fallback,
    /// Device per-frame callback while an AR session runs
    Xr,
    /// Neither loop; only seen briefly during teardown
    Stopped,
}

/// Best hit-test result for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSample {
    /// Surface pose in the session reference space
    pub pose: Mat4,
    /// Whether the underlying result can create an anchor
    pub anchorable: bool,
}

/// Per-frame device queries
pub trait XrFrame {
    /// Nearest hit from the hit-test source, if any
    fn hit_test(&self) -> Option<HitSample>;

    /// Live pose of an anchor, if the device tracks it this frame
    fn anchor_pose(&self, anchor: AnchorId) -> Option<Mat4>;

    /// Camera pose supplied by the device
    fn viewer_pose(&self) -> Option<Mat4>;
}

/// Resource acquisition and release on the AR runtime.
///
/// Methods returning nothing start asynchronous work whose result is fed
/// back into the controller later; they must not call back synchronously.
pub trait XrDevice {
    fn request_reference_space(&mut self, kind: &str, token: SessionToken);

    fn add_select_listener(&mut self, channel: InputChannel) -> Result<(), crate::XrError>;

    fn remove_select_listener(&mut self, channel: InputChannel);

    fn request_hit_test_source(&mut self, token: SessionToken);

    /// Release the hit-test source acquired under `token`
    fn cancel_hit_test_source(&mut self, token: SessionToken);

    /// Create an anchor from the most recent hit result
    fn request_anchor(&mut self, ticket: PlacementTicket);

    fn delete_anchor(&mut self, anchor: AnchorId);

    fn start_frame_loop(&mut self, mode: FrameLoop);

    fn stop_frame_loop(&mut self);
}

/// Plain-data snapshot of one device frame.
///
/// Adapters poll the device once per frame into this and hand it to the
/// controller, so nothing is awaited inside the render tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSample {
    pub hit: Option<HitSample>,
    pub anchor_poses: HashMap<AnchorId, Mat4>,
    pub viewer: Option<Mat4>,
}

impl XrFrame for FrameSample {
    fn hit_test(&self) -> Option<HitSample> {
        self.hit
    }

    fn anchor_pose(&self, anchor: AnchorId) -> Option<Mat4> {
        self.anchor_poses.get(&anchor).copied()
    }

    fn viewer_pose(&self) -> Option<Mat4> {
        self.viewer
    }
}
