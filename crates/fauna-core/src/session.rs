//! AR session lifecycle controller
//!
//! [`ArController`] owns everything the viewer mutates: the prefab, the
//! placement slot, the control values and the frame driver. Device resources
//! are acquired in [`ArController::on_session_start`] and the completion
//! callbacks that follow it, and released in [`ArController::on_session_end`]
//! in mirror order. Completions carry the [`SessionToken`] they were issued
//! under, so anything that arrives after the session ended is dropped.

use bevy_math::Vec3;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::error::{ConfigError, XrError};
use crate::frame::{FrameDriver, FrameOutcome};
use crate::model::{GroupTransform, ModelGroup, ModelRegistry, SubModelKind};
use crate::placement::{PlacedInstance, Placement, RequestOutcome};
use crate::port::{AnchorId, FrameLoop, InputChannel, PlacementTicket, SessionToken, XrDevice, XrFrame};
use crate::target::{resolve, ActiveTarget, SessionPhase};

/// Last values written by the scale and rotation sliders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub scale: f32,
    pub rotation_degrees: f32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

/// Per-session bookkeeping, dropped wholesale on session end
#[derive(Debug, Clone)]
struct ActiveSession {
    token: SessionToken,
    /// Set once the reference space completion has been handled
    configured: bool,
    reference_space_ready: bool,
    hit_test_ready: bool,
    listeners: Vec<InputChannel>,
    /// Prefab scale/rotation at session start
    carry_over: GroupTransform,
}

#[derive(Debug, Clone)]
pub struct ArController {
    config: ViewerConfig,
    registry: ModelRegistry,
    prefab: ModelGroup,
    last_token: u64,
    session: Option<ActiveSession>,
    placement: Placement,
    controls: ControlState,
    frames: FrameDriver,
}

impl ArController {
    pub fn new(config: ViewerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = config.registry()?;
        let prefab = registry.prefab(config.preview.home());
        let placement = Placement::new(config.placement.debounce(), config.placement.hide_reticle_when_placed);
        let frames = FrameDriver::new(config.preview.spin_per_frame);

        Ok(Self {
            config,
            registry,
            prefab,
            last_token: 0,
            session: None,
            placement,
            controls: ControlState::default(),
            frames,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn prefab(&self) -> &ModelGroup {
        &self.prefab
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn placed(&self) -> Option<&PlacedInstance> {
        self.placement.placed()
    }

    pub fn controls(&self) -> ControlState {
        self.controls
    }

    pub fn frame_loop(&self) -> FrameLoop {
        self.frames.mode()
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_token(&self) -> Option<SessionToken> {
        self.session.as_ref().map(|s| s.token)
    }

    /// Channels currently registered with the device
    pub fn listeners(&self) -> &[InputChannel] {
        self.session.as_ref().map(|s| s.listeners.as_slice()).unwrap_or_default()
    }

    pub fn hit_test_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.hit_test_ready)
    }

    pub fn reference_space_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.reference_space_ready)
    }

    /// Prefab transform recorded when the current session started
    pub fn carry_over(&self) -> Option<GroupTransform> {
        self.session.as_ref().map(|s| s.carry_over)
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.session {
            None => SessionPhase::Idle,
            Some(_) if self.placement.is_occupied() => SessionPhase::Placed,
            Some(_) => SessionPhase::Unplaced,
        }
    }

    /// Re-evaluated on every call, never cached
    pub fn active_target(&self) -> Option<ActiveTarget> {
        let placed = self.placement.placed().filter(|p| p.group.visible).map(|p| p.id);
        resolve(self.session.is_some(), self.prefab.visible, placed)
    }

    /// Register the preview loop at startup
    pub fn start_preview(&mut self, device: &mut impl XrDevice) {
        if self.session.is_none() {
            self.frames.switch_to(FrameLoop::Fallback, device);
        }
    }

    /// Begin a session. Ends the current one first if needed.
    pub fn on_session_start(&mut self, device: &mut impl XrDevice) -> SessionToken {
        if self.session.is_some() {
            warn!("Session started while another is active, ending the previous one");
            self.on_session_end(device);
        }

        self.last_token += 1;
        let token = SessionToken(self.last_token);

        self.placement.reset();
        self.prefab.visible = false;
        self.session = Some(ActiveSession {
            token,
            configured: false,
            reference_space_ready: false,
            hit_test_ready: false,
            listeners: Vec::new(),
            carry_over: self.prefab.transform,
        });
        // No preview ticks once a session exists; the XR loop starts after
        // the reference space resolves
        self.frames.stop(device);

        info!(session = token.0, "AR session started");
        device.request_reference_space(&self.config.session.reference_space, token);
        token
    }

    /// Reference space request finished. Setup continues whether it
    /// succeeded or not.
    pub fn on_reference_space(
        &mut self,
        token: SessionToken,
        result: Result<(), XrError>,
        device: &mut impl XrDevice,
    ) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.token == token) else {
            debug!(session = token.0, "Discarding stale reference space");
            return false;
        };
        if session.configured {
            return false;
        }
        session.configured = true;

        match result {
            Ok(()) => session.reference_space_ready = true,
            Err(e) => warn!("Continuing without reference space: {}", e),
        }

        self.placement.create_container();

        for channel in InputChannel::ALL {
            match device.add_select_listener(channel) {
                Ok(()) => session.listeners.push(channel),
                Err(e) => warn!("{}", e),
            }
        }

        self.placement.create_reticle();
        device.request_hit_test_source(token);

        self.frames.switch_to(FrameLoop::Xr, device);
        true
    }

    /// Hit-test source request finished. A late success is cancelled.
    pub fn on_hit_test_source(
        &mut self,
        token: SessionToken,
        result: Result<(), XrError>,
        device: &mut impl XrDevice,
    ) -> bool {
        let Some(session) = self.session.as_mut().filter(|s| s.token == token) else {
            if result.is_ok() {
                debug!(session = token.0, "Cancelling hit-test source for an ended session");
                device.cancel_hit_test_source(token);
            }
            return false;
        };

        match result {
            Ok(()) => {
                session.hit_test_ready = true;
                true
            }
            Err(e) => {
                warn!("Hit-test source unavailable, placement disabled: {}", e);
                false
            }
        }
    }

    /// Mirror of session start. A no-op when no session is active.
    pub fn on_session_end(&mut self, device: &mut impl XrDevice) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.frames.stop(device);

        for channel in &session.listeners {
            device.remove_select_listener(*channel);
        }

        if session.hit_test_ready {
            device.cancel_hit_test_source(session.token);
        }

        self.placement.teardown(device);
        self.placement.reset();
        self.controls = ControlState::default();

        self.prefab.visible = true;
        self.prefab.reset(self.config.preview.home());

        self.frames.switch_to(FrameLoop::Fallback, device);
        info!(session = session.token.0, "AR session ended");
    }

    /// Funnel for all three select channels
    pub fn on_select(&mut self, channel: InputChannel, now: Duration, device: &mut impl XrDevice) -> RequestOutcome {
        let Some(session) = &self.session else {
            return RequestOutcome::Rejected;
        };
        let token = session.token;

        let (initial, controls) = if self.config.placement.carry_over_transform {
            let carried = session.carry_over;
            (
                GroupTransform {
                    translation: Vec3::ZERO,
                    ..carried
                },
                ControlState {
                    scale: carried.scale,
                    rotation_degrees: carried.yaw.to_degrees(),
                },
            )
        } else {
            (GroupTransform::IDENTITY, ControlState::default())
        };

        let outcome = self.placement.request(now, &self.prefab, initial, token, device);
        if outcome != RequestOutcome::Rejected {
            debug!(%channel, "Placement accepted: {:?}", outcome);
            self.controls = controls;
        }
        outcome
    }

    /// Anchor request finished
    pub fn on_anchor_created(
        &mut self,
        ticket: PlacementTicket,
        result: Result<AnchorId, XrError>,
        device: &mut impl XrDevice,
    ) -> bool {
        if self.session_token() != Some(ticket.session) {
            debug!(session = ticket.session.0, "Discarding anchor for an ended session");
            if let Ok(anchor) = result {
                device.delete_anchor(anchor);
            }
            return false;
        }
        self.placement.complete_anchor(ticket, result, device)
    }

    fn target_group(&mut self) -> Option<&mut ModelGroup> {
        match self.active_target()? {
            ActiveTarget::Prefab => Some(&mut self.prefab),
            ActiveTarget::Placed(_) => self.placement.placed_mut().map(|p| &mut p.group),
        }
    }

    /// Set the target's uniform scale. Non-finite or non-positive values
    /// are ignored.
    pub fn apply_scale(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        if let Some(group) = self.target_group() {
            group.transform.scale = factor;
            self.controls.scale = factor;
        }
    }

    /// Set the target's rotation about y
    pub fn apply_rotation_degrees(&mut self, degrees: f32) {
        if !degrees.is_finite() {
            return;
        }
        if let Some(group) = self.target_group() {
            group.transform.yaw = degrees.to_radians();
            self.controls.rotation_degrees = degrees;
        }
    }

    pub fn show_sub_model(&mut self, kind: SubModelKind) {
        if let Some(group) = self.target_group() {
            group.show(kind);
        }
    }

    pub fn fallback_tick(&mut self) -> FrameOutcome {
        self.frames.fallback_tick(&mut self.prefab)
    }

    pub fn xr_tick(&mut self, frame: Option<&impl XrFrame>) -> FrameOutcome {
        let hit_test_ready = self.hit_test_ready();
        let placement = &mut self.placement;
        self.frames
            .xr_tick(frame, |frame| placement.update_frame(frame, hit_test_ready))
    }
}
