//! Test doubles for the device port

use bevy_math::{Mat4, Vec3};

use crate::error::XrError;
use crate::port::{
    AnchorId, FrameLoop, FrameSample, HitSample, InputChannel, PlacementTicket, SessionToken, XrDevice,
};

/// One call made on a [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    RequestReferenceSpace(String, SessionToken),
    AddListener(InputChannel),
    RemoveListener(InputChannel),
    RequestHitTestSource(SessionToken),
    CancelHitTestSource(SessionToken),
    RequestAnchor(PlacementTicket),
    DeleteAnchor(AnchorId),
    StartFrameLoop(FrameLoop),
    StopFrameLoop,
}

/// Device that records every call and never calls back
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub calls: Vec<DeviceCall>,
    /// Channels whose listener registration fails
    pub failing_channels: Vec<InputChannel>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, call: &DeviceCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn position(&self, call: &DeviceCall) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }

    pub fn anchor_requests(&self) -> Vec<PlacementTicket> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::RequestAnchor(ticket) => Some(*ticket),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_anchors(&self) -> Vec<AnchorId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DeleteAnchor(anchor) => Some(*anchor),
                _ => None,
            })
            .collect()
    }
}

impl XrDevice for RecordingDevice {
    fn request_reference_space(&mut self, kind: &str, token: SessionToken) {
        self.calls.push(DeviceCall::RequestReferenceSpace(kind.to_string(), token));
    }

    fn add_select_listener(&mut self, channel: InputChannel) -> Result<(), XrError> {
        if self.failing_channels.contains(&channel) {
            return Err(XrError::ListenerFailed {
                channel: channel.to_string(),
                reason: "unsupported".to_string(),
            });
        }
        self.calls.push(DeviceCall::AddListener(channel));
        Ok(())
    }

    fn remove_select_listener(&mut self, channel: InputChannel) {
        self.calls.push(DeviceCall::RemoveListener(channel));
    }

    fn request_hit_test_source(&mut self, token: SessionToken) {
        self.calls.push(DeviceCall::RequestHitTestSource(token));
    }

    fn cancel_hit_test_source(&mut self, token: SessionToken) {
        self.calls.push(DeviceCall::CancelHitTestSource(token));
    }

    fn request_anchor(&mut self, ticket: PlacementTicket) {
        self.calls.push(DeviceCall::RequestAnchor(ticket));
    }

    fn delete_anchor(&mut self, anchor: AnchorId) {
        self.calls.push(DeviceCall::DeleteAnchor(anchor));
    }

    fn start_frame_loop(&mut self, mode: FrameLoop) {
        self.calls.push(DeviceCall::StartFrameLoop(mode));
    }

    fn stop_frame_loop(&mut self) {
        self.calls.push(DeviceCall::StopFrameLoop);
    }
}

/// Surface hit at `at`
pub fn hit_at(at: Vec3, anchorable: bool) -> HitSample {
    HitSample {
        pose: Mat4::from_translation(at),
        anchorable,
    }
}

/// Frame whose hit test returns `hit`
pub fn frame_with_hit(hit: Option<HitSample>) -> FrameSample {
    FrameSample {
        hit,
        viewer: Some(Mat4::IDENTITY),
        ..Default::default()
    }
}
