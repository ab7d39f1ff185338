//! Placement state machine: reticle tracking, debounced spawn requests and
//! anchor binding of the single placed instance

use bevy_math::Mat4;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::XrError;
use crate::model::{GroupTransform, ModelGroup};
use crate::port::{AnchorId, HitSample, PlacementTicket, SessionToken, XrDevice, XrFrame};

/// Rejects requests that arrive within `interval` of the last accepted one
#[derive(Debug, Clone)]
pub struct Debounce {
    interval: Duration,
    last_accepted: Option<Duration>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: None,
        }
    }

    /// Returns true and records `now` if the window has elapsed
    pub fn try_accept(&mut self, now: Duration) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_sub(last) < self.interval {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

/// Placement indicator driven by the hit-test port
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reticle {
    pub visible: bool,
    pub pose: Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// How a placed instance keeps its pose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorBinding {
    /// Pose is re-read from the anchor every frame
    Anchored(AnchorId),
    /// Pose captured once from the reticle
    Static,
}

/// A copy of the prefab living in the session container
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedInstance {
    pub id: InstanceId,
    pub group: ModelGroup,
    pub binding: AnchorBinding,
    /// Placement pose in the session reference space
    pub pose: Mat4,
}

impl PlacedInstance {
    pub fn anchor(&self) -> Option<AnchorId> {
        match self.binding {
            AnchorBinding::Anchored(anchor) => Some(anchor),
            AnchorBinding::Static => None,
        }
    }

    /// Placement pose composed with the group's own scale/rotation
    pub fn world_matrix(&self) -> Mat4 {
        self.pose * self.group.transform.to_matrix()
    }
}

/// Session-scoped parent of everything spawned during one AR session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContainer {
    instances: Vec<PlacedInstance>,
}

impl SessionContainer {
    pub fn instances(&self) -> &[PlacedInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn attach(&mut self, instance: PlacedInstance) {
        self.instances.push(instance);
    }

    fn detach(&mut self, id: InstanceId) -> Option<PlacedInstance> {
        let index = self.instances.iter().position(|i| i.id == id)?;
        Some(self.instances.remove(index))
    }

    fn get_mut(&mut self, id: InstanceId) -> Option<&mut PlacedInstance> {
        self.instances.iter_mut().find(|i| i.id == id)
    }
}

/// An accepted request whose anchor has not resolved yet
#[derive(Debug, Clone, PartialEq)]
struct Reservation {
    ticket: PlacementTicket,
    instance: PlacedInstance,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Slot {
    #[default]
    Empty,
    Reserved(Box<Reservation>),
    Occupied(InstanceId),
}

/// Result of a placement request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Guard failed; silently ignored
    Rejected,
    /// Anchor requested, the instance attaches when it resolves
    AwaitingAnchor(PlacementTicket),
    /// Placed immediately with a static pose
    Placed(InstanceId),
}

#[derive(Debug, Clone)]
pub struct Placement {
    debounce: Debounce,
    hide_reticle_when_placed: bool,
    reticle: Option<Reticle>,
    last_hit: Option<HitSample>,
    container: Option<SessionContainer>,
    slot: Slot,
    next_ticket: u64,
    next_instance: u64,
}

impl Placement {
    pub fn new(debounce: Duration, hide_reticle_when_placed: bool) -> Self {
        Self {
            debounce: Debounce::new(debounce),
            hide_reticle_when_placed,
            reticle: None,
            last_hit: None,
            container: None,
            slot: Slot::Empty,
            next_ticket: 0,
            next_instance: 0,
        }
    }

    pub fn reticle(&self) -> Option<&Reticle> {
        self.reticle.as_ref()
    }

    pub fn reticle_visible(&self) -> bool {
        self.reticle.is_some_and(|r| r.visible)
    }

    pub fn last_hit(&self) -> Option<&HitSample> {
        self.last_hit.as_ref()
    }

    pub fn container(&self) -> Option<&SessionContainer> {
        self.container.as_ref()
    }

    /// True while a request is waiting for its anchor or an instance is placed
    pub fn is_occupied(&self) -> bool {
        !matches!(self.slot, Slot::Empty)
    }

    pub fn pending_ticket(&self) -> Option<PlacementTicket> {
        match &self.slot {
            Slot::Reserved(reservation) => Some(reservation.ticket),
            _ => None,
        }
    }

    pub fn placed(&self) -> Option<&PlacedInstance> {
        let Slot::Occupied(id) = self.slot else {
            return None;
        };
        self.container.as_ref()?.instances.iter().find(|i| i.id == id)
    }

    pub fn placed_mut(&mut self) -> Option<&mut PlacedInstance> {
        let Slot::Occupied(id) = self.slot else {
            return None;
        };
        self.container.as_mut()?.get_mut(id)
    }

    /// Clear per-session fields at session start
    pub fn reset(&mut self) {
        self.slot = Slot::Empty;
        self.last_hit = None;
        self.debounce.reset();
    }

    pub fn create_container(&mut self) {
        self.container.get_or_insert_with(SessionContainer::default);
    }

    pub fn create_reticle(&mut self) {
        self.reticle.get_or_insert_with(Reticle::default);
    }

    /// Accept or reject a spawn request.
    ///
    /// The synchronous part (guards, eviction, cloning, slot reservation)
    /// completes before the anchor is requested.
    pub fn request(
        &mut self,
        now: Duration,
        prefab: &ModelGroup,
        initial: GroupTransform,
        session: SessionToken,
        device: &mut impl XrDevice,
    ) -> RequestOutcome {
        let Some(reticle) = self.reticle.filter(|r| r.visible) else {
            return RequestOutcome::Rejected;
        };
        if !self.debounce.try_accept(now) {
            return RequestOutcome::Rejected;
        }

        self.evict(device);

        let mut group = prefab.instantiate();
        group.transform = initial;

        let instance = PlacedInstance {
            id: InstanceId(self.next_instance),
            group,
            binding: AnchorBinding::Static,
            pose: reticle.pose,
        };
        self.next_instance += 1;

        let ticket = PlacementTicket {
            session,
            id: self.next_ticket,
        };
        self.next_ticket += 1;

        let anchorable = self.last_hit.is_some_and(|hit| hit.anchorable);
        self.slot = Slot::Reserved(Box::new(Reservation { ticket, instance }));

        if anchorable {
            device.request_anchor(ticket);
            RequestOutcome::AwaitingAnchor(ticket)
        } else {
            self.complete_anchor(ticket, Err(XrError::AnchorUnsupported), device);
            match self.slot {
                Slot::Occupied(id) => RequestOutcome::Placed(id),
                _ => RequestOutcome::Rejected,
            }
        }
    }

    /// Finish a reserved placement with the anchor result.
    ///
    /// Returns false when the ticket was superseded; a successful anchor for
    /// a superseded ticket is deleted right away.
    pub fn complete_anchor(
        &mut self,
        ticket: PlacementTicket,
        result: Result<AnchorId, XrError>,
        device: &mut impl XrDevice,
    ) -> bool {
        let current = matches!(&self.slot, Slot::Reserved(r) if r.ticket == ticket);
        if !current {
            debug!(ticket = ticket.id, "Discarding superseded anchor result");
            if let Ok(anchor) = result {
                device.delete_anchor(anchor);
            }
            return false;
        }
        let Slot::Reserved(reservation) = std::mem::take(&mut self.slot) else {
            return false;
        };
        let mut instance = reservation.instance;

        match result {
            Ok(anchor) => {
                debug!(ticket = ticket.id, anchor = anchor.0, "Placed anchored instance");
                instance.binding = AnchorBinding::Anchored(anchor);
            }
            Err(XrError::AnchorUnsupported) => {
                debug!(ticket = ticket.id, "Anchors unsupported, placing with static pose");
            }
            Err(e) => {
                warn!("Anchor creation failed, placing with static pose: {}", e);
            }
        }

        let id = instance.id;
        self.container
            .get_or_insert_with(SessionContainer::default)
            .attach(instance);
        self.slot = Slot::Occupied(id);
        true
    }

    /// Per-frame reticle and anchor update
    pub fn update_frame(&mut self, frame: &impl XrFrame, hit_test_ready: bool) {
        let hit = if hit_test_ready { frame.hit_test() } else { None };
        let hide_for_placement = self.hide_reticle_when_placed && self.is_occupied();

        match (self.reticle.as_mut(), hit) {
            (Some(reticle), Some(hit)) if !hide_for_placement => {
                reticle.visible = true;
                reticle.pose = hit.pose;
                self.last_hit = Some(hit);
            }
            (reticle, _) => {
                if let Some(reticle) = reticle {
                    reticle.visible = false;
                }
                self.last_hit = None;
            }
        }

        if let Some(container) = self.container.as_mut() {
            for instance in &mut container.instances {
                if let AnchorBinding::Anchored(anchor) = instance.binding {
                    // Snap, anchors are authoritative
                    if let Some(pose) = frame.anchor_pose(anchor) {
                        instance.pose = pose;
                    }
                }
            }
        }
    }

    /// Detach and release whatever occupies the slot
    pub fn evict(&mut self, device: &mut impl XrDevice) {
        match std::mem::take(&mut self.slot) {
            Slot::Empty => {}
            Slot::Reserved(reservation) => {
                debug!(ticket = reservation.ticket.id, "Dropping placement still waiting for its anchor");
            }
            Slot::Occupied(id) => {
                let detached = self.container.as_mut().and_then(|c| c.detach(id));
                if let Some(instance) = detached {
                    if let Some(anchor) = instance.anchor() {
                        device.delete_anchor(anchor);
                    }
                    debug!(instance = id.0, "Evicted placed instance");
                }
            }
        }
    }

    /// Release every session-scoped resource. Safe on already-cleared state.
    pub fn teardown(&mut self, device: &mut impl XrDevice) {
        self.evict(device);
        if let Some(container) = self.container.take() {
            for instance in container.instances {
                if let Some(anchor) = instance.anchor() {
                    device.delete_anchor(anchor);
                }
            }
        }
        self.reticle = None;
        self.last_hit = None;
        self.debounce.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelRegistry, SubModelKind};
    use crate::testing::{frame_with_hit, hit_at, DeviceCall, RecordingDevice};
    use bevy_math::Vec3;

    const DEBOUNCE: Duration = Duration::from_millis(160);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn prefab() -> ModelGroup {
        ModelRegistry::default().prefab(Vec3::new(0.0, 1.5, -3.0))
    }

    /// Placement with container, reticle and one tracked frame
    fn tracking(hit: HitSample) -> Placement {
        let mut placement = Placement::new(DEBOUNCE, false);
        placement.create_container();
        placement.create_reticle();
        placement.update_frame(&frame_with_hit(Some(hit)), true);
        placement
    }

    fn request(placement: &mut Placement, now: Duration, device: &mut RecordingDevice) -> RequestOutcome {
        placement.request(now, &prefab(), GroupTransform::IDENTITY, SessionToken(1), device)
    }

    #[test]
    fn test_debounce_window() {
        let mut debounce = Debounce::new(DEBOUNCE);
        assert!(debounce.try_accept(ms(1000)));
        assert!(!debounce.try_accept(ms(1000)));
        assert!(!debounce.try_accept(ms(1159)));
        assert!(debounce.try_accept(ms(1160)));
        debounce.reset();
        assert!(debounce.try_accept(ms(0)));
    }

    #[test]
    fn test_rejects_without_visible_reticle() {
        let mut device = RecordingDevice::new();
        let mut placement = Placement::new(DEBOUNCE, false);
        placement.create_container();
        assert_eq!(request(&mut placement, ms(0), &mut device), RequestOutcome::Rejected);

        placement.create_reticle();
        placement.update_frame(&frame_with_hit(None), true);
        assert_eq!(request(&mut placement, ms(0), &mut device), RequestOutcome::Rejected);
        assert!(!placement.is_occupied());
        assert!(device.calls.is_empty());
    }

    #[test]
    fn test_rejected_request_does_not_consume_debounce() {
        let mut device = RecordingDevice::new();
        let mut placement = Placement::new(DEBOUNCE, false);
        placement.create_container();
        placement.create_reticle();

        // Reticle hidden: rejected without touching the debounce clock
        assert_eq!(request(&mut placement, ms(1000), &mut device), RequestOutcome::Rejected);

        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::ZERO, false))), true);
        assert!(matches!(request(&mut placement, ms(1010), &mut device), RequestOutcome::Placed(_)));
    }

    #[test]
    fn test_burst_creates_one_instance() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, false));

        let outcomes: Vec<_> = [1000, 1001, 1050, 1100, 1159]
            .into_iter()
            .map(|t| request(&mut placement, ms(t), &mut device))
            .collect();

        assert!(matches!(outcomes[0], RequestOutcome::Placed(_)));
        assert!(outcomes[1..].iter().all(|o| *o == RequestOutcome::Rejected));
        assert_eq!(placement.container().unwrap().len(), 1);

        // First request after the window is accepted and replaces the instance
        assert!(matches!(request(&mut placement, ms(1160), &mut device), RequestOutcome::Placed(_)));
        assert_eq!(placement.container().unwrap().len(), 1);
        assert_eq!(placement.placed().unwrap().id, InstanceId(1));
    }

    #[test]
    fn test_static_placement_uses_reticle_pose() {
        let mut device = RecordingDevice::new();
        let at = Vec3::new(0.3, -1.2, -0.8);
        let mut placement = tracking(hit_at(at, false));

        let outcome = request(&mut placement, ms(0), &mut device);

        let RequestOutcome::Placed(id) = outcome else {
            panic!("expected static placement, got {:?}", outcome);
        };
        let placed = placement.placed().unwrap();
        assert_eq!(placed.id, id);
        assert_eq!(placed.binding, AnchorBinding::Static);
        assert_eq!(placed.pose, Mat4::from_translation(at));
        assert_eq!(placed.group.visible_sub_model(), Some(SubModelKind::Primary));
        assert_eq!(placed.group.transform, GroupTransform::IDENTITY);
        assert!(device.anchor_requests().is_empty());
    }

    #[test]
    fn test_anchor_success_binds_instance() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::X, true));

        let RequestOutcome::AwaitingAnchor(ticket) = request(&mut placement, ms(0), &mut device) else {
            panic!("expected anchor request");
        };
        assert_eq!(device.anchor_requests(), vec![ticket]);
        // Slot is reserved but nothing is attached yet
        assert!(placement.is_occupied());
        assert!(placement.placed().is_none());
        assert!(placement.container().unwrap().is_empty());

        assert!(placement.complete_anchor(ticket, Ok(AnchorId(7)), &mut device));

        let placed = placement.placed().unwrap();
        assert_eq!(placed.binding, AnchorBinding::Anchored(AnchorId(7)));
    }

    #[test]
    fn test_anchor_failure_falls_back_to_reticle_pose() {
        let mut device = RecordingDevice::new();
        let at = Vec3::new(1.0, 0.0, -2.0);
        let mut placement = tracking(hit_at(at, true));

        let RequestOutcome::AwaitingAnchor(ticket) = request(&mut placement, ms(0), &mut device) else {
            panic!("expected anchor request");
        };
        // The reticle moves before the anchor fails
        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::ZERO, true))), true);

        let failure = Err(XrError::AnchorFailed("tracking lost".to_string()));
        assert!(placement.complete_anchor(ticket, failure, &mut device));

        let placed = placement.placed().unwrap();
        assert_eq!(placed.binding, AnchorBinding::Static);
        assert_eq!(placed.pose, Mat4::from_translation(at));
    }

    #[test]
    fn test_superseded_anchor_is_deleted() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, true));

        let RequestOutcome::AwaitingAnchor(first) = request(&mut placement, ms(0), &mut device) else {
            panic!("expected anchor request");
        };
        let RequestOutcome::AwaitingAnchor(second) = request(&mut placement, ms(200), &mut device) else {
            panic!("expected anchor request");
        };

        assert!(!placement.complete_anchor(first, Ok(AnchorId(1)), &mut device));
        assert_eq!(device.deleted_anchors(), vec![AnchorId(1)]);

        assert!(placement.complete_anchor(second, Ok(AnchorId(2)), &mut device));
        assert_eq!(placement.container().unwrap().len(), 1);
        assert_eq!(placement.placed().unwrap().anchor(), Some(AnchorId(2)));
    }

    #[test]
    fn test_replacement_detaches_and_deletes_previous_anchor() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, true));

        for (i, now) in [0u64, 200, 400, 600].into_iter().enumerate() {
            let RequestOutcome::AwaitingAnchor(ticket) = request(&mut placement, ms(now), &mut device) else {
                panic!("expected anchor request");
            };
            assert!(placement.complete_anchor(ticket, Ok(AnchorId(i as u64)), &mut device));
            assert_eq!(placement.container().unwrap().len(), 1);
        }

        assert_eq!(device.deleted_anchors(), vec![AnchorId(0), AnchorId(1), AnchorId(2)]);
        assert_eq!(placement.placed().unwrap().anchor(), Some(AnchorId(3)));
    }

    #[test]
    fn test_anchor_pose_snaps_every_frame() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, true));
        let RequestOutcome::AwaitingAnchor(ticket) = request(&mut placement, ms(0), &mut device) else {
            panic!("expected anchor request");
        };
        placement.complete_anchor(ticket, Ok(AnchorId(3)), &mut device);

        let drifted = Mat4::from_translation(Vec3::new(0.0, 0.01, 0.0));
        let mut frame = frame_with_hit(None);
        frame.anchor_poses.insert(AnchorId(3), drifted);
        placement.update_frame(&frame, true);
        assert_eq!(placement.placed().unwrap().pose, drifted);

        // No pose this frame: keep the last one
        placement.update_frame(&frame_with_hit(None), true);
        assert_eq!(placement.placed().unwrap().pose, drifted);
    }

    #[test]
    fn test_reticle_stays_visible_after_placement_by_default() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, false));
        request(&mut placement, ms(0), &mut device);

        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::Y, false))), true);
        assert!(placement.reticle_visible());
        assert!(placement.last_hit().is_some());
    }

    #[test]
    fn test_reticle_hidden_after_placement_when_configured() {
        let mut device = RecordingDevice::new();
        let mut placement = Placement::new(DEBOUNCE, true);
        placement.create_container();
        placement.create_reticle();
        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::ZERO, false))), true);
        request(&mut placement, ms(0), &mut device);

        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::Y, false))), true);
        assert!(!placement.reticle_visible());
        assert!(placement.last_hit().is_none());
    }

    #[test]
    fn test_no_hit_test_source_hides_reticle() {
        let mut placement = tracking(hit_at(Vec3::ZERO, false));
        assert!(placement.reticle_visible());

        placement.update_frame(&frame_with_hit(Some(hit_at(Vec3::ZERO, false))), false);
        assert!(!placement.reticle_visible());
        assert!(placement.last_hit().is_none());
    }

    #[test]
    fn test_teardown_releases_everything_once() {
        let mut device = RecordingDevice::new();
        let mut placement = tracking(hit_at(Vec3::ZERO, true));
        let RequestOutcome::AwaitingAnchor(ticket) = request(&mut placement, ms(0), &mut device) else {
            panic!("expected anchor request");
        };
        placement.complete_anchor(ticket, Ok(AnchorId(9)), &mut device);

        placement.teardown(&mut device);
        placement.teardown(&mut device);

        assert_eq!(device.count(&DeviceCall::DeleteAnchor(AnchorId(9))), 1);
        assert!(placement.container().is_none());
        assert!(placement.reticle().is_none());
        assert!(!placement.is_occupied());
    }
}
