//! Active-target resolution for the UI controls

use crate::placement::InstanceId;

/// Lifecycle phase derived from the session and placement slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No AR session
    #[default]
    Idle,
    /// AR running, reticle tracking, nothing placed
    Unplaced,
    /// AR running with a placed instance (or one waiting for its anchor)
    Placed,
}

/// The group a control action mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTarget {
    Prefab,
    Placed(InstanceId),
}

/// Pick the group controls should act on.
///
/// `placed` is the id of the placed instance if one exists and is visible.
/// Precedence: prefab outside AR, then the placed instance inside AR, then
/// any visible prefab, else nothing.
pub fn resolve(session_active: bool, prefab_visible: bool, placed: Option<InstanceId>) -> Option<ActiveTarget> {
    if !session_active && prefab_visible {
        return Some(ActiveTarget::Prefab);
    }
    if session_active {
        if let Some(id) = placed {
            return Some(ActiveTarget::Placed(id));
        }
    }
    if prefab_visible {
        return Some(ActiveTarget::Prefab);
    }
    None
}
