//! Reset bookkeeping: the Idle -> PendingUndo -> Idle state machine.
//!
//! A reset is only performed once a full serialized snapshot of the prior
//! state has been captured; the snapshot is the sole rollback target and is
//! discarded when the undo window closes. Snapshot ids are monotonically
//! increasing so a late expiry task can never clear a newer pending undo.

use chrono::{DateTime, Utc};

/// Why a reset or undo was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum ResetError {
    /// `reset` while an undo window is still open.
    UndoPending,
    /// `undo` with no reset to roll back.
    NothingToUndo,
    /// `undo` after the window closed.
    UndoExpired,
    /// Snapshot capture or restore failed; the pre-existing state stands.
    Snapshot(String),
}

impl std::fmt::Display for ResetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndoPending => write!(f, "a reset is already awaiting undo"),
            Self::NothingToUndo => write!(f, "no reset to undo"),
            Self::UndoExpired => write!(f, "undo window has expired"),
            Self::Snapshot(e) => write!(f, "snapshot failure: {}", e),
        }
    }
}

impl std::error::Error for ResetError {}

enum Phase {
    Idle,
    PendingUndo {
        snapshot_id: u64,
        snapshot: String,
        deadline: DateTime<Utc>,
    },
}

pub(crate) struct ResetController {
    phase: Phase,
    next_snapshot_id: u64,
}

impl ResetController {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Idle,
            next_snapshot_id: 1,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::PendingUndo { .. })
    }

    /// Arm the undo window with a captured snapshot. Returns the snapshot id
    /// the expiry task must present to clear it.
    pub(crate) fn arm(&mut self, snapshot: String, deadline: DateTime<Utc>) -> u64 {
        let snapshot_id = self.next_snapshot_id;
        self.next_snapshot_id += 1;
        self.phase = Phase::PendingUndo {
            snapshot_id,
            snapshot,
            deadline,
        };
        snapshot_id
    }

    /// Take the pending snapshot, transitioning to Idle.
    pub(crate) fn take_pending(&mut self) -> Option<(String, DateTime<Utc>)> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => None,
            Phase::PendingUndo {
                snapshot, deadline, ..
            } => Some((snapshot, deadline)),
        }
    }

    /// Discard the snapshot with the given id, if it is still the armed one.
    /// Returns whether anything was cleared.
    pub(crate) fn expire(&mut self, id: u64) -> bool {
        match &self.phase {
            Phase::PendingUndo { snapshot_id, .. } if *snapshot_id == id => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }
}
