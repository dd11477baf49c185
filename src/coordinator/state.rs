//! Task lifecycle state machine and payment state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoordinatorError, Result};

// =============================================================================
// TaskStatus state machine
// =============================================================================

/// Lifecycle status of a task.
///
/// ```text
/// pending → assigned → in_progress → review → complete → paid
///                            ↑          │
///                            └──────────┘   (any non-terminal → failed → pending)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Review,
    Complete,
    Paid,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        Self::Pending,
        Self::Assigned,
        Self::InProgress,
        Self::Review,
        Self::Complete,
        Self::Paid,
        Self::Failed,
    ];

    /// Statuses reachable from `self` in one step.
    pub fn valid_transitions(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Pending => &[Assigned, Failed],
            Assigned => &[InProgress, Failed],
            InProgress => &[Review, Failed],
            Review => &[Complete, InProgress, Failed],
            Complete => &[Paid, Failed],
            Paid => &[],
            Failed => &[Pending],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Only `paid` is terminal; `failed` can be retried.
    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    from.can_transition_to(to)
}

/// Validate a transition, returning `InvalidStateTransition` when not allowed.
pub fn transition(from: TaskStatus, to: TaskStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

pub fn is_terminal(status: TaskStatus) -> bool {
    status.is_terminal()
}

// =============================================================================
// PaymentState
// =============================================================================

/// Settlement state for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// A payment attempt has claimed the task and is in flight.
    Pending,
    /// The transfer succeeded. Terminal.
    Processed,
    /// The last attempt failed; the task may be paid again.
    Failed,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
