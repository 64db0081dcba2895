// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The shared status alphabet for kernels and sessions, its transition
//! table, and the session-from-kernels aggregation rule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status alphabet shared by [`crate::Kernel`] and [`crate::Session`].
///
/// Ordering matters: `PartialOrd`/`Ord` follow the declaration order below,
/// which is also the "minimum of remaining statuses" order used by the
/// session aggregation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Scheduled,
    Preparing,
    Pulling,
    Prepared,
    Creating,
    Running,
    Terminating,
    Terminated,
    Cancelled,
    Error,
}

crate::simple_display! {
    Status {
        Pending => "PENDING",
        Scheduled => "SCHEDULED",
        Preparing => "PREPARING",
        Pulling => "PULLING",
        Prepared => "PREPARED",
        Creating => "CREATING",
        Running => "RUNNING",
        Terminating => "TERMINATING",
        Terminated => "TERMINATED",
        Cancelled => "CANCELLED",
        Error => "ERROR",
    }
}

impl Status {
    /// Statuses from which an agent occupies resources for a kernel.
    pub fn is_occupying(&self) -> bool {
        matches!(
            self,
            Status::Preparing
                | Status::Pulling
                | Status::Prepared
                | Status::Creating
                | Status::Running
                | Status::Terminating
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Terminated | Status::Cancelled)
    }

    /// The legal next statuses per the §4.3 transition table.
    pub fn legal_next(&self) -> &'static [Status] {
        use Status::*;
        match self {
            Pending => &[Scheduled, Cancelled],
            Scheduled => &[Preparing, Pulling, Cancelled, Error],
            Preparing => &[Pulling, Prepared, Cancelled, Error],
            Pulling => &[Prepared, Cancelled, Error],
            Prepared => &[Creating, Cancelled, Error],
            Creating => &[Running, Terminating, Error],
            Running => &[Terminating, Error],
            Terminating => &[Terminated, Error],
            Terminated => &[],
            Cancelled => &[],
            Error => &[Terminating, Terminated],
        }
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        self.legal_next().contains(&next)
    }
}

/// The fixed reason-code enumeration attached to status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionReason {
    UserRequested,
    ForceTerminated,
    IdleTimeout,
    FailedToStart,
    ImagePullFailed,
    KilledByEvent,
    TaskFinished,
    TaskFailed,
    AgentTermination,
}

crate::simple_display! {
    TransitionReason {
        UserRequested => "USER_REQUESTED",
        ForceTerminated => "FORCE_TERMINATED",
        IdleTimeout => "IDLE_TIMEOUT",
        FailedToStart => "FAILED_TO_START",
        ImagePullFailed => "IMAGE_PULL_FAILED",
        KilledByEvent => "KILLED_BY_EVENT",
        TaskFinished => "TASK_FINISHED",
        TaskFailed => "TASK_FAILED",
        AgentTermination => "AGENT_TERMINATION",
    }
}

/// `status -> epoch_ms` history, recorded once per transition.
pub type StatusHistory = BTreeMap<String, i64>;

pub fn record_transition(history: &mut StatusHistory, status: Status, now_epoch_ms: i64) {
    history.insert(status.to_string(), now_epoch_ms);
}

/// Aggregate a session's status from its kernels' statuses, per the
/// §4.3 rule:
///
/// 1. any kernel ERROR -> ERROR
/// 2. all kernels TERMINATED -> TERMINATED
/// 3. all kernels CANCELLED -> CANCELLED
/// 4. any kernel TERMINATING -> TERMINATING
/// 5. else the minimum status among the kernels
///
/// Returns `None` for a session with no kernels (aggregation has nothing
/// to compute; callers should leave the session status untouched).
pub fn aggregate_session_status<I>(kernel_statuses: I) -> Option<Status>
where
    I: IntoIterator<Item = Status>,
{
    let statuses: Vec<Status> = kernel_statuses.into_iter().collect();
    if statuses.is_empty() {
        return None;
    }
    if statuses.iter().any(|s| *s == Status::Error) {
        return Some(Status::Error);
    }
    if statuses.iter().all(|s| *s == Status::Terminated) {
        return Some(Status::Terminated);
    }
    if statuses.iter().all(|s| *s == Status::Cancelled) {
        return Some(Status::Cancelled);
    }
    if statuses.iter().any(|s| *s == Status::Terminating) {
        return Some(Status::Terminating);
    }
    statuses.into_iter().min()
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
