// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

//! The session/kernel FSM (§4.3): validated status transitions, history
//! recording, and the session-from-kernels aggregation rule.

use bai_core::{
    aggregate_session_status, record_transition, Event, KernelId, RegistryError, SessionId,
    Status, StatusHistory, TransitionReason,
};
use bai_storage::{KernelRepo, SessionRepo};
use sqlx::{Postgres, Transaction};

use crate::error::from_storage;

/// Transitions one kernel's status within an open transaction, recording
/// history; rejects illegal transitions per [`Status::can_transition_to`]
/// rather than silently clamping.
pub async fn transition_kernel<'c>(
    tx: &mut Transaction<'c, Postgres>,
    kernel_id: &KernelId,
    from: Status,
    to: Status,
    history: &mut StatusHistory,
    epoch_ms: i64,
) -> Result<(), RegistryError> {
    if !from.can_transition_to(to) {
        return Err(RegistryError::invalid_argument(format!(
            "illegal kernel transition {from} -> {to}"
        )));
    }
    record_transition(history, to, epoch_ms);
    KernelRepo::update_status(tx, kernel_id, to, history).await.map_err(from_storage)
}

/// Recomputes a session's status from its kernels and persists the change
/// if the aggregate differs from the session's current status (§4.3
/// "Session-from-kernels aggregation rule"). Returns the event to publish,
/// if the status changed. `creation_id` is the session's own (stamped at
/// `create_session` time, re-emitted unchanged on every later transition)
/// so `SessionStarted`/`SessionCancelled` consumers keying off it never see
/// an empty string.
pub async fn recompute_session_status<'c>(
    tx: &mut Transaction<'c, Postgres>,
    session_id: SessionId,
    current_status: Status,
    creation_id: &str,
    history: &mut StatusHistory,
    epoch_ms: i64,
) -> Result<Option<Event>, RegistryError> {
    let kernels = KernelRepo::list_for_update_by_session(tx, &session_id).await.map_err(from_storage)?;
    let Some(aggregated) = aggregate_session_status(kernels.iter().map(|k| k.status)) else {
        return Ok(None);
    };
    if aggregated == current_status {
        return Ok(None);
    }
    record_transition(history, aggregated, epoch_ms);
    SessionRepo::update_status(tx, &session_id, aggregated, history).await.map_err(from_storage)?;

    let event = match aggregated {
        Status::Running => {
            Some(Event::SessionStarted { session_id, creation_id: creation_id.to_string() })
        }
        Status::Cancelled => Some(Event::SessionCancelled {
            session_id,
            creation_id: creation_id.to_string(),
            reason: TransitionReason::UserRequested.to_string(),
        }),
        Status::Terminating => Some(Event::SessionTerminating {
            session_id,
            reason: TransitionReason::KilledByEvent.to_string(),
        }),
        Status::Terminated => Some(Event::SessionTerminated {
            session_id,
            reason: TransitionReason::TaskFinished.to_string(),
        }),
        Status::Error => Some(Event::SessionTerminating {
            session_id,
            reason: TransitionReason::TaskFailed.to_string(),
        }),
        _ => None,
    };
    Ok(event)
}
