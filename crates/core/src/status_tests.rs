// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Backend.AI Contributors

use super::*;

#[test]
fn pending_can_only_move_to_scheduled_or_cancelled() {
    assert!(Status::Pending.can_transition_to(Status::Scheduled));
    assert!(Status::Pending.can_transition_to(Status::Cancelled));
    assert!(!Status::Pending.can_transition_to(Status::Running));
}

#[test]
fn error_allows_force_terminate_path() {
    assert!(Status::Error.can_transition_to(Status::Terminating));
    assert!(Status::Error.can_transition_to(Status::Terminated));
    assert!(!Status::Error.can_transition_to(Status::Running));
}

#[test]
fn terminated_and_cancelled_are_terminal() {
    assert!(Status::Terminated.legal_next().is_empty());
    assert!(Status::Cancelled.legal_next().is_empty());
    assert!(Status::Terminated.is_terminal());
    assert!(Status::Cancelled.is_terminal());
}

#[test]
fn aggregate_any_error_wins() {
    let statuses = [Status::Running, Status::Error, Status::Pulling];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Error));
}

#[test]
fn aggregate_all_terminated() {
    let statuses = [Status::Terminated, Status::Terminated];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Terminated));
}

#[test]
fn aggregate_all_cancelled() {
    let statuses = [Status::Cancelled, Status::Cancelled];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Cancelled));
}

#[test]
fn aggregate_any_terminating_wins_over_running() {
    let statuses = [Status::Running, Status::Terminating, Status::Running];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Terminating));
}

#[test]
fn aggregate_falls_back_to_minimum_status() {
    let statuses = [Status::Running, Status::Pulling, Status::Creating];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Pulling));
}

#[test]
fn aggregate_mixed_terminated_and_cancelled_is_not_all_of_either() {
    // Not all TERMINATED, not all CANCELLED, none ERROR/TERMINATING:
    // falls through to minimum-status, where Terminated < Cancelled.
    let statuses = [Status::Terminated, Status::Cancelled];
    assert_eq!(aggregate_session_status(statuses), Some(Status::Terminated));
}

#[test]
fn aggregate_empty_is_none() {
    assert_eq!(aggregate_session_status(std::iter::empty()), None);
}
