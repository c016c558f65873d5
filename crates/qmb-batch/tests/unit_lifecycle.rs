use qmb_batch::{SubmissionId, UnitState};
use qmb_core::{BatchError, ErrorInfo};

#[test]
fn accepted_path_walks_every_state() {
    let mut state = UnitState::Created;
    assert!(!state.is_terminal());
    state.advance(UnitState::Scripted).expect("scripted");
    state.advance(UnitState::Dispatched).expect("dispatched");
    assert!(!state.is_terminal());
    state
        .advance(UnitState::Accepted {
            submission_id: SubmissionId::new("77"),
        })
        .expect("accepted");
    assert!(state.is_terminal());
}

#[test]
fn terminal_states_refuse_further_transitions() {
    let mut state = UnitState::Created;
    state
        .advance(UnitState::Skipped {
            error: BatchError::Dependency(ErrorInfo::new("missing_upstream", "no upstream")),
        })
        .expect("skipped");
    assert!(state.is_terminal());
    let err = state.advance(UnitState::Scripted).expect_err("terminal");
    assert_eq!(err.info().code, "unit_transition");
}

#[test]
fn dispatch_cannot_be_skipped_over() {
    let mut state = UnitState::Created;
    let err = state
        .advance(UnitState::Accepted {
            submission_id: SubmissionId::new("1"),
        })
        .expect_err("created cannot be accepted");
    assert!(matches!(err, BatchError::Dispatch(_)));
    assert_eq!(state, UnitState::Created);
}
