mod support;

use pretty_assertions::assert_eq;
use storyreel_core::{update, Effect, JobOutcome, Msg, Notice, TaskStatus};
use support::{init_logging, report, reported, running};

#[test]
fn stop_requests_backend_cancel_without_resetting() {
    init_logging();
    let state = running(&["a", "b"], "img_3");
    let (state, effects) = update(state, Msg::StopRequested);

    assert_eq!(
        effects,
        vec![Effect::RequestCancel {
            job: 1,
            task_id: "img_3".to_string()
        }]
    );

    let (state, effects) = update(state, Msg::CancelAcknowledged { job: 1 });
    assert_eq!(effects, vec![Effect::Notify(Notice::CancelRequested)]);
    assert!(state.is_generating());
    assert!(state.is_polling());
}

#[test]
fn cancelled_status_from_next_poll_finishes_the_job() {
    init_logging();
    let state = running(&["a", "b"], "img_3");
    let (state, _) = update(state, Msg::StopRequested);
    let (state, _) = update(state, Msg::CancelAcknowledged { job: 1 });
    let (state, effects) = update(state, reported(1, report("cancelled", 1, 2)));

    assert_eq!(effects[0], Effect::DisarmPolling);
    assert_eq!(effects[1], Effect::Notify(Notice::Cancelled));
    assert_eq!(state.progress().status, TaskStatus::Cancelled);

    let (_state, effects) = update(state, Msg::ResetDue { job: 1 });
    assert!(effects.contains(&Effect::JobFinished {
        job: 1,
        outcome: JobOutcome::Cancelled
    }));
}

#[test]
fn failed_cancel_resets_immediately() {
    init_logging();
    let state = running(&["a"], "img_3");
    let (state, _) = update(state, Msg::StopRequested);
    let (state, effects) = update(
        state,
        Msg::CancelFailed {
            job: 1,
            message: "http status 500".to_string(),
        },
    );

    assert_eq!(
        effects,
        vec![
            Effect::Notify(Notice::CancelFailed("http status 500".to_string())),
            Effect::DisarmPolling,
            Effect::JobFinished {
                job: 1,
                outcome: JobOutcome::Aborted {
                    reason: "cancel failed: http status 500".to_string()
                },
            },
        ]
    );
    assert!(!state.is_generating());
}

#[test]
fn teardown_disarms_and_abandons_the_job() {
    init_logging();
    let state = running(&["a"], "img_3");
    let (state, effects) = update(state, Msg::Teardown);

    assert_eq!(effects[0], Effect::DisarmPolling);
    assert!(matches!(
        effects[1],
        Effect::JobFinished {
            outcome: JobOutcome::Aborted { .. },
            ..
        }
    ));
    let (_state, effects) = update(state, Msg::Teardown);
    assert_eq!(effects, vec![Effect::DisarmPolling]);
}

#[test]
fn cancel_replies_for_an_earlier_job_are_ignored() {
    init_logging();
    let state = running(&["a"], "img_1");
    let (state, _) = update(state, Msg::StopRequested);
    let (state, _) = update(state, Msg::ResetRequested);
    let (state, _) = update(
        state,
        Msg::StartRequested {
            prompts: support::prompts(&["b"]),
        },
    );

    let (state, effects) = update(
        state,
        Msg::CancelFailed {
            job: 1,
            message: "http status 500".to_string(),
        },
    );
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::CancelAcknowledged { job: 1 });
    assert!(effects.is_empty());
    assert!(state.is_generating());
    assert_eq!(state.current_job(), 2);
}
