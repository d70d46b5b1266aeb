use crate::{Effect, Msg, Notice, TrackerState, POLL_INTERVAL, TERMINAL_RESET_DELAY};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    let effects = match msg {
        Msg::StartRequested { prompts } => {
            if prompts.is_empty() {
                return (state, vec![Effect::Notify(Notice::NoPrompts)]);
            }
            if state.is_generating() {
                return (state, vec![Effect::Notify(Notice::AlreadyGenerating)]);
            }
            let job = state.begin_job(prompts);
            vec![Effect::Submit { job }]
        }
        Msg::SubmitSucceeded { job, receipt } => {
            if !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            state.record_submission(receipt);
            vec![
                Effect::DisarmPolling,
                Effect::ArmPolling {
                    interval: POLL_INTERVAL,
                },
            ]
        }
        Msg::SubmitFailed { job, message } => {
            if !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            let mut effects = vec![Effect::Notify(Notice::SubmitFailed(message.clone()))];
            effects.extend(state.full_reset(&format!("submission failed: {message}")));
            effects
        }
        Msg::PollTick => {
            if !state.is_polling() {
                return (state, Vec::new());
            }
            if state.progress().task_id.is_empty() {
                state.full_reset("polling without a task id")
            } else {
                vec![Effect::QueryProgress {
                    job: state.current_job(),
                    task_id: state.progress().task_id.clone(),
                }]
            }
        }
        Msg::ProgressReported { job, report } => {
            if !state.is_polling() || !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            match state.apply_report(report) {
                Some(notice) => vec![
                    // Timer goes first so no tick races the terminal handling.
                    Effect::DisarmPolling,
                    Effect::Notify(notice),
                    Effect::ScheduleReset {
                        job: state.current_job(),
                        delay: TERMINAL_RESET_DELAY,
                    },
                ],
                None => Vec::new(),
            }
        }
        Msg::PollFailed { job, message } => {
            if !state.is_polling() || !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            let mut effects = vec![Effect::Notify(Notice::PollFailed(message.clone()))];
            effects.extend(state.full_reset(&format!("progress query failed: {message}")));
            effects
        }
        Msg::StopRequested => {
            if state.progress().task_id.is_empty() {
                Vec::new()
            } else {
                vec![Effect::RequestCancel {
                    job: state.current_job(),
                    task_id: state.progress().task_id.clone(),
                }]
            }
        }
        // The next poll observes `cancelled` and resets.
        Msg::CancelAcknowledged { job } => {
            if !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            vec![Effect::Notify(Notice::CancelRequested)]
        }
        Msg::CancelFailed { job, message } => {
            if !is_active_job(&state, job) {
                return (state, Vec::new());
            }
            let mut effects = vec![Effect::Notify(Notice::CancelFailed(message.clone()))];
            effects.extend(state.full_reset(&format!("cancel failed: {message}")));
            effects
        }
        Msg::ResetRequested => state.full_reset("reset requested"),
        Msg::ResetDue { job } => {
            if is_active_job(&state, job) {
                state.full_reset("reset")
            } else {
                Vec::new()
            }
        }
        Msg::Teardown => state.full_reset("tracker torn down"),
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn is_active_job(state: &TrackerState, job: crate::JobSeq) -> bool {
    state.is_generating() && state.current_job() == job
}
