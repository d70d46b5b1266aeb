#![allow(dead_code)]

use std::sync::Once;

use storyreel_core::{
    update, Effect, GenerationPrompt, JobSeq, Msg, ProgressReport, SubmitReceipt, TaskStatus, TrackerState,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(reel_logging::initialize_for_tests);
}

pub fn prompts(ids: &[&str]) -> Vec<GenerationPrompt> {
    ids.iter()
        .map(|id| GenerationPrompt::new(*id, format!("scene {id}")))
        .collect()
}

pub fn report(status: &str, current: u32, total: u32) -> ProgressReport {
    ProgressReport {
        status: TaskStatus::parse(status),
        current: Some(current),
        total: Some(total),
        errors: Vec::new(),
    }
}

/// Progress reply for the query issued by `job`.
pub fn reported(job: JobSeq, report: ProgressReport) -> Msg {
    Msg::ProgressReported { job, report }
}

/// Starts a batch and feeds a successful submission back in.
pub fn running(ids: &[&str], task_id: &str) -> TrackerState {
    let (state, effects) = update(
        TrackerState::new(),
        Msg::StartRequested {
            prompts: prompts(ids),
        },
    );
    let job = match effects.as_slice() {
        [Effect::Submit { job }] => *job,
        other => panic!("expected a single submit effect, got {other:?}"),
    };
    let (state, _) = update(
        state,
        Msg::SubmitSucceeded {
            job,
            receipt: SubmitReceipt {
                task_id: task_id.to_string(),
                total: ids.len() as u32,
            },
        },
    );
    state
}
