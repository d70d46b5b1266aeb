use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use reel_logging::{reel_debug, reel_info, reel_trace, reel_warn};
use storyreel_core::{
    update, Effect, GenerationPrompt, JobOutcome, JobSeq, Msg, SubmitReceipt, TrackerState,
    TrackerView,
};
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{ApiError, MediaApi, NoticeSink};

/// Runs one generation job at a time against the backend and tracks it.
///
/// Independent trackers (for example one for images and one for audio)
/// share nothing. Dropping a tracker stops its polling.
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
}

/// Resolves once with the outcome of a started job, after the tracker has
/// returned to idle.
#[derive(Debug)]
pub struct JobCompletion {
    job: JobSeq,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobCompletion {
    pub fn job(&self) -> JobSeq {
        self.job
    }

    pub async fn wait(self) -> JobOutcome {
        self.rx.await.unwrap_or_else(|_| JobOutcome::Aborted {
            reason: "tracker dropped".to_string(),
        })
    }
}

struct TrackerInner {
    label: String,
    api: Arc<dyn MediaApi>,
    notices: Arc<dyn NoticeSink>,
    state: Mutex<TrackerState>,
    poll_guard: Mutex<Option<CancellationToken>>,
    waiters: Mutex<HashMap<JobSeq, oneshot::Sender<JobOutcome>>>,
    view_tx: watch::Sender<TrackerView>,
}

impl TaskTracker {
    pub fn new(
        label: impl Into<String>,
        api: Arc<dyn MediaApi>,
        notices: Arc<dyn NoticeSink>,
    ) -> Self {
        let state = TrackerState::new();
        let (view_tx, _view_rx) = watch::channel(state.view());
        Self {
            inner: Arc::new(TrackerInner {
                label: label.into(),
                api,
                notices,
                state: Mutex::new(state),
                poll_guard: Mutex::new(None),
                waiters: Mutex::new(HashMap::new()),
                view_tx,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Submits `prompts` through `submit` and begins polling.
    ///
    /// Returns `None` without calling `submit` when the batch is empty or a
    /// job is already running; a warning notice is emitted instead.
    pub async fn start<F, Fut>(
        &self,
        prompts: Vec<GenerationPrompt>,
        submit: F,
    ) -> Option<JobCompletion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SubmitReceipt, ApiError>>,
    {
        let batch_len = prompts.len();
        let effects = self.inner.dispatch(Msg::StartRequested { prompts });
        let job = effects.iter().find_map(|effect| match effect {
            Effect::Submit { job } => Some(*job),
            _ => None,
        });
        let Some(job) = job else {
            self.inner.drive(effects).await;
            return None;
        };

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.waiters).insert(job, tx);
        self.inner.drive(effects).await;

        reel_info!(
            "[{}] Submitting job {} with {} prompts",
            self.inner.label,
            job,
            batch_len
        );
        let msg = match submit().await {
            Ok(receipt) => {
                reel_info!(
                    "[{}] Job {} accepted as task {} (total={})",
                    self.inner.label,
                    job,
                    receipt.task_id,
                    receipt.total
                );
                Msg::SubmitSucceeded { job, receipt }
            }
            Err(err) => {
                reel_warn!("[{}] Job {} submission failed: {}", self.inner.label, job, err);
                Msg::SubmitFailed {
                    job,
                    message: err.to_string(),
                }
            }
        };
        let effects = self.inner.dispatch(msg);
        self.inner.drive(effects).await;

        Some(JobCompletion { job, rx })
    }

    /// Asks the backend to cancel the running task. No-op without a task id.
    pub async fn stop(&self) {
        let effects = self.inner.dispatch(Msg::StopRequested);
        self.inner.drive(effects).await;
    }

    /// Clears all progress and stops polling immediately.
    pub fn reset(&self) {
        let effects = self.inner.dispatch(Msg::ResetRequested);
        self.inner.apply_all_local(effects);
    }

    /// Stops polling unconditionally. Also runs when the tracker is dropped.
    pub fn teardown(&self) {
        let effects = self.inner.dispatch(Msg::Teardown);
        self.inner.apply_all_local(effects);
    }

    pub fn is_generating(&self) -> bool {
        lock(&self.inner.state).is_generating()
    }

    pub fn snapshot(&self) -> TrackerView {
        lock(&self.inner.state).view()
    }

    /// Observes every state change as a fresh view.
    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.inner.view_tx.subscribe()
    }
}

impl Drop for TaskTracker {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl TrackerInner {
    fn dispatch(&self, msg: Msg) -> Vec<Effect> {
        let mut guard = lock(&self.state);
        let state = std::mem::take(&mut *guard);
        let (mut state, effects) = update(state, msg);
        if state.consume_dirty() {
            self.view_tx.send_replace(state.view());
        }
        *guard = state;
        effects
    }

    /// Executes effects in order, feeding IO results back through `update`.
    fn drive(self: &Arc<Self>, effects: Vec<Effect>) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(self);
        async move {
            let mut queue: VecDeque<Effect> = effects.into();
            while let Some(effect) = queue.pop_front() {
                if let Some(msg) = inner.execute(effect).await {
                    queue.extend(inner.dispatch(msg));
                }
            }
        }
        .boxed()
    }

    async fn execute(self: &Arc<Self>, effect: Effect) -> Option<Msg> {
        match effect {
            Effect::QueryProgress { job, task_id } => {
                reel_trace!("[{}] Polling task {}", self.label, task_id);
                Some(match self.api.progress(&task_id).await {
                    Ok(report) => {
                        reel_debug!(
                            "[{}] Task {} status={} current={:?} total={:?}",
                            self.label,
                            task_id,
                            report.status,
                            report.current,
                            report.total
                        );
                        Msg::ProgressReported { job, report }
                    }
                    Err(err) => Msg::PollFailed {
                        job,
                        message: err.to_string(),
                    },
                })
            }
            Effect::RequestCancel { job, task_id } => {
                reel_info!("[{}] Requesting cancel of task {}", self.label, task_id);
                Some(match self.api.cancel(&task_id).await {
                    Ok(()) => Msg::CancelAcknowledged { job },
                    Err(err) => Msg::CancelFailed {
                        job,
                        message: err.to_string(),
                    },
                })
            }
            other => {
                self.apply_local(other);
                None
            }
        }
    }

    fn apply_all_local(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            self.apply_local(effect);
        }
    }

    fn apply_local(self: &Arc<Self>, effect: Effect) {
        match effect {
            // The submission itself runs inside `TaskTracker::start`.
            Effect::Submit { .. } => {}
            Effect::ArmPolling { interval } => self.arm_polling(interval),
            Effect::DisarmPolling => self.disarm_polling(),
            Effect::ScheduleReset { job, delay } => {
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let effects = inner.dispatch(Msg::ResetDue { job });
                    inner.drive(effects).await;
                });
            }
            Effect::Notify(notice) => self.notices.notify(&self.label, notice),
            Effect::JobFinished { job, outcome } => {
                reel_info!("[{}] Job {} finished: {}", self.label, job, outcome);
                let waiter = lock(&self.waiters).remove(&job);
                if let Some(tx) = waiter {
                    if tx.send(outcome).is_err() {
                        reel_debug!("[{}] Nobody waits for job {}", self.label, job);
                    }
                }
            }
            Effect::QueryProgress { .. } | Effect::RequestCancel { .. } => {
                reel_warn!("[{}] Dropping network effect outside the driver", self.label);
            }
        }
    }

    fn arm_polling(self: &Arc<Self>, period: Duration) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.poll_guard).replace(token.clone()) {
            previous.cancel();
        }
        tokio::spawn(poll_loop(Arc::clone(self), token, period));
    }

    fn disarm_polling(&self) {
        if let Some(token) = lock(&self.poll_guard).take() {
            token.cancel();
        }
    }
}

async fn poll_loop(inner: Arc<TrackerInner>, token: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // Each tick finishes its query before the next one can fire.
        let effects = inner.dispatch(Msg::PollTick);
        inner.drive(effects).await;
    }
    reel_trace!("[{}] Poll loop stopped", inner.label);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
