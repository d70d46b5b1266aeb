use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context};
use bytes::Bytes;
use futures_util::Stream;
use reel_logging::{reel_info, reel_warn};
use storyreel_core::{GenerationPrompt, JobOutcome};
use storyreel_engine::{
    pump_event_stream, ApiError, AudioBatchRequest, ChapterRequest, ChapterText,
    ImageBatchRequest, JobCompletion, LogNoticeSink, MediaApi, ReqwestApiClient, SceneInfo,
    StreamEnd, TaskTracker, VideoSettings,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::{Command, Invocation, PromptSource};
use crate::config::AppConfig;
use crate::prompts::load_prompts;

struct Session {
    client: Arc<ReqwestApiClient>,
    project: String,
    chapter: String,
    workflow: Option<String>,
}

pub async fn run(invocation: Invocation, config: AppConfig) -> anyhow::Result<()> {
    let client = ReqwestApiClient::new(config.client_settings())
        .with_context(|| format!("invalid server url {:?}", config.server.base_url))?;
    reel_info!("Using backend at {}", client.base_url());
    let session = Session {
        client: Arc::new(client),
        project: invocation.project.unwrap_or(config.defaults.project),
        chapter: invocation.chapter.unwrap_or(config.defaults.chapter),
        workflow: config.defaults.workflow,
    };
    let mut interrupts = interrupts();

    match invocation.command {
        Command::Images { prompts, workflow } => {
            let prompts = load_prompts(&prompts)?;
            let outcome = generate_images(&session, prompts, workflow, &mut interrupts).await?;
            ensure!(outcome.is_success(), "image generation {outcome}");
        }
        Command::Audio { prompts } => {
            let prompts = load_prompts(&prompts)?;
            let outcome = generate_audio(&session, prompts, &mut interrupts).await?;
            ensure!(outcome.is_success(), "audio generation {outcome}");
        }
        Command::Produce {
            source,
            workflow,
            video,
        } => {
            let (images, audio) = produce_prompts(&session, &source).await?;
            let outcome = generate_images(&session, images, workflow, &mut interrupts).await?;
            ensure!(
                outcome.is_success(),
                "image generation {outcome}, audio skipped"
            );
            let outcome = generate_audio(&session, audio, &mut interrupts).await?;
            ensure!(
                outcome.is_success(),
                "audio generation {outcome}, video skipped"
            );
            if video {
                assemble_video(&session, None).await?;
            }
        }
        Command::Video { output } => assemble_video(&session, output.as_deref()).await?,
        Command::Scenes => list_scenes(&session).await?,
        Command::Chapter {
            prompt,
            continuation,
            use_last_chapter,
        } => {
            let request = ChapterRequest {
                is_continuation: continuation,
                use_last_chapter,
                ..ChapterRequest::new(session.project.as_str(), session.chapter.as_str(), prompt)
            };
            write_chapter(&session, &request, &mut interrupts).await?;
        }
        Command::Cancel { task_id } => {
            session
                .client
                .cancel(&task_id)
                .await
                .with_context(|| format!("cancel of {task_id} failed"))?;
            println!("cancel requested for {task_id}");
        }
        Command::Workflows => list_workflows(&session).await?,
        Command::Help => println!("{}", crate::cli::USAGE),
    }
    Ok(())
}

/// Forwards every Ctrl-C until the listener fails or the receiver is dropped.
fn interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                reel_warn!("Could not listen for Ctrl-C: {}", err);
                break;
            }
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Image and audio batches for `produce`.
async fn produce_prompts(
    session: &Session,
    source: &PromptSource,
) -> anyhow::Result<(Vec<GenerationPrompt>, Vec<GenerationPrompt>)> {
    match source {
        PromptSource::Files { images, audio } => Ok((load_prompts(images)?, load_prompts(audio)?)),
        PromptSource::Scenes => {
            let scenes = session
                .client
                .scene_list(&session.project, &session.chapter)
                .await
                .context("could not read the scene list")?;
            ensure!(
                !scenes.is_empty(),
                "{}/{} has no scenes",
                session.project,
                session.chapter
            );
            let images = scenes
                .iter()
                .filter(|scene| !scene.prompt.trim().is_empty())
                .map(SceneInfo::image_prompt)
                .collect();
            let audio = scenes
                .iter()
                .filter(|scene| !scene.content.trim().is_empty())
                .map(SceneInfo::narration_prompt)
                .collect();
            Ok((images, audio))
        }
    }
}

async fn generate_images(
    session: &Session,
    prompts: Vec<GenerationPrompt>,
    workflow: Option<String>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<JobOutcome> {
    let request = ImageBatchRequest {
        project_name: session.project.clone(),
        chapter_name: session.chapter.clone(),
        prompts: prompts.clone(),
        workflow: workflow.or_else(|| session.workflow.clone()),
        params: None,
        image_settings: None,
    };
    let tracker = new_tracker("images", session);
    let client = Arc::clone(&session.client);
    let completion = tracker
        .start(prompts, move || async move { client.submit_images(&request).await })
        .await;
    follow(&tracker, completion, interrupts).await
}

async fn generate_audio(
    session: &Session,
    prompts: Vec<GenerationPrompt>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<JobOutcome> {
    let request = AudioBatchRequest {
        project_name: session.project.clone(),
        chapter_name: session.chapter.clone(),
        prompts: prompts.clone(),
        audio_settings: None,
    };
    let tracker = new_tracker("audio", session);
    let client = Arc::clone(&session.client);
    let completion = tracker
        .start(prompts, move || async move { client.submit_audio(&request).await })
        .await;
    follow(&tracker, completion, interrupts).await
}

fn new_tracker(label: &str, session: &Session) -> TaskTracker {
    TaskTracker::new(label, session.client.clone(), Arc::new(LogNoticeSink))
}

/// Logs progress until the job resolves.
///
/// The first interrupt asks the backend to cancel and keeps waiting for the
/// terminal status. The second abandons the job, which then resolves as
/// aborted.
async fn follow(
    tracker: &TaskTracker,
    completion: Option<JobCompletion>,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<JobOutcome> {
    let Some(completion) = completion else {
        bail!("{} batch was not started", tracker.label());
    };
    let mut views = tracker.subscribe();
    let wait = completion.wait();
    tokio::pin!(wait);
    let mut stop_sent = false;

    loop {
        tokio::select! {
            outcome = &mut wait => return Ok(outcome),
            Ok(()) = views.changed() => {
                let view = views.borrow_and_update().clone();
                if view.is_generating {
                    reel_info!(
                        "[{}] {}/{} ({}%) {}",
                        tracker.label(),
                        view.progress.current,
                        view.progress.total,
                        view.percent,
                        view.progress.status
                    );
                }
            }
            Some(()) = interrupts.recv() => {
                if stop_sent {
                    reel_warn!("[{}] Interrupted again, abandoning job", tracker.label());
                    tracker.teardown();
                } else {
                    stop_sent = true;
                    reel_warn!("[{}] Interrupted, cancelling task", tracker.label());
                    tracker.stop().await;
                }
            }
        }
    }
}

async fn write_chapter(
    session: &Session,
    request: &ChapterRequest,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> anyhow::Result<()> {
    let stream = session.client.open_chapter_stream(request).await?;
    let cancel = CancellationToken::new();
    let mut stdout = io::stdout();

    let (result, write_error) = {
        let relay = relay_chapter(stream.into_byte_stream(), &cancel, &mut stdout);
        tokio::pin!(relay);
        loop {
            tokio::select! {
                done = &mut relay => break done,
                Some(()) = interrupts.recv() => cancel.cancel(),
            }
        }
    };
    if let Some(err) = write_error {
        return Err(anyhow!(err).context("could not write chapter text"));
    }
    writeln!(stdout)?;

    match result.end {
        StreamEnd::Finished => {
            reel_info!("Chapter finished ({} chars)", result.text.chars().count());
            Ok(())
        }
        StreamEnd::Cancelled => {
            reel_warn!(
                "Chapter stopped after {} chars",
                result.text.chars().count()
            );
            Ok(())
        }
        StreamEnd::Interrupted(err) => Err(anyhow!(err).context("chapter stream interrupted")),
    }
}

/// Copies decoded chapter text to `out` as it arrives.
///
/// A failed write cancels `cancel`, so the read stops at the next chunk
/// boundary, and is returned next to the text received so far.
async fn relay_chapter<S, W>(
    stream: S,
    cancel: &CancellationToken,
    out: &mut W,
) -> (ChapterText, Option<io::Error>)
where
    S: Stream<Item = Result<Bytes, ApiError>>,
    W: Write,
{
    let mut write_error = None;
    let text = pump_event_stream(stream, cancel, |piece| {
        if write_error.is_some() {
            return;
        }
        if let Err(err) = out.write_all(piece.as_bytes()).and_then(|()| out.flush()) {
            reel_warn!("Chapter output closed: {}", err);
            write_error = Some(err);
            cancel.cancel();
        }
    })
    .await;
    (text, write_error)
}

async fn assemble_video(session: &Session, output: Option<&Path>) -> anyhow::Result<()> {
    let receipt = session
        .client
        .generate_video(&session.project, &session.chapter, &VideoSettings::default())
        .await
        .context("video assembly failed")?;
    println!("video written to {}", receipt.video_path);
    if let Some(output) = output {
        let bytes = session
            .client
            .download_video(&session.project, &session.chapter, output)
            .await
            .with_context(|| format!("could not download the video to {output:?}"))?;
        println!("saved {bytes} bytes to {}", output.display());
    }
    Ok(())
}

async fn list_scenes(session: &Session) -> anyhow::Result<()> {
    let scenes = session
        .client
        .scene_list(&session.project, &session.chapter)
        .await?;
    if scenes.is_empty() {
        println!("no scenes in {}/{}", session.project, session.chapter);
        return Ok(());
    }
    for scene in scenes {
        println!("{}\t{}", scene.id, scene.prompt.trim());
    }
    Ok(())
}

async fn list_workflows(session: &Session) -> anyhow::Result<()> {
    let workflows = session.client.list_workflows().await?;
    if workflows.is_empty() {
        println!("no workflows available");
        return Ok(());
    }
    for workflow in workflows {
        match workflow.size {
            Some(size) => println!("{}\t{} bytes", workflow.name, size),
            None => println!("{}", workflow.name),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::{stream, StreamExt};
    use storyreel_core::{ProgressReport, SubmitReceipt, TaskStatus};

    use super::*;

    /// Backend whose task never finishes on its own.
    #[derive(Default)]
    struct EndlessApi {
        cancel_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MediaApi for EndlessApi {
        async fn progress(&self, _task_id: &str) -> Result<ProgressReport, ApiError> {
            Ok(ProgressReport {
                status: TaskStatus::Running,
                current: Some(0),
                total: Some(2),
                errors: Vec::new(),
            })
        }

        async fn cancel(&self, _task_id: &str) -> Result<(), ApiError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Accepts a fixed number of writes, then fails like a closed pipe.
    struct ClosingWriter {
        accepted: Vec<u8>,
        writes_left: usize,
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.writes_left == 0 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.writes_left -= 1;
            self.accepted.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_interrupt_abandons_the_job() {
        let api = Arc::new(EndlessApi::default());
        let tracker = TaskTracker::new("images", api.clone(), Arc::new(LogNoticeSink));
        let completion = tracker
            .start(
                vec![GenerationPrompt::new("1", "a"), GenerationPrompt::new("2", "b")],
                || async {
                    Ok(SubmitReceipt {
                        task_id: "img_1".to_string(),
                        total: 2,
                    })
                },
            )
            .await;

        let (tx, mut interrupts) = mpsc::unbounded_channel();
        tx.send(()).unwrap();
        tx.send(()).unwrap();
        let outcome = follow(&tracker, completion, &mut interrupts).await.unwrap();

        assert_eq!(
            outcome,
            JobOutcome::Aborted {
                reason: "tracker torn down".to_string(),
            }
        );
        assert_eq!(api.cancel_calls.load(Ordering::SeqCst), 1);
        assert!(!tracker.is_generating());
    }

    #[tokio::test]
    async fn closed_output_stops_the_chapter_read() {
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"data: Once upon\n\n")),
            Ok(Bytes::from_static(b"data:  a time\n\n")),
        ])
        .chain(stream::pending());
        let cancel = CancellationToken::new();
        let mut out = ClosingWriter {
            accepted: Vec::new(),
            writes_left: 1,
        };

        let (text, write_error) = relay_chapter(chunks, &cancel, &mut out).await;

        assert!(cancel.is_cancelled());
        assert_eq!(text.end, StreamEnd::Cancelled);
        assert_eq!(out.accepted, b"Once upon");
        assert_eq!(
            write_error.map(|err| err.kind()),
            Some(io::ErrorKind::BrokenPipe)
        );
    }
}
