use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reel_logging::{reel_debug, reel_info, reel_warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use storyreel_core::{GenerationPrompt, ProgressReport, SubmitReceipt};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::event_stream::{pump_event_stream, ChapterText};
use crate::types::{Envelope, ProgressData, ReceiptData, WorkflowList};
use crate::{
    ApiError, AudioBatchRequest, ChapterRequest, FailureKind, ImageBatchRequest, SceneInfo,
    VideoReceipt, VideoSettings, WorkflowInfo,
};

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request limit for non-streamed calls. Chapter streams only use
    /// the connect timeout.
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Job endpoints a tracker polls and cancels through.
#[async_trait::async_trait]
pub trait MediaApi: Send + Sync {
    async fn progress(&self, task_id: &str) -> Result<ProgressReport, ApiError>;

    async fn cancel(&self, task_id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApiClient {
    base: Url,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl ReqwestApiClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let base = parse_base_url(&settings.base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            base,
            client,
            stream_client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn submit_images(
        &self,
        request: &ImageBatchRequest,
    ) -> Result<SubmitReceipt, ApiError> {
        reel_info!(
            "Submitting {} image prompts for {}/{}",
            request.prompts.len(),
            request.project_name,
            request.chapter_name
        );
        let data: Option<ReceiptData> = self
            .post_json(self.endpoint("media/generate_images")?, request)
            .await?;
        require_data(data, "generate_images").map(SubmitReceipt::from)
    }

    pub async fn submit_audio(&self, request: &AudioBatchRequest) -> Result<SubmitReceipt, ApiError> {
        reel_info!(
            "Submitting {} audio prompts for {}/{}",
            request.prompts.len(),
            request.project_name,
            request.chapter_name
        );
        let data: Option<ReceiptData> = self
            .post_json(self.endpoint("media/generate-audio")?, request)
            .await?;
        require_data(data, "generate-audio").map(SubmitReceipt::from)
    }

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, ApiError> {
        let data: Option<WorkflowList> = self.get_json(self.endpoint("media/workflows")?).await?;
        Ok(data.map(|list| list.workflows).unwrap_or_default())
    }

    /// Starts chapter generation and validates the response before any
    /// decoding happens.
    pub async fn open_chapter_stream(
        &self,
        request: &ChapterRequest,
    ) -> Result<ChapterStream, ApiError> {
        let url = self.endpoint("chapter/generate")?;
        reel_info!(
            "Opening chapter stream for {}/{} (continuation={})",
            request.project_name,
            request.chapter_name,
            request.is_continuation
        );
        let response = self
            .stream_client
            .post(url)
            .header(ACCEPT, EVENT_STREAM)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }
        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(ApiError::new(
                FailureKind::MissingBody,
                "chapter stream has no body",
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());
        if content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
        {
            // Validation failures come back as a plain envelope.
            read_envelope::<serde_json::Value>(response).await?;
            return Err(ApiError::new(
                FailureKind::MalformedResponse,
                "expected an event stream, got JSON",
            ));
        }

        Ok(ChapterStream { response })
    }

    /// Scenes of a chapter in backend order.
    pub async fn scene_list(
        &self,
        project_name: &str,
        chapter_name: &str,
    ) -> Result<Vec<SceneInfo>, ApiError> {
        let url = self.chapter_endpoint("chapter/scene_list", project_name, chapter_name)?;
        let data: Option<Vec<SceneInfo>> = self.get_json(url).await?;
        Ok(data.unwrap_or_default())
    }

    /// Image prompts for every scene that has one.
    pub async fn scene_prompts(
        &self,
        project_name: &str,
        chapter_name: &str,
    ) -> Result<Vec<GenerationPrompt>, ApiError> {
        let scenes = self.scene_list(project_name, chapter_name).await?;
        let prompts: Vec<GenerationPrompt> = scenes
            .iter()
            .filter(|scene| !scene.prompt.trim().is_empty())
            .map(SceneInfo::image_prompt)
            .collect();
        if prompts.len() < scenes.len() {
            reel_warn!(
                "{} of {} scenes in {}/{} have no image prompt",
                scenes.len() - prompts.len(),
                scenes.len(),
                project_name,
                chapter_name
            );
        }
        Ok(prompts)
    }

    /// Assembles the chapter video from its generated images and audio.
    ///
    /// The backend answers only once the video is written, so this call is
    /// bound by the connect timeout alone.
    pub async fn generate_video(
        &self,
        project_name: &str,
        chapter_name: &str,
        settings: &VideoSettings,
    ) -> Result<VideoReceipt, ApiError> {
        let url = self.chapter_endpoint("generate-video", project_name, chapter_name)?;
        reel_info!("Assembling video for {}/{}", project_name, chapter_name);
        let mut request = self.stream_client.post(url);
        if !settings.is_empty() {
            request = request.json(settings);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let data: Option<VideoReceipt> = read_envelope(response).await?;
        require_data(data, "generate-video")
    }

    /// Downloads the assembled chapter video to `dest`. Returns the byte count.
    pub async fn download_video(
        &self,
        project_name: &str,
        chapter_name: &str,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let url = self.chapter_endpoint("get-video", project_name, chapter_name)?;
        reel_debug!("GET {}", url);
        let mut response = self
            .stream_client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        reel_info!("Saved video to {:?} ({} bytes)", dest, written);
        Ok(written)
    }

    fn chapter_endpoint(
        &self,
        path: &str,
        project_name: &str,
        chapter_name: &str,
    ) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("project_name", project_name)
            .append_pair("chapter_name", chapter_name);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ApiError> {
        reel_debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;
        read_envelope(response).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        reel_debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_envelope(response).await
    }
}

#[async_trait::async_trait]
impl MediaApi for ReqwestApiClient {
    async fn progress(&self, task_id: &str) -> Result<ProgressReport, ApiError> {
        let mut url = self.endpoint("media/progress")?;
        url.query_pairs_mut().append_pair("task_id", task_id);
        let data: Option<ProgressData> = self.get_json(url).await?;
        require_data(data, "progress").map(ProgressReport::from)
    }

    async fn cancel(&self, task_id: &str) -> Result<(), ApiError> {
        let mut url = self.endpoint("media/cancel")?;
        // The backend reads the id from the query; the body mirrors it.
        url.query_pairs_mut().append_pair("task_id", task_id);
        let body = serde_json::json!({ "task_id": task_id });
        let _: Option<serde_json::Value> = self.post_json(url, &body).await?;
        reel_info!("Cancel accepted for task {}", task_id);
        Ok(())
    }
}

/// An established chapter-generation response.
pub struct ChapterStream {
    response: reqwest::Response,
}

impl ChapterStream {
    pub fn into_byte_stream(self) -> impl Stream<Item = Result<Bytes, ApiError>> + Send {
        self.response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
    }

    /// Decodes the stream until it ends or `cancel` fires.
    pub async fn read_text<F: FnMut(&str)>(
        self,
        cancel: &CancellationToken,
        on_text: F,
    ) -> ChapterText {
        pump_event_stream(self.into_byte_stream(), cancel, on_text).await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let mut base =
        Url::parse(raw.trim()).map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(ApiError::new(
            FailureKind::InvalidUrl,
            format!("{raw} cannot be used as a base url"),
        ));
    }
    // `join` replaces the last segment unless the path ends with a slash.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, ApiError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::new(FailureKind::MalformedResponse, err.to_string()))?;
    envelope.into_data()
}

/// Builds an `HttpStatus` error, preferring the backend's `detail` or
/// `message` text over the bare status line.
async fn status_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| {
            body.get("detail")
                .or_else(|| body.get("message"))
                .and_then(|value| value.as_str())
                .map(str::to_string)
        })
        .filter(|detail| !detail.trim().is_empty());
    ApiError::new(
        FailureKind::HttpStatus(status.as_u16()),
        detail.unwrap_or_else(|| status.to_string()),
    )
}

fn io_error(err: std::io::Error) -> ApiError {
    ApiError::new(FailureKind::Io, err.to_string())
}

fn require_data<T>(data: Option<T>, endpoint: &str) -> Result<T, ApiError> {
    data.ok_or_else(|| {
        ApiError::new(
            FailureKind::MalformedResponse,
            format!("{endpoint} response has no data"),
        )
    })
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(FailureKind::MalformedResponse, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::parse_base_url;

    #[test]
    fn base_url_gains_trailing_slash() {
        let base = parse_base_url("http://localhost:5001/api").unwrap();
        assert_eq!(
            base.join("media/progress").unwrap().as_str(),
            "http://localhost:5001/api/media/progress"
        );
    }

    #[test]
    fn non_base_url_is_rejected() {
        assert!(parse_base_url("mailto:someone@example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }
}
