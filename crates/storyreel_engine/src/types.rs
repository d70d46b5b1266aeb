use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use storyreel_core::{GenerationPrompt, ProgressReport, SubmitReceipt, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    MalformedResponse,
    /// Backend answered with a non-"success" envelope.
    Application,
    MissingBody,
    /// Writing a downloaded file failed.
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::Application => write!(f, "application error"),
            FailureKind::MissingBody => write!(f, "missing response body"),
            FailureKind::Io => write!(f, "io error"),
        }
    }
}

/// Response wrapper shared by every non-streamed endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    status: String,
    data: Option<T>,
    message: Option<String>,
}

impl<T> Envelope<T> {
    pub(crate) fn into_data(self) -> Result<Option<T>, ApiError> {
        if self.status == "success" {
            return Ok(self.data);
        }
        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("backend reported status {:?}", self.status));
        Err(ApiError::new(FailureKind::Application, message))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReceiptData {
    task_id: String,
    #[serde(default)]
    total: u32,
}

impl From<ReceiptData> for SubmitReceipt {
    fn from(data: ReceiptData) -> Self {
        SubmitReceipt {
            task_id: data.task_id,
            total: data.total,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressData {
    #[serde(default)]
    status: String,
    current: Option<u32>,
    total: Option<u32>,
    #[serde(default)]
    errors: Vec<String>,
}

impl From<ProgressData> for ProgressReport {
    fn from(data: ProgressData) -> Self {
        ProgressReport {
            status: TaskStatus::parse(&data.status),
            current: data.current,
            total: data.total,
            errors: data.errors,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowList {
    #[serde(default)]
    pub(crate) workflows: Vec<WorkflowInfo>,
}

/// A generation workflow file known to the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowInfo {
    pub name: String,
    pub path: Option<String>,
    pub size: Option<u64>,
    /// Modification time in seconds since the epoch.
    pub modified: Option<f64>,
}

/// Body of `POST /media/generate_images`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageBatchRequest {
    pub project_name: String,
    pub chapter_name: String,
    #[serde(serialize_with = "serialize_prompts")]
    pub prompts: Vec<GenerationPrompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(rename = "imageSettings", skip_serializing_if = "Option::is_none")]
    pub image_settings: Option<serde_json::Value>,
}

/// Body of `POST /media/generate-audio`.
#[derive(Debug, Clone, Serialize)]
pub struct AudioBatchRequest {
    pub project_name: String,
    pub chapter_name: String,
    #[serde(serialize_with = "serialize_prompts")]
    pub prompts: Vec<GenerationPrompt>,
    #[serde(rename = "audioSettings", skip_serializing_if = "Option::is_none")]
    pub audio_settings: Option<serde_json::Value>,
}

/// Body of `POST /chapter/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterRequest {
    pub project_name: String,
    pub chapter_name: String,
    pub prompt: String,
    /// Continue the existing chapter text instead of writing a fresh one.
    pub is_continuation: bool,
    /// Feed the previous chapter to the model as context.
    pub use_last_chapter: bool,
}

impl ChapterRequest {
    pub fn new(
        project_name: impl Into<String>,
        chapter_name: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            chapter_name: chapter_name.into(),
            prompt: prompt.into(),
            is_continuation: false,
            use_last_chapter: true,
        }
    }
}

/// One numbered scene of a chapter, as split by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SceneInfo {
    pub id: String,
    /// Narration text of the scene.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub base_scene: String,
    #[serde(default)]
    pub scene: String,
    /// Image prompt derived from the scene.
    #[serde(default)]
    pub prompt: String,
}

impl SceneInfo {
    pub fn image_prompt(&self) -> GenerationPrompt {
        GenerationPrompt::new(self.id.as_str(), self.prompt.trim())
    }

    pub fn narration_prompt(&self) -> GenerationPrompt {
        GenerationPrompt::new(self.id.as_str(), self.content.trim())
    }
}

/// Optional overrides for video assembly. Unset fields keep backend defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_intensity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(u32, u32)>,
}

impl VideoSettings {
    pub(crate) fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoReceipt {
    /// Server-side path of the assembled video.
    pub video_path: String,
}

#[derive(Serialize)]
struct PromptBody<'a> {
    id: &'a str,
    prompt: &'a str,
}

fn serialize_prompts<S: Serializer>(
    prompts: &[GenerationPrompt],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(prompts.iter().map(|p| PromptBody {
        id: &p.id,
        prompt: &p.prompt,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_carries_backend_message() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_value(json!({"status": "error", "data": null, "message": "missing id"}))
                .unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.kind, FailureKind::Application);
        assert_eq!(err.message, "missing id");
    }

    #[test]
    fn error_envelope_without_message_names_status() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_value(json!({"status": "failed"})).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.message, "backend reported status \"failed\"");
    }

    #[test]
    fn unknown_task_progress_has_no_counters() {
        let data: ProgressData = serde_json::from_value(json!({"status": "not_found"})).unwrap();
        let report = ProgressReport::from(data);
        assert_eq!(report.status, TaskStatus::NotFound);
        assert_eq!(report.current, None);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn image_request_uses_backend_field_names() {
        let request = ImageBatchRequest {
            project_name: "demo".to_string(),
            chapter_name: "chapter1".to_string(),
            prompts: vec![GenerationPrompt::new("3", "a lighthouse")],
            workflow: None,
            params: None,
            image_settings: Some(json!({"width": 512})),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "project_name": "demo",
                "chapter_name": "chapter1",
                "prompts": [{"id": "3", "prompt": "a lighthouse"}],
                "imageSettings": {"width": 512},
            })
        );
    }

    #[test]
    fn scene_maps_to_image_and_narration_prompts() {
        let scene: SceneInfo = serde_json::from_value(json!({
            "id": "2",
            "content": " The gulls went quiet. ",
            "base_scene": "harbor",
            "scene": "dusk",
            "prompt": "empty harbor at dusk",
        }))
        .unwrap();
        assert_eq!(
            scene.image_prompt(),
            GenerationPrompt::new("2", "empty harbor at dusk")
        );
        assert_eq!(
            scene.narration_prompt(),
            GenerationPrompt::new("2", "The gulls went quiet.")
        );
    }

    #[test]
    fn video_settings_skip_unset_fields() {
        let settings = VideoSettings {
            font_size: Some(32),
            resolution: Some((1280, 720)),
            ..VideoSettings::default()
        };
        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            json!({"font_size": 32, "resolution": [1280, 720]})
        );
        assert!(VideoSettings::default().is_empty());
    }
}
