//! REST client for the pose inference service.
//!
//! Each frame is sent as raw RGB24 bytes to `POST /predict`; the service
//! answers with the keypoints of every detected person.

use posewatch_core::pose::{PersonKeypoints, PoseError, PoseEstimator};
use posewatch_core::video::Frame;
use serde::Deserialize;

/// Confidence threshold passed to the model when none is configured.
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Connection settings for the inference service.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseServiceConfig {
    /// Base HTTP URL, e.g. `http://localhost:8000`.
    pub api_url: String,
    /// Model identifier the service should load, taken from `model_path`.
    pub model: String,
    /// Minimum detection confidence.
    pub confidence: f32,
}

impl PoseServiceConfig {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var            | Default                 |
    /// |--------------------|-------------------------|
    /// | `POSE_SERVICE_URL` | `http://localhost:8000` |
    /// | `POSE_CONFIDENCE`  | `0.25`                  |
    pub fn from_env(model: impl Into<String>) -> Self {
        let api_url = std::env::var("POSE_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8000".into())
            .trim_end_matches('/')
            .to_string();
        let confidence = std::env::var("POSE_CONFIDENCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONFIDENCE);
        Self {
            api_url,
            model: model.into(),
            confidence,
        }
    }
}

/// Errors from the inference service layer.
#[derive(Debug, thiserror::Error)]
pub enum PoseServiceError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("pose service error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<PoseServiceError> for PoseError {
    fn from(e: PoseServiceError) -> Self {
        PoseError::Inference(e.to_string())
    }
}

/// Response body of `POST /predict`.
#[derive(Debug, Deserialize)]
pub struct PredictResponse {
    /// One list of `[x, y, confidence]` triples per detected person.
    #[serde(default)]
    pub keypoints: Vec<PersonKeypoints>,
}

/// HTTP client for one inference service instance.
pub struct PoseServiceApi {
    client: reqwest::Client,
    config: PoseServiceConfig,
}

impl PoseServiceApi {
    pub fn new(config: PoseServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &PoseServiceConfig {
        &self.config
    }

    /// Check that the service is up. Sends `GET /health`.
    pub async fn health(&self) -> Result<(), PoseServiceError> {
        let response = self
            .client
            .get(format!("{}/health", self.config.api_url))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Run the model on a single frame. The pixel buffer becomes the request
    /// body as is.
    pub async fn predict(&self, frame: Frame) -> Result<PredictResponse, PoseServiceError> {
        let params = self.query_params(&frame);
        let response = self
            .client
            .post(format!("{}/predict", self.config.api_url))
            .query(&params)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(frame_body(frame))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<PredictResponse>().await?)
    }

    fn query_params(&self, frame: &Frame) -> [(&'static str, String); 4] {
        [
            ("model", self.config.model.clone()),
            ("width", frame.width.to_string()),
            ("height", frame.height.to_string()),
            ("conf", self.config.confidence.to_string()),
        ]
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PoseServiceError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PoseServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PoseServiceError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Move the frame's pixels into a request body without copying them.
fn frame_body(frame: Frame) -> reqwest::Body {
    reqwest::Body::from(frame.data)
}

impl PoseEstimator for PoseServiceApi {
    async fn estimate(&self, frame: Frame) -> Result<Vec<PersonKeypoints>, PoseError> {
        let response = self.predict(frame).await?;
        Ok(response.keypoints)
    }
}
