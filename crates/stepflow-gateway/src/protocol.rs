use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use stepflow_core::config::DeadEndPolicy;
use stepflow_core::error::StepflowError;
use stepflow_core::types::{GraphId, RunEvent, RunId, RunStatus, StateMap};
use stepflow_engine::RunSnapshot;

/// Body of `POST /graph/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub graph_id: GraphId,
    #[serde(default)]
    pub initial_state: Option<StateMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits_per_node: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_end: Option<DeadEndPolicy>,
}

/// Query string of `POST /graph/run`.
#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub sync: Option<bool>,
}

/// Run status, state and log as returned by the run endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: RunId,
    pub status: RunStatus,
    pub state: StateMap,
    pub log: Vec<RunEvent>,
}

impl From<RunSnapshot> for RunResponse {
    fn from(snap: RunSnapshot) -> Self {
        Self {
            run_id: snap.run_id,
            status: snap.status,
            state: snap.state,
            log: snap.log,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

impl From<&StepflowError> for ErrorPayload {
    fn from(e: &StepflowError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Error frame sent over the run WebSocket before closing.
#[derive(Debug, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub error: ErrorPayload,
}

impl ErrorFrame {
    pub fn new(e: &StepflowError) -> Self {
        Self {
            frame_type: "error",
            error: e.into(),
        }
    }
}

/// Reply to a client's `ping` text message.
#[derive(Debug, Serialize)]
pub struct PongFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
}

impl Default for PongFrame {
    fn default() -> Self {
        Self { frame_type: "pong" }
    }
}

/// Engine error rendered as a JSON HTTP response.
#[derive(Debug)]
pub struct ApiError(pub StepflowError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            StepflowError::Structural(_)
            | StepflowError::ConditionParse { .. }
            | StepflowError::InvalidOptions(_)
            | StepflowError::Json(_) => StatusCode::BAD_REQUEST,
            StepflowError::GraphNotFound(_) | StepflowError::RunNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StepflowError> for ApiError {
    fn from(e: StepflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": ErrorPayload::from(&self.0) });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(StepflowError::Structural("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(StepflowError::RunNotFound("r".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(StepflowError::Gateway("g".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = ErrorFrame::new(&StepflowError::RunNotFound("abc".into()));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["kind"], "run_not_found");
    }
}
