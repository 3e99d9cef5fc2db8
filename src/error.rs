// error.rs - Error types for the gateway and the workflow
use crate::types::WorkflowStep;
use crate::workflow::slots::SlotStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No API key configured. Connect an account to continue")]
    MissingCredential,
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("{service} API error ({status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Failed to decode base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    EmptyResponse(&'static str),
    #[error("Video generation failed: {0}")]
    VideoFailed(String),
    #[error("Video job {operation} did not finish within {waited_secs}s")]
    Timeout { operation: String, waited_secs: u64 },
}

// request URLs are dropped so nothing from the query string reaches logs or views
impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.without_url())
    }
}

impl GatewayError {
    /// Failure text safe to show to clients. The full error goes to the logs only.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential => "No API key configured",
            GatewayError::Http(_) => "Could not reach the generation service",
            GatewayError::Api { .. } => "The generation service rejected the request",
            GatewayError::Decode(_) | GatewayError::Base64(_) | GatewayError::EmptyResponse(_) => {
                "The generation service returned an unusable response"
            }
            GatewayError::VideoFailed(_) => "Video generation failed",
            GatewayError::Timeout { .. } => "Video generation timed out",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {index} is out of range for {len} slots")]
    OutOfRange { index: usize, len: usize },
    #[error("Slot {0} was already filled")]
    AlreadyFilled(usize),
    #[error("Slot {index} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        index: usize,
        from: SlotStatus,
        to: SlotStatus,
    },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("No image provided")]
    MissingImage,
    #[error("Invalid image payload: {0}")]
    InvalidImage(#[from] base64::DecodeError),
    #[error("Invalid JSON configuration: {0}")]
    InvalidConfig(#[source] serde_json::Error),
    #[error("Configuration out of range: {0}")]
    ConfigOutOfRange(String),
    #[error("Cannot {action} while the workflow is at {actual}")]
    WrongStep {
        action: &'static str,
        actual: WorkflowStep,
    },
    #[error("{0} is not ready")]
    NotReady(&'static str),
    #[error("No proposal selected")]
    NoSelection,
    #[error("Unknown proposal id '{0}'")]
    UnknownProposal(String),
    #[error(transparent)]
    Slot(#[from] SlotError),
}
