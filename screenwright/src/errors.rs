use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("Input synthesis failed: {0}")]
    InputFailed(String),

    #[error("Clipboard error: {0}")]
    ClipboardError(String),

    #[error("Recognition backend error: {0}")]
    RecognitionError(String),

    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),

    #[error("Unknown step kind: {0}")]
    UnknownStepKind(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Workflow file error: {0}")]
    WorkflowFile(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Run interrupted by user")]
    Interrupted,
}
