use serde_json::Value;

use crate::{BlockSize, FilterId, FilterInfo, ImageUpload, JobId, JobStatus, MetricsReport, Stage};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted the upload form. Either image may be missing.
    UploadSubmitted {
        element: Option<ImageUpload>,
        target: Option<ImageUpload>,
    },
    /// Upload accepted; the service issued a job id.
    UploadSucceeded {
        attempt: u64,
        job_id: JobId,
        payload: Value,
    },
    UploadFailed { attempt: u64, message: String },
    PreprocessSucceeded { job_id: JobId, payload: Value },
    GenerateSucceeded { job_id: JobId, payload: Value },
    /// Preprocess or generate failed; the pipeline halts at `stage`.
    StageFailed {
        job_id: JobId,
        stage: Stage,
        message: String,
    },
    /// One status snapshot from the poller.
    StatusReceived { job_id: JobId, payload: Value },
    /// Poller reached a terminal status.
    PollingFinished { job_id: JobId, status: JobStatus },
    PollingFailed { job_id: JobId, message: String },
    /// User picked a filter.
    FilterRequested(FilterId),
    FilterApplied { job_id: JobId, payload: Value },
    FilterFailed { job_id: JobId, message: String },
    /// User picked a block size.
    BlockSizeRequested(BlockSize),
    BlockSizeApplied { job_id: JobId, payload: Value },
    BlockSizeFailed { job_id: JobId, message: String },
    /// Extra artifacts (e.g. multiresolution renders) to merge into outputs.
    OutputsReceived { job_id: JobId, payload: Value },
    FilterCatalogLoaded(Vec<FilterInfo>),
    MetricsLoaded { job_id: JobId, metrics: MetricsReport },
    /// User dismissed the error banner. Nothing is retried.
    ErrorDismissed,
    /// Fallback for placeholder wiring.
    NoOp,
}
