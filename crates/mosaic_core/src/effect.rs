use crate::{BlockSize, FilterId, ImageUpload, JobId};

/// Remote work requested by the reducer; the engine reports each outcome back
/// as a [`Msg`](crate::Msg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Upload {
        attempt: u64,
        element: ImageUpload,
        target: ImageUpload,
    },
    Preprocess { job_id: JobId },
    Generate { job_id: JobId },
    StartPolling { job_id: JobId },
    /// Stop the poll loop of an abandoned job.
    CancelPolling { job_id: JobId },
    ApplyFilter { job_id: JobId, filter: FilterId },
    /// Set the block size, then regenerate at that size.
    ChangeBlockSize { job_id: JobId, size: BlockSize },
}
