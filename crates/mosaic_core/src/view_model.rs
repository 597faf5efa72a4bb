use crate::outputs::{artifact_url, OutputMap};
use crate::{ActiveView, BlockSize, FilterId, FilterInfo, JobId, JobStatus, MetricsReport, Stage};

/// Read-only snapshot of the job for the presentation layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobViewModel {
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: Stage,
    pub outputs: OutputMap,
    pub selected_block_size: BlockSize,
    pub selected_filter: FilterId,
    pub active_view: ActiveView,
    pub error: Option<String>,
    pub is_applying_changes: bool,
    pub is_polling: bool,
    pub is_running: bool,
    pub filters: Vec<FilterInfo>,
    pub metrics: Option<MetricsReport>,
    pub dirty: bool,
}

impl JobViewModel {
    /// The mosaic the active view points at, falling back to the unfiltered one.
    pub fn displayed_mosaic(&self) -> Option<&str> {
        let filtered = match self.active_view {
            ActiveView::Filtered => artifact_url(&self.outputs, "filtered_mosaic"),
            ActiveView::Original => None,
        };
        filtered.or_else(|| artifact_url(&self.outputs, "mosaic"))
    }
}
