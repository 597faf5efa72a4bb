use serde_json::Value;

use crate::outputs::{merge, OutputMap};
use crate::view_model::JobViewModel;
use crate::{
    ActiveView, BlockSize, FilterId, FilterInfo, JobId, JobStatus, MetricsReport,
    PendingMutation, SingleFlight, Stage,
};

/// The orchestrated job and everything the presentation layer may observe.
///
/// Fields change only through the methods below, which the reducer in
/// `update` drives; readers take a [`JobViewModel`] snapshot via [`view`].
///
/// [`view`]: JobState::view
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobState {
    attempt: u64,
    job_id: Option<JobId>,
    status: JobStatus,
    progress: u8,
    stage: Stage,
    outputs: OutputMap,
    selected_block_size: BlockSize,
    selected_filter: FilterId,
    active_view: ActiveView,
    error: Option<String>,
    flight: SingleFlight,
    polling: bool,
    pipeline_running: bool,
    filters: Vec<FilterInfo>,
    metrics: Option<MetricsReport>,
    dirty: bool,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> JobViewModel {
        JobViewModel {
            job_id: self.job_id.clone(),
            status: self.status,
            progress: self.progress,
            stage: self.stage,
            outputs: self.outputs.clone(),
            selected_block_size: self.selected_block_size,
            selected_filter: self.selected_filter.clone(),
            active_view: self.active_view,
            error: self.error.clone(),
            is_applying_changes: self.flight.is_busy(),
            is_polling: self.polling,
            is_running: self.pipeline_running,
            filters: self.filters.clone(),
            metrics: self.metrics,
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Sequence number of the current upload submission.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_current(&self, job_id: &JobId) -> bool {
        self.job_id.as_ref() == Some(job_id)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn outputs(&self) -> &OutputMap {
        &self.outputs
    }

    pub fn selected_filter(&self) -> &FilterId {
        &self.selected_filter
    }

    pub fn selected_block_size(&self) -> BlockSize {
        self.selected_block_size
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_applying_changes(&self) -> bool {
        self.flight.is_busy()
    }

    /// Replaces the job with a fresh placeholder, keeping only the filter
    /// catalog. Returns the id of the abandoned job, if it had one.
    pub(crate) fn start_new_job(&mut self) -> Option<JobId> {
        let previous = self.job_id.take();
        let attempt = self.attempt + 1;
        let filters = std::mem::take(&mut self.filters);
        *self = Self {
            attempt,
            filters,
            pipeline_running: true,
            ..Self::default()
        };
        self.mark_dirty();
        previous
    }

    /// Binds the remote id. A bound id is never replaced.
    pub(crate) fn bind_job(&mut self, job_id: JobId) -> bool {
        if self.job_id.is_some() {
            return false;
        }
        self.job_id = Some(job_id);
        self.mark_dirty();
        true
    }

    /// Moves the step cursor forward; it never goes back within one job.
    pub(crate) fn advance_stage(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
            self.mark_dirty();
        }
    }

    /// Merges a remote payload into outputs and adopts its status and progress.
    pub(crate) fn apply_fragment(&mut self, fragment: &Value) {
        self.outputs = merge(&self.outputs, fragment);
        if let Some(status) = JobStatus::from_payload(fragment) {
            self.status = status;
        }
        if let Some(progress) = fragment.get("progress").and_then(Value::as_u64) {
            self.progress = progress.min(100) as u8;
        }
        self.mark_dirty();
    }

    pub(crate) fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.mark_dirty();
    }

    pub(crate) fn dismiss_error(&mut self) -> bool {
        let had_error = self.error.take().is_some();
        if had_error {
            self.mark_dirty();
        }
        had_error
    }

    pub(crate) fn finish_pipeline(&mut self) {
        if self.pipeline_running {
            self.pipeline_running = false;
            self.mark_dirty();
        }
    }

    pub(crate) fn set_polling(&mut self, polling: bool) {
        if self.polling != polling {
            self.polling = polling;
            self.mark_dirty();
        }
    }

    /// Mutations need a finished pipeline, no active poll, no pending error
    /// and a free single-flight slot.
    pub(crate) fn can_mutate(&self) -> bool {
        self.job_id.is_some()
            && self.stage == Stage::Complete
            && !self.polling
            && !self.pipeline_running
            && self.error.is_none()
            && !self.flight.is_busy()
    }

    /// Claims the single-flight slot and applies the optimistic selection.
    pub(crate) fn begin_mutation(&mut self, mutation: PendingMutation) -> bool {
        if !self.can_mutate() {
            return false;
        }
        let requested = mutation.clone();
        if !self.flight.try_begin(mutation) {
            return false;
        }
        match requested {
            PendingMutation::Filter { requested, .. } => self.selected_filter = requested,
            PendingMutation::BlockSize { requested, .. } => self.selected_block_size = requested,
        }
        self.mark_dirty();
        true
    }

    /// Releases the slot after the remote side confirmed the mutation.
    pub(crate) fn settle_mutation(&mut self) -> Option<PendingMutation> {
        let settled = self.flight.finish();
        if settled.is_some() {
            self.mark_dirty();
        }
        settled
    }

    /// Releases the slot, restores the pre-call selection and records the error.
    pub(crate) fn rollback_mutation(&mut self, message: impl Into<String>) {
        match self.flight.finish() {
            Some(PendingMutation::Filter { previous, .. }) => self.selected_filter = previous,
            Some(PendingMutation::BlockSize { previous, .. }) => {
                self.selected_block_size = previous
            }
            None => {}
        }
        self.record_error(message);
    }

    pub(crate) fn set_active_view(&mut self, view: ActiveView) {
        if self.active_view != view {
            self.active_view = view;
            self.mark_dirty();
        }
    }

    /// A regenerated mosaic no longer matches any earlier filtered rendition.
    pub(crate) fn reset_filter_selection(&mut self) {
        self.selected_filter = FilterId::none();
        self.set_active_view(ActiveView::Original);
        self.mark_dirty();
    }

    pub(crate) fn set_filter_catalog(&mut self, filters: Vec<FilterInfo>) {
        self.filters = filters;
        self.mark_dirty();
    }

    /// Without a loaded catalog every id is accepted and left to the service.
    pub(crate) fn knows_filter(&self, filter: &FilterId) -> bool {
        filter.is_none()
            || self.filters.is_empty()
            || self.filters.iter().any(|info| &info.id == filter)
    }

    pub(crate) fn set_metrics(&mut self, metrics: MetricsReport) {
        self.metrics = Some(metrics);
        self.mark_dirty();
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}
