//! Mosaic core: pure job state machine, output aggregation and view-model helpers.
mod effect;
mod msg;
mod mutation;
mod outputs;
mod state;
mod types;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::Msg;
pub use mutation::{PendingMutation, SingleFlight};
pub use outputs::{
    artifact_url, merge, normalize_filter_fragment, normalize_multiresolution_fragment, OutputMap,
};
pub use state::JobState;
pub use types::{
    ActiveView, BlockSize, FilterId, FilterInfo, ImageUpload, JobId, JobStatus, MetricsReport,
    Stage, ValidationError,
};
pub use update::update;
pub use view_model::JobViewModel;
