//! Mosaic engine: HTTP transport, status polling and effect execution.
mod client;
mod mutations;
mod orchestrator;
mod poller;
mod types;

pub use client::{ClientSettings, MosaicApi, ReqwestMosaicClient};
pub use orchestrator::{NullSink, Orchestrator, OrchestratorError, ViewSink};
pub use poller::{poll, PollError, PollSettings};
pub use types::{BlockSizeAck, LegacyMosaic, TransportError, UploadResponse};
