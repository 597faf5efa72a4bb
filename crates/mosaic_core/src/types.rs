use std::fmt;

use engine_logging::engine_warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque job identifier issued by the remote service on upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Remote-authoritative job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    Uploading,
    Preprocessing,
    Generating,
    Completed,
    Error,
}

impl JobStatus {
    /// Normalizes the status strings reported by the remote service.
    pub fn from_remote(raw: &str) -> Self {
        match raw {
            "pending" => JobStatus::Pending,
            "uploading" | "uploaded" | "element_uploaded" => JobStatus::Uploading,
            "preprocessing" | "preprocessed" => JobStatus::Preprocessing,
            "generating" | "generating_mosaic" => JobStatus::Generating,
            "completed" => JobStatus::Completed,
            "error" => JobStatus::Error,
            other => {
                engine_warn!("Unknown remote job status {:?}; treating as pending", other);
                JobStatus::Pending
            }
        }
    }

    /// Reads the `status` field of a remote payload, if present.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        payload
            .get("status")
            .and_then(Value::as_str)
            .map(JobStatus::from_remote)
    }

    /// `completed` and `error` are the only statuses that stop polling.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Uploading => "uploading",
            JobStatus::Preprocessing => "preprocessing",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-local cursor over the fixed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    Upload,
    Preprocess,
    Generate,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Upload,
        Stage::Preprocess,
        Stage::Generate,
        Stage::Complete,
    ];

    pub fn index(self) -> u8 {
        match self {
            Stage::Upload => 0,
            Stage::Preprocess => 1,
            Stage::Generate => 2,
            Stage::Complete => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Upload => "Upload Images",
            Stage::Preprocess => "Preprocess",
            Stage::Generate => "Generate Mosaic",
            Stage::Complete => "Complete",
        }
    }
}

/// Mosaic block size in pixels, restricted to the sizes the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BlockSize {
    Px8,
    Px16,
    #[default]
    Px32,
    Px64,
}

impl BlockSize {
    pub const ALL: [BlockSize; 4] = [
        BlockSize::Px8,
        BlockSize::Px16,
        BlockSize::Px32,
        BlockSize::Px64,
    ];

    pub fn pixels(self) -> u32 {
        match self {
            BlockSize::Px8 => 8,
            BlockSize::Px16 => 16,
            BlockSize::Px32 => 32,
            BlockSize::Px64 => 64,
        }
    }
}

impl TryFrom<u32> for BlockSize {
    type Error = ValidationError;

    fn try_from(pixels: u32) -> Result<Self, Self::Error> {
        BlockSize::ALL
            .into_iter()
            .find(|size| size.pixels() == pixels)
            .ok_or(ValidationError::InvalidBlockSize(pixels))
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pixels())
    }
}

/// Identifier of a filter from the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    pub const NONE: &'static str = "none";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel meaning "no filter applied".
    pub fn none() -> Self {
        Self::new(Self::NONE)
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FilterId {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One entry of the remote filter catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfo {
    pub id: FilterId,
    pub display_name: String,
}

/// Which mosaic rendition the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    Original,
    Filtered,
}

/// Advisory quality metrics. `None` fields mean "unavailable".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsReport {
    pub ssim: Option<f64>,
    pub mse: Option<f64>,
    pub psnr: Option<f64>,
}

impl MetricsReport {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        self.ssim.is_some() || self.mse.is_some() || self.psnr.is_some()
    }

    /// Reads the `metrics` object of a payload; missing fields stay `None`.
    pub fn from_payload(payload: &Value) -> Self {
        let metrics = payload.get("metrics");
        let field = |name: &str| metrics.and_then(|m| m.get(name)).and_then(Value::as_f64);
        Self {
            ssim: field("ssim"),
            mse: field("mse"),
            psnr: field("psnr"),
        }
    }
}

/// An image file to submit, held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    file_name: String,
    bytes: Vec<u8>,
}

impl ImageUpload {
    pub const ALLOWED_EXTENSIONS: [&'static str; 3] = ["png", "jpg", "jpeg"];

    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        }
    }

    /// Mirrors the service's own checks so bad input never leaves the client.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let allowed = self
            .extension()
            .is_some_and(|ext| Self::ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        if !allowed {
            return Err(ValidationError::UnsupportedImageType {
                file_name: self.file_name.clone(),
            });
        }
        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyImage {
                file_name: self.file_name.clone(),
            });
        }
        Ok(())
    }
}

/// Input rejected before any remote call was made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please select both images")]
    MissingImages,
    #[error("invalid image type for {file_name}; allowed types: png, jpg, jpeg")]
    UnsupportedImageType { file_name: String },
    #[error("image {file_name} is empty")]
    EmptyImage { file_name: String },
    #[error("invalid block size {0}; allowed sizes: 8, 16, 32, 64")]
    InvalidBlockSize(u32),
    #[error("unknown filter {0}")]
    UnknownFilter(String),
}
