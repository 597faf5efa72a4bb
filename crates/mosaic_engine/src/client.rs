use std::collections::BTreeMap;
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use mosaic_core::{BlockSize, FilterId, FilterInfo, ImageUpload, JobId, MetricsReport};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use url::Url;

use crate::types::{
    error_from_body, parse_filter_catalog, parse_filter_previews, BlockSizeAck, LegacyMosaic,
    TransportError, UploadResponse,
};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin of the mosaic service; also the base for returned locators.
    pub base_url: Url,
    pub connect_timeout: Duration,
    /// Generation runs inside the request, so this is generous.
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:5000";

    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn parse(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Resolves a relative locator returned by the service.
    pub fn resolve(&self, locator: &str) -> Option<Url> {
        self.base_url.join(locator).ok()
    }
}

/// One operation per remote capability of the mosaic service.
#[async_trait::async_trait]
pub trait MosaicApi: Send + Sync {
    async fn upload(
        &self,
        element: &ImageUpload,
        target: &ImageUpload,
    ) -> Result<UploadResponse, TransportError>;

    async fn upload_element(&self, element: &ImageUpload) -> Result<UploadResponse, TransportError>;

    async fn upload_target(
        &self,
        job_id: &JobId,
        target: &ImageUpload,
    ) -> Result<UploadResponse, TransportError>;

    async fn preprocess(&self, job_id: &JobId) -> Result<Value, TransportError>;

    async fn set_block_size(
        &self,
        job_id: &JobId,
        size: BlockSize,
    ) -> Result<BlockSizeAck, TransportError>;

    async fn multiresolution_preview(&self, job_id: &JobId) -> Result<Value, TransportError>;

    async fn generate(&self, job_id: &JobId) -> Result<Value, TransportError>;

    async fn generate_multiresolution(&self, job_id: &JobId) -> Result<Value, TransportError>;

    async fn generate_legacy(
        &self,
        element: &ImageUpload,
        target: &ImageUpload,
    ) -> Result<LegacyMosaic, TransportError>;

    async fn apply_filter(
        &self,
        job_id: &JobId,
        filter: &FilterId,
        options: &Value,
    ) -> Result<Value, TransportError>;

    async fn list_filters(&self) -> Result<Vec<FilterInfo>, TransportError>;

    async fn filter_previews(
        &self,
        job_id: &JobId,
    ) -> Result<BTreeMap<String, String>, TransportError>;

    async fn compare_filters(
        &self,
        job_id: &JobId,
        filters: &[FilterId],
    ) -> Result<Value, TransportError>;

    async fn metrics(&self, job_id: &JobId) -> Result<MetricsReport, TransportError>;

    async fn compare_metrics(&self, job_id: &JobId) -> Result<Value, TransportError>;

    async fn batch_metrics(&self, job_ids: &[JobId]) -> Result<Value, TransportError>;

    async fn job_status(&self, job_id: &JobId) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestMosaicClient {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestMosaicClient {
    pub fn new(settings: ClientSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.settings.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                TransportError::Network(format!("invalid base url {}", self.settings.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, TransportError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            let err = error_from_body(status.as_u16(), &String::from_utf8_lossy(&body));
            engine_warn!("{} failed with status {}: {}", url, status.as_u16(), err);
            return Err(err);
        }

        engine_debug!("{} -> {} ({} bytes)", url, status.as_u16(), body.len());
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn get(&self, segments: &[&str]) -> Result<Value, TransportError> {
        let url = self.endpoint(segments)?;
        self.send(self.client.get(url)).await
    }

    async fn post_json(&self, segments: &[&str], body: &Value) -> Result<Value, TransportError> {
        let url = self.endpoint(segments)?;
        self.send(self.client.post(url).json(body)).await
    }

    async fn post_form(&self, segments: &[&str], form: Form) -> Result<Value, TransportError> {
        let url = self.endpoint(segments)?;
        self.send(self.client.post(url).multipart(form)).await
    }
}

#[async_trait::async_trait]
impl MosaicApi for ReqwestMosaicClient {
    async fn upload(
        &self,
        element: &ImageUpload,
        target: &ImageUpload,
    ) -> Result<UploadResponse, TransportError> {
        let form = Form::new()
            .part("element_img", image_part(element)?)
            .part("big_img", image_part(target)?);
        let payload = self.post_form(&["api", "upload"], form).await?;
        UploadResponse::from_payload(payload)
    }

    async fn upload_element(&self, element: &ImageUpload) -> Result<UploadResponse, TransportError> {
        let form = Form::new().part("element_img", image_part(element)?);
        let payload = self.post_form(&["api", "upload_element"], form).await?;
        UploadResponse::from_payload(payload)
    }

    async fn upload_target(
        &self,
        job_id: &JobId,
        target: &ImageUpload,
    ) -> Result<UploadResponse, TransportError> {
        let form = Form::new().part("big_img", image_part(target)?);
        let payload = self
            .post_form(&["api", "upload_target", job_id.as_str()], form)
            .await?;
        UploadResponse::from_payload(payload)
    }

    async fn preprocess(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "preprocess", job_id.as_str()]).await
    }

    async fn set_block_size(
        &self,
        job_id: &JobId,
        size: BlockSize,
    ) -> Result<BlockSizeAck, TransportError> {
        let payload = self
            .post_json(
                &["api", "set_block_size", job_id.as_str()],
                &json!({ "block_size": size.pixels() }),
            )
            .await?;
        serde_json::from_value(payload).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn multiresolution_preview(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "multiresolution_preview", job_id.as_str()])
            .await
    }

    async fn generate(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "generate_mosaic", job_id.as_str()]).await
    }

    async fn generate_multiresolution(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "multiresolution", job_id.as_str()]).await
    }

    async fn generate_legacy(
        &self,
        element: &ImageUpload,
        target: &ImageUpload,
    ) -> Result<LegacyMosaic, TransportError> {
        let form = Form::new()
            .part("element_img", image_part(element)?)
            .part("big_img", image_part(target)?);
        let payload = self.post_form(&["api", "generate_mosaic"], form).await?;
        serde_json::from_value(payload).map_err(|err| TransportError::Decode(err.to_string()))
    }

    async fn apply_filter(
        &self,
        job_id: &JobId,
        filter: &FilterId,
        options: &Value,
    ) -> Result<Value, TransportError> {
        self.post_json(
            &["api", "apply_filter", job_id.as_str()],
            &json!({ "filter": filter, "options": options }),
        )
        .await
    }

    async fn list_filters(&self) -> Result<Vec<FilterInfo>, TransportError> {
        let payload = self.get(&["api", "available_filters"]).await?;
        parse_filter_catalog(&payload)
    }

    async fn filter_previews(
        &self,
        job_id: &JobId,
    ) -> Result<BTreeMap<String, String>, TransportError> {
        let payload = self.get(&["api", "filter_preview", job_id.as_str()]).await?;
        Ok(parse_filter_previews(&payload))
    }

    async fn compare_filters(
        &self,
        job_id: &JobId,
        filters: &[FilterId],
    ) -> Result<Value, TransportError> {
        self.post_json(
            &["api", "compare_filters", job_id.as_str()],
            &json!({ "filters": filters }),
        )
        .await
    }

    async fn metrics(&self, job_id: &JobId) -> Result<MetricsReport, TransportError> {
        let payload = self.get(&["api", "metrics", job_id.as_str()]).await?;
        Ok(MetricsReport::from_payload(&payload))
    }

    async fn compare_metrics(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "metrics", "compare", job_id.as_str()])
            .await
    }

    async fn batch_metrics(&self, job_ids: &[JobId]) -> Result<Value, TransportError> {
        self.post_json(&["api", "metrics", "batch"], &json!({ "job_ids": job_ids }))
            .await
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Value, TransportError> {
        self.get(&["api", "job", job_id.as_str()]).await
    }
}

fn image_part(image: &ImageUpload) -> Result<Part, TransportError> {
    Part::bytes(image.bytes().to_vec())
        .file_name(image.file_name().to_string())
        .mime_str(image.content_type())
        .map_err(map_reqwest_error)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Network(format!("timeout: {err}"));
    }
    if err.is_decode() {
        return TransportError::Decode(err.to_string());
    }
    TransportError::Network(err.to_string())
}
