use mosaic_core::{BlockSize, FilterId, ImageUpload, JobId};
use mosaic_engine::{ClientSettings, MosaicApi, ReqwestMosaicClient, TransportError};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ReqwestMosaicClient {
    ReqwestMosaicClient::new(ClientSettings::parse(&server.uri()).expect("mock uri"))
        .expect("client")
}

#[tokio::test]
async fn upload_sends_both_images_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .and(header_exists("content-type"))
        .and(body_string_contains("name=\"element_img\""))
        .and(body_string_contains("name=\"big_img\""))
        .and(body_string_contains("filename=\"target.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "J1",
            "status": "uploaded",
            "progress": 10,
            "element_url": "/static/uploads/J1_element.png",
            "big_url": "/static/uploads/J1_big.jpg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .upload(
            &ImageUpload::new("element.png", vec![1, 2, 3]),
            &ImageUpload::new("target.jpg", vec![4, 5, 6]),
        )
        .await
        .expect("upload ok");

    assert_eq!(response.job_id, JobId::new("J1"));
    assert_eq!(
        response.fragment["element_url"],
        json!("/static/uploads/J1_element.png")
    );
}

#[tokio::test]
async fn json_error_body_is_surfaced_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/set_block_size/J1"))
        .and(body_json(json!({"block_size": 64})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid size"})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .set_block_size(&JobId::new("J1"), BlockSize::Px64)
        .await
        .expect_err("rejected");

    assert_eq!(
        err,
        TransportError::Remote {
            status: 400,
            message: "invalid size".to_string()
        }
    );
    assert_eq!(err.to_string(), "invalid size");
}

#[tokio::test]
async fn html_error_body_is_a_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/preprocess/J1"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_raw("<html>Internal Server Error</html>", "text/html"),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .preprocess(&JobId::new("J1"))
        .await
        .expect_err("server error");

    assert_eq!(err, TransportError::Protocol { status: 500 });
    assert_eq!(err.to_string(), "server error 500");
}

#[tokio::test]
async fn success_with_non_json_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/job/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .job_status(&JobId::new("J1"))
        .await
        .expect_err("not json");

    assert!(matches!(err, TransportError::Decode(_)));
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client =
        ReqwestMosaicClient::new(ClientSettings::parse(&uri).expect("uri")).expect("client");
    let err = client
        .job_status(&JobId::new("J1"))
        .await
        .expect_err("nothing listening");

    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn apply_filter_posts_filter_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/apply_filter/J1"))
        .and(body_json(json!({"filter": "sepia", "options": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "filter_outputs": {"filtered_mosaic": "/static/outputs/J1_sepia.png"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .apply_filter(&JobId::new("J1"), &FilterId::new("sepia"), &json!({}))
        .await
        .expect("filter ok");

    assert_eq!(
        payload["filter_outputs"]["filtered_mosaic"],
        json!("/static/outputs/J1_sepia.png")
    );
}

#[tokio::test]
async fn filter_catalog_and_previews_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/available_filters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filters": {"none": "No Filter", "sepia": "Sepia Tone"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/filter_preview/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filter_previews": {"sepia": "/static/previews/J1_sepia.png"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let filters = client.list_filters().await.expect("catalog");
    assert_eq!(
        filters.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
        vec!["none", "sepia"]
    );

    let previews = client
        .filter_previews(&JobId::new("J1"))
        .await
        .expect("previews");
    assert_eq!(
        previews.get("sepia").map(String::as_str),
        Some("/static/previews/J1_sepia.png")
    );
}

#[tokio::test]
async fn metrics_are_read_from_metrics_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/metrics/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": {"ssim": 0.82, "mse": 140.5, "psnr": 26.6}
        })))
        .mount(&server)
        .await;

    let metrics = client_for(&server)
        .metrics(&JobId::new("J1"))
        .await
        .expect("metrics");

    assert_eq!(metrics.ssim, Some(0.82));
    assert_eq!(metrics.psnr, Some(26.6));
    assert!(metrics.is_available());
}

#[tokio::test]
async fn legacy_generate_returns_both_mosaics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate_mosaic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "L1",
            "simple_mosaic_url": "/static/outputs/L1_simple.png",
            "mosaic_url": "/static/outputs/L1_mosaic.png"
        })))
        .mount(&server)
        .await;

    let legacy = client_for(&server)
        .generate_legacy(
            &ImageUpload::new("e.png", vec![1]),
            &ImageUpload::new("b.png", vec![2]),
        )
        .await
        .expect("legacy ok");

    assert_eq!(legacy.job_id, Some(JobId::new("L1")));
    assert_eq!(legacy.mosaic_url, "/static/outputs/L1_mosaic.png");
}

#[tokio::test]
async fn two_step_upload_binds_target_to_existing_job() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload_element"))
        .and(body_string_contains("name=\"element_img\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "J7",
            "status": "element_uploaded",
            "element_url": "/static/uploads/J7_element.png"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/upload_target/J7"))
        .and(body_string_contains("name=\"big_img\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "J7",
            "status": "uploaded",
            "element_url": "/static/uploads/J7_element.png",
            "big_url": "/static/uploads/J7_big.png"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let element = client
        .upload_element(&ImageUpload::new("tile.png", vec![1]))
        .await
        .expect("element ok");
    let target = client
        .upload_target(&element.job_id, &ImageUpload::new("big.png", vec![2]))
        .await
        .expect("target ok");

    assert_eq!(target.job_id, element.job_id);
    assert_eq!(target.fragment["big_url"], json!("/static/uploads/J7_big.png"));
}

#[tokio::test]
async fn comparison_endpoints_pass_payloads_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/compare_filters/J1"))
        .and(body_json(json!({"filters": ["sepia", "blur"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filters": ["sepia", "blur"],
            "comparison_url": "/static/outputs/J1_compare.png"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/metrics/batch"))
        .and(body_json(json!({"job_ids": ["J1", "J2"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "J1": {"ssim": 0.8},
            "J2": {"error": "Job not found"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let comparison = client
        .compare_filters(
            &JobId::new("J1"),
            &[FilterId::new("sepia"), FilterId::new("blur")],
        )
        .await
        .expect("comparison");
    assert_eq!(
        comparison["comparison_url"],
        json!("/static/outputs/J1_compare.png")
    );

    let batch = client
        .batch_metrics(&[JobId::new("J1"), JobId::new("J2")])
        .await
        .expect("batch");
    assert_eq!(batch["J1"]["ssim"], json!(0.8));
}
