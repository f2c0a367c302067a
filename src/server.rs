//! HTTP server setup and routing

use crate::error::ErrorKind;
use crate::metrics::MetricsSnapshot;
use crate::processor::{ProcessingFailure, RiskPipeline};
use crate::types::PredictionRow;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub pipeline: Arc<RiskPipeline>,
}

/// Build the router with all routes
pub fn build_router(ctx: AppContext, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process", post(process_upload))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Bind `addr` and serve until the process stops
pub async fn run(addr: &str, ctx: AppContext, max_upload_bytes: usize) -> anyhow::Result<()> {
    let app = build_router(ctx, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "Ok" }))
}

async fn metrics(State(ctx): State<AppContext>) -> Json<MetricsSnapshot> {
    Json(ctx.pipeline.metrics().snapshot())
}

#[derive(Debug, Serialize)]
struct SuccessBody {
    res: &'static str,
    message: &'static str,
    results: Vec<PredictionRow>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    res: &'static str,
    kind: Option<ErrorKind>,
    error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    supplied_columns: Option<Vec<String>>,
}

fn error_response(status: StatusCode, kind: Option<ErrorKind>, message: String) -> Response {
    let body = ErrorBody {
        res: "Error",
        kind,
        error_message: message,
        supplied_columns: None,
    };
    (status, Json(body)).into_response()
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnsupportedFileType
        | ErrorKind::EmptyInput
        | ErrorKind::CsvRead
        | ErrorKind::MalformedRow => StatusCode::BAD_REQUEST,
        ErrorKind::SchemaValidation
        | ErrorKind::MissingIdentifier
        | ErrorKind::DuplicateIdentifier
        | ErrorKind::EmptyAfterCleaning
        | ErrorKind::MissingFeature => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::UploadStorage
        | ErrorKind::ModelArtifactMissing
        | ErrorKind::ModelArtifactInvalid
        | ErrorKind::Inference => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ProcessingFailure {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = ErrorBody {
            res: "Error",
            kind: Some(kind),
            error_message: self.to_string(),
            supplied_columns: self.supplied_columns,
        };
        (status_for(kind), Json(body)).into_response()
    }
}

/// Score an uploaded CSV (multipart field `file`)
async fn process_upload(State(ctx): State<AppContext>, mut multipart: Multipart) -> Response {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((filename, bytes));
                        break;
                    }
                    Err(e) => {
                        return error_response(StatusCode::BAD_REQUEST, None, e.body_text());
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, None, e.body_text()),
        }
    }

    let Some((filename, bytes)) = upload else {
        warn!("Upload without a file field");
        return error_response(
            StatusCode::BAD_REQUEST,
            None,
            "Missing multipart field \"file\"".to_string(),
        );
    };

    let pipeline = ctx.pipeline.clone();
    let outcome =
        tokio::task::spawn_blocking(move || pipeline.process(&filename, &bytes)).await;

    match outcome {
        Ok(Ok(result)) => Json(SuccessBody {
            res: "Success",
            message: "File processed successfully",
            results: result.presentation(),
        })
        .into_response(),
        Ok(Err(failure)) => failure.into_response(),
        Err(e) => {
            error!(error = %e, "Processing task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                format!("Unexpected error: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::tests::{row, HEADER};
    use crate::processor::tests::pipeline_in;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::util::ServiceExt; // for `oneshot`

    const BOUNDARY: &str = "X-HEART-RISK-BOUNDARY";

    fn app(dir: &std::path::Path) -> Router {
        let ctx = AppContext {
            pipeline: Arc::new(pipeline_in(dir)),
        };
        build_router(ctx, 1024 * 1024)
    }

    fn upload_request(filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
Content-Type: text/csv\r\n\r\n\
{content}\r\n\
--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/process")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn extract_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(dir.path()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response).await;
        assert_eq!(body["status"], "Ok");
    }

    #[tokio::test]
    async fn test_process_endpoint_scores_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv = format!("{HEADER}\n{}\n{}", row("11", "0.1", "0.1"), row("12", "0.0", "0.0"));
        let response = app(dir.path())
            .oneshot(upload_request("patients.csv", &csv))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response).await;
        assert_eq!(body["res"], "Success");
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], "11");
        let proba = results[0]["proba"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&proba));

        // Upload removed once the request completes
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_process_endpoint_reports_schema_errors() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload_request("patients.csv", "id,Age\n1,0.3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = extract_json(response).await;
        assert_eq!(body["kind"], "schema_validation");
        assert_eq!(body["supplied_columns"], serde_json::json!(["id", "Age"]));
        assert!(body["error_message"].as_str().unwrap().contains("Uploaded columns"));
    }

    #[tokio::test]
    async fn test_process_endpoint_rejects_non_csv() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload_request("patients.json", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = extract_json(response).await;
        assert_eq!(body["kind"], "unsupported_file_type");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_process_endpoint_rejects_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        let csv = format!("{HEADER}\n{},extra", row("11", "0.1", "0.1"));
        let response = app(dir.path())
            .oneshot(upload_request("patients.csv", &csv))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = extract_json(response).await;
        assert_eq!(body["kind"], "malformed_row");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reflects_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let csv = format!("{HEADER}\n{}\n{}", row("11", "0.1", "0.1"), row("12", "", "0.0"));

        let response = app
            .clone()
            .oneshot(upload_request("patients.csv", &csv))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app
            .clone()
            .oneshot(upload_request("patients.txt", "id\n1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = extract_json(response).await;
        assert_eq!(body["files_processed"], 1);
        assert_eq!(body["files_failed"], 1);
        assert_eq!(body["rows_scored"], 1);
        assert_eq!(body["rows_dropped"], 1);
        assert_eq!(body["failures_by_kind"]["unsupported_file_type"], 1);
    }
}
