use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use gmf_forms::error::AppError;
use gmf_forms::workflows::stamp_request::{
    MailSender, SubmissionFields, SubmissionFiles, SubmissionService,
};
use serde_json::json;

use crate::infra::{stage_upload, AppState};

/// File slots accepted from the form; everything else in the body is
/// treated as a text field.
const FILE_FIELDS: [&str; 6] = [
    "divisionHeadSign",
    "userSign",
    "qaSign",
    "license",
    "cv",
    "authLetter",
];

/// Signatures plus three document scans comfortably fit; anything bigger
/// is a misuse of the form.
const MAX_SUBMISSION_BYTES: usize = 25 * 1024 * 1024;

pub(crate) fn with_submission_routes<M>(service: Arc<SubmissionService<M>>) -> axum::Router
where
    M: MailSender + 'static,
{
    axum::Router::new()
        .route(
            "/api/v1/submissions",
            axum::routing::post(submit_endpoint::<M>),
        )
        .layer(DefaultBodyLimit::max(MAX_SUBMISSION_BYTES))
        .with_state(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Parse the multipart body into fields/files, stage uploads to disk, and
/// hand the submission to the pipeline.
pub(crate) async fn submit_endpoint<M>(
    State(service): State<Arc<SubmissionService<M>>>,
    mut multipart: Multipart,
) -> Response
where
    M: MailSender + 'static,
{
    let mut fields = SubmissionFields::default();
    let mut files = SubmissionFiles::default();

    loop {
        let part = match multipart.next_field().await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "multipart parse failed");
                return bad_request("malformed multipart form");
            }
        };

        let name = part.name().unwrap_or_default().to_string();
        if FILE_FIELDS.contains(&name.as_str()) {
            let original_filename = part.file_name().map(str::to_string);
            let bytes = match part.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(field = %name, error = %err, "multipart file read failed");
                    return bad_request("malformed multipart form");
                }
            };
            // Browsers submit empty parts for untouched file inputs.
            if bytes.is_empty() {
                continue;
            }
            match stage_upload(&name, original_filename, &bytes) {
                Ok(staged) => files.apply(&name, staged),
                Err(err) => return AppError::Io(err).into_response(),
            }
        } else {
            match part.text().await {
                Ok(value) => fields.apply(&name, value),
                Err(err) => {
                    tracing::warn!(field = %name, error = %err, "multipart text read failed");
                    return bad_request("malformed multipart form");
                }
            }
        }
    }

    match service.submit(fields, files).await {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                tracing::warn!(warning = %warning, "submission completed with warning");
            }
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "message": "Form processed and email sent",
                    "pdf": outcome.pdf_filename,
                })),
            )
                .into_response()
        }
        Err(err) => AppError::from(err).into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}
