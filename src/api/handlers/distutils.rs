//! Distutils-compatible registration and upload endpoint.
//!
//! Upload tools POST a multipart (or url-encoded) form to `/`; responses
//! are the short plain-text bodies the legacy protocol expects:
//!   200 "release registered" / "upload accepted"
//!   400 malformed request or unsupported metadata version
//!   403 authorization failure or duplicate upload
//!
//! Routes:
//!   POST /            - register a release / upload a distribution
//!   GET  /classifiers - newline-separated list of known classifiers

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::api::SharedState;
use crate::auth::{directory, extract_basic_credentials, ActingIdentity, AuthorizationGate};
use crate::error::AppError;
use crate::services::registry::{RegistryOutcome, RegistryService, UploadRequest, UploadedFile};

const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024; // 512 MB

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(register_or_upload))
        .route("/classifiers", get(list_classifiers))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Authenticate via Basic auth, returning the acting identity on success.
async fn authenticate(
    state: &SharedState,
    headers: &HeaderMap,
) -> Result<ActingIdentity, Response> {
    let (username, password) = extract_basic_credentials(headers).ok_or_else(|| {
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("WWW-Authenticate", "Basic realm=\"pkgindex\"")
            .body(Body::from("Authentication required"))
            .unwrap()
    })?;

    directory::resolve_identity(&state.db, &username, &password)
        .await
        .map_err(|e| e.into_response())?
        .ok_or_else(|| {
            Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("WWW-Authenticate", "Basic realm=\"pkgindex\"")
                .body(Body::from("Invalid credentials"))
                .unwrap()
        })
}

// ---------------------------------------------------------------------------
// POST / — register or upload
// ---------------------------------------------------------------------------

async fn register_or_upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    req: Request,
) -> Result<Response, Response> {
    let actor = authenticate(&state, &headers).await?;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let form = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| legacy_response(AppError::BadRequest(format!("Invalid multipart: {}", e))))?;
        parse_multipart(multipart).await.map_err(legacy_response)?
    } else {
        let bytes = axum::body::to_bytes(req.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| legacy_response(AppError::BadRequest(format!("Invalid body: {}", e))))?;
        parse_urlencoded(&bytes).map_err(legacy_response)?
    };

    let service = RegistryService::new(
        state.db.clone(),
        state.store.clone(),
        AuthorizationGate::new(state.config.global_ownership),
    );

    let outcome = service
        .register_or_upload(&actor, form)
        .await
        .map_err(legacy_response)?;

    let mut body = match &outcome {
        RegistryOutcome::Registered { .. } => "release registered".to_string(),
        RegistryOutcome::Uploaded { .. } => "upload accepted".to_string(),
    };
    if let Some(notice) = outcome.notice() {
        body.push('\n');
        body.push_str(notice);
    }

    Ok((StatusCode::OK, body).into_response())
}

/// Decode a multipart form into the multi-valued request representation.
/// Repeated fields (classifiers) accumulate; the `content` part carries the
/// artifact payload.
async fn parse_multipart(mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name.is_empty() {
            continue;
        }

        if name == "content" {
            let filename = field
                .file_name()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    AppError::BadRequest("Missing filename in content field".to_string())
                })?;
            let content = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid file: {}", e)))?;
            request.file = Some(UploadedFile { filename, content });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid field '{}': {}", name, e)))?;
            request.push(name, text);
        }
    }

    Ok(request)
}

/// Decode an url-encoded body (register-only; no file part is possible).
fn parse_urlencoded(bytes: &[u8]) -> Result<UploadRequest, AppError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
        .map_err(|e| AppError::BadRequest(format!("Invalid form body: {}", e)))?;

    let mut request = UploadRequest::default();
    for (name, value) in pairs {
        request.push(name, value);
    }
    Ok(request)
}

/// Map service errors onto the legacy wire statuses: 400 for malformed
/// requests, 403 for both authorization failures and duplicate uploads
/// (upload tools know no 409), 500 for everything else — a rolled-back
/// transaction is reported as a failure, never as a success-shaped body.
fn legacy_response(err: AppError) -> Response {
    let (status, body) = match &err {
        AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AppError::Forbidden(msg) | AppError::Conflict(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    };

    tracing::error!(error = %err, status = %status, "register/upload rejected");
    (status, body).into_response()
}

// ---------------------------------------------------------------------------
// GET /classifiers
// ---------------------------------------------------------------------------

async fn list_classifiers(State(state): State<SharedState>) -> Result<Response, Response> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM classifiers ORDER BY name")
        .fetch_all(&state.db)
        .await
        .map_err(|e| AppError::from(e).into_response())?;

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        names.join("\n"),
    )
        .into_response())
}
