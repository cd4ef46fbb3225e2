//! Distribution download endpoint.
//!
//! Routes (mounted under `/dists`):
//!   GET /:package/:version/:filename - download one distribution file
//!
//! A package with an empty download-permission set is public; otherwise the
//! requester must authenticate and their primary group must hold download
//! permission.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::api::SharedState;
use crate::auth::{directory, extract_basic_credentials};
use crate::error::AppError;
use crate::models::group::Group;

pub fn router() -> Router<SharedState> {
    Router::new().route("/:package/:version/:filename", get(download))
}

async fn download(
    State(state): State<SharedState>,
    Path((package, version, filename)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let key = format!("{}/{}/{}", package, version, filename);

    // The distribution row must exist; the store alone is not authoritative.
    let exists: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT 1
        FROM distributions d
        JOIN releases r ON r.id = d.release_id
        WHERE r.package_name = $1 AND r.version = $2 AND d.content = $3
        "#,
    )
    .bind(&package)
    .bind(&version)
    .bind(&key)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from(e).into_response())?;

    if exists.is_none() {
        return Err((StatusCode::NOT_FOUND, "File not found").into_response());
    }

    let permissions: Vec<Group> = sqlx::query_as(
        r#"
        SELECT g.id, g.name
        FROM groups g
        JOIN package_download_permissions pdp ON pdp.group_id = g.id
        WHERE pdp.package_name = $1
        "#,
    )
    .bind(&package)
    .fetch_all(&state.db)
    .await
    .map_err(|e| AppError::from(e).into_response())?;

    let mut username = "Anonymous".to_string();

    // Empty permission set means anonymous access is allowed.
    if !permissions.is_empty() {
        let Some((user, pass)) = extract_basic_credentials(&headers) else {
            return Err(Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .header("WWW-Authenticate", "Basic realm=\"pkgindex\"")
                .body(Body::from("Authentication required"))
                .unwrap());
        };

        let identity = directory::resolve_identity(&state.db, &user, &pass)
            .await
            .map_err(|e| e.into_response())?;

        let allowed = identity.as_ref().is_some_and(|actor| {
            actor
                .primary_group()
                .is_some_and(|g| permissions.iter().any(|p| p.id == g.id))
        });

        if !allowed {
            info!(user = %user, package = %package, "download permission denied");
            return Err((
                StatusCode::FORBIDDEN,
                format!("You are not authorised to download {}", package),
            )
                .into_response());
        }
        username = user;
    }

    let content = state
        .store
        .read(&key)
        .await
        .map_err(|e| e.into_response())?;

    info!(user = %username, package = %package, file = %filename, "downloaded");

    let content_type = if filename.ends_with(".whl") || filename.ends_with(".egg") {
        "application/zip"
    } else if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        "application/gzip"
    } else {
        "application/octet-stream"
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .header(CONTENT_LENGTH, content.len().to_string())
        .body(Body::from(content))
        .unwrap())
}
