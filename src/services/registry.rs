//! Registration/upload protocol state machine.
//!
//! Drives one request through
//! `Received -> Authorized -> Resolved(Package) -> Resolved(Release) ->
//! Validated(Metadata) -> (Committed | Deduplicated -> Stored -> Committed)`
//! inside a single database transaction, committed only at the terminal
//! success transition. Any rejection rolls back; no partial state is
//! observable to the caller.

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{directory, ActingIdentity, AuthorizationGate, PackageTarget};
use crate::error::{AppError, Result};
use crate::metadata::{self, PackageInfo};
use crate::models::distribution::Distribution;
use crate::models::group::{Group, ADD_PACKAGE};
use crate::models::package::Package;
use crate::models::release::Release;
use crate::storage::{ArtifactStore, ReleaseRef};

/// A decoded register/upload request: the multi-valued form fields plus the
/// optional artifact payload.
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub fields: IndexMap<String, Vec<String>>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Bytes,
}

impl UploadRequest {
    /// First value of a field, if present.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// All values of a field.
    pub fn list(&self, field: &str) -> &[String] {
        self.fields.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Append one field value, keeping earlier values of the same field.
    pub fn push(&mut self, field: impl Into<String>, value: String) {
        self.fields.entry(field.into()).or_default().push(value);
    }
}

/// Terminal success states of the protocol handler.
#[derive(Debug)]
pub enum RegistryOutcome {
    /// Metadata registered, no artifact payload.
    Registered { notice: Option<String> },
    /// Artifact stored and distribution recorded.
    Uploaded { notice: Option<String> },
}

impl RegistryOutcome {
    pub fn notice(&self) -> Option<&str> {
        match self {
            RegistryOutcome::Registered { notice } | RegistryOutcome::Uploaded { notice } => {
                notice.as_deref()
            }
        }
    }
}

/// Registration/upload service.
pub struct RegistryService {
    db: PgPool,
    store: Arc<dyn ArtifactStore>,
    gate: AuthorizationGate,
}

impl RegistryService {
    pub fn new(db: PgPool, store: Arc<dyn ArtifactStore>, gate: AuthorizationGate) -> Self {
        Self { db, store, gate }
    }

    /// Register a release and optionally store an uploaded distribution.
    pub async fn register_or_upload(
        &self,
        actor: &ActingIdentity,
        mut request: UploadRequest,
    ) -> Result<RegistryOutcome> {
        let file = request.file.take();

        let name = request.first("name").map(str::trim).unwrap_or("");
        if name.is_empty() {
            return Err(AppError::BadRequest("No package name specified.".into()));
        }

        let mut tx = self.db.begin().await?;

        // Received -> Authorized. The gate is consulted before any mutation;
        // it needs to know whether the package exists and who owns it.
        let existing = find_package(&mut tx, name).await?;
        match &existing {
            Some(package) => {
                let owners = owner_groups(&mut tx, &package.name).await?;
                self.gate.can_upload(
                    actor,
                    &PackageTarget::Existing {
                        owner_groups: owners.as_slice(),
                    },
                )?;
            }
            None => {
                let group_can_add_package = match self.gate.sole_group(actor) {
                    Ok(group) => {
                        directory::group_has_capability(&self.db, group.id, ADD_PACKAGE).await?
                    }
                    // The gate re-derives the precise group-count error below.
                    Err(_) => false,
                };
                self.gate.can_register(
                    actor,
                    &PackageTarget::New {
                        group_can_add_package,
                    },
                )?;
            }
        }

        // Authorized -> Resolved(Package). First-time registration grants
        // the creating group(s) ownership and download permission.
        let (package, package_created) = match existing {
            Some(package) => (package, false),
            None => {
                let package = create_package(&mut tx, name).await?;
                for group in self.creating_groups(actor)? {
                    grant_owner(&mut tx, &package.name, group.id).await?;
                    grant_download(&mut tx, &package.name, group.id).await?;
                }
                (package, true)
            }
        };

        // Resolved(Package) -> Resolved(Release)
        let version = request.first("version").map(str::trim).unwrap_or("");
        if version.is_empty() {
            return Err(AppError::BadRequest(
                "Release version and metadata version must be specified".into(),
            ));
        }
        let (release, _release_created) = ensure_release(&mut tx, &package.name, version).await?;

        // Resolved(Release) -> Validated(Metadata)
        let metadata_version = request
            .first("metadata_version")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(release.metadata_version.as_str())
            .to_string();
        if metadata_version.is_empty() {
            return Err(AppError::BadRequest(
                "Release version and metadata version must be specified".into(),
            ));
        }
        if metadata::fields(&metadata_version).is_none() {
            return Err(AppError::BadRequest(format!(
                "Metadata version must be one of: {}",
                metadata::SUPPORTED_VERSIONS.join(", ")
            )));
        }

        let metadata_version = effective_metadata_version(
            metadata_version,
            request.contains("classifiers") || request.contains("classifier"),
            request.contains("download_url"),
        );

        // The wire field is `classifiers`; the metadata field is singular.
        let mut incoming = request.fields.clone();
        if let Some(classifiers) = incoming.get("classifiers").cloned() {
            incoming.insert("classifier".to_string(), classifiers);
        }
        let package_info = metadata::filter_package_info(&incoming, &metadata_version)?;

        update_release_metadata(&mut tx, release.id, &metadata_version, &package_info).await?;

        for classifier in request.list("classifiers") {
            link_classifier(&mut tx, &package.name, classifier).await?;
        }

        let notice = package_created
            .then(|| self.onboarding_notice(&package.name, actor))
            .transpose()?;

        // Validated -> Committed (no file): a valid, complete terminal state.
        let Some(file) = file else {
            tx.commit().await?;
            info!(
                package = %package.name,
                version = %version,
                user = %actor.username,
                "release registered"
            );
            return Ok(RegistryOutcome::Registered { notice });
        };

        // Validated -> Deduplicated
        let filename = basename(&file.filename);
        if filename.is_empty() {
            return Err(AppError::BadRequest("Uploaded file has no name.".into()));
        }
        if release_has_filename(&mut tx, release.id, filename).await? {
            return Err(AppError::Conflict(
                "That file has already been uploaded...".into(),
            ));
        }

        // Deduplicated -> Stored. The filesystem write is not covered by the
        // database transaction: a failed commit after this point leaves an
        // orphan file, picked up by the offline verify sweep.
        let release_ref = ReleaseRef {
            package: &package.name,
            version,
        };
        let stored = self
            .store
            .write(release_ref, filename, file.content.clone())
            .await?;

        let md5_digest = request
            .first("md5_digest")
            .filter(|d| !d.is_empty())
            .unwrap_or(&stored.md5_digest)
            .to_string();

        // Stored -> Committed
        let inserted = insert_distribution(
            &mut tx,
            release.id,
            &stored.key,
            &md5_digest,
            request.first("filetype").filter(|v| !v.is_empty()).unwrap_or("sdist"),
            request.first("pyversion").unwrap_or(""),
            request.first("comment").unwrap_or(""),
            request.first("gpg_signature").unwrap_or(""),
            Some(actor.user_id),
        )
        .await;
        if let Err(e) = inserted {
            warn!(
                key = %stored.key,
                "distribution insert failed after artifact write; file is orphaned until the next verify sweep"
            );
            return Err(e);
        }
        tx.commit().await?;

        info!(
            package = %package.name,
            version = %version,
            filename = %filename,
            size = stored.size,
            user = %actor.username,
            "upload accepted"
        );
        Ok(RegistryOutcome::Uploaded { notice })
    }

    /// Groups granted ownership + download permission when this actor
    /// creates a package. Under global ownership the sole-group rule does
    /// not apply, so every membership is granted; a group-less actor
    /// creates an ownerless, public package.
    fn creating_groups<'a>(&self, actor: &'a ActingIdentity) -> Result<Vec<&'a Group>> {
        if self.gate.global_ownership {
            Ok(actor.groups.iter().collect())
        } else {
            Ok(vec![self.gate.sole_group(actor)?])
        }
    }

    fn onboarding_notice(&self, package: &str, actor: &ActingIdentity) -> Result<String> {
        let groups = self.creating_groups(actor)?;
        let access = if groups.is_empty() {
            "anyone (public download)".to_string()
        } else {
            groups
                .iter()
                .map(|g| g.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Ok(format!(
            "Package '{}' created. Groups with download access: {}. \
             Manage permissions at /packages/{}/permissions/",
            package, access, package
        ))
    }
}

/// The backward-compatibility upgrade rule: classifier tags and download
/// URLs are not legal under metadata version 1.0, so their presence
/// silently upgrades the effective version to 1.1.
pub fn effective_metadata_version(
    version: String,
    has_classifiers: bool,
    has_download_url: bool,
) -> String {
    if version == "1.0" && (has_classifiers || has_download_url) {
        "1.1".to_string()
    } else {
        version
    }
}

fn basename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
}

// ---------------------------------------------------------------------------
// Transaction-scoped persistence helpers, shared with the bulk importer
// ---------------------------------------------------------------------------

pub(crate) async fn find_package(conn: &mut PgConnection, name: &str) -> Result<Option<Package>> {
    let package: Option<Package> = sqlx::query_as(
        "SELECT name, auto_hide, allow_comments FROM packages WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(conn)
    .await?;
    Ok(package)
}

/// Create the package if it does not exist and return the current row.
///
/// Two concurrent first-writers race here; `ON CONFLICT DO NOTHING` plus the
/// re-fetch makes the loser observe the winner's row instead of failing.
pub(crate) async fn create_package(conn: &mut PgConnection, name: &str) -> Result<Package> {
    sqlx::query("INSERT INTO packages (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    find_package(conn, name)
        .await?
        .ok_or_else(|| AppError::Internal(format!("package '{}' vanished after insert", name)))
}

pub(crate) async fn owner_groups(conn: &mut PgConnection, package: &str) -> Result<Vec<Group>> {
    let groups: Vec<Group> = sqlx::query_as(
        r#"
        SELECT g.id, g.name
        FROM groups g
        JOIN package_owners po ON po.group_id = g.id
        WHERE po.package_name = $1
        ORDER BY g.name
        "#,
    )
    .bind(package)
    .fetch_all(conn)
    .await?;
    Ok(groups)
}

pub(crate) async fn grant_owner(
    conn: &mut PgConnection,
    package: &str,
    group_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO package_owners (package_name, group_id) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(package)
    .bind(group_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn grant_download(
    conn: &mut PgConnection,
    package: &str,
    group_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO package_download_permissions (package_name, group_id) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(package)
    .bind(group_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Fetch or create the release for `(package, version)`. Same conflict
/// policy as [`create_package`].
pub(crate) async fn ensure_release(
    conn: &mut PgConnection,
    package: &str,
    version: &str,
) -> Result<(Release, bool)> {
    let existing: Option<Release> = fetch_release(&mut *conn, package, version).await?;
    if let Some(release) = existing {
        return Ok((release, false));
    }

    sqlx::query(
        "INSERT INTO releases (package_name, version) VALUES ($1, $2)
         ON CONFLICT (package_name, version) DO NOTHING",
    )
    .bind(package)
    .bind(version)
    .execute(&mut *conn)
    .await?;

    let release = fetch_release(conn, package, version).await?.ok_or_else(|| {
        AppError::Internal(format!("release {} {} vanished after insert", package, version))
    })?;
    Ok((release, true))
}

async fn fetch_release(
    conn: &mut PgConnection,
    package: &str,
    version: &str,
) -> Result<Option<Release>> {
    let release: Option<Release> = sqlx::query_as(
        r#"
        SELECT id, package_name, version, metadata_version, package_info, hidden, created_at
        FROM releases
        WHERE package_name = $1 AND version = $2
        "#,
    )
    .bind(package)
    .bind(version)
    .fetch_optional(conn)
    .await?;
    Ok(release)
}

pub(crate) async fn update_release_metadata(
    conn: &mut PgConnection,
    release_id: Uuid,
    metadata_version: &str,
    package_info: &PackageInfo,
) -> Result<()> {
    // Bound as text and cast: the column is JSON (not JSONB) so the field
    // order of the mapping survives.
    sqlx::query(
        "UPDATE releases SET metadata_version = $1, package_info = $2::json WHERE id = $3",
    )
    .bind(metadata_version)
    .bind(serde_json::to_string(package_info)?)
    .bind(release_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Create the classifier row on first use and attach it to the package.
pub(crate) async fn link_classifier(
    conn: &mut PgConnection,
    package: &str,
    classifier: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO classifiers (name) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(classifier)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "INSERT INTO package_classifiers (package_name, classifier_name) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(package)
    .bind(classifier)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn release_has_filename(
    conn: &mut PgConnection,
    release_id: Uuid,
    filename: &str,
) -> Result<bool> {
    let distributions: Vec<Distribution> = sqlx::query_as(
        r#"
        SELECT id, release_id, content, md5_digest, filetype, pyversion, comment,
               signature, uploader_id, created_at
        FROM distributions
        WHERE release_id = $1
        "#,
    )
    .bind(release_id)
    .fetch_all(conn)
    .await?;

    Ok(distributions.iter().any(|d| d.filename() == filename))
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_distribution(
    conn: &mut PgConnection,
    release_id: Uuid,
    content: &str,
    md5_digest: &str,
    filetype: &str,
    pyversion: &str,
    comment: &str,
    signature: &str,
    uploader_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO distributions
            (release_id, content, md5_digest, filetype, pyversion, comment, signature, uploader_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(release_id)
    .bind(content)
    .bind(md5_digest)
    .bind(filetype)
    .bind(pyversion)
    .bind(comment)
    .bind(signature)
    .bind(uploader_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_metadata_version_upgrade() {
        // Classifiers or a download URL force 1.0 up to 1.1
        assert_eq!(
            effective_metadata_version("1.0".into(), true, false),
            "1.1"
        );
        assert_eq!(
            effective_metadata_version("1.0".into(), false, true),
            "1.1"
        );
        // No trigger fields: unchanged
        assert_eq!(
            effective_metadata_version("1.0".into(), false, false),
            "1.0"
        );
        // Newer versions never change
        assert_eq!(effective_metadata_version("1.2".into(), true, true), "1.2");
    }

    #[test]
    fn test_basename_strips_path_components() {
        assert_eq!(basename("demo-lib-1.0.tar.gz"), "demo-lib-1.0.tar.gz");
        assert_eq!(basename("/tmp/demo-lib-1.0.tar.gz"), "demo-lib-1.0.tar.gz");
        assert_eq!(basename("C:\\dists\\demo.whl"), "demo.whl");
    }

    #[test]
    fn test_upload_request_multi_values() {
        let mut request = UploadRequest::default();
        request.push("classifiers", "A :: B".to_string());
        request.push("classifiers", "C :: D".to_string());
        request.push("name", "demo-lib".to_string());

        assert_eq!(request.first("name"), Some("demo-lib"));
        assert_eq!(request.list("classifiers").len(), 2);
        assert!(request.contains("classifiers"));
        assert!(!request.contains("version"));
    }
}
