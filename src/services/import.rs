//! Bulk import reconciler.
//!
//! Offline batch variant of the registration/upload logic, driven from
//! local archive files instead of network requests. Ownership and download
//! permissions come from CLI-supplied groups rather than the acting
//! identity's memberships. Every per-file failure is logged and the batch
//! continues; no single archive can abort the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::auth::directory;
use crate::error::{AppError, Result};
use crate::formats::pkginfo::{self, ArchiveMetadata};
use crate::formats::classify_archive;
use crate::metadata;
use crate::models::group::Group;
use crate::models::user::User;
use crate::services::registry;
use crate::storage::{ArtifactStore, ReleaseRef};

/// Batch import options.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Group that becomes the owner of imported packages.
    pub owner_group: String,
    /// Group given immediate download permission. None means the packages
    /// are imported world-readable.
    pub download_perm_group: Option<String>,
    /// User recorded as the uploader of every distribution.
    pub upload_user: String,
    /// Accept archives without embedded metadata, deriving name/version
    /// from the filename after interactive confirmation.
    pub old_style: bool,
}

/// Per-batch counters.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: usize,
    pub ignored: usize,
}

enum ImportStatus {
    Imported {
        package_created: bool,
        release_created: bool,
    },
    Ignored,
}

/// Bulk import service.
pub struct ImportService {
    db: PgPool,
    store: Arc<dyn ArtifactStore>,
}

impl ImportService {
    pub fn new(db: PgPool, store: Arc<dyn ArtifactStore>) -> Self {
        Self { db, store }
    }

    /// Import a list of local archives. Returns counters; individual
    /// failures are logged, never propagated.
    pub async fn run(&self, files: &[PathBuf], options: &ImportOptions) -> Result<ImportReport> {
        let owner = directory::group_by_name(&self.db, &options.owner_group)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Unknown owner group: {}", options.owner_group))
            })?;

        let download_perm = match &options.download_perm_group {
            Some(name) => Some(directory::group_by_name(&self.db, name).await?.ok_or_else(
                || AppError::BadRequest(format!("Unknown download permission group: {}", name)),
            )?),
            None => {
                warn!("No download permission group given; packages will be world-readable");
                None
            }
        };

        let uploader = directory::user_by_name(&self.db, &options.upload_user)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Unknown upload user: {}", options.upload_user))
            })?;

        let mut report = ImportReport::default();

        for path in files {
            match self
                .import_one(path, &owner, download_perm.as_ref(), &uploader, options)
                .await
            {
                Ok(ImportStatus::Imported {
                    package_created,
                    release_created,
                }) => {
                    report.imported += 1;
                    info!(
                        file = %path.display(),
                        package_created,
                        release_created,
                        "Importing: Success"
                    );
                }
                Ok(ImportStatus::Ignored) => {
                    report.ignored += 1;
                    warn!(file = %path.display(), "Ignoring");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(file = %path.display(), error = %e, "Importing: FAILED");
                }
            }
        }

        info!(
            imported = report.imported,
            failed = report.failed,
            ignored = report.ignored,
            "Import finished"
        );
        Ok(report)
    }

    async fn import_one(
        &self,
        path: &Path,
        owner: &Group,
        download_perm: Option<&Group>,
        uploader: &User,
        options: &ImportOptions,
    ) -> Result<ImportStatus> {
        let Some(filetype) = classify_archive(path) else {
            return Ok(ImportStatus::Ignored);
        };

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::BadRequest(format!("Unreadable path: {}", path.display())))?
            .to_string();

        let archive = match pkginfo::read_archive(path, filetype) {
            Ok(meta) => meta,
            Err(e) if options.old_style => {
                let Some((name, version)) = pkginfo::old_style_name_version(&filename) else {
                    return Err(e);
                };
                if !confirm(&format!(
                    "No metadata in {}; import as '{}' version '{}'? [y/N] ",
                    filename, name, version
                ))? {
                    return Ok(ImportStatus::Ignored);
                }
                ArchiveMetadata {
                    name,
                    version,
                    metadata_version: "1.0".to_string(),
                    fields: IndexMap::new(),
                }
            }
            Err(e) => return Err(e),
        };

        let package_info = metadata::filter_package_info(&archive.fields, &archive.metadata_version)?;
        let content = Bytes::from(tokio::fs::read(path).await?);

        let mut tx = self.db.begin().await?;

        let (package, package_created) =
            match registry::find_package(&mut tx, &archive.name).await? {
                Some(package) => (package, false),
                None => {
                    let package = registry::create_package(&mut tx, &archive.name).await?;
                    registry::grant_owner(&mut tx, &package.name, owner.id).await?;
                    if let Some(group) = download_perm {
                        registry::grant_download(&mut tx, &package.name, group.id).await?;
                    }
                    (package, true)
                }
            };

        let (release, release_created) =
            registry::ensure_release(&mut tx, &package.name, &archive.version).await?;
        registry::update_release_metadata(
            &mut tx,
            release.id,
            &archive.metadata_version,
            &package_info,
        )
        .await?;
        for classifier in package_info.get_list("classifier") {
            registry::link_classifier(&mut tx, &package.name, classifier).await?;
        }

        if registry::release_has_filename(&mut tx, release.id, &filename).await? {
            return Err(AppError::Conflict(format!(
                "'{}' already uploaded for {} {}",
                filename, package.name, archive.version
            )));
        }

        let stored = self
            .store
            .write(
                ReleaseRef {
                    package: &package.name,
                    version: &archive.version,
                },
                &filename,
                content,
            )
            .await?;

        registry::insert_distribution(
            &mut tx,
            release.id,
            &stored.key,
            &stored.md5_digest,
            filetype.as_str(),
            "",
            "",
            "",
            Some(uploader.id),
        )
        .await?;

        tx.commit().await?;
        Ok(ImportStatus::Imported {
            package_created,
            release_created,
        })
    }
}

/// Blocking yes/no prompt on stdin, used only by the interactive old-style
/// import path.
fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
