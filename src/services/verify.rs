//! Offline consistency sweep.
//!
//! Walks every distribution row and checks that the stored file exists and
//! still matches its recorded MD5 digest. Detects the accepted
//! inconsistency window between filesystem writes and database commits;
//! runs out-of-band, never on the upload path.

use sqlx::PgPool;
use tracing::{error, info};

use crate::error::{AppError, Result};
use crate::storage::ArtifactStore;

/// Result of one verification sweep.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub okay: usize,
    pub missing: usize,
    pub mismatched: usize,
}

impl VerifyReport {
    pub fn total(&self) -> usize {
        self.okay + self.missing + self.mismatched
    }
}

/// Check every distribution against the artifact store.
pub async fn verify_all(db: &PgPool, store: &dyn ArtifactStore) -> Result<VerifyReport> {
    info!("Started verification");

    let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT d.content, d.md5_digest, r.package_name, r.version, d.filetype
        FROM distributions d
        JOIN releases r ON r.id = d.release_id
        ORDER BY r.package_name, r.version
        "#,
    )
    .fetch_all(db)
    .await?;

    let mut report = VerifyReport::default();

    for (content, md5_digest, package, version, filetype) in &rows {
        match store.verify(content, md5_digest).await {
            Ok(true) => report.okay += 1,
            Ok(false) => {
                report.mismatched += 1;
                error!(
                    package = %package,
                    version = %version,
                    filetype = %filetype,
                    path = %content,
                    "Distribution md5 mismatch"
                );
            }
            Err(AppError::NotFound(_)) => {
                report.missing += 1;
                error!(
                    package = %package,
                    version = %version,
                    filetype = %filetype,
                    path = %content,
                    "Distribution not found"
                );
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Finished verification: {}/{} correct",
        report.okay,
        report.total()
    );
    Ok(report)
}
