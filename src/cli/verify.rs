//! `pkgindex verify` — offline consistency sweep.

use std::sync::Arc;

use sqlx::PgPool;

use crate::error::Result;
use crate::services::verify::verify_all;
use crate::storage::ArtifactStore;

pub async fn run(db: PgPool, store: Arc<dyn ArtifactStore>) -> Result<()> {
    let report = verify_all(&db, store.as_ref()).await?;
    println!(
        "{}/{} distributions correct ({} missing, {} digest mismatches)",
        report.okay,
        report.total(),
        report.missing,
        report.mismatched
    );
    Ok(())
}
