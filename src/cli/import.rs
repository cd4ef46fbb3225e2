//! `pkgindex import` — bulk archive import.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use sqlx::PgPool;

use crate::error::Result;
use crate::services::import::{ImportOptions, ImportService};
use crate::storage::ArtifactStore;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Archives to import (e.g. foo-1.2.3.tar.gz bar-1.9.zip baz-2.2.egg)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// The group owner of the imported packages
    #[arg(long)]
    pub owner_group: String,

    /// Group given immediate download permission to the packages.
    /// WARNING: without it the packages are imported world-readable.
    #[arg(long)]
    pub download_perm_group: Option<String>,

    /// The user recorded as the uploader of the imported distributions
    #[arg(long)]
    pub upload_user: String,

    /// Accept archives without embedded metadata, deriving name/version
    /// from the filename (interactive)
    #[arg(long)]
    pub old_style: bool,
}

/// Run the import batch. Per-file failures are logged inside the service
/// and never abort the run.
pub async fn run(db: PgPool, store: Arc<dyn ArtifactStore>, args: ImportArgs) -> Result<()> {
    let service = ImportService::new(db, store);
    let options = ImportOptions {
        owner_group: args.owner_group,
        download_perm_group: args.download_perm_group,
        upload_user: args.upload_user,
        old_style: args.old_style,
    };

    let report = service.run(&args.files, &options).await?;
    println!(
        "Imported {} archive(s), {} failed, {} ignored",
        report.imported, report.failed, report.ignored
    );
    Ok(())
}
