//! Release model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::metadata::PackageInfo;

/// One version of a package, with its own metadata.
///
/// `package_info` is the ordered multi-valued metadata mapping; its keys are
/// restricted to the field set of `metadata_version`. The column is plain
/// `JSON` so that insertion order survives the round trip.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Release {
    pub id: Uuid,
    pub package_name: String,
    pub version: String,
    pub metadata_version: String,
    pub package_info: Json<PackageInfo>,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}
