//! Distribution model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One uploaded artifact file belonging to a release.
///
/// `content` is the storage key under the artifact store
/// (`<package>/<version>/<filename>`). The signature blob is stored
/// opaquely and never verified here.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Distribution {
    pub id: Uuid,
    pub release_id: Uuid,
    pub content: String,
    pub md5_digest: String,
    pub filetype: String,
    pub pyversion: String,
    pub comment: String,
    #[serde(skip_serializing)]
    pub signature: String,
    pub uploader_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Distribution {
    /// Base filename of the stored content, for duplicate-upload checks.
    pub fn filename(&self) -> &str {
        self.content.rsplit('/').next().unwrap_or(&self.content)
    }
}

/// Known distribution file types. The database column stays free-form text
/// (the protocol passes arbitrary strings through); this enum covers the
/// classifications the importer assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filetype {
    /// Source distribution (.tar.gz, .tgz, .zip)
    Sdist,
    /// Built distribution (.egg, .whl)
    Bdist,
}

impl Filetype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Filetype::Sdist => "sdist",
            Filetype::Bdist => "bdist",
        }
    }
}
