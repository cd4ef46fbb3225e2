//! Package and classifier models.

use serde::Serialize;
use sqlx::FromRow;

/// Package entity. The name is the primary key and is case-sensitive.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Package {
    pub name: String,
    /// Hide older releases automatically when a new one is registered
    pub auto_hide: bool,
    pub allow_comments: bool,
}

/// A flat taxonomy tag, created lazily on first use and attached to
/// packages many-to-many.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Classifier {
    pub name: String,
}
