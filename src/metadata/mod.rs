//! Metadata schema registry.
//!
//! Maps a metadata-format version string ("1.0", "1.1", "1.2") to the set of
//! recognized field names for that version, and normalizes incoming
//! multi-valued metadata against it. The field sets are static
//! configuration, taken from the PEP 241/314/345 metadata specifications as
//! upload tools actually emit them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Metadata-format versions this index accepts, oldest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0", "1.1", "1.2"];

/// Placeholder emitted by generic upload tooling for fields the author never
/// filled in. Never persisted as real data.
pub const UNKNOWN_SENTINEL: &str = "UNKNOWN";

const FIELDS_1_0: &[&str] = &[
    "platform",
    "summary",
    "description",
    "keywords",
    "home_page",
    "author",
    "author_email",
    "license",
];

const FIELDS_1_1: &[&str] = &[
    "platform",
    "supported_platform",
    "summary",
    "description",
    "keywords",
    "home_page",
    "download_url",
    "author",
    "author_email",
    "license",
    "classifier",
    "requires",
    "provides",
    "obsoletes",
];

const FIELDS_1_2: &[&str] = &[
    "platform",
    "supported_platform",
    "summary",
    "description",
    "keywords",
    "home_page",
    "download_url",
    "author",
    "author_email",
    "maintainer",
    "maintainer_email",
    "license",
    "classifier",
    "requires_dist",
    "provides_dist",
    "obsoletes_dist",
    "requires_python",
    "requires_external",
    "project_url",
];

/// Wire-format field set for a metadata version, or None if the version is
/// not registered.
pub fn fields(version: &str) -> Option<&'static [&'static str]> {
    match version {
        "1.0" => Some(FIELDS_1_0),
        "1.1" => Some(FIELDS_1_1),
        "1.2" => Some(FIELDS_1_2),
        _ => None,
    }
}

/// The specification calls the field `platform` but historical clients and
/// metadata readers pluralize it. Wire keys are folded onto the internal
/// name here, exactly once.
pub fn normalize_field_name(name: &str) -> &str {
    if name == "platform" {
        "platforms"
    } else {
        name
    }
}

/// Internal (storage) field set for a metadata version: the wire set with
/// the `platform` rename applied.
pub fn resolved_fields(version: &str) -> Result<Vec<&'static str>> {
    let wire = fields(version).ok_or_else(|| unsupported_version(version))?;
    Ok(wire.iter().map(|f| normalize_field_name(f)).collect())
}

fn unsupported_version(version: &str) -> AppError {
    AppError::BadRequest(format!(
        "Metadata version must be one of: {} (got '{}')",
        SUPPORTED_VERSIONS.join(", "),
        version
    ))
}

/// Ordered multi-valued metadata mapping for one release: field name to one
/// or more string values (classifiers and platforms legitimately repeat).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageInfo(pub IndexMap<String, Vec<String>>);

impl PackageInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for a field, if any.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// All values for a field.
    pub fn get_list(&self, field: &str) -> &[String] {
        self.0.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn set_list(&mut self, field: impl Into<String>, values: Vec<String>) {
        self.0.insert(field.into(), values);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Filter an incoming multi-valued mapping down to the fields recognized
/// for `version`.
///
/// Wire keys are normalized (`platform` -> `platforms`), fields outside the
/// version's set are silently dropped, and any value equal to the `UNKNOWN`
/// sentinel is stripped from its list. Input order is preserved.
pub fn filter_package_info(
    input: &IndexMap<String, Vec<String>>,
    version: &str,
) -> Result<PackageInfo> {
    let allowed = resolved_fields(version)?;
    let mut info = PackageInfo::new();

    for (key, values) in input {
        let key = normalize_field_name(key);
        if !allowed.contains(&key) {
            continue;
        }
        let values: Vec<String> = values
            .iter()
            .filter(|v| v.as_str() != UNKNOWN_SENTINEL)
            .cloned()
            .collect();
        info.set_list(key, values);
    }

    Ok(info)
}
