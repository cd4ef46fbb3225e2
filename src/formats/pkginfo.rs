//! PKG-INFO / METADATA extraction from distribution archives.
//!
//! Source distributions (gzipped tarballs, zips) carry an RFC-822 style
//! `PKG-INFO` file; built distributions (eggs, wheels) carry
//! `EGG-INFO/PKG-INFO` or `*.dist-info/METADATA`. Both reduce to the same
//! ordered multi-valued field mapping keyed by the schema registry's wire
//! field names.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use indexmap::IndexMap;
use tar::Archive;

use crate::error::{AppError, Result};
use crate::models::distribution::Filetype;

/// Metadata read out of one distribution archive.
#[derive(Debug, Clone)]
pub struct ArchiveMetadata {
    pub name: String,
    pub version: String,
    pub metadata_version: String,
    /// Remaining fields, wire-named (`platform`, `classifier`, ...), in
    /// file order.
    pub fields: IndexMap<String, Vec<String>>,
}

/// Read name/version/metadata out of an archive on disk.
pub fn read_archive(path: &Path, filetype: Filetype) -> Result<ArchiveMetadata> {
    let bytes = std::fs::read(path)?;
    match filetype {
        Filetype::Sdist => extract_sdist(&bytes, path),
        Filetype::Bdist => extract_bdist(&bytes),
    }
}

fn extract_sdist(content: &[u8], path: &Path) -> Result<ArchiveMetadata> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

    if is_zip {
        return find_in_zip(content, |name| name.ends_with("PKG-INFO"));
    }

    let gz = GzDecoder::new(content);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| AppError::BadRequest(format!("Invalid tarball: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| AppError::BadRequest(format!("Invalid tarball entry: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| AppError::BadRequest(format!("Invalid path in tarball: {}", e)))?
            .to_path_buf();

        if entry_path.ends_with("PKG-INFO") {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| AppError::BadRequest(format!("Failed to read PKG-INFO: {}", e)))?;
            return parse_pkg_info(&text);
        }
    }

    Err(AppError::BadRequest(
        "PKG-INFO not found in source distribution".to_string(),
    ))
}

fn extract_bdist(content: &[u8]) -> Result<ArchiveMetadata> {
    // Eggs and wheels are both zip archives; the metadata file name differs.
    find_in_zip(content, |name| {
        name.ends_with("EGG-INFO/PKG-INFO")
            || (name.contains(".dist-info/") && name.ends_with("METADATA"))
    })
}

fn find_in_zip(content: &[u8], matches: impl Fn(&str) -> bool) -> Result<ArchiveMetadata> {
    let cursor = std::io::Cursor::new(content);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| AppError::BadRequest(format!("Invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| AppError::BadRequest(format!("Failed to read zip entry: {}", e)))?;
        let name = file.name().to_string();

        if matches(&name) {
            let mut text = String::new();
            file.read_to_string(&mut text)
                .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
            return parse_pkg_info(&text);
        }
    }

    Err(AppError::BadRequest(
        "No package metadata found in archive".to_string(),
    ))
}

/// Parse RFC-822 style PKG-INFO / METADATA content.
///
/// Repeated headers (Classifier, Platform, ...) accumulate; continuation
/// lines are folded into the previous value. Header names map onto the
/// registry's wire field names (`Home-page` -> `home_page`).
pub fn parse_pkg_info(content: &str) -> Result<ArchiveMetadata> {
    let mut fields: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut current_key: Option<String> = None;
    let mut current_value = String::new();

    let mut flush = |key: Option<String>, value: &str, fields: &mut IndexMap<String, Vec<String>>| {
        if let Some(key) = key {
            fields.entry(key).or_default().push(value.to_string());
        }
    };

    for line in content.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if current_key.is_some() {
                current_value.push('\n');
                current_value.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            flush(current_key.take(), &current_value, &mut fields);
            current_key = Some(field_name(&line[..colon_pos]));
            current_value = line[colon_pos + 1..].trim().to_string();
        } else if line.is_empty() {
            // Blank line ends the header block; the body (long description)
            // is not part of the field mapping.
            flush(current_key.take(), &current_value, &mut fields);
            break;
        }
    }
    flush(current_key.take(), &current_value, &mut fields);

    let name = fields
        .shift_remove("name")
        .and_then(|v| v.into_iter().next())
        .ok_or_else(|| AppError::BadRequest("Archive metadata missing Name field".to_string()))?;
    let version = fields
        .shift_remove("version")
        .and_then(|v| v.into_iter().next())
        .ok_or_else(|| {
            AppError::BadRequest("Archive metadata missing Version field".to_string())
        })?;
    let metadata_version = fields
        .shift_remove("metadata_version")
        .and_then(|v| v.into_iter().next())
        .unwrap_or_else(|| "1.0".to_string());

    Ok(ArchiveMetadata {
        name,
        version,
        metadata_version,
        fields,
    })
}

/// Map an RFC-822 header name to the registry's wire field name.
fn field_name(header: &str) -> String {
    header.trim().to_ascii_lowercase().replace('-', "_")
}

/// Heuristic name/version split for old-style archives without embedded
/// metadata: the part before the first hyphen is the name, the rest of the
/// basename stem (with a trailing ".tar" stripped) is the version.
pub fn old_style_name_version(filename: &str) -> Option<(String, String)> {
    let stem = Path::new(filename).file_stem()?.to_str()?;
    let (name, version) = stem.split_once('-')?;
    let version = version.strip_suffix(".tar").unwrap_or(version);
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pkg_info_basic_fields() {
        let content = "Metadata-Version: 1.1\n\
                       Name: demo-lib\n\
                       Version: 1.0\n\
                       Summary: A demonstration library\n\
                       Home-page: https://example.com\n\
                       Author: Jane Doe\n\
                       License: MIT\n";
        let meta = parse_pkg_info(content).unwrap();
        assert_eq!(meta.name, "demo-lib");
        assert_eq!(meta.version, "1.0");
        assert_eq!(meta.metadata_version, "1.1");
        assert_eq!(
            meta.fields.get("summary").map(|v| v.as_slice()),
            Some(&["A demonstration library".to_string()][..])
        );
        assert_eq!(
            meta.fields.get("home_page").map(|v| v.as_slice()),
            Some(&["https://example.com".to_string()][..])
        );
    }

    #[test]
    fn test_parse_pkg_info_repeated_headers_accumulate() {
        let content = "Metadata-Version: 1.1\n\
                       Name: demo-lib\n\
                       Version: 1.0\n\
                       Classifier: Development Status :: 4 - Beta\n\
                       Classifier: Intended Audience :: Developers\n\
                       Platform: any\n";
        let meta = parse_pkg_info(content).unwrap();
        assert_eq!(meta.fields.get("classifier").map(|v| v.len()), Some(2));
        assert_eq!(meta.fields.get("platform").map(|v| v.len()), Some(1));
    }

    #[test]
    fn test_parse_pkg_info_continuation_lines() {
        let content = "Metadata-Version: 1.0\n\
                       Name: demo-lib\n\
                       Version: 1.0\n\
                       Summary: first line\n\
                       \tsecond line\n";
        let meta = parse_pkg_info(content).unwrap();
        assert_eq!(
            meta.fields.get("summary").map(|v| v.as_slice()),
            Some(&["first line\nsecond line".to_string()][..])
        );
    }

    #[test]
    fn test_parse_pkg_info_stops_at_body() {
        let content = "Metadata-Version: 1.0\n\
                       Name: demo-lib\n\
                       Version: 1.0\n\
                       \n\
                       This is the long description.\n\
                       Keywords: not-a-header\n";
        let meta = parse_pkg_info(content).unwrap();
        assert!(!meta.fields.contains_key("keywords"));
    }

    #[test]
    fn test_parse_pkg_info_defaults_metadata_version() {
        let content = "Name: demo-lib\nVersion: 1.0\n";
        let meta = parse_pkg_info(content).unwrap();
        assert_eq!(meta.metadata_version, "1.0");
    }

    #[test]
    fn test_parse_pkg_info_missing_name_is_error() {
        let err = parse_pkg_info("Version: 1.0\n").unwrap_err();
        assert!(err.to_string().contains("Name"));
    }

    #[test]
    fn test_old_style_name_version() {
        assert_eq!(
            old_style_name_version("foo-1.2.3.tar.gz"),
            Some(("foo".to_string(), "1.2.3".to_string()))
        );
        assert_eq!(
            old_style_name_version("bar-1.9.zip"),
            Some(("bar".to_string(), "1.9".to_string()))
        );
        // Version keeps inner hyphens
        assert_eq!(
            old_style_name_version("baz-2.2-rc1.tgz"),
            Some(("baz".to_string(), "2.2-rc1".to_string()))
        );
        assert_eq!(old_style_name_version("nodash.tgz"), None);
    }

    #[test]
    fn test_sdist_round_trip_through_tarball() {
        // Build a minimal foo-0.1.tar.gz containing PKG-INFO
        let pkg_info = "Metadata-Version: 1.0\nName: foo\nVersion: 0.1\nSummary: x\n";
        let mut tar_bytes = Vec::new();
        {
            let enc = flate2::write::GzEncoder::new(&mut tar_bytes, flate2::Compression::default());
            let mut builder = tar::Builder::new(enc);
            let mut header = tar::Header::new_gnu();
            header.set_size(pkg_info.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "foo-0.1/PKG-INFO", pkg_info.as_bytes())
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let meta = extract_sdist(&tar_bytes, Path::new("foo-0.1.tar.gz")).unwrap();
        assert_eq!(meta.name, "foo");
        assert_eq!(meta.version, "0.1");
    }
}
