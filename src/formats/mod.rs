//! Distribution archive readers.

pub mod pkginfo;

use std::path::Path;

use crate::models::distribution::Filetype;

/// Classify an archive path by extension.
///
/// `.zip`, `.tar.gz` and `.tgz` are source distributions; `.egg` and `.whl`
/// are built distributions. Anything else is not importable.
pub fn classify_archive(path: &Path) -> Option<Filetype> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(".zip") || name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(Filetype::Sdist)
    } else if name.ends_with(".egg") || name.ends_with(".whl") {
        Some(Filetype::Bdist)
    } else {
        None
    }
}
