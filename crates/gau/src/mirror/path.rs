//! Local mirror path derivation.

use std::path::{Path, PathBuf};

use url::Url;

use super::error::{MirrorError, Result};
use crate::credentials::host_identifier;

/// Directory used for sources reached over a local transport (`file://`).
const LOCAL_HOST_DIR: &str = "local";
/// Suffix carried by every mirror directory and by no intermediate one.
const MIRROR_SUFFIX: &str = ".git";

/// Derives the bare mirror directory for a source URL.
///
/// `https://gitee.com/kesin/demo` maps to `<root>/gitee.com/kesin/demo.git`.
/// The same URL always maps to the same directory, and `..` segments are
/// rejected so a mirror can never escape the root.
///
/// Only the last component ends in `.git`, so one mirror never lives inside
/// another: `…/org` and `…/org/repo` become `org.git` and `org/repo.git`.
pub fn mirror_path(root: &Path, source_url: &str) -> Result<PathBuf> {
    let url = Url::parse(source_url.trim()).map_err(|e| MirrorError::InvalidUrl {
        url: source_url.to_string(),
        reason: e.to_string(),
    })?;

    let host_dir = host_identifier(&url)
        .map(|host| host.replace(':', "_"))
        .unwrap_or_else(|| LOCAL_HOST_DIR.to_string());

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();

    if segments.is_empty() {
        return Err(MirrorError::InvalidUrl {
            url: source_url.to_string(),
            reason: "url has no repository path".to_string(),
        });
    }

    let mut path = root.join(host_dir);
    let last = segments.len() - 1;
    for (i, segment) in segments.into_iter().enumerate() {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return Err(MirrorError::PathTraversal(source_url.to_string()));
        }
        if i < last {
            if segment.ends_with(MIRROR_SUFFIX) {
                return Err(MirrorError::InvalidUrl {
                    url: source_url.to_string(),
                    reason: format!("only the last path segment may end in {}", MIRROR_SUFFIX),
                });
            }
            path.push(segment);
        } else if segment.ends_with(MIRROR_SUFFIX) {
            path.push(segment);
        } else {
            path.push(format!("{}{}", segment, MIRROR_SUFFIX));
        }
    }

    Ok(path)
}
