//! Version directories: `<data_dir>/<version>/` where `<version>` is a
//! microsecond timestamp `YYYYmmddHHMMSSffffff`. Versions compare by
//! numeric value, which for equal-width names is their lexical order.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// A fresh version id, strictly greater than `current` when given.
pub fn next_version(current: Option<&str>) -> String {
    let generated = chrono::Local::now().format(VERSION_FORMAT).to_string();
    match current.and_then(|c| c.parse::<u128>().ok()) {
        Some(cur) if generated.parse::<u128>().map_or(true, |g| g <= cur) => {
            format!("{:020}", cur + 1)
        }
        _ => generated,
    }
}

pub fn is_version_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 38 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Order two version names numerically.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Version directories under `data_dir`, oldest first.
pub fn list_versions(data_dir: &Path) -> Result<Vec<String>> {
    let mut versions = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_version_name(name) {
                versions.push(name.to_string());
            }
        }
    }
    versions.sort_by(|a, b| compare(a, b));
    Ok(versions)
}

/// Delete versions older than `current` so that at most `max_keep`
/// versions up to and including `current` remain. Versions newer than
/// `current` belong to an in-flight backup and are never touched.
///
/// Returns the removed version names.
pub fn prune_versions(data_dir: &Path, current: &str, max_keep: usize) -> Result<Vec<String>> {
    let keep = max_keep.max(1);
    let candidates: Vec<String> = list_versions(data_dir)?
        .into_iter()
        .filter(|v| compare(v, current) != Ordering::Greater)
        .collect();
    if candidates.len() <= keep {
        return Ok(Vec::new());
    }

    let excess = candidates.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for version in candidates.into_iter().take(excess) {
        if version == current {
            continue;
        }
        match fs::remove_dir_all(data_dir.join(&version)) {
            Ok(()) => {
                info!(version = %version, "pruned version");
                removed.push(version);
            }
            Err(e) => warn!(version = %version, error = %e, "failed to prune version"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_shape() {
        let v = next_version(None);
        assert_eq!(v.len(), 20);
        assert!(is_version_name(&v));
    }

    #[test]
    fn test_next_version_strictly_increases() {
        let far_future = "99990101000000000000";
        let next = next_version(Some(far_future));
        assert_eq!(next, "99990101000000000001");
        assert_eq!(compare(&next, far_future), Ordering::Greater);

        let a = next_version(None);
        let b = next_version(Some(&a));
        assert_eq!(compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_list_ignores_non_versions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240102000000000000", "20240101000000000000", "members"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("20230101000000000000"), b"file").unwrap();
        assert_eq!(
            list_versions(dir.path()).unwrap(),
            vec!["20240101000000000000", "20240102000000000000"]
        );
    }

    #[test]
    fn test_prune_keeps_current_and_newer() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["10", "11", "12", "13", "14"];
        for name in names {
            fs::create_dir(dir.path().join(name)).unwrap();
        }

        let removed = prune_versions(dir.path(), "13", 2).unwrap();
        assert_eq!(removed, vec!["10", "11"]);
        assert_eq!(list_versions(dir.path()).unwrap(), vec!["12", "13", "14"]);

        // max_keep of zero still keeps the current version.
        prune_versions(dir.path(), "13", 0).unwrap();
        assert_eq!(list_versions(dir.path()).unwrap(), vec!["13", "14"]);
    }
}
