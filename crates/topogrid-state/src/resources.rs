//! Locating the files schedules reference before anything is launched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StateError, StateResult};

/// Map each required resource to the first file that provides it.
///
/// Directories are searched in order. A resource matches a file whose path
/// relative to the search directory equals the resource name, or, for bare
/// names, whose file name equals it.
pub fn find_resources(
    required: &BTreeSet<String>,
    dirs: &[PathBuf],
) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    for dir in dirs {
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            for name in required {
                if found.contains_key(name) {
                    continue;
                }
                if provides(relative, entry.path(), name) {
                    debug!(resource = %name, path = ?entry.path(), "resource located");
                    found.insert(name.clone(), entry.path().to_path_buf());
                }
            }
        }
    }
    found
}

fn provides(relative: &Path, path: &Path, name: &str) -> bool {
    let wanted = Path::new(name);
    if relative == wanted {
        return true;
    }
    wanted.components().count() == 1 && path.file_name() == wanted.file_name()
}

/// Fail with every resource that no search directory provides.
pub fn validate_resources(
    required: &BTreeSet<String>,
    dirs: &[PathBuf],
) -> StateResult<BTreeMap<String, PathBuf>> {
    let found = find_resources(required, dirs);
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !found.contains_key(*name))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(found)
    } else {
        Err(StateError::MissingResources(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn finds_bare_and_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("scripts/setup.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(dir.path().join("payload.bin"), [0u8; 4]).unwrap();

        let dirs = vec![dir.path().to_path_buf()];
        let found =
            validate_resources(&required(&["setup.sh", "scripts/setup.sh", "payload.bin"]), &dirs)
                .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found["payload.bin"], dir.path().join("payload.bin"));
    }

    #[test]
    fn earlier_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("tool"), "a").unwrap();
        std::fs::write(second.path().join("tool"), "b").unwrap();

        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_resources(&required(&["tool"]), &dirs);
        assert_eq!(found["tool"], first.path().join("tool"));
    }

    #[test]
    fn reports_every_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_resources(
            &required(&["a.sh", "b.sh"]),
            &[dir.path().to_path_buf()],
        )
        .unwrap_err();
        match err {
            StateError::MissingResources(missing) => assert_eq!(missing, vec!["a.sh", "b.sh"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nothing_required_always_passes() {
        assert!(validate_resources(&BTreeSet::new(), &[]).unwrap().is_empty());
    }
}
