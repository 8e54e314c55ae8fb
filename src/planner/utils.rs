use std::path::{Path, PathBuf};

/// Resolves `path` like `canonicalize`, but also for paths that don't exist
/// yet: the nearest existing ancestor is canonicalized and the rest is
/// appended as is.
pub(crate) fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }

    let mut rest = vec![];
    let mut current = path;
    while let (Some(parent), Some(name)) = (current.parent(), current.file_name()) {
        rest.push(name.to_owned());
        if let Ok(mut resolved) = parent.canonicalize() {
            resolved.extend(rest.iter().rev());
            return resolved;
        }
        current = parent;
    }

    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub(crate) fn same_location(a: &Path, b: &Path) -> bool {
    resolve(a) == resolve(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_missing_paths_through_existing_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("a")).unwrap();

        let missing = dir.path().join("a").join("..").join("b").join("c.md");
        assert_eq!(resolve(&missing), root.join("b").join("c.md"));
    }

    #[test]
    fn same_location_sees_through_dot_segments() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("x")).unwrap();
        std::fs::write(dir.path().join("x/p.md"), "").unwrap();

        assert!(same_location(
            &dir.path().join("x/p.md"),
            &dir.path().join("x/./p.md")
        ));
        assert!(!same_location(
            &dir.path().join("x/p.md"),
            &dir.path().join("y/p.md")
        ));
    }
}
