use std::{
    collections::{HashMap, VecDeque},
    ffi::OsStr,
    fs::ReadDir,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, warn};

use crate::metadata::Document;

/// Collects files with extension `ext` (case-insensitive) under `root`,
/// sorted by path. Only `root` itself is listed unless `recursive` is set.
///
/// An unreadable `root` is an error. Anything unreadable below it is logged
/// and left out.
pub(crate) fn find_documents(root: &Path, ext: &str, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root).with_context(|| format!("while listing {:?}", root))?;

    let mut walk = Walk {
        ext,
        recursive,
        found: vec![],
        pending: VecDeque::new(),
    };
    walk.scan(entries);
    walk.drain();

    let mut found = walk.found;
    found.sort();
    Ok(found)
}

struct Walk<'a> {
    ext: &'a str,
    recursive: bool,
    found: Vec<PathBuf>,
    pending: VecDeque<PathBuf>,
}

impl Walk<'_> {
    fn drain(&mut self) {
        while let Some(dir) = self.pending.pop_front() {
            match std::fs::read_dir(&dir) {
                Ok(entries) => self.scan(entries),
                Err(e) => warn!("Skipping unreadable directory {:?}: {e}", dir),
            }
        }
    }

    fn scan(&mut self, entries: ReadDir) {
        for entry in entries {
            let (path, meta) = match entry.and_then(|e| Ok((e.path(), e.metadata()?))) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {e}");
                    continue;
                }
            };

            if meta.is_dir() {
                if self.recursive {
                    self.pending.push_back(path);
                }
            } else if meta.is_file()
                && path
                    .extension()
                    .and_then(OsStr::to_str)
                    .is_some_and(|e| e.eq_ignore_ascii_case(self.ext))
            {
                self.found.push(path);
            }
        }
    }
}

pub(crate) fn load_documents(paths: &[PathBuf]) -> Vec<Document> {
    paths
        .iter()
        .filter_map(|p| match Document::load(p) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("Skipping unreadable file: {e:#}");
                None
            }
        })
        .collect()
}

#[derive(Debug)]
pub(crate) struct DocumentIndex {
    key: String,
    documents: Vec<Document>,
    by_value: HashMap<String, Vec<usize>>,
}

impl DocumentIndex {
    pub fn build(documents: Vec<Document>, key: &str) -> Self {
        let mut by_value: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, doc) in documents.iter().enumerate() {
            let Some(front_matter) = doc.front_matter() else {
                debug!("{:?} has no front-matter", doc.path);
                continue;
            };
            let Some(value) = front_matter.get(key) else {
                debug!("{:?} has no `{key}`", doc.path);
                continue;
            };
            by_value.entry(value).or_default().push(i);
        }

        Self {
            key: key.to_string(),
            documents,
            by_value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn lookup(&self, value: &str) -> Vec<&Document> {
        self.by_value
            .get(value)
            .map(|indices| indices.iter().map(|&i| &self.documents[i]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn finds_markdown_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let b = write(root, "b.md", "");
        let a = write(root, "a.MD", "");
        let nested = write(root, "2020/01/c.md", "");
        write(root, "notes.txt", "");
        write(root, "a/image.png", "");

        assert_eq!(find_documents(root, "md", false).unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(find_documents(root, "md", true).unwrap(), vec![nested, a, b]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(find_documents(&dir.path().join("nope"), "md", true).is_err());
    }

    #[test]
    fn unreadable_subdirectories_are_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let kept = write(root, "2020/a.md", "");

        let mut walk = Walk {
            ext: "md",
            recursive: true,
            found: vec![],
            pending: VecDeque::from([root.join("gone"), root.join("2020")]),
        };
        walk.drain();
        assert_eq!(walk.found, vec![kept]);
    }

    #[test]
    fn indexes_by_key() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let paths = vec![
            write(root, "a.md", "---\nid: 1\n---\n"),
            write(root, "b.md", "---\nid: '2'\n---\n"),
            write(root, "c.md", "---\nID: 2\n---\n"),
            write(root, "d.md", "no front matter\n"),
            write(root, "e.md", "---\ntitle: no id\n---\n"),
        ];
        let index = DocumentIndex::build(load_documents(&paths), "id");

        assert_eq!(index.key(), "id");
        assert_eq!(index.documents().len(), 5);
        assert_eq!(index.lookup("1").len(), 1);
        assert_eq!(index.lookup("1")[0].path, paths[0]);
        let twos: Vec<_> = index.lookup("2").iter().map(|d| d.path.clone()).collect();
        assert_eq!(twos, vec![paths[1].clone(), paths[2].clone()]);
        assert!(index.lookup("3").is_empty());
    }
}
