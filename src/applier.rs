use std::{io::ErrorKind, path::Path};

use anyhow::{anyhow, bail, Context};
use fs_extra::dir::CopyOptions;
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    frontmatter::update_field,
    planner::{resolve, Mutation},
};

#[derive(Serialize, Debug, Default, PartialEq, Eq)]
pub(crate) struct ApplyReport {
    pub applied: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub failures: usize,
}

enum Outcome {
    Applied,
    Unchanged,
    Conflict,
}

pub(crate) fn apply(mutations: &[Mutation]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for mutation in mutations {
        match apply_one(mutation) {
            Ok(Outcome::Applied) => report.applied += 1,
            Ok(Outcome::Unchanged) => report.unchanged += 1,
            Ok(Outcome::Conflict) => report.conflicts += 1,
            Err(e) => {
                error!("{e:#}");
                report.failures += 1;
            }
        }
    }
    report
}

fn apply_one(mutation: &Mutation) -> anyhow::Result<Outcome> {
    match mutation {
        Mutation::SetField {
            path,
            key,
            value,
            previous,
        } => {
            // the file may have changed since planning
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("while reading {:?}", path))?;
            let (updated, changed) = update_field(&text, key, value)
                .with_context(|| format!("while updating {:?}", path))?;
            if !changed {
                info!("{:?}: `{key}` already {value}", path);
                return Ok(Outcome::Unchanged);
            }
            std::fs::write(path, updated).with_context(|| format!("while writing {:?}", path))?;
            match previous {
                Some(previous) => info!("{:?}: {key}: {previous} -> {value}", path),
                None => info!("{:?}: added {key}: {value}", path),
            }
            Ok(Outcome::Applied)
        }
        Mutation::MoveFile { from, to } => move_entry(from, to, false),
        Mutation::MoveDir { from, to } => move_entry(from, to, true),
    }
}

fn move_entry(from: &Path, to: &Path, is_dir: bool) -> anyhow::Result<Outcome> {
    if resolve(to).starts_with(resolve(from)) {
        bail!("cannot move {:?} into itself ({:?})", from, to);
    }
    let parent = to
        .parent()
        .ok_or_else(|| anyhow!("{:?} has no parent directory", to))?;
    fs_extra::dir::create_all(parent, false)
        .with_context(|| format!("while creating {:?}", parent))?;

    if to.symlink_metadata().is_ok() {
        warn!("{:?} already exists, not moving {:?}", to, from);
        return Ok(Outcome::Conflict);
    }
    if is_dir != from.is_dir() {
        bail!("{:?} is not a {}", from, if is_dir { "directory" } else { "file" });
    }

    match std::fs::rename(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            warn!("{:?} and {:?} are on different devices, copying instead", from, to);
            let moved = if is_dir {
                let options = CopyOptions {
                    copy_inside: true,
                    ..CopyOptions::new()
                };
                fs_extra::dir::move_dir(from, to, &options)
            } else {
                fs_extra::file::move_file(from, to, &fs_extra::file::CopyOptions::new())
            };
            moved.with_context(|| format!("while moving {:?} to {:?}", from, to))?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("while moving {:?} to {:?}", from, to));
        }
    }
    info!("moved {:?} -> {:?}", from, to);
    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::{find_documents, load_documents, DocumentIndex},
        planner::{plan_field_updates, plan_relocations},
        redirects,
    };
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, text).unwrap();
        path
    }

    fn plan_ids(root: &Path, redirects: &str) -> Vec<Mutation> {
        let paths = find_documents(root, "md", true).unwrap();
        let index = DocumentIndex::build(load_documents(&paths), "id");
        plan_field_updates(&redirects::parse(redirects), &index, "id").mutations
    }

    fn plan_moves(root: &Path) -> Vec<Mutation> {
        let paths = find_documents(root, "md", false).unwrap();
        plan_relocations(&load_documents(&paths), root, "date").mutations
    }

    #[test]
    fn field_updates_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let post = write(dir.path(), "a.md", "---\nid: 1\n---\nid: 1 in the body\n");
        let rules = "/2015/02/22/1/* posts/new-arrival/:splat\n";

        let first = plan_ids(dir.path(), rules);
        assert_eq!(first.len(), 1);
        assert_eq!(
            apply(&first),
            ApplyReport {
                applied: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            std::fs::read_to_string(&post).unwrap(),
            "---\nid: new-arrival\n---\nid: 1 in the body\n"
        );

        assert_eq!(plan_ids(dir.path(), rules), vec![]);
    }

    #[test]
    fn stale_field_update_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let post = write(dir.path(), "a.md", "---\nid: 1\n---\n");
        let mutations = plan_ids(dir.path(), "/2015/02/22/1/* posts/x\n");
        std::fs::write(&post, "---\nid: x\n---\n").unwrap();

        assert_eq!(apply(&mutations).unchanged, 1);
    }

    #[test]
    fn relocation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "hello.md", "---\ndate: 2021-03-05 10:00\n---\n");
        write(&root, "hello/cover.png", "png");

        let first = plan_moves(&root);
        assert_eq!(first.len(), 2);
        assert_eq!(apply(&first).applied, 2);
        assert!(root.join("2021/03/hello.md").is_file());
        assert!(root.join("2021/03/hello/cover.png").is_file());
        assert!(!root.join("hello.md").exists());
        assert!(!root.join("hello").exists());

        let paths = find_documents(&root, "md", true).unwrap();
        let second = plan_relocations(&load_documents(&paths), &root, "date").mutations;
        assert_eq!(second, vec![]);
    }

    #[test]
    fn never_overwrites() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let post = write(&root, "a.md", "---\ndate: 2021-03-05\n---\nnew\n");
        let existing = write(&root, "2021/03/a.md", "old\n");
        let other = write(&root, "b.md", "---\ndate: 2022-01-01\n---\n");

        let report = apply(&plan_moves(&root));
        assert_eq!(
            report,
            ApplyReport {
                applied: 1,
                conflicts: 1,
                ..Default::default()
            }
        );
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "old\n");
        assert!(post.exists());
        assert!(!other.exists());
        assert!(root.join("2022/01/b.md").exists());
    }

    #[test]
    fn existing_folder_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "hello.md", "---\ndate: 2021-03-05\n---\n");
        let source = write(&root, "hello/cover.png", "new");
        let existing = write(&root, "2021/03/hello/cover.png", "old");

        let report = apply(&plan_moves(&root));
        assert_eq!(
            report,
            ApplyReport {
                applied: 1,
                conflicts: 1,
                ..Default::default()
            }
        );
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "old");
        assert_eq!(
            std::fs::read_dir(root.join("2021/03/hello")).unwrap().count(),
            1
        );
    }

    #[test]
    fn year_named_post_keeps_the_year_folder() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        write(&root, "2021.md", "---\ndate: 2021-03-05\n---\n");
        let old = write(&root, "2021/01/old.md", "---\ndate: 2021-01-02\n---\nbody\n");

        let report = apply(&plan_moves(&root));
        assert_eq!(
            report,
            ApplyReport {
                applied: 1,
                ..Default::default()
            }
        );
        assert!(root.join("2021/03/2021.md").is_file());
        assert_eq!(
            std::fs::read_to_string(&old).unwrap(),
            "---\ndate: 2021-01-02\n---\nbody\n"
        );
    }

    #[test]
    fn folder_move_into_itself_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let old = write(&root, "2021/01/old.md", "old\n");

        let report = apply(&[Mutation::MoveDir {
            from: root.join("2021"),
            to: root.join("2021/03/2021"),
        }]);
        assert_eq!(report.failures, 1);
        assert_eq!(std::fs::read_to_string(&old).unwrap(), "old\n");
        assert!(!root.join("2021/03").exists());
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let moved = write(root, "b.md", "");
        let mutations = vec![
            Mutation::SetField {
                path: root.join("missing.md"),
                key: "id".into(),
                value: "x".into(),
                previous: None,
            },
            Mutation::MoveFile {
                from: root.join("gone.md"),
                to: root.join("2020/01/gone.md"),
            },
            Mutation::MoveFile {
                from: moved.clone(),
                to: root.join("2020/01/b.md"),
            },
        ];

        let report = apply(&mutations);
        assert_eq!(report.failures, 2);
        assert_eq!(report.applied, 1);
        assert!(root.join("2020/01/b.md").exists());
        assert!(!moved.exists());
    }
}
