use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::metadata::relative;

#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Mutation {
    SetField {
        path: PathBuf,
        key: String,
        value: String,
        previous: Option<String>,
    },
    MoveFile {
        from: PathBuf,
        to: PathBuf,
    },
    MoveDir {
        from: PathBuf,
        to: PathBuf,
    },
}

impl Mutation {
    pub fn describe(&self, root: &Path) -> String {
        match self {
            Mutation::SetField {
                path,
                key,
                value,
                previous: Some(previous),
            } => format!("{}: {key}: {previous} -> {value}", relative(path, root).display()),
            Mutation::SetField {
                path, key, value, ..
            } => format!("{}: add {key}: {value}", relative(path, root).display()),
            Mutation::MoveFile { from, to } => format!(
                "file:   {} -> {}",
                relative(from, root).display(),
                relative(to, root).display()
            ),
            Mutation::MoveDir { from, to } => format!(
                "folder: {}/ -> {}/",
                relative(from, root).display(),
                relative(to, root).display()
            ),
        }
    }
}

#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
#[serde(tag = "reason", content = "candidates", rename_all = "snake_case")]
pub(crate) enum SkipReason {
    NotFound,
    Ambiguous(Vec<PathBuf>),
    NoFrontMatter,
    NoDate,
    UpToDate,
    DuplicateTarget,
    NoFileName,
    InsideItself,
}

#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub(crate) struct Skipped {
    pub subject: String,
    pub reason: SkipReason,
}

#[derive(Serialize, Debug, Default)]
pub(crate) struct Plan {
    pub mutations: Vec<Mutation>,
    pub skipped: Vec<Skipped>,
}

impl Plan {
    pub(super) fn skip(&mut self, subject: impl Into<String>, reason: SkipReason) {
        self.skipped.push(Skipped {
            subject: subject.into(),
            reason,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}
