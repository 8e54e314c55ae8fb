use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{anyhow, bail, Context};
use log::debug;

const FIELD_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Commit {
    pub id: String,
    /// ISO-8601 committer date, as reported.
    pub timestamp: String,
    pub message: String,
}

impl Commit {
    /// The first `max_lines` non-empty lines of the message.
    pub fn preview(&self, max_lines: usize) -> String {
        let lines: Vec<_> = self
            .message
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(max_lines)
            .collect();
        if lines.is_empty() {
            "(no commit message)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Version-control queries the `updated` selector relies on.
pub(crate) trait History {
    /// Revisions touching `file`, newest first.
    fn commits(&self, file: &Path) -> anyhow::Result<Vec<Commit>>;
    fn diff(&self, id: &str, file: &Path) -> anyhow::Result<String>;
    fn describe(&self, id: &str) -> anyhow::Result<String>;
    fn web_url(&self, id: &str) -> Option<String>;
}

pub(crate) struct Git {
    root: PathBuf,
}

impl Git {
    pub fn discover(dir: &Path) -> Self {
        let root = run_git(dir, &["rev-parse", "--show-toplevel"])
            .map(|out| PathBuf::from(out.trim()))
            .unwrap_or_else(|e| {
                debug!("not inside a git work tree ({e:#}), using {:?}", dir);
                dir.to_path_buf()
            });
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.root).unwrap_or(file)
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .context("failed to run git")?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl History for Git {
    fn commits(&self, file: &Path) -> anyhow::Result<Vec<Commit>> {
        let rel = self.relative(file).to_string_lossy().into_owned();
        let out = run_git(
            &self.root,
            &[
                "log",
                "--follow",
                "--pretty=format:%H%x1f%cI%x1f%B%x1e",
                "--",
                &rel,
            ],
        )?;
        Ok(parse_log(&out))
    }

    fn diff(&self, id: &str, file: &Path) -> anyhow::Result<String> {
        let rel = self.relative(file).to_string_lossy().into_owned();
        run_git(&self.root, &["show", id, "--", &rel])
    }

    fn describe(&self, id: &str) -> anyhow::Result<String> {
        run_git(
            &self.root,
            &["show", "--no-patch", "--pretty=format:%H%n%ci%n%s%n%n%b", id],
        )
    }

    fn web_url(&self, id: &str) -> Option<String> {
        let remote = run_git(&self.root, &["remote", "get-url", "origin"]).ok()?;
        commit_web_url(&remote, id)
    }
}

/// Parses `git log` output formatted as `%H%x1f%cI%x1f%B%x1e`.
pub(crate) fn parse_log(out: &str) -> Vec<Commit> {
    out.trim_matches(|c: char| c == RECORD_SEP || c.is_whitespace())
        .split(RECORD_SEP)
        .filter_map(|record| {
            let mut fields = record.splitn(3, FIELD_SEP);
            let id = fields.next()?.trim();
            let timestamp = fields.next()?.trim();
            let message = fields.next()?.trim();
            if id.is_empty() {
                return None;
            }
            Some(Commit {
                id: id.to_string(),
                timestamp: timestamp.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// `git@host:owner/repo.git` or `https://host/owner/repo.git` to
/// `https://host/owner/repo/commit/<id>`.
pub(crate) fn commit_web_url(remote: &str, id: &str) -> Option<String> {
    let remote = remote.trim();
    if remote.is_empty() {
        return None;
    }
    let url = match remote.strip_prefix("git@") {
        Some(rest) => format!("https://{}", rest.replacen(':', "/", 1)),
        None => remote.to_string(),
    };
    let url = url.strip_suffix(".git").unwrap_or(&url);
    Some(format!("{url}/commit/{id}"))
}

pub(crate) fn open_in_browser(url: &str) -> anyhow::Result<()> {
    webbrowser::open(url).map_err(|e| anyhow!("failed to open {url}: {e}"))
}
