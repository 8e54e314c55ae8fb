use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};

pub(crate) const POSTS_DIR_ENV: &str = "POSTKEEPER_POSTS_DIR";
pub(crate) const DEFAULT_POSTS_DIR: &str = "source/_posts";

#[derive(Debug)]
pub(crate) struct Context {
    pub posts_dir: PathBuf,
    pub apply: bool,
    pub yes: bool,
    pub report: Option<PathBuf>,
}

impl Context {
    pub fn init(
        posts_dir: Option<PathBuf>,
        apply: bool,
        yes: bool,
        report: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let posts_dir = posts_dir
            .or_else(|| std::env::var_os(POSTS_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POSTS_DIR));
        if !posts_dir.is_dir() {
            bail!("posts directory does not exist: {:?}", posts_dir);
        }
        let posts_dir = posts_dir
            .canonicalize()
            .with_context(|| format!("while resolving {:?}", posts_dir))?;

        Ok(Self {
            posts_dir,
            apply,
            yes,
            report,
        })
    }

    pub fn display<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.posts_dir).unwrap_or(path).display()
    }
}
