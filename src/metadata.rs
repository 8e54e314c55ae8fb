use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::frontmatter::FrontMatter;

#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while reading {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }

    pub fn front_matter(&self) -> Option<FrontMatter> {
        FrontMatter::parse(&self.text)
    }

    pub fn display_path(&self, root: &Path) -> PathBuf {
        relative(&self.path, root)
    }
}

pub(crate) fn relative(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
