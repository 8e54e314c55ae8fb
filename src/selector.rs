use std::{
    io::{BufRead, Write},
    path::Path,
    sync::OnceLock,
};

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{info, warn};
use regex::Regex;

use crate::{
    console,
    frontmatter::FrontMatter,
    history::{open_in_browser, Commit, History},
    metadata::Document,
};

pub(crate) const MAX_CANDIDATES: usize = 20;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HELP: &str = "Actions: v=show diff for this file in that commit, m=show full commit message, \
o=open commit in browser.\nEnter e.g. '1v' to preview commit 1's diff, or just '1' to pick it. \
Blank to skip.";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Action {
    Diff,
    Message,
    Open,
}

impl Action {
    fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_lowercase() {
            'v' => Some(Self::Diff),
            'm' => Some(Self::Message),
            'o' => Some(Self::Open),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum Choice {
    Select(usize),
    Actions(usize, Vec<Action>),
    Help,
    Skip,
    Invalid(String),
}

fn choice_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([a-zA-Z]*)$").unwrap())
}

pub(crate) fn parse_choice(input: &str) -> Choice {
    let input = input.trim();
    if input.is_empty() {
        return Choice::Skip;
    }
    if matches!(input.to_ascii_lowercase().as_str(), "h" | "help" | "?") {
        return Choice::Help;
    }
    let Some(caps) = choice_pattern().captures(input) else {
        return Choice::Invalid(
            "Enter a number, number+actions (e.g. 1v), 'h' for help, or blank to skip".into(),
        );
    };
    let Ok(n) = caps[1].parse::<usize>() else {
        return Choice::Invalid("Number out of range".into());
    };

    let mut actions = vec![];
    for code in caps[2].chars() {
        match Action::from_code(code) {
            Some(action) => actions.push(action),
            None => return Choice::Invalid(format!("Unknown action: {code}")),
        }
    }
    if actions.is_empty() {
        Choice::Select(n)
    } else {
        Choice::Actions(n, actions)
    }
}

/// Normalizes an ISO-8601 timestamp to `YYYY-MM-DD HH:MM:SS`, keeping the
/// commit's own offset. Unrecognized input comes back unchanged.
pub(crate) fn format_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.format(TIMESTAMP_FORMAT).to_string();
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S %z") {
        return dt.format(TIMESTAMP_FORMAT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return dt.format(TIMESTAMP_FORMAT).to_string();
        }
    }
    if let Some(dt) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return dt.format(TIMESTAMP_FORMAT).to_string();
    }
    raw.to_string()
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    NotOffered,
    Skipped,
    Previewed(String),
    Written(String),
}

enum State {
    Listing,
    AwaitingChoice,
    ApplyingAction(usize, Vec<Action>),
    Committing(usize),
    Skipped,
}

/// Walks the operator through picking a commit time for posts lacking `key`.
pub(crate) struct Selector<'a, H, R, W> {
    pub history: &'a H,
    pub input: R,
    pub output: W,
    pub key: String,
    pub anchor: String,
    pub preview: bool,
}

impl<H: History, R: BufRead, W: Write> Selector<'_, H, R, W> {
    pub fn process(&mut self, path: &Path) -> anyhow::Result<Outcome> {
        let doc = Document::load(path)?;
        let Some(front_matter) = doc.front_matter() else {
            info!("Skipping {:?}: no front-matter", path);
            return Ok(Outcome::NotOffered);
        };
        if front_matter.contains(&self.key) {
            info!("Skipping {:?}: `{}` already present", path, self.key);
            return Ok(Outcome::NotOffered);
        }

        let mut commits = match self.history.commits(path) {
            Ok(commits) => commits,
            Err(e) => {
                warn!("Could not read history of {:?}: {e:#}", path);
                return Ok(Outcome::NotOffered);
            }
        };
        if commits.is_empty() {
            info!("No history found for {:?}", path);
            return Ok(Outcome::NotOffered);
        }
        commits.truncate(MAX_CANDIDATES);

        let mut state = State::Listing;
        loop {
            state = match state {
                State::Listing => {
                    self.list(path, &commits)?;
                    State::AwaitingChoice
                }
                State::AwaitingChoice => {
                    let answer =
                        console::prompt(&mut self.input, &mut self.output, "Choice> ")?;
                    // end of input counts as a blank answer
                    match parse_choice(answer.as_deref().unwrap_or_default()) {
                        Choice::Skip => State::Skipped,
                        Choice::Help => {
                            writeln!(self.output, "{HELP}")?;
                            State::AwaitingChoice
                        }
                        Choice::Invalid(message) => {
                            writeln!(self.output, "{message}")?;
                            State::AwaitingChoice
                        }
                        Choice::Select(n) | Choice::Actions(n, _)
                            if n == 0 || n > commits.len() =>
                        {
                            writeln!(self.output, "Number out of range")?;
                            State::AwaitingChoice
                        }
                        Choice::Select(n) => State::Committing(n - 1),
                        Choice::Actions(n, actions) => State::ApplyingAction(n - 1, actions),
                    }
                }
                State::ApplyingAction(i, actions) => {
                    for action in actions {
                        self.run_action(action, &commits[i], path)?;
                    }
                    State::AwaitingChoice
                }
                State::Committing(i) => return self.commit(path, &commits[i]),
                State::Skipped => {
                    writeln!(self.output, "Skipped")?;
                    return Ok(Outcome::Skipped);
                }
            };
        }
    }

    fn list(&mut self, path: &Path, commits: &[Commit]) -> anyhow::Result<()> {
        writeln!(self.output, "\n{}", "=".repeat(60))?;
        writeln!(self.output, "File: {}", path.display())?;
        writeln!(self.output, "Found commits:")?;
        for (i, commit) in commits.iter().enumerate() {
            writeln!(
                self.output,
                "[{}] {}\n{}\n",
                i + 1,
                commit.timestamp,
                commit.preview(3)
            )?;
        }
        writeln!(self.output, "{HELP}")?;
        Ok(())
    }

    /// Action failures are reported to the operator, who can try again.
    fn run_action(&mut self, action: Action, commit: &Commit, path: &Path) -> anyhow::Result<()> {
        let shown = match action {
            Action::Diff => {
                writeln!(self.output, "\n--- diff for commit {} ---", commit.id)?;
                self.history.diff(&commit.id, path)
            }
            Action::Message => {
                writeln!(self.output, "\n--- full commit info ---")?;
                self.history.describe(&commit.id)
            }
            Action::Open => match self.history.web_url(&commit.id) {
                Some(url) => open_in_browser(&url).map(|_| format!("Opened in browser: {url}")),
                None => Ok("Could not determine a web URL for this commit".to_string()),
            },
        };
        match shown {
            Ok(text) => writeln!(self.output, "{text}")?,
            Err(e) => writeln!(self.output, "Failed: {e:#}")?,
        }
        Ok(())
    }

    fn commit(&mut self, path: &Path, commit: &Commit) -> anyhow::Result<Outcome> {
        let value = format_timestamp(&commit.timestamp);
        writeln!(self.output, "Selected time: {value}")?;
        if self.preview {
            writeln!(self.output, "(preview mode) Not writing file")?;
            return Ok(Outcome::Previewed(value));
        }

        // re-read: the file may have changed while the operator was choosing
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while reading {:?}", path))?;
        let Some(mut front_matter) = FrontMatter::parse(&text) else {
            bail!("{:?} lost its front-matter", path);
        };
        if !front_matter.insert_after(&self.anchor, &self.key, &value)? {
            return Ok(Outcome::Skipped);
        }
        std::fs::write(path, front_matter.apply_to(&text))
            .with_context(|| format!("while writing {:?}", path))?;
        writeln!(self.output, "Wrote {} to {}", self.key, path.display())?;
        Ok(Outcome::Written(value))
    }
}
