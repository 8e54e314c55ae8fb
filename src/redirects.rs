use std::{path::Path, sync::OnceLock};

use anyhow::Context;
use log::debug;
use regex::Regex;

fn rule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // e.g. `/2015/02/22/1/*        posts/new-arrival/:splat`
    PATTERN.get_or_init(|| {
        Regex::new(r"^/(\d{4})/(\d{2})/(\d{2})/([^/]+)/\*\s+posts/([^/:\s]+)").unwrap()
    })
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct RedirectRule {
    pub year: String,
    pub month: String,
    pub day: String,
    pub old_id: String,
    pub new_id: String,
}

/// Extracts the date-path redirects from a `_redirects` file.
///
/// Lines that don't look like `/YYYY/MM/DD/<old>/* posts/<new>` are ignored.
pub(crate) fn parse(text: &str) -> Vec<RedirectRule> {
    let mut rules = vec![];
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(caps) = rule_pattern().captures(line) else {
            debug!("line {}: not a post redirect, ignoring: {line}", n + 1);
            continue;
        };
        rules.push(RedirectRule {
            year: caps[1].to_string(),
            month: caps[2].to_string(),
            day: caps[3].to_string(),
            old_id: caps[4].to_string(),
            new_id: caps[5].to_string(),
        });
    }
    rules
}

pub(crate) fn load(path: &Path) -> anyhow::Result<Vec<RedirectRule>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("while reading redirects from {:?}", path))?;
    Ok(parse(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_post_redirects() {
        let text = "\
# old permalinks
/2015/02/22/1/*        posts/new-arrival/:splat

  /2016/11/03/hello-world/*\tposts/hello
/about   /pages/about  301
/2015/02/22/2/x   posts/nope
";
        let rules = parse(text);
        assert_eq!(
            rules,
            vec![
                RedirectRule {
                    year: "2015".into(),
                    month: "02".into(),
                    day: "22".into(),
                    old_id: "1".into(),
                    new_id: "new-arrival".into(),
                },
                RedirectRule {
                    year: "2016".into(),
                    month: "11".into(),
                    day: "03".into(),
                    old_id: "hello-world".into(),
                    new_id: "hello".into(),
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse("/15/02/22/1/* posts/a\n/2015/2/22/1/* posts/a").is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("_redirects");
        std::fs::write(&path, "/2015/02/22/1/* posts/new-arrival/:splat\n").unwrap();
        let rules = load(&path).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].new_id, "new-arrival");
        assert!(load(&dir.path().join("missing")).is_err());
    }
}
