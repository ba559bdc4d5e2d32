//! Cross-reference scanner for issue bodies.
//!
//! A line of the form `<keyword>[:] <reference>` names another issue, where
//! the reference is one of `#12`, `owner/repo#12` or
//! `https://github.com/owner/repo/issues/12`. Anything else on the line
//! (other than trailing whitespace) disqualifies it.

use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;

static LINK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?P<kind>[A-Za-z]+)\s*:?\s+",
        r"(?:",
        r"https?://(?:www\.)?github\.com/(?P<url_owner>[A-Za-z0-9_-]+)/(?P<url_repo>[A-Za-z0-9_-]+)/issues/(?P<url_number>[0-9]+)/?",
        r"|",
        r"(?:(?P<owner>[A-Za-z0-9_-]+)/(?P<repo>[A-Za-z0-9_-]+))?#(?P<number>[0-9]+)",
        r")\s*$",
    ))
    .unwrap_or_else(|e| panic!("invalid link pattern: {}", e))
});

/// A reference found in an issue body.
///
/// Empty `owner` and `repo` mean the issue's own repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedLink {
    /// Keyword, lower-cased.
    pub link_type: String,
    pub owner: String,
    pub repo: String,
    pub number: i64,
}

impl ParsedLink {
    pub fn is_same_repository(&self) -> bool {
        self.owner.is_empty() && self.repo.is_empty()
    }
}

/// Scan a body for references, one candidate per line.
///
/// Lazy and side-effect free; a missing or empty body yields nothing.
pub fn scan(body: Option<&str>) -> impl Iterator<Item = ParsedLink> + '_ {
    body.unwrap_or_default().lines().filter_map(parse_line)
}

fn parse_line(line: &str) -> Option<ParsedLink> {
    let caps = LINK_LINE.captures(line.trim_start())?;

    let (owner, repo, number) = match caps.name("url_number") {
        Some(number) => (
            group(&caps, "url_owner"),
            group(&caps, "url_repo"),
            number.as_str(),
        ),
        None => (group(&caps, "owner"), group(&caps, "repo"), group(&caps, "number")),
    };

    // Digit runs too long for i64 are treated as no match
    let number = number.parse::<i64>().ok()?;

    Some(ParsedLink {
        link_type: caps["kind"].to_lowercase(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        number,
    })
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map(|m| m.as_str()).unwrap_or("")
}
