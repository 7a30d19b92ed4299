use once_cell::sync::Lazy;
use regex::Regex;

/// `ref: refs/heads/<name>` as written by git for a checked-out branch
static RE_BRANCH_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ref: refs/heads/(.+?)\s*$").unwrap());

/// What the head-reference file points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// A local branch
    Branch(String),
    /// A direct commit id or any other non-branch reference
    Detached(String),
}

impl Head {
    pub fn parse(contents: &str) -> Self {
        let first_line = contents.lines().next().unwrap_or("");
        match RE_BRANCH_REF.captures(first_line) {
            Some(caps) => Head::Branch(caps[1].to_string()),
            None => Head::Detached(first_line.trim().to_string()),
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Branch(name) => Some(name),
            Head::Detached(_) => None,
        }
    }
}
