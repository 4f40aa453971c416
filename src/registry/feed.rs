//! Parser for the operation feed
//!
//! One operation per line, optionally followed by a tab and a result mapping:
//!
//! ```text
//! # comment
//! util.Scaler::__construct
//! util.Buffer::append	{out=return,out2=i1}
//! ```

use slog::{debug, warn, Logger};
use std::fmt;

const COMMENT_SIGN: char = '#';
const MAPPING_DELIMITER: char = '\t';

/// Where a declared output takes its value from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// The call's return value
    Return,
    /// The Nth argument (1-based) as it is after the call
    Input(usize),
}

impl Provenance {
    fn parse(src: &str) -> Option<Self> {
        if src == "return" {
            return Some(Provenance::Return);
        }
        let index: usize = src.strip_prefix('i')?.parse().ok()?;
        (index >= 1).then_some(Provenance::Input(index))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Return => write!(f, "return"),
            Provenance::Input(n) => write!(f, "i{}", n),
        }
    }
}

/// Output name to provenance, in declaration order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultMapping {
    entries: Vec<(String, Provenance)>,
}

impl ResultMapping {
    pub fn new(entries: Vec<(String, Provenance)>) -> Self {
        Self { entries }
    }

    /// The implicit mapping `{out=return}`
    pub fn implicit() -> Self {
        Self {
            entries: vec![(crate::composition::DEFAULT_OUTPUT.to_string(), Provenance::Return)],
        }
    }

    pub fn get(&self, output: &str) -> Option<Provenance> {
        self.entries
            .iter()
            .find(|(name, _)| name == output)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Provenance)> {
        self.entries.iter().map(|(name, p)| (name.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One well-formed line of the feed
#[derive(Clone, Debug, PartialEq)]
pub struct OperationEntry {
    pub owner: String,
    pub member: String,
    pub mapping: Option<ResultMapping>,
}

impl OperationEntry {
    /// `<owner>::<member>`
    pub fn operation_name(&self) -> String {
        format!("{}::{}", self.owner, self.member)
    }
}

/// Parse feed text, skipping comments, blank lines and malformed lines
pub fn parse_feed(content: &str, logger: &Logger) -> Vec<OperationEntry> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with(COMMENT_SIGN) {
            continue;
        }
        match parse_line(line) {
            Some(entry) => {
                debug!(logger, "Parsed operation"; "operation" => entry.operation_name());
                entries.push(entry);
            }
            None => {
                warn!(logger, "Not well-formed line in operation feed";
                    "line_number" => index + 1,
                    "line" => line
                );
            }
        }
    }
    entries
}

fn parse_line(line: &str) -> Option<OperationEntry> {
    let (head, mapping) = match line.split_once(MAPPING_DELIMITER) {
        Some((head, rest)) => (head, Some(parse_mapping(rest.trim_matches(MAPPING_DELIMITER))?)),
        None => (line, None),
    };

    let (owner, member) = head.split_once("::")?;
    let owner = owner.trim();
    let member = member.trim();
    if owner.is_empty()
        || member.is_empty()
        || owner.contains(COMMENT_SIGN)
        || member.contains("::")
        || member.contains(char::is_whitespace)
    {
        return None;
    }

    Some(OperationEntry {
        owner: owner.to_string(),
        member: member.to_string(),
        mapping,
    })
}

fn parse_mapping(text: &str) -> Option<ResultMapping> {
    let inner = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    if inner.trim().is_empty() {
        return None;
    }
    let mut entries = Vec::new();
    for pair in inner.split(',') {
        let (name, src) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() || entries.iter().any(|(n, _): &(String, Provenance)| n == name) {
            return None;
        }
        entries.push((name.to_string(), Provenance::parse(src.trim())?));
    }
    Some(ResultMapping::new(entries))
}
