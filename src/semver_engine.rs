//! Hand-rolled semantic version parser, precedence comparator and range
//! expression language. Deliberately not a thin wrapper over an
//! existing `semver`-style crate.

use std::cmp::Ordering;
use std::fmt;

use crate::errors::PromptPmError;

/// `(major, minor, patch, prerelease[], build[])`.
#[derive(Debug, Clone, Eq)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<String>,
    pub build: Vec<String>,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Parse `MAJOR.MINOR.PATCH[-PRE[.PRE...]][+BUILD[.BUILD...]]`.
    pub fn parse(value: &str) -> Result<Self, PromptPmError> {
        let normalized = value.trim();

        let (core_and_pre, build) = match normalized.split_once('+') {
            Some((left, right)) => (left, Some(right)),
            None => (normalized, None),
        };
        let (core, prerelease) = match core_and_pre.split_once('-') {
            Some((left, right)) => (left, Some(right)),
            None => (core_and_pre, None),
        };

        let mut core_parts = core.split('.');
        let major_str = core_parts
            .next()
            .ok_or_else(|| invalid(value))?;
        let minor_str = core_parts.next().ok_or_else(|| invalid(value))?;
        let patch_str = core_parts.next().ok_or_else(|| invalid(value))?;
        if core_parts.next().is_some() {
            return Err(invalid(value));
        }

        let major = parse_core_field(major_str, value)?;
        let minor = parse_core_field(minor_str, value)?;
        let patch = parse_core_field(patch_str, value)?;

        let prerelease = match prerelease {
            Some(text) => parse_identifiers(text, value, true)?,
            None => Vec::new(),
        };
        let build = match build {
            Some(text) => parse_identifiers(text, value, false)?,
            None => Vec::new(),
        };

        Ok(SemanticVersion {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }

    /// Total order excluding build metadata.
    pub fn compare_precedence(&self, other: &SemanticVersion) -> Ordering {
        let core_self = (self.major, self.minor, self.patch);
        let core_other = (other.major, other.minor, other.patch);
        match core_self.cmp(&core_other) {
            Ordering::Equal => compare_prerelease(&self.prerelease, &other.prerelease),
            ordering => ordering,
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease.join("."))?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare_precedence(other) == Ordering::Equal
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare_precedence(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare_precedence(other)
    }
}

fn invalid(value: &str) -> PromptPmError {
    PromptPmError::dependency(format!("Invalid semantic version: {:?}", value))
}

fn parse_core_field(text: &str, original: &str) -> Result<u64, PromptPmError> {
    if text.is_empty() || (text.len() > 1 && text.starts_with('0')) {
        return Err(invalid(original));
    }
    text.parse::<u64>().map_err(|_| invalid(original))
}

fn parse_identifiers(
    text: &str,
    original: &str,
    check_numeric_leading_zero: bool,
) -> Result<Vec<String>, PromptPmError> {
    let mut identifiers = Vec::new();
    for identifier in text.split('.') {
        if identifier.is_empty() || !identifier.chars().all(is_identifier_char) {
            return Err(invalid(original));
        }
        let is_numeric = identifier.chars().all(|c| c.is_ascii_digit());
        if check_numeric_leading_zero
            && is_numeric
            && identifier.len() > 1
            && identifier.starts_with('0')
        {
            return Err(invalid(original));
        }
        identifiers.push(identifier.to_string());
    }
    Ok(identifiers)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Pairwise prerelease identifier comparison.
fn compare_prerelease(left: &[String], right: &[String]) -> Ordering {
    if left.is_empty() && right.is_empty() {
        return Ordering::Equal;
    }
    if left.is_empty() {
        return Ordering::Greater;
    }
    if right.is_empty() {
        return Ordering::Less;
    }

    for (left_id, right_id) in left.iter().zip(right.iter()) {
        if left_id == right_id {
            continue;
        }

        let left_numeric = is_numeric_identifier(left_id);
        let right_numeric = is_numeric_identifier(right_id);

        let ordering = match (left_numeric, right_numeric) {
            (true, true) => {
                let left_value: u64 = left_id.parse().expect("validated numeric identifier");
                let right_value: u64 = right_id.parse().expect("validated numeric identifier");
                left_value.cmp(&right_value)
            }
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => left_id.cmp(right_id),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}

fn is_numeric_identifier(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit())
}

pub fn compare_versions(left: &SemanticVersion, right: &SemanticVersion) -> Ordering {
    left.compare_precedence(right)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorOperator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
pub struct VersionComparator {
    pub operator: ComparatorOperator,
    pub version: SemanticVersion,
}

impl VersionComparator {
    pub fn matches(&self, candidate: &SemanticVersion) -> bool {
        let ordering = candidate.compare_precedence(&self.version);
        match self.operator {
            ComparatorOperator::Lt => ordering == Ordering::Less,
            ComparatorOperator::Le => ordering != Ordering::Greater,
            ComparatorOperator::Gt => ordering == Ordering::Greater,
            ComparatorOperator::Ge => ordering != Ordering::Less,
            ComparatorOperator::Eq => ordering == Ordering::Equal,
        }
    }
}

/// An OR of AND-groups of comparators.
#[derive(Debug, Clone)]
pub struct VersionRange {
    pub alternatives: Vec<Vec<VersionComparator>>,
}

impl VersionRange {
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        self.alternatives
            .iter()
            .any(|group| group.iter().all(|comparator| comparator.matches(version)))
    }
}

pub fn parse_version(value: &str) -> Result<SemanticVersion, PromptPmError> {
    SemanticVersion::parse(value)
}

/// Parse a version range expression: comparator tokens, `^`/`~`
/// shorthands, and `||`-separated alternatives.
pub fn parse_version_range(expression: &str) -> Result<VersionRange, PromptPmError> {
    let normalized = expression.trim();
    if normalized.is_empty() || normalized == "*" {
        return Ok(VersionRange {
            alternatives: vec![Vec::new()],
        });
    }

    let mut alternatives = Vec::new();
    for alternative_text in normalized.split("||") {
        let alternative_text = alternative_text.trim();
        if alternative_text.is_empty() {
            return Err(invalid_range(expression));
        }

        let tokens = split_tokens(alternative_text);
        if tokens.is_empty() {
            return Err(invalid_range(expression));
        }

        let mut comparators = Vec::new();
        for token in tokens {
            comparators.extend(parse_range_token(&token, expression)?);
        }
        alternatives.push(comparators);
    }

    Ok(VersionRange { alternatives })
}

fn split_tokens(text: &str) -> Vec<String> {
    text.replace(',', " ")
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

fn invalid_range(expression: &str) -> PromptPmError {
    PromptPmError::dependency(format!("Invalid semantic version range: {:?}", expression))
}

fn parse_range_token(token: &str, original: &str) -> Result<Vec<VersionComparator>, PromptPmError> {
    if token == "*" {
        return Ok(Vec::new());
    }

    if let Some(rest) = token.strip_prefix('^') {
        if rest.is_empty() {
            return Err(invalid_range(original));
        }
        let base = parse_version(rest)?;
        let upper = caret_upper_bound(&base);
        return Ok(vec![
            VersionComparator {
                operator: ComparatorOperator::Ge,
                version: base,
            },
            VersionComparator {
                operator: ComparatorOperator::Lt,
                version: upper,
            },
        ]);
    }

    if let Some(rest) = token.strip_prefix('~') {
        if rest.is_empty() {
            return Err(invalid_range(original));
        }
        let base = parse_version(rest)?;
        let upper = SemanticVersion::new(base.major, base.minor + 1, 0);
        return Ok(vec![
            VersionComparator {
                operator: ComparatorOperator::Ge,
                version: base,
            },
            VersionComparator {
                operator: ComparatorOperator::Lt,
                version: upper,
            },
        ]);
    }

    for (prefix, operator) in [
        (">=", ComparatorOperator::Ge),
        ("<=", ComparatorOperator::Le),
        (">", ComparatorOperator::Gt),
        ("<", ComparatorOperator::Lt),
        ("=", ComparatorOperator::Eq),
    ] {
        if let Some(rest) = token.strip_prefix(prefix) {
            if rest.is_empty() {
                return Err(invalid_range(original));
            }
            let version = parse_version(rest)?;
            return Ok(vec![VersionComparator { operator, version }]);
        }
    }

    let version = parse_version(token)?;
    Ok(vec![VersionComparator {
        operator: ComparatorOperator::Eq,
        version,
    }])
}

fn caret_upper_bound(base: &SemanticVersion) -> SemanticVersion {
    if base.major > 0 {
        SemanticVersion::new(base.major + 1, 0, 0)
    } else if base.minor > 0 {
        SemanticVersion::new(0, base.minor + 1, 0)
    } else {
        SemanticVersion::new(0, 0, base.patch + 1)
    }
}

pub fn satisfies_version_range(version: &SemanticVersion, expression: &str) -> Result<bool, PromptPmError> {
    let range = parse_version_range(expression)?;
    Ok(range.matches(version))
}
