//! Revision label ordering and head resolution.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::VersionError;
use crate::node::Revision;

/// A parsed `major[.minor]` revision label.
///
/// Labels compare numerically by `(major, minor)`, so `0.10` sorts after `0.2`.
/// A missing minor component counts as `0`; segments after the second are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionLabel {
    pub major: u32,
    pub minor: u32,
}

impl VersionLabel {
    /// Create a label from its components.
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a dotted label.
    pub fn parse(label: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidLabel {
            label: label.to_string(),
        };

        let mut segments = label.split('.');
        let major = segments
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let minor = match segments.next() {
            Some(s) => s.parse::<u32>().map_err(|_| invalid())?,
            None => 0,
        };

        Ok(Self { major, minor })
    }
}

impl FromStr for VersionLabel {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Compare two raw labels numerically.
pub fn compare_labels(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(VersionLabel::parse(a)?.cmp(&VersionLabel::parse(b)?))
}

/// Sort raw labels ascending. Fails on the first unparseable label.
pub fn sort_labels<S: AsRef<str>>(labels: &mut [S]) -> Result<(), VersionError> {
    for label in labels.iter() {
        VersionLabel::parse(label.as_ref())?;
    }
    labels.sort_by_cached_key(|l| VersionLabel::parse(l.as_ref()).unwrap_or_default());
    Ok(())
}

/// Return the head revision: the maximum label under `(major, minor)` order.
///
/// Every revision must carry a valid label. When two labels compare equal the
/// later one in the slice wins.
pub fn head_of(revisions: &[Revision]) -> Result<&Revision, VersionError> {
    let mut head: Option<(VersionLabel, &Revision)> = None;

    for revision in revisions {
        let label = revision.label.as_deref().ok_or(VersionError::MissingLabel)?;
        let parsed = VersionLabel::parse(label)?;
        if head.as_ref().is_none_or(|(best, _)| parsed >= *best) {
            head = Some((parsed, revision));
        }
    }

    head.map(|(_, r)| r).ok_or(VersionError::Empty)
}
