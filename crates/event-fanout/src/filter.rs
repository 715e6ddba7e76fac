//! # Subscription Filters
//!
//! Declarative subject predicates. Each subscription has exactly one mode:
//!
//! | Mode        | Matches when                                         |
//! |-------------|------------------------------------------------------|
//! | `Prefix`    | subject starts with one of the prefixes (byte-wise)   |
//! | `AllowList` | subject equals one of the listed values              |
//! | `Combined`  | either of the above, configured explicitly           |
//!
//! Filters fail closed: an empty list never matches. An empty prefix would
//! match every subject, so it is refused at construction.

use serde::{Deserialize, Serialize};

use crate::error::FanoutError;
use crate::events::Subject;

/// Subject predicate of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubjectFilter {
    Prefix {
        prefixes: Vec<String>,
    },
    AllowList {
        subjects: Vec<String>,
    },
    Combined {
        prefixes: Vec<String>,
        subjects: Vec<String>,
    },
}

impl SubjectFilter {
    /// Prefix mode.
    pub fn prefix<I, S>(prefixes: I) -> Result<Self, FanoutError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = SubjectFilter::Prefix {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Allow-list mode.
    pub fn allow_list<I, S>(subjects: I) -> Result<Self, FanoutError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = SubjectFilter::AllowList {
            subjects: subjects.into_iter().map(Into::into).collect(),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Prefix OR allow-list.
    pub fn combined<P, S>(prefixes: P, subjects: S) -> Result<Self, FanoutError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let filter = SubjectFilter::Combined {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            subjects: subjects.into_iter().map(Into::into).collect(),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Refuse empty entries. Filters deserialized from configuration must be
    /// validated before use.
    pub fn validate(&self) -> Result<(), FanoutError> {
        if self.prefixes().iter().any(String::is_empty) {
            return Err(FanoutError::InvalidFilter(
                "empty prefix would match every subject".into(),
            ));
        }
        if self.subjects().iter().any(String::is_empty) {
            return Err(FanoutError::InvalidFilter(
                "allow-list contains an empty subject".into(),
            ));
        }
        Ok(())
    }

    pub fn matches(&self, subject: &Subject) -> bool {
        self.matches_str(subject.as_str())
    }

    pub fn matches_str(&self, subject: &str) -> bool {
        let by_prefix = || self.prefixes().iter().any(|p| subject.starts_with(p.as_str()));
        let by_name = || self.subjects().iter().any(|s| s == subject);

        match self {
            SubjectFilter::Prefix { .. } => by_prefix(),
            SubjectFilter::AllowList { .. } => by_name(),
            SubjectFilter::Combined { .. } => by_prefix() || by_name(),
        }
    }

    /// True if no subject can ever match.
    pub fn is_empty(&self) -> bool {
        self.prefixes().is_empty() && self.subjects().is_empty()
    }

    pub fn mode(&self) -> &'static str {
        match self {
            SubjectFilter::Prefix { .. } => "prefix",
            SubjectFilter::AllowList { .. } => "allow_list",
            SubjectFilter::Combined { .. } => "combined",
        }
    }

    fn prefixes(&self) -> &[String] {
        match self {
            SubjectFilter::Prefix { prefixes } | SubjectFilter::Combined { prefixes, .. } => {
                prefixes
            }
            SubjectFilter::AllowList { .. } => &[],
        }
    }

    fn subjects(&self) -> &[String] {
        match self {
            SubjectFilter::AllowList { subjects } | SubjectFilter::Combined { subjects, .. } => {
                subjects
            }
            SubjectFilter::Prefix { .. } => &[],
        }
    }
}
