//! Core domain model for Job Trail: job records, the reconciliation rule that
//! merges freshly fetched postings into stored ones, query value types, and
//! profile entries.

use thiserror::Error;

pub const CRATE_NAME: &str = "jobtrail-core";

/// Declares a closed, string-backed enum with `as_str`, `ALL`, `Display`, and a
/// `FromStr` that rejects anything outside the set with a [`ValidationError`].
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $field:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        let allowed = Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>();
                        $crate::ValidationError::new(
                            $field,
                            s,
                            format!("expected one of: {}", allowed.join(", ")),
                        )
                    })
            }
        }
    };
}

pub mod job;
pub mod profile;
pub mod query;

pub use job::{
    reconcile, validate_score, CandidateJob, JobRecord, JobStatus, UserFields, SCORE_MAX,
    SCORE_MIN,
};
pub use profile::{
    Certification, Education, Honor, JobHistory, Proficiency, ProfileKey, Skill, SkillCategory,
    Stored,
};
pub use query::{Direction, JobFilter, OrderBy, OrderField, QueryError};

/// A field value that falls outside its domain (bad enum member, out-of-range
/// score, empty identity).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} {value:?}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
