//! Attribute/regex filtering of a queue snapshot.

use regex::Regex;

use crate::core::errors::{Result, SquidError};
use crate::queue::job::{JobField, JobRecord};

/// Which attribute to match, and the pattern to search it for.
///
/// A spec with no attribute or an empty pattern is the identity filter. The
/// pattern is compiled once, when the spec is built.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    attribute: Option<JobField>,
    pattern: String,
    regex: Option<Regex>,
}

impl FilterSpec {
    /// The filter that keeps every job.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a filter on `attribute`; an empty `pattern` keeps every job.
    pub fn new(attribute: Option<JobField>, pattern: &str) -> Result<Self> {
        let regex = match attribute {
            Some(_) if !pattern.is_empty() => {
                Some(Regex::new(pattern).map_err(|error| SquidError::InvalidPattern {
                    pattern: pattern.to_string(),
                    details: error.to_string(),
                })?)
            }
            _ => None,
        };
        Ok(Self {
            attribute,
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Build a filter from a field key such as `"state"`; `""` means no attribute.
    pub fn from_key(key: &str, pattern: &str) -> Result<Self> {
        let attribute = if key.is_empty() {
            None
        } else {
            Some(key.parse::<JobField>()?)
        };
        Self::new(attribute, pattern)
    }

    #[must_use]
    pub const fn attribute(&self) -> Option<JobField> {
        self.attribute
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True when this spec keeps every job.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.regex.is_none()
    }

    /// Whether `job` passes: the attribute is non-empty and the pattern is
    /// found anywhere in it.
    #[must_use]
    pub fn matches(&self, job: &JobRecord) -> bool {
        match (self.attribute, &self.regex) {
            (Some(field), Some(regex)) => {
                let value = job.get(field);
                !value.is_empty() && regex.is_match(value)
            }
            _ => true,
        }
    }

    /// Short human description, e.g. `state =~ /PEND/`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.attribute {
            Some(field) if !self.is_identity() => format!("{field} =~ /{}/", self.pattern),
            _ => "all jobs".to_string(),
        }
    }
}

/// Keep the jobs matching `spec`, preserving order. Identity specs return the
/// input untouched.
#[must_use]
pub fn filter_jobs(jobs: Vec<JobRecord>, spec: &FilterSpec) -> Vec<JobRecord> {
    if spec.is_identity() {
        return jobs;
    }
    jobs.into_iter().filter(|job| spec.matches(job)).collect()
}
