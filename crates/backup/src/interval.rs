//! Retention intervals
//!
//! An interval names a directory of pointers, a strftime format turning a
//! point in time into a pointer label, and an optional limit on how many
//! pointers survive pruning. Written as `[LIMIT@]NAME:STRFTIME`, e.g.
//! `7@daily:%Y-%m-%d`.

use crate::{Error, Result};
use chrono::format::{self, Item, Parsed, StrftimeItems};
use chrono::NaiveDateTime;
use std::fmt::{self, Write};
use std::str::FromStr;

/// A named retention bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    name: String,
    format: String,
    limit: Option<usize>,
}

impl Interval {
    pub fn new(name: &str, format: &str, limit: Option<usize>) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidInterval {
            spec: format!("{}:{}", name, format),
            reason: reason.to_string(),
        };

        if name.is_empty() || name.contains('/') {
            return Err(invalid("name must be non-empty and contain no '/'"));
        }
        if name.starts_with('.') || name == crate::layout::SNAPSHOTS_DIR {
            return Err(invalid("name is reserved"));
        }
        if format.is_empty() {
            return Err(invalid("empty strftime format"));
        }
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid("bad strftime format"));
        }

        Ok(Self {
            name: name.to_string(),
            format: format.to_string(),
            limit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Maximum number of pointers kept; `None` keeps everything
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Pointer label for the bucket containing `now`
    pub fn label_for(&self, now: &NaiveDateTime) -> Result<String> {
        let mut label = String::new();
        write!(label, "{}", now.format(&self.format)).map_err(|_| Error::InvalidInterval {
            spec: self.to_string(),
            reason: "format failed".to_string(),
        })?;

        if label.contains('/') || label.is_empty() || label.starts_with('.') {
            return Err(Error::InvalidInterval {
                spec: self.to_string(),
                reason: format!("label {:?} is not a valid file name", label),
            });
        }

        Ok(label)
    }

    /// Whether `label` is something `label_for` could have produced
    pub fn matches(&self, label: &str) -> bool {
        let mut parsed = Parsed::new();
        format::parse(&mut parsed, label, StrftimeItems::new(&self.format)).is_ok()
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidInterval {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let (limit, rest) = match spec.split_once('@') {
            Some((limit, rest)) => {
                let limit = limit
                    .parse::<usize>()
                    .map_err(|_| invalid("LIMIT must be a non-negative integer"))?;
                (Some(limit), rest)
            }
            None => (None, spec),
        };

        let (name, format) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing 'NAME:'"))?;

        Interval::new(name, format, limit)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(limit) => write!(f, "{}@{}:{}", limit, self.name, self.format),
            None => write!(f, "{}:{}", self.name, self.format),
        }
    }
}
