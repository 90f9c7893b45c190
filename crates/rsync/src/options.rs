//! rsync option sets
//!
//! Options are kept by long name without the leading `--`. A flag renders
//! as `--name`, a valued option renders one `--name value` pair per value.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Options every snapshot run starts from
pub const DEFAULT_OPTIONS: &[&str] = &[
    "archive",
    "hard-links",
    "one-file-system",
    "numeric-ids",
    "delete",
];

/// Value of a single option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    /// `--name`
    Flag,
    /// `--name value`, repeated for each value
    Values(Vec<OsString>),
}

/// An ordered set of rsync long options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    opts: BTreeMap<String, OptValue>,
}

impl Options {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// The default snapshot option set
    pub fn defaults() -> Self {
        let mut options = Self::new();
        for name in DEFAULT_OPTIONS {
            options.flag(name);
        }
        options
    }

    /// Set a flag option, replacing any values
    pub fn flag(&mut self, name: &str) {
        self.opts.insert(normalize_name(name), OptValue::Flag);
    }

    /// Set a single-valued option, replacing whatever was there
    pub fn set(&mut self, name: &str, value: impl AsRef<OsStr>) {
        self.opts.insert(
            normalize_name(name),
            OptValue::Values(vec![value.as_ref().to_os_string()]),
        );
    }

    /// Append a value to a repeatable option such as `exclude`
    pub fn push(&mut self, name: &str, value: impl AsRef<OsStr>) {
        let value = value.as_ref().to_os_string();
        match self.opts.get_mut(&normalize_name(name)) {
            Some(OptValue::Values(values)) => values.push(value),
            _ => {
                self.opts
                    .insert(normalize_name(name), OptValue::Values(vec![value]));
            }
        }
    }

    /// Remove an option entirely
    pub fn remove(&mut self, name: &str) -> Option<OptValue> {
        self.opts.remove(&normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.opts.contains_key(&normalize_name(name))
    }

    pub fn get(&self, name: &str) -> Option<&OptValue> {
        self.opts.get(&normalize_name(name))
    }

    /// Apply a user option string
    ///
    /// - `OPT` sets a flag
    /// - `OPT=VALUE` appends a value
    /// - `OPT=` removes the option
    pub fn apply(&mut self, spec: &str) -> Result<()> {
        let (name, value) = match spec.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (spec, None),
        };

        let name = name.trim_start_matches('-');
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::Option(spec.to_string()));
        }

        match value {
            None => self.flag(name),
            Some("") => {
                self.remove(name);
            }
            Some(value) => self.push(name, value),
        }

        Ok(())
    }

    /// Render as command-line arguments
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();

        for (name, value) in &self.opts {
            match value {
                OptValue::Flag => args.push(OsString::from(format!("--{}", name))),
                OptValue::Values(values) => {
                    for value in values {
                        args.push(OsString::from(format!("--{}", name)));
                        args.push(value.clone());
                    }
                }
            }
        }

        args
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches('-').replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(options: &Options) -> Vec<String> {
        options
            .to_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = Options::defaults();

        for name in DEFAULT_OPTIONS {
            assert_eq!(options.get(name), Some(&OptValue::Flag));
        }
        assert_eq!(options.to_args().len(), DEFAULT_OPTIONS.len());
    }

    #[test]
    fn test_apply_flag_value_and_removal() {
        let mut options = Options::defaults();

        options.apply("xattrs").unwrap();
        options.apply("exclude=/tmp/").unwrap();
        options.apply("exclude=/var/cache/").unwrap();
        options.apply("one-file-system=").unwrap();

        assert!(options.contains("xattrs"));
        assert!(!options.contains("one-file-system"));

        let rendered = args(&options);
        let exclude_pairs: Vec<_> = rendered
            .windows(2)
            .filter(|w| w[0] == "--exclude")
            .map(|w| w[1].clone())
            .collect();
        assert_eq!(exclude_pairs, vec!["/tmp/", "/var/cache/"]);
    }

    #[test]
    fn test_names_are_normalized() {
        let mut options = Options::new();
        options.apply("--numeric_ids").unwrap();

        assert!(options.contains("numeric-ids"));
        assert_eq!(args(&options), vec!["--numeric-ids"]);
    }

    #[test]
    fn test_set_replaces_values() {
        let mut options = Options::new();
        options.push("link-dest", "/a");
        options.set("link-dest", "/b");

        assert_eq!(args(&options), vec!["--link-dest", "/b"]);
    }

    #[test]
    fn test_invalid_option() {
        let mut options = Options::new();

        assert!(matches!(options.apply(""), Err(Error::Option(_))));
        assert!(matches!(options.apply("--=x"), Err(Error::Option(_))));
        assert!(matches!(options.apply("bad name"), Err(Error::Option(_))));
    }
}
