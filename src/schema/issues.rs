//! Validation issues collected while checking a candidate event.

use std::fmt;

/// A single problem found at `path` (e.g. `data.email`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every issue found for one candidate. Validation keeps going after the
/// first problem so callers see the whole picture at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationIssues(Vec<ValidationIssue>);

impl ValidationIssues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue::new(path, message));
    }

    pub fn extend(&mut self, other: ValidationIssues) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.0.iter()
    }

    /// Whether any issue was reported for exactly `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|issue| issue.path == path)
    }

    pub fn into_vec(self) -> Vec<ValidationIssue> {
        self.0
    }

    /// Report `path` when `value` is empty or whitespace.
    pub fn require_non_empty(&mut self, path: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(path, "must not be empty");
        }
    }

    /// Report `path` unless `value` looks like `local@domain`.
    pub fn require_email(&mut self, path: &str, value: &str) {
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };
        if !valid {
            self.push(path, format!("'{value}' is not a valid email address"));
        }
    }

    pub fn require_positive(&mut self, path: &str, value: u64) {
        if value == 0 {
            self.push(path, "must be greater than zero");
        }
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl IntoIterator for ValidationIssues {
    type Item = ValidationIssue;
    type IntoIter = std::vec::IntoIter<ValidationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
