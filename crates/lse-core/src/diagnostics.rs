//! Diagnostics collected while initialising a network model.
//!
//! [`crate::NetworkBuilder::build`] walks every entity once and records what it
//! finds here instead of stopping at the first problem, so a model loader can
//! report all dangling references in one go. Errors abort initialisation;
//! warnings are kept on the [`crate::Network`].
//!
//! ```
//! use lse_core::diagnostics::{Diagnostics, IssueCategory};
//!
//! let mut diag = Diagnostics::new();
//! diag.warning(IssueCategory::Observability, "Bus#3", "bus has no voltage measurement");
//! diag.error(IssueCategory::Reference, "Switch 'CB-12'", "terminal bus does not exist");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert_eq!(diag.summary(), "1 warning, 1 error");
//! ```

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Model is usable but probably not what was intended
    Warning,
    /// Model cannot be initialised
    Error,
}

/// What part of the model an issue concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    /// An ID that points at nothing
    Reference,
    /// The same ID used twice
    Duplicate,
    /// Impedances, base voltages, voltage levels
    Electrical,
    /// Buses that can never be directly observed
    Observability,
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueCategory::Reference => "reference",
            IssueCategory::Duplicate => "duplicate",
            IssueCategory::Electrical => "electrical",
            IssueCategory::Observability => "observability",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    pub category: IssueCategory,
    /// Entity the issue was found on, e.g. "Bus#14" or "Branch 'L1-2'"
    pub entity: String,
    pub message: String,
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}[{}] {}: {}",
            severity, self.category, self.entity, self.message
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, category: IssueCategory, entity: &str, message: &str) {
        self.issues.push(DiagnosticIssue {
            severity,
            category,
            entity: entity.to_string(),
            message: message.to_string(),
        });
    }

    pub fn warning(&mut self, category: IssueCategory, entity: &str, message: &str) {
        self.push(Severity::Warning, category, entity, message);
    }

    pub fn error(&mut self, category: IssueCategory, entity: &str, message: &str) {
        self.push(Severity::Error, category, entity, message);
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
    }

    pub fn in_category(&self, category: IssueCategory) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.category == category)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn summary(&self) -> String {
        let count = |n: usize, noun: &str| {
            if n == 1 {
                format!("1 {noun}")
            } else {
                format!("{n} {noun}s")
            }
        };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => count(w, "warning"),
            (0, e) => count(e, "error"),
            (w, e) => format!("{}, {}", count(w, "warning"), count(e, "error")),
        }
    }

    /// All errors on one line, used as the payload of an aborted initialisation.
    pub fn error_report(&self) -> String {
        self.errors()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_severity_and_category() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_clean());
        diag.warning(IssueCategory::Observability, "Bus#2", "bus has no voltage measurement");
        diag.error(IssueCategory::Reference, "Branch 'L1'", "unknown bus Bus#9");
        diag.warning(IssueCategory::Electrical, "Switch 'CB-1'", "switch terminals coincide");

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
        assert_eq!(diag.in_category(IssueCategory::Electrical).count(), 1);
        assert_eq!(diag.in_category(IssueCategory::Duplicate).count(), 0);
    }

    #[test]
    fn test_serialization() {
        let mut diag = Diagnostics::new();
        diag.error(IssueCategory::Duplicate, "Bus 'North'", "duplicate bus id 4");

        let json = serde_json::to_string_pretty(&diag).unwrap();
        assert!(json.contains("\"severity\": \"error\""));
        assert!(json.contains("\"category\": \"duplicate\""));
        assert!(json.contains("\"entity\": \"Bus 'North'\""));
    }

    #[test]
    fn test_summary_and_error_report() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.error(IssueCategory::Reference, "Branch 'L1'", "unknown bus Bus#9");
        diag.error(IssueCategory::Electrical, "Branch 'L2'", "zero impedance");
        diag.warning(IssueCategory::Observability, "Bus#1", "no voltage measurement");
        assert_eq!(diag.summary(), "1 warning, 2 errors");

        assert_eq!(
            diag.error_report(),
            "error[reference] Branch 'L1': unknown bus Bus#9; \
             error[electrical] Branch 'L2': zero impedance"
        );
    }
}
