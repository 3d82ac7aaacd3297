//! Diagnostics collected while an operation keeps going.
//!
//! Fusion skips unreadable or unrecognized files instead of failing; each
//! skip lands here so the caller can report it. The energy-system validator
//! reuses the same container for structural problems.
//!
//! # Example
//!
//! ```
//! use flexmo_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_file("unrecognized", "no family matches", "notes.csv");
//! diag.add_error("structure", "storage has no inflow");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! ```

use serde::Serialize;

use crate::FlexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the operation continued (e.g. a skipped file)
    Warning,
    /// The element could not be used
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Category for grouping (e.g. "parse", "unrecognized", "structure")
    pub category: String,
    pub message: String,
    /// Input file the issue refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({})", file)?;
        }
        Ok(())
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

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_file(&mut self, category: &str, message: &str, file: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_file(file));
    }

    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    /// Record a recoverable [`FlexError`] as a warning against its file.
    pub fn record(&mut self, err: &FlexError) {
        match err {
            FlexError::ParseWarn { file, message } => {
                self.add_warning_with_file("parse", message, file)
            }
            other => self.add_warning("parse", &other.to_string()),
        }
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_pluralization() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning("parse", "a");
        assert_eq!(diag.summary(), "1 warning");

        diag.add_warning("parse", "b");
        diag.add_error("structure", "c");
        assert_eq!(diag.summary(), "2 warnings, 1 error");
    }

    #[test]
    fn test_record_parse_warning_keeps_file() {
        let mut diag = Diagnostics::new();
        diag.record(&FlexError::parse_warn("GUI_2024.csv", "missing ISP column"));

        let issue = &diag.issues[0];
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.file.as_deref(), Some("GUI_2024.csv"));
        assert_eq!(
            issue.to_string(),
            "[warning:parse] missing ISP column (GUI_2024.csv)"
        );
    }

    #[test]
    fn test_serializes_without_empty_fields() {
        let mut diag = Diagnostics::new();
        diag.add_warning("unrecognized", "skipped");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(!json.contains("\"file\""));
    }
}
