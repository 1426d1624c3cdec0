// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all binding stages.
// Binding works on named entities (operations, resources, FU types) rather
// than source text, so diagnostics carry a subject name instead of a span.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0300`, `W0500`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable code constants, grouped by component.
pub mod codes {
    use super::DiagCode;

    /// An operation has no functional-unit candidate in the catalog.
    pub const E0100: DiagCode = DiagCode("E0100");
    /// A shared resource referenced by a proxy has no canonical owner.
    pub const E0300: DiagCode = DiagCode("E0300");
    /// A persisted binding record names an operation absent from the graph.
    pub const E0400: DiagCode = DiagCode("E0400");
    /// Two persisted records for one operation disagree.
    pub const E0401: DiagCode = DiagCode("E0401");
    /// Exact assignment failed; fell back to the first-fit heuristic.
    pub const W0500: DiagCode = DiagCode("W0500");
    /// First-fit assignment needed more instances than the catalog allocates.
    pub const W0501: DiagCode = DiagCode("W0501");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related subject ──────────────────────────────────────────────────────

/// A secondary named entity providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSubject {
    pub subject: String,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any binding stage.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// The operation/resource/FU name the diagnostic is about, if any.
    pub subject: Option<String>,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedSubject>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, subject, hint, or related info.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            subject: None,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the name of the entity the diagnostic is about.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related named entity.
    pub fn with_related(mut self, subject: impl Into<String>, label: impl Into<String>) -> Self {
        self.related.push(RelatedSubject {
            subject: subject.into(),
            label: label.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, "\n  subject: {}", subject)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True when any diagnostic in the slice is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_subject() {
        let d = Diagnostic::new(DiagLevel::Error, "no canonical owner for shared resource")
            .with_code(codes::E0300)
            .with_subject("mem_ctrl");
        assert_eq!(
            format!("{d}"),
            "error[E0300]: no canonical owner for shared resource\n  subject: mem_ctrl"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::new(DiagLevel::Warning, "fell back to first-fit assignment")
            .with_code(codes::W0500)
            .with_hint("raise the solver time budget")
            .with_related("mult16", "affected functional unit");

        assert_eq!(d.code, Some(codes::W0500));
        assert_eq!(d.hint.as_deref(), Some("raise the solver time budget"));
        assert_eq!(d.related.len(), 1);
    }

    #[test]
    fn has_errors_detects_level() {
        let warn = Diagnostic::new(DiagLevel::Warning, "w");
        let err = Diagnostic::new(DiagLevel::Error, "e");
        assert!(!has_errors(&[warn.clone()]));
        assert!(has_errors(&[warn, err]));
    }
}
