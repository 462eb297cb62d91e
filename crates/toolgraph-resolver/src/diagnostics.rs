//! Error and warning records carried by every result object.

use std::fmt;

use serde::Serialize;

/// Stable identifier for a diagnostic, so callers can branch on codes
/// instead of matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    MissingRequiredField,
    DuplicateTool,
    MissingDependency,
    PlatformIncompatible,
    InvalidVersionConstraint,
    SelfDependency,
    CircularDependencies,
    NodeCreationFailed,
    EdgeCreationFailed,
    DanglingEdge,
    OrphanedRequiredDependency,
    CrossPlatformGap,
    ExcessiveFanOut,
    UnknownTarget,
    BlockedByCycle,
    MaxIterationsExceeded,
    Timeout,
    MaxStepsExceeded,
    LookupFailed,
}

impl DiagnosticCode {
    /// Hard errors exclude the affected item and flip `success` to false.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            DiagnosticCode::MissingRequiredField
                | DiagnosticCode::NodeCreationFailed
                | DiagnosticCode::EdgeCreationFailed
                | DiagnosticCode::DanglingEdge
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            DiagnosticCode::DuplicateTool => "DUPLICATE_TOOL",
            DiagnosticCode::MissingDependency => "MISSING_DEPENDENCY",
            DiagnosticCode::PlatformIncompatible => "PLATFORM_INCOMPATIBLE",
            DiagnosticCode::InvalidVersionConstraint => "INVALID_VERSION_CONSTRAINT",
            DiagnosticCode::SelfDependency => "SELF_DEPENDENCY",
            DiagnosticCode::CircularDependencies => "CIRCULAR_DEPENDENCIES",
            DiagnosticCode::NodeCreationFailed => "NODE_CREATION_FAILED",
            DiagnosticCode::EdgeCreationFailed => "EDGE_CREATION_FAILED",
            DiagnosticCode::DanglingEdge => "DANGLING_EDGE",
            DiagnosticCode::OrphanedRequiredDependency => "ORPHANED_REQUIRED_DEPENDENCY",
            DiagnosticCode::CrossPlatformGap => "CROSS_PLATFORM_GAP",
            DiagnosticCode::ExcessiveFanOut => "EXCESSIVE_FAN_OUT",
            DiagnosticCode::UnknownTarget => "UNKNOWN_TARGET",
            DiagnosticCode::BlockedByCycle => "BLOCKED_BY_CYCLE",
            DiagnosticCode::MaxIterationsExceeded => "MAX_ITERATIONS_EXCEEDED",
            DiagnosticCode::Timeout => "TIMEOUT",
            DiagnosticCode::MaxStepsExceeded => "MAX_STEPS_EXCEEDED",
            DiagnosticCode::LookupFailed => "LOOKUP_FAILED",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error or warning, located by a dotted path such as `tools.node`
/// or `dependencies.python`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub path: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.path)
    }
}

/// Path of a tool entry.
pub fn tool_path(id: &str) -> String {
    format!("tools.{id}")
}

/// Path of a dependency declaration.
pub fn dependency_path(id: &str) -> String {
    format!("dependencies.{id}")
}

/// Accumulates errors and warnings over a run without halting on the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, path: impl Into<String>) {
        let diag = Diagnostic::new(code, message, path);
        tracing::debug!("error: {diag}");
        self.errors.push(diag);
    }

    pub fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>, path: impl Into<String>) {
        let diag = Diagnostic::new(code, message, path);
        tracing::warn!("{diag}");
        self.warnings.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Whether any recorded error is a hard error.
    pub fn has_hard_errors(&self) -> bool {
        self.errors.iter().any(|e| e.code.is_hard())
    }

    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.errors.iter().chain(&self.warnings).any(|d| d.code == code)
    }

    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.errors
            .iter()
            .chain(&self.warnings)
            .filter(|d| d.code == code)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
