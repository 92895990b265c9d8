use serde::{Deserialize, Serialize};

/// A single reported static-analysis issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: i64,
    pub file: String,
    pub line: i64,
    pub col: i64,
    pub code: String,
    pub message: String,
    pub category: Category,
    pub severity: Severity,
    pub status: Status,
    pub hash: String,
    pub first_detected: String,
    pub last_seen: String,
    pub occurrence_count: i64,
    pub pattern_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub context_line: Option<String>,
}

impl Diagnostic {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Status::Fixed | Status::Ignored)
    }
}

/// Severity assigned by the scanner from analyzer output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Ordering weight, highest severity first (topological tie-breaks)
    pub fn rank(&self) -> i64 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

/// Broad shape of a diagnostic, inferred from its code and message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    TypeMismatch,
    MissingDeclaration,
    UndefinedReference,
    ImportError,
    Syntax,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeMismatch => "type-mismatch",
            Self::MissingDeclaration => "missing-declaration",
            Self::UndefinedReference => "undefined-reference",
            Self::ImportError => "import-error",
            Self::Syntax => "syntax",
            Self::Other => "other",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "type-mismatch" => Self::TypeMismatch,
            "missing-declaration" => Self::MissingDeclaration,
            "undefined-reference" => Self::UndefinedReference,
            "import-error" => Self::ImportError,
            "syntax" => Self::Syntax,
            _ => Self::Other,
        }
    }

    /// Categories that plausibly cause downstream diagnostics
    pub fn is_root_cause(&self) -> bool {
        matches!(
            self,
            Self::MissingDeclaration | Self::ImportError | Self::Syntax
        )
    }

    /// Categories that plausibly sit downstream of a root cause
    pub fn is_effect(&self) -> bool {
        matches!(self, Self::TypeMismatch | Self::UndefinedReference)
    }
}

/// Diagnostic lifecycle. Fixed and Ignored are terminal; rows are never
/// deleted, only marked terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    Detected,
    Analyzing,
    FixAvailable,
    Fixed,
    Ignored,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Analyzing => "analyzing",
            Self::FixAvailable => "fix_available",
            Self::Fixed => "fixed",
            Self::Ignored => "ignored",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "analyzing" => Self::Analyzing,
            "fix_available" => Self::FixAvailable,
            "fixed" => Self::Fixed,
            "ignored" => Self::Ignored,
            _ => Self::Detected,
        }
    }
}

/// A generalized shape of recurring diagnostics (same code, same message
/// skeleton), the lookup key for historically successful fixes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: i64,
    pub code: String,
    pub message_template: String,
    pub created_at: String,
}

/// Kind of mutation a fix performs; closed set, matched exhaustively
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FixKind {
    ReplaceLine,
    ReplaceBlock,
    InsertLine,
    DeleteLine,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReplaceLine => "replace-line",
            Self::ReplaceBlock => "replace-block",
            Self::InsertLine => "insert-line",
            Self::DeleteLine => "delete-line",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "replace-block" => Self::ReplaceBlock,
            "insert-line" => Self::InsertLine,
            "delete-line" => Self::DeleteLine,
            _ => Self::ReplaceLine,
        }
    }
}

/// A persisted candidate remediation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFix {
    pub id: i64,
    pub pattern_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub kind: FixKind,
    pub content: String,
    /// Expected original text at the mutation site; mutations verify it
    /// before writing
    pub anchor: Option<String>,
    pub priority: i64,
    pub success_rate: f64,
    pub created_at: String,
}

/// How a fix application was resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FixMethod {
    Automatic,
    Pattern,
    Advisory,
    Manual,
}

impl FixMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Pattern => "pattern",
            Self::Advisory => "advisory",
            Self::Manual => "manual",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "pattern" => Self::Pattern,
            "advisory" => Self::Advisory,
            "manual" => Self::Manual,
            _ => Self::Automatic,
        }
    }
}

/// Immutable record of one fix application attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    pub id: i64,
    pub diagnostic_id: i64,
    /// None for ephemeral fixes that never got promoted
    pub fix_id: Option<i64>,
    pub method: FixMethod,
    pub applied_at: String,
    pub success: bool,
    pub dry_run: bool,
    pub before_snippet: String,
    pub after_snippet: String,
    pub failure_reason: Option<String>,
}

/// A directed likely-causes edge between two diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub cause_id: i64,
    pub effect_id: i64,
    pub confidence: f64,
}

/// A set of diagnostics sharing a probable root cause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub code: String,
    pub description: String,
    pub representative_id: i64,
    pub suggested_fix_id: Option<i64>,
    pub member_count: i64,
    pub created_at: String,
}

/// Persisted advisory-oracle suggestion for one diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advice {
    pub id: i64,
    pub diagnostic_id: i64,
    pub explanation: String,
    pub suggested_fix: String,
    pub confidence: f64,
    pub created_at: String,
}
