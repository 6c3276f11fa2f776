//! Error types for sessiontier-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sessiontier-core
#[derive(Error, Debug)]
pub enum Error {
    /// Remote storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Solver errors
    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runtime errors (task join failures, shutdown races, etc.)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Storage(err) => Some(err.remediation()),
            Self::Solve(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the storage directory exists and is writable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .command("Validate JSON", "python -m json.tool < snapshot.json")
                    .alternative("Check for trailing commas or invalid UTF-8."),
            ),
            Self::Runtime(_) => None,
        }
    }
}

/// Remote storage errors
///
/// None of these halt the optimizer: the affected session keeps its current
/// residency and the operation is retried on the next cycle.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Invalid session id for storage: {0:?}")]
    InvalidId(String),

    #[error("Session codec failed: {0}")]
    Codec(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Unavailable { backend, .. } => Remediation::new(format!(
                "Storage backend {backend} is unreachable. Sessions keep their current residency."
            ))
            .alternative("Check the backend's health; the next cycle retries automatically."),
            Self::InvalidId(_) => Remediation::new(
                "Session ids stored on disk may only contain ASCII letters, digits, '-', '_' and '.'.",
            )
            .alternative("Use the in-memory storage backend for arbitrary ids."),
            Self::Codec(_) => Remediation::new(
                "A stored session snapshot could not be encoded or decoded.",
            )
            .alternative("Ensure every node uses the same serializer and compressor."),
            Self::Io(_) => Remediation::new("Check storage directory permissions and free space.")
                .command("Check space", "df -h"),
        }
    }
}

/// Solver errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    /// No feasible or computable assignment this cycle; prior residency is kept.
    #[error("No solution: {0}")]
    NoSolution(String),

    /// Resource vectors and constraints disagree on dimensionality.
    #[error("Dimension mismatch: expected {expected} resource dimensions, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl SolveError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::NoSolution(_) => Remediation::new(
                "The solver produced no assignment. The cycle was skipped and residency kept.",
            )
            .alternative("Register a remote storage and check that capacities are non-zero.")
            .alternative("Try a heuristic solver such as greedy-adjusted."),
            Self::DimensionMismatch { .. } => Remediation::new(
                "Configuration resource vectors must match the constraint vector length.",
            ),
        }
    }

    /// Whether the error indicates a programming fault rather than a transient condition.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}

/// Configuration errors
///
/// Individual unparsable values never produce these; they fall back to their
/// defaults with a warning. Only an unreadable or syntactically broken file does.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\"")),
            Self::ParseError(_) => Remediation::new("Config parse failed. Fix the TOML syntax and retry.")
                .command("Show defaults", "sessiontier config --defaults"),
            Self::SerializeFailed(_) => {
                Remediation::new("Failed to serialize configuration. Check config values.")
            }
        }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
