use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for toolgraph operations that can fail outright.
///
/// Domain problems found while building or ordering a graph are reported as
/// diagnostics inside result objects instead; this type covers the edges of
/// the system (files, configuration, injected lookups).
#[derive(Debug, Error, Diagnostic)]
pub enum ToolgraphError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest file could not be read or parsed.
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check the manifest file for syntax errors"))]
    Manifest { message: String },

    /// The global configuration file is invalid.
    #[error("Config error: {message}")]
    #[diagnostic(help("Check ~/.toolgraph/config.toml"))]
    Config { message: String },

    /// Planning failed (unresolved conflicts, hard construction errors).
    #[error("Resolution failed: {message}")]
    Resolution { message: String },

    /// A native package-manager lookup failed.
    #[error("Lookup failed: {message}")]
    Lookup { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type ToolgraphResult<T> = miette::Result<T>;
