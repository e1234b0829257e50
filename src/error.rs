//! Error types for geowall.

use std::fmt;
use thiserror::Error;

/// Why a single registry record was rejected.
///
/// Never fatal to a parse run; rejected records are counted and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Invalid count: {0}")]
    InvalidCount(i64),

    #[error("Non-numeric count: '{0}'")]
    NonNumericCount(String),

    #[error("Invalid prefix length {prefix} for count {count}")]
    PrefixOutOfRange { prefix: i64, count: i64 },

    #[error("Invalid IPv4 start address: '{0}'")]
    InvalidAddress(String),
}

/// Failure of a single backend primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend tool could not be executed at all.
    #[error("Backend not available: {0}")]
    Unavailable(String),

    /// The command ran and reported failure.
    #[error("{command} failed: {diagnostic}")]
    Command { command: String, diagnostic: String },
}

/// Named steps of the install/uninstall transition and of status inspection,
/// used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    ResetChain,
    CreateChain,
    AppendMandatory,
    AppendRange,
    LinkJump,
    LinkDeny,
    DeleteChain,
    Inspect,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStep::ResetChain => "reset chain",
            InstallStep::CreateChain => "create chain",
            InstallStep::AppendMandatory => "append mandatory range",
            InstallStep::AppendRange => "append whitelist range",
            InstallStep::LinkJump => "link jump rule",
            InstallStep::LinkDeny => "link default-deny rule",
            InstallStep::DeleteChain => "delete chain",
            InstallStep::Inspect => "inspect firewall state",
        };
        f.write_str(name)
    }
}

/// Structural failure of the firewall reconciler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirewallError {
    #[error("Firewall backend not available: {0}")]
    BackendUnavailable(String),

    #[error("Step '{step}' failed: {command}: {diagnostic}")]
    CommandFailed {
        step: InstallStep,
        command: String,
        diagnostic: String,
    },
}

impl FirewallError {
    /// Attach a step to a raw backend failure.
    pub fn at(step: InstallStep, err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => FirewallError::BackendUnavailable(msg),
            BackendError::Command {
                command,
                diagnostic,
            } => FirewallError::CommandFailed {
                step,
                command,
                diagnostic,
            },
        }
    }

    /// The step that failed, if the error came from a command.
    pub fn step(&self) -> Option<InstallStep> {
        match self {
            FirewallError::CommandFailed { step, .. } => Some(*step),
            FirewallError::BackendUnavailable(_) => None,
        }
    }
}

/// Failure of a single feed download attempt.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Feed too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

impl FetchError {
    /// Whether another attempt cannot succeed.
    ///
    /// Client errors are permanent except request timeout and rate limiting.
    pub fn is_permanent(&self) -> bool {
        match self {
            FetchError::Status(status) => {
                status.is_client_error()
                    && *status != reqwest::StatusCode::REQUEST_TIMEOUT
                    && *status != reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::TooLarge { .. } => true,
        }
    }
}

/// Conditions surfaced to the command layer that need an explicit decision.
#[derive(Error, Debug)]
pub enum GeowallError {
    #[error("No {country} IPv4 ranges found in the registry feed")]
    EmptyRangeSet { country: String },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Aborted by user")]
    Aborted,
}
