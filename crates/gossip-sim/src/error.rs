use std::fmt;

use crate::agent::AgentId;

/// Machine-readable error codes for batch drivers and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TooFewAgents,
    UnknownStrategy,
    UnknownCallProtocol,
    InvalidTransition,
    ConfigParseError,
    ProbeExhausted,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TooFewAgents => "E1001",
            Self::UnknownStrategy => "E1002",
            Self::UnknownCallProtocol => "E1003",
            Self::InvalidTransition => "E1004",
            Self::ConfigParseError => "E1005",
            Self::ProbeExhausted => "E9001",
        }
    }

    /// Optional remediation hint for terminal output.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::TooFewAgents => Some("Use at least two agents."),
            Self::UnknownStrategy => Some(
                "Use one of: Random, Call-Me-Once, Learn-New-Secrets, Bubble, Mathematical, \
                 Token, Spider, Token-improved, Spider-improved, Call-Min-Secrets, \
                 Call-Max-Secrets, Call-Best-Secrets, Divide.",
            ),
            Self::UnknownCallProtocol => Some("Use `Standard` or `Not-Standard`."),
            Self::InvalidTransition => Some("Reset the simulation before reconfiguring it."),
            Self::ConfigParseError => Some("Fix the TOML syntax in the config file and retry."),
            Self::ProbeExhausted => Some("This is a bug. Report it with the seed and settings."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the simulation core.
///
/// Configuration errors surface synchronously from `initialize`/`configure`.
/// [`SimError::ProbeExhausted`] is fatal: it means the engine handed a
/// selection function an empty pool, which cannot happen in a correct build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// Fewer than two agents were requested.
    #[error("at least 2 agents are required, got {requested}")]
    TooFewAgents { requested: usize },

    /// A strategy name did not match any known strategy.
    #[error("unknown strategy: {0:?}")]
    UnknownStrategy(String),

    /// A call-protocol name did not match any known protocol.
    #[error("unknown call protocol: {0:?}")]
    UnknownCallProtocol(String),

    /// A lifecycle action was requested in a state that does not allow it.
    #[error("cannot {action} while simulation is {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    /// A configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Config(String),

    /// The Mathematical strategy probed every id without hitting the pool.
    #[error(
        "probe from agent {caller} starting at {start} exhausted all {agent_count} ids without a candidate"
    )]
    ProbeExhausted {
        caller: AgentId,
        start: usize,
        agent_count: usize,
    },
}

impl SimError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TooFewAgents { .. } => ErrorCode::TooFewAgents,
            Self::UnknownStrategy(_) => ErrorCode::UnknownStrategy,
            Self::UnknownCallProtocol(_) => ErrorCode::UnknownCallProtocol,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::ProbeExhausted { .. } => ErrorCode::ProbeExhausted,
        }
    }

    /// `true` for errors caused by caller-supplied settings.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        !matches!(self, Self::ProbeExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
