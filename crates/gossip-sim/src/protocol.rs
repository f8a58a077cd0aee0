use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Call-admission rule applied while building candidate pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum CallProtocol {
    /// Agents already paired this round are removed from every pool.
    #[default]
    Standard,
    /// No removal: callers may pick a busy peer and forfeit their turn.
    #[serde(rename = "Not-Standard")]
    NotStandard,
}

impl CallProtocol {
    pub const ALL: [Self; 2] = [Self::Standard, Self::NotStandard];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::NotStandard => "Not-Standard",
        }
    }

    /// Whether busy agents are filtered out of candidate pools.
    #[must_use]
    pub const fn excludes_busy(self) -> bool {
        matches!(self, Self::Standard)
    }
}

impl fmt::Display for CallProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CallProtocol {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.name().eq_ignore_ascii_case(wanted))
            .or_else(|| {
                wanted
                    .eq_ignore_ascii_case("not_standard")
                    .then_some(Self::NotStandard)
            })
            .ok_or_else(|| SimError::UnknownCallProtocol(s.to_string()))
    }
}

impl TryFrom<String> for CallProtocol {
    type Error = SimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
