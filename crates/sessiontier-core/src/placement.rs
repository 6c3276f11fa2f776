//! Where a session's state lives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Residency of a session.
///
/// | Placement | Local memory | Remote storage |
/// |-----------|--------------|----------------|
/// | `Local`   | yes          | no             |
/// | `Remote`  | no           | yes            |
/// | `Both`    | yes          | yes            |
/// | `Drop`    | no           | no             |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Local,
    Remote,
    Both,
    #[default]
    Drop,
}

impl Placement {
    /// All placements in canonical order.
    pub const ALL: [Placement; 4] = [
        Placement::Local,
        Placement::Remote,
        Placement::Both,
        Placement::Drop,
    ];

    /// Whether this placement consumes local capacity.
    #[must_use]
    pub const fn uses_local(self) -> bool {
        matches!(self, Self::Local | Self::Both)
    }

    /// Whether this placement consumes remote capacity.
    #[must_use]
    pub const fn uses_remote(self) -> bool {
        matches!(self, Self::Remote | Self::Both)
    }

    /// Index in [`Placement::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Local => 0,
            Self::Remote => 1,
            Self::Both => 2,
            Self::Drop => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Both => "both",
            Self::Drop => "drop",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "both" => Ok(Self::Both),
            "drop" => Ok(Self::Drop),
            _ => Err(format!(
                "unknown placement: {s}. Expected one of: local, remote, both, drop"
            )),
        }
    }
}
