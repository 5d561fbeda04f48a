//! Forwarding hop tags
//!
//! Every runtime that relays an envelope appends `<kind>::<instance>` to the
//! envelope's hop list. The hub reads these back to find the real sender of
//! envelopes that were relayed on behalf of a context with no channel of its
//! own.

use std::fmt;
use std::str::FromStr;

use crate::address::ContextKind;
use crate::error::HopParseError;

const SEPARATOR: &str = "::";

/// Identity of one relaying runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HopTag {
    /// Kind of the relaying context
    pub kind: ContextKind,
    /// Runtime instance identifier, unique per runtime
    pub instance: String,
}

impl HopTag {
    /// Create a hop tag
    pub fn new(kind: ContextKind, instance: impl Into<String>) -> Self {
        Self {
            kind,
            instance: instance.into(),
        }
    }

    /// Whether this hop may have relayed for an embedded frame
    pub fn forwards_frames(&self) -> bool {
        self.kind.is_extension_page()
    }
}

/// Parse a raw hop string
pub fn parse_hop(raw: &str) -> Result<HopTag, HopParseError> {
    let (kind, instance) = raw
        .split_once(SEPARATOR)
        .ok_or_else(|| HopParseError::MissingSeparator(raw.to_string()))?;

    let kind = kind
        .parse::<ContextKind>()
        .map_err(|_| HopParseError::UnknownKind {
            hop: raw.to_string(),
        })?;

    if instance.is_empty() {
        return Err(HopParseError::EmptyInstance(raw.to_string()));
    }

    Ok(HopTag::new(kind, instance))
}

impl fmt::Display for HopTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.kind, self.instance)
    }
}

impl FromStr for HopTag {
    type Err = HopParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hop(s)
    }
}
