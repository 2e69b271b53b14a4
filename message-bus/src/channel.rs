//! Channel naming for correlated messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical legs that publish or await correlated messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// pacs.002 status report answering a pacs.008 we sent out
    CreditTransferStatus,
    /// Terminal outcome of a pacs.008 processed against the switch
    TransferResult,
}

impl ChannelType {
    /// Channel prefix for this leg
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::CreditTransferStatus => "credit-transfer-status",
            ChannelType::TransferResult => "transfer-result",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation key: `{type}-{id}`
///
/// Publisher and waiter must derive the key from the same business
/// identifier (usually the original end-to-end id); nothing else ties the
/// two sides together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    kind: String,
    id: String,
}

impl ChannelKey {
    /// Create a key from a free-form type segment
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create a key for one of the known legs
    pub fn for_leg(leg: ChannelType, id: impl Into<String>) -> Self {
        Self::new(leg.as_str(), id)
    }

    /// Type segment
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Business correlation value
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Joined channel name
    pub fn channel(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}
