//! Small shared value types used across the domain, exchange, and engine
//! layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the book an order or grid level binding is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A locally-minted client order identifier.
///
/// Encodes the instance, level, side, and placement epoch so the engine
/// can recognize its own orders on an exchange's open-order list without a
/// side channel: `ct-{instance_id}-{level}-{side}-{epoch}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(instance_id: &str, level: usize, side: Side, epoch: u64) -> Self {
        Self(format!("ct-{instance_id}-{level}-{side}-{epoch}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the `(level, side, epoch)` triple back out of an id this
    /// engine minted, used by reconciliation to recognize its own orders
    /// (and which level they belong to) on the exchange's open-order list,
    /// even without any local binding for them.
    pub fn parse_level_side_epoch(&self, instance_id: &str) -> Option<(usize, Side, u64)> {
        let prefix = format!("ct-{instance_id}-");
        let rest = self.0.strip_prefix(&prefix)?;
        let mut parts = rest.splitn(3, '-');
        let level: usize = parts.next()?.parse().ok()?;
        let side = match parts.next()? {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            _ => return None,
        };
        let epoch: u64 = parts.next()?.parse().ok()?;
        Some((level, side, epoch))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
