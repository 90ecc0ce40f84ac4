//! Tenant identity, plan tiers and quota decisions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Tenant identifier as issued by the messaging transport.
pub type OwnerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Vip,
}

impl Tier {
    /// Maximum concurrent instances, `None` meaning unbounded.
    pub fn max_instances(&self) -> Option<usize> {
        match self {
            Tier::Free => Some(1),
            Tier::Premium => Some(3),
            Tier::Vip => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Vip => "vip",
        }
    }

    /// Parses a persisted tier name, treating anything unknown as `free`.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(Tier::Free)
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "vip" => Ok(Tier::Vip),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied { current: usize, limit: usize },
}

impl QuotaDecision {
    pub fn evaluate(current: usize, tier: Tier) -> Self {
        match tier.max_instances() {
            Some(limit) if current >= limit => QuotaDecision::Denied { current, limit },
            _ => QuotaDecision::Allowed,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Builds the instance id for an owner's bundle from its content digest.
pub fn instance_id_for(owner_id: OwnerId, content_digest: &str) -> String {
    format!("{owner_id}_{content_digest}")
}

/// Extracts the owning tenant from an instance id.
///
/// The owner segment is compared numerically, so `12` never owns `123_x`.
pub fn owner_of(instance_id: &str) -> Option<OwnerId> {
    let (owner, rest) = instance_id.split_once('_')?;
    if rest.is_empty() {
        return None;
    }
    owner.parse().ok()
}
