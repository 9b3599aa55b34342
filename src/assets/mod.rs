//! Staked-asset domain types
//!
//! An asset is an externally-owned NFT bound to a (page, slot, role) triple.
//! Role attributes are a closed tagged enum so role handling is exhaustive at
//! compile time.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{LapidaryError, Result};

/// Top-level namespace separating the mining subsystem from polishing
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Mining,
    Polishing,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Mining => "mining",
            Page::Polishing => "polishing",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Page {
    type Err = LapidaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mining" => Ok(Page::Mining),
            "polishing" => Ok(Page::Polishing),
            other => Err(LapidaryError::Validation(format!("unknown page '{}'", other))),
        }
    }
}

/// Role an asset plays within a slot
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Mine,
    Table,
    Worker,
    Gem,
    Speedboost,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mine => "mine",
            Role::Table => "table",
            Role::Worker => "worker",
            Role::Gem => "gem",
            Role::Speedboost => "speedboost",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LapidaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mine" => Ok(Role::Mine),
            "table" => Ok(Role::Table),
            "worker" => Ok(Role::Worker),
            "gem" => Ok(Role::Gem),
            "speedboost" => Ok(Role::Speedboost),
            other => Err(LapidaryError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Role-specific attributes carried by a staked asset
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleAttributes {
    Mine {
        power: u32,
    },
    Table {
        power: u32,
    },
    Worker {
        power: u32,
    },
    Gem {
        gem_type: String,
        polished: bool,
        bonus: f64,
    },
    Speedboost {
        boost: f64,
        multiplier: f64,
    },
}

impl RoleAttributes {
    pub fn role(&self) -> Role {
        match self {
            RoleAttributes::Mine { .. } => Role::Mine,
            RoleAttributes::Table { .. } => Role::Table,
            RoleAttributes::Worker { .. } => Role::Worker,
            RoleAttributes::Gem { .. } => Role::Gem,
            RoleAttributes::Speedboost { .. } => Role::Speedboost,
        }
    }

    /// Power contribution for mine/table/worker roles, zero otherwise
    pub fn power(&self) -> u32 {
        match self {
            RoleAttributes::Mine { power }
            | RoleAttributes::Table { power }
            | RoleAttributes::Worker { power } => *power,
            _ => 0,
        }
    }

    /// Boost fraction for speedboost roles, zero otherwise
    pub fn boost(&self) -> f64 {
        match self {
            RoleAttributes::Speedboost { boost, .. } => *boost,
            _ => 0.0,
        }
    }
}

/// An externally-owned asset staked into a slot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StakedAsset {
    pub asset_id: String,
    pub template_id: String,
    #[serde(flatten)]
    pub attributes: RoleAttributes,
}

impl StakedAsset {
    pub fn role(&self) -> Role {
        self.attributes.role()
    }
}

/// Normalize a boost/multiplier pair
///
/// The two fields are mutually derivable (`multiplier = 1 + boost`); either
/// may be supplied. Boost is clamped at zero.
pub fn normalize_boost(boost: Option<f64>, multiplier: Option<f64>) -> (f64, f64) {
    let boost = boost
        .or_else(|| multiplier.map(|m| m - 1.0))
        .unwrap_or(0.0)
        .max(0.0);
    (boost, 1.0 + boost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_role_round_trip() {
        assert_eq!("mining".parse::<Page>().unwrap(), Page::Mining);
        assert_eq!("polishing".parse::<Page>().unwrap(), Page::Polishing);
        assert!("crafting".parse::<Page>().is_err());

        for role in [Role::Mine, Role::Table, Role::Worker, Role::Gem, Role::Speedboost] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn boost_derived_from_multiplier() {
        let (boost, multiplier) = normalize_boost(None, Some(1.25));
        assert!((boost - 0.25).abs() < 1e-9);
        assert!((multiplier - 1.25).abs() < 1e-9);
    }

    #[test]
    fn boost_clamped_at_zero() {
        let (boost, multiplier) = normalize_boost(Some(-0.5), None);
        assert_eq!(boost, 0.0);
        assert_eq!(multiplier, 1.0);

        let (boost, _) = normalize_boost(None, Some(0.5));
        assert_eq!(boost, 0.0);
    }

    #[test]
    fn boost_preferred_over_multiplier_when_both_given() {
        let (boost, multiplier) = normalize_boost(Some(0.1), Some(3.0));
        assert!((boost - 0.1).abs() < 1e-9);
        assert!((multiplier - 1.1).abs() < 1e-9);
    }

    #[test]
    fn attributes_report_their_role_and_power() {
        let mine = RoleAttributes::Mine { power: 100 };
        assert_eq!(mine.role(), Role::Mine);
        assert_eq!(mine.power(), 100);

        let gem = RoleAttributes::Gem {
            gem_type: "ruby".to_string(),
            polished: false,
            bonus: 0.03,
        };
        assert_eq!(gem.role(), Role::Gem);
        assert_eq!(gem.power(), 0);

        let boost = RoleAttributes::Speedboost {
            boost: 0.2,
            multiplier: 1.2,
        };
        assert_eq!(boost.boost(), 0.2);
    }
}
