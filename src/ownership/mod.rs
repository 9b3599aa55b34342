//! Asset ownership validation
//!
//! Verifies that an account currently owns a set of assets by racing several
//! interchangeable asset-index endpoints. All endpoints are queried
//! concurrently, each bounded by its own timeout; the first *successful*
//! response decides the outcome and the remaining in-flight requests are
//! dropped. If every endpoint fails, the check fails open: the caller may
//! proceed, and an audit event records that verification was bypassed.

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::logging::{AuditEvent, AuditKind, AuditLogger};
use crate::types::{LapidaryError, Result};

/// Configuration for the ownership oracle race
#[derive(Debug, Clone)]
pub struct OwnershipConfig {
    /// Interchangeable asset-index base URLs
    pub endpoints: Vec<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Collection the asset query is filtered to
    pub collection: String,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            request_timeout: Duration::from_millis(2500),
            collection: String::new(),
        }
    }
}

/// Result of an ownership check
#[derive(Debug, Clone)]
pub struct OwnershipOutcome {
    /// Every requested asset appeared in the winning response
    pub valid: bool,
    /// Owned-asset ids from the winning response (empty when degraded)
    pub owned_assets: Vec<String>,
    /// True when no endpoint answered and the check failed open
    pub degraded: bool,
}

/// Asset record as the index endpoints report it
#[derive(Debug, Clone, Deserialize)]
struct OwnedAsset {
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    #[serde(default)]
    data: Vec<OwnedAsset>,
}

/// Races redundant ownership-oracle endpoints
pub struct AssetOwnershipValidator {
    config: OwnershipConfig,
    client: reqwest::Client,
    audit: Arc<AuditLogger>,
}

impl AssetOwnershipValidator {
    pub fn new(config: OwnershipConfig, audit: Arc<AuditLogger>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LapidaryError::Http(format!("Failed to build http client: {}", e)))?;

        Ok(Self {
            config,
            client,
            audit,
        })
    }

    /// Check that `account` owns every id in `asset_ids`
    ///
    /// Never returns an error for oracle unavailability; a full outage is
    /// reported as `degraded = true` with `valid = true`.
    pub async fn validate(&self, account: &str, asset_ids: &[String]) -> OwnershipOutcome {
        if asset_ids.is_empty() {
            return OwnershipOutcome {
                valid: true,
                owned_assets: Vec::new(),
                degraded: false,
            };
        }

        let mut races: FuturesUnordered<_> = self
            .config
            .endpoints
            .iter()
            .map(|endpoint| self.query_endpoint(endpoint, account, asset_ids))
            .collect();

        // First successful responder wins; dropping the set cancels losers.
        while let Some(result) = races.next().await {
            match result {
                Ok(owned) => {
                    drop(races);
                    let outcome = decide(asset_ids, &owned);
                    debug!(
                        account = %account,
                        requested = asset_ids.len(),
                        owned = owned.len(),
                        valid = outcome.valid,
                        "ownership race decided"
                    );
                    return outcome;
                }
                Err(e) => {
                    debug!(account = %account, "oracle endpoint failed: {}", e);
                }
            }
        }

        warn!(
            account = %account,
            endpoints = self.config.endpoints.len(),
            "all ownership endpoints failed, proceeding unverified"
        );
        self.audit
            .record(AuditEvent::new(
                AuditKind::DegradedValidation,
                account,
                serde_json::json!({ "asset_ids": asset_ids }),
            ))
            .await;

        OwnershipOutcome {
            valid: true,
            owned_assets: Vec::new(),
            degraded: true,
        }
    }

    async fn query_endpoint(
        &self,
        endpoint: &str,
        account: &str,
        asset_ids: &[String],
    ) -> Result<Vec<String>> {
        let url = format!("{}/v1/assets", endpoint);
        let ids = asset_ids.join(",");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("owner", account),
                ("collection_name", self.config.collection.as_str()),
                ("ids", ids.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LapidaryError::Http(format!("{}: {}", endpoint, e)))?
            .error_for_status()
            .map_err(|e| LapidaryError::Http(format!("{}: {}", endpoint, e)))?;

        let body: AssetsResponse = response
            .json()
            .await
            .map_err(|e| LapidaryError::Http(format!("{}: {}", endpoint, e)))?;

        Ok(body.data.into_iter().map(|a| a.asset_id).collect())
    }
}

/// Decide an outcome from the winning response
fn decide(requested: &[String], owned: &[String]) -> OwnershipOutcome {
    let owned_set: HashSet<&str> = owned.iter().map(String::as_str).collect();
    let valid = requested.iter().all(|id| owned_set.contains(id.as_str()));
    OwnershipOutcome {
        valid,
        owned_assets: owned.to_vec(),
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn valid_when_all_requested_ids_owned() {
        let outcome = decide(&ids(&["a-1", "a-2"]), &ids(&["a-2", "a-1", "a-3"]));
        assert!(outcome.valid);
        assert!(!outcome.degraded);
    }

    #[test]
    fn invalid_when_any_id_missing() {
        let outcome = decide(&ids(&["a-1", "a-9"]), &ids(&["a-1"]));
        assert!(!outcome.valid);
        assert!(!outcome.degraded);
    }

    #[test]
    fn empty_owned_set_fails_nonempty_request() {
        let outcome = decide(&ids(&["a-1"]), &[]);
        assert!(!outcome.valid);
    }

    #[tokio::test]
    async fn no_endpoints_fails_open_with_degraded_flag() {
        let validator = AssetOwnershipValidator::new(
            OwnershipConfig::default(),
            Arc::new(AuditLogger::new(None)),
        )
        .unwrap();

        let outcome = validator.validate("alice", &ids(&["a-1"])).await;
        assert!(outcome.valid);
        assert!(outcome.degraded);
        assert!(outcome.owned_assets.is_empty());
    }

    #[tokio::test]
    async fn empty_request_is_trivially_valid() {
        let validator = AssetOwnershipValidator::new(
            OwnershipConfig::default(),
            Arc::new(AuditLogger::new(None)),
        )
        .unwrap();

        let outcome = validator.validate("alice", &[]).await;
        assert!(outcome.valid);
        assert!(!outcome.degraded);
    }
}
