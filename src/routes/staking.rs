//! Staking routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use crate::assets::{Page, Role};
use crate::routes::{error_response, json_response, read_json};
use crate::server::http::service_unavailable;
use crate::server::AppState;
use crate::staking::StakeRequest;
use crate::types::{LapidaryError, Result};

fn parse_page(page: &str) -> Result<Page> {
    page.parse()
}

fn parse_slot(slot: &str) -> Result<u32> {
    slot.parse()
        .map_err(|_| LapidaryError::Validation(format!("invalid slot number '{}'", slot)))
}

/// Normalized record as the API reports it: every branch present even when
/// empty, including the legacy account-wide `gems` branch older clients
/// still read
fn record_response(record: &crate::db::schemas::StakingRecordDoc) -> serde_json::Value {
    serde_json::json!({
        "account": record.account,
        "mining": record.mining,
        "polishing": record.polishing,
        "gems": {},
    })
}

/// GET /api/accounts/{account}/staking
pub async fn handle_get_record(state: &AppState, account: &str) -> Response<Full<Bytes>> {
    let Some(ref store) = state.stake_store else {
        return service_unavailable();
    };

    match store.get(account).await {
        Ok(record) => json_response(StatusCode::OK, &record_response(&record)),
        Err(e) => error_response(&e),
    }
}

/// POST /api/accounts/{account}/staking/{page}/{slot}
pub async fn handle_stake(
    state: &AppState,
    account: &str,
    page: &str,
    slot: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let Some(ref store) = state.stake_store else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        let slot_num = parse_slot(slot)?;
        let request: StakeRequest = read_json(req).await?;
        store.stake(account, page, slot_num, request).await
    }
    .await;

    match result {
        Ok(record) => json_response(StatusCode::OK, &record_response(&record)),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/accounts/{account}/staking/{page}/{slot}/{role}/{asset_id}
pub async fn handle_unstake(
    state: &AppState,
    account: &str,
    page: &str,
    slot: &str,
    role: &str,
    asset_id: &str,
) -> Response<Full<Bytes>> {
    let Some(ref store) = state.stake_store else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        let slot_num = parse_slot(slot)?;
        let role: Role = role.parse()?;
        store.unstake(account, page, slot_num, role, asset_id).await
    }
    .await;

    match result {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "removed": asset_id }),
        ),
        Err(e) => error_response(&e),
    }
}

/// Reconcile request body: assets the oracle reports as no longer owned
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub missing_assets: Vec<String>,
}

/// POST /api/accounts/{account}/staking/{page}/{slot}/reconcile
pub async fn handle_reconcile(
    state: &AppState,
    account: &str,
    page: &str,
    slot: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let Some(ref store) = state.stake_store else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        let slot_num = parse_slot(slot)?;
        let request: ReconcileRequest = read_json(req).await?;
        store
            .auto_unstake_missing(account, page, slot_num, &request.missing_assets)
            .await
    }
    .await;

    match result {
        Ok(failures) => {
            let failures: Vec<serde_json::Value> = failures
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "asset_id": f.asset_id,
                        "error": f.error.to_string(),
                    })
                })
                .collect();
            json_response(StatusCode::OK, &serde_json::json!({ "failures": failures }))
        }
        Err(e) => error_response(&e),
    }
}
