//! Production job routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use crate::assets::Page;
use crate::production::JobInputs;
use crate::routes::{error_response, json_response, read_json};
use crate::server::http::service_unavailable;
use crate::server::AppState;
use crate::types::Result;

fn parse_page(page: &str) -> Result<Page> {
    page.parse()
}

/// GET /api/accounts/{account}/jobs/{page}
pub async fn handle_list(state: &AppState, account: &str, page: &str) -> Response<Full<Bytes>> {
    let Some(ref engine) = state.engine else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        engine.active_jobs(account, page).await
    }
    .await;

    match result {
        Ok(jobs) => json_response(StatusCode::OK, &serde_json::json!({ "jobs": jobs })),
        Err(e) => error_response(&e),
    }
}

/// Start-job request body
#[derive(Debug, Default, Deserialize)]
pub struct StartJobRequest {
    #[serde(default)]
    pub slot_num: Option<u32>,
    #[serde(default)]
    pub amount_in: Option<i64>,
}

/// POST /api/accounts/{account}/jobs/{page}
pub async fn handle_start(
    state: &AppState,
    account: &str,
    page: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let Some(ref engine) = state.engine else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        let request: StartJobRequest = read_json(req).await?;
        engine
            .start_job(
                account,
                page,
                JobInputs {
                    requested_slot: request.slot_num,
                    amount_in: request.amount_in,
                },
            )
            .await
    }
    .await;

    match result {
        Ok(job) => json_response(StatusCode::CREATED, &job),
        Err(e) => error_response(&e),
    }
}

/// POST /api/accounts/{account}/jobs/complete/{job_id}
pub async fn handle_complete(
    state: &AppState,
    account: &str,
    job_id: &str,
) -> Response<Full<Bytes>> {
    let Some(ref engine) = state.engine else {
        return service_unavailable();
    };

    match engine.complete_job(account, job_id).await {
        Ok(history) => json_response(StatusCode::OK, &history),
        Err(e) => error_response(&e),
    }
}

/// Unlock request body
#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub target_slot: u32,
}

/// POST /api/accounts/{account}/slots/{page}/unlock
pub async fn handle_unlock(
    state: &AppState,
    account: &str,
    page: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let Some(ref engine) = state.engine else {
        return service_unavailable();
    };

    let result = async {
        let page = parse_page(page)?;
        let request: UnlockRequest = read_json(req).await?;
        engine.unlock_slot(account, page, request.target_slot).await
    }
    .await;

    match result {
        // Accepted: the unlock lands when the payment collaborator confirms
        Ok(intent) => json_response(StatusCode::ACCEPTED, &intent),
        Err(e) => error_response(&e),
    }
}
