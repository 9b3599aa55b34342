//! Live view routes

use bson::doc;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::live::WriteSource;
use crate::routes::{error_response, json_response};
use crate::server::http::service_unavailable;
use crate::server::AppState;

/// GET /api/accounts/{account}/live
///
/// A missing snapshot schedules a rebuild and answers 404; the client's next
/// poll normally finds the document.
pub async fn handle_get_live(state: &AppState, account: &str) -> Response<Full<Bytes>> {
    let Some(ref live_views) = state.live_views else {
        return service_unavailable();
    };

    match live_views.find_one(doc! { "account": account }).await {
        Ok(Some(view)) => json_response(StatusCode::OK, &view),
        Ok(None) => {
            if let Some(ref scheduler) = state.scheduler {
                scheduler.note_write(account, WriteSource::Profile);
            }
            json_response(
                StatusCode::NOT_FOUND,
                &serde_json::json!({ "error": format!("no live view for {}", account) }),
            )
        }
        Err(e) => error_response(&e),
    }
}
