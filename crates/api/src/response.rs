//! Turning service outcomes into HTTP responses.

use application::{Lookup, RedirectTarget, Replayable};
use axum::Json;
use axum::http::header::LOCATION;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Set on responses served from the idempotency store.
pub const IDEMPOTENT_REPLAYED: HeaderName = HeaderName::from_static("idempotent-replayed");

/// 201 for a fresh run; a replay gets its stored status and body.
pub fn replayable<T: Serialize>(result: Replayable<T>) -> Response {
    match result {
        Replayable::Fresh(value) => (StatusCode::CREATED, Json(value)).into_response(),
        Replayable::Replayed { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            (status, [(IDEMPOTENT_REPLAYED, "true")], Json(body)).into_response()
        }
    }
}

pub fn redirect(target: RedirectTarget) -> Response {
    let status = StatusCode::from_u16(target.status.code()).unwrap_or(StatusCode::MOVED_PERMANENTLY);
    let location = target.location.clone();
    (status, [(LOCATION, location)], Json(target)).into_response()
}

/// 200 with the value, or a redirect to where it moved.
pub fn lookup<T: Serialize>(result: Lookup<T>) -> Response {
    match result {
        Lookup::Found(value) => Json(value).into_response(),
        Lookup::Redirect(target) => redirect(target),
    }
}

#[cfg(test)]
mod tests {
    use domain::seo::RedirectStatus;

    use super::*;

    #[test]
    fn test_temporary_redirect_uses_302() {
        let response = redirect(RedirectTarget {
            location: "/courses/new".to_string(),
            status: RedirectStatus::Temporary,
        });
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/courses/new");
    }

    #[test]
    fn test_replay_keeps_stored_status() {
        let response = replayable::<()>(Replayable::Replayed {
            status: 201,
            body: serde_json::json!({"id": 1}),
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[IDEMPOTENT_REPLAYED], "true");
    }
}
