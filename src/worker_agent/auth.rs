//! Bearer auth against the per-worker token, generalized from the teacher's
//! `gateway::auth` fixed daemon-token middleware to a constant-time compare
//! against the `worker_token` issued at provisioning time.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use super::state::WorkerState;

pub async fn auth_middleware(State(state): State<WorkerState>, headers: HeaderMap, request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(provided) = provided else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if tokens_match(provided.as_bytes(), state.worker_token.as_bytes()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    provided.len() == expected.len() && bool::from(provided.ct_eq(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tokens_compare_equal() {
        assert!(tokens_match(b"secret-token", b"secret-token"));
    }

    #[test]
    fn mismatched_tokens_compare_unequal() {
        assert!(!tokens_match(b"secret-token", b"other-token"));
    }

    #[test]
    fn different_length_tokens_never_match() {
        assert!(!tokens_match(b"short", b"a-much-longer-token"));
    }
}
