//! Bearer auth for ControlAPI: the presented token is SHA-256 hashed and
//! looked up in `Token`, generalized from `gateway/auth.rs`'s fixed-token
//! middleware to a Store-backed hash lookup (distinct from WorkerAgent's
//! fixed-secret `subtle` compare — this is a database lookup).

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use diesel::prelude::*;
use sha2::{Digest, Sha256};

use crate::database::schema::tokens::dsl as t;

use super::state::ControlApiState;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn auth_middleware(State(state): State<ControlApiState>, headers: HeaderMap, request: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(provided) = provided else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if token_exists(&state, provided).await {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn token_exists(state: &ControlApiState, token: &str) -> bool {
    let hash = hash_token(token);
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || {
        let Ok(mut conn) = pool.get() else { return false };
        t::tokens.filter(t::token_hash.eq(&hash)).first::<crate::database::models::Token>(&mut conn).optional().unwrap_or(None).is_some()
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_not_plaintext() {
        let h1 = hash_token("op-token");
        let h2 = hash_token("op-token");
        assert_eq!(h1, h2);
        assert_ne!(h1, "op-token");
    }
}
