// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer authentication for the ingestion endpoint.
//!
//! Each configured principal has its own bearer token. A matching
//! `Authorization: Bearer <token>` header attaches the principal to the
//! request as a [`Principal`] extension. With no principals configured every
//! request is rejected (fail-closed).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use lifeline_config::model::PrincipalConfig;

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

/// Token to principal-name table.
#[derive(Clone, Default)]
pub struct AuthConfig {
    principals: Arc<HashMap<String, String>>,
}

impl AuthConfig {
    pub fn from_principals(principals: &[PrincipalConfig]) -> Self {
        let table = principals
            .iter()
            .filter(|p| !p.token.is_empty())
            .map(|p| (p.token.clone(), p.name.clone()))
            .collect();
        Self {
            principals: Arc::new(table),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    fn resolve(&self, token: &str) -> Option<&str> {
        self.principals.get(token).map(String::as_str)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.principals.values().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("AuthConfig")
            .field("principals", &names)
            .finish()
    }
}

/// Middleware that resolves the bearer token to a principal.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.is_empty() {
        tracing::error!("gateway has no principals configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let name = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth.resolve(token.trim()))
        .map(str::to_string);

    match name {
        Some(name) => {
            request.extensions_mut().insert(Principal(name));
            Ok(next.run(request).await)
        }
        None => {
            tracing::debug!("bearer token missing or unknown");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
