//! Request extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};

use beacon_core::{Error, Result};
use beacon_engine::ReadAccess;

use crate::response::ApiError;
use crate::state::AppState;

/// Authenticated read context: a validated API key, from the
/// `X-API-Key` header or the `key` query parameter.
#[derive(Debug, Clone)]
pub struct ReadAuth {
    pub access: ReadAccess,
}

impl ReadAuth {
    /// Tenant scope for this request. The `project` parameter is always
    /// required; a project-bound key pins the scope to its own project,
    /// while a static key (single-tenant mode) scopes by the parameter.
    pub fn scope(&self, project_param: Option<&str>) -> Result<String> {
        let param = project_param
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::validation("project is required"))?;
        Ok(match &self.access {
            ReadAccess::Project(project) => project.id.clone(),
            ReadAccess::Static => param.to_string(),
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ReadAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header_key = parts
            .headers
            .get("X-API-Key")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());

        let query_key = parts.uri.query().and_then(find_key_param);

        let key = header_key.or(query_key);
        let access = state.auth.resolve_read_key(key).await?;
        Ok(ReadAuth { access })
    }
}

/// Pull `key=...` out of a raw query string. Keys are plain `sk_`
/// identifiers, so no percent-decoding is needed.
fn find_key_param(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("key="))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}
