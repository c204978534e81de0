//! Role checks for the administrative endpoints.
//!
//! Identity is established upstream; the proxy forwards the caller's planning
//! role in the `x-planning-role` header.

use axum::http::{HeaderMap, StatusCode};

pub const ROLE_HEADER: &str = "x-planning-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Planner,
    Viewer,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "planner" => Some(Self::Planner),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Bulk import and template download.
    pub fn can_import(&self) -> bool {
        matches!(self, Self::Admin | Self::Planner)
    }
}

/// Read the caller's role. Missing or unknown → 401.
pub fn caller_role(headers: &HeaderMap) -> Result<Role, (StatusCode, String)> {
    headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                format!("Missing or unknown {} header", ROLE_HEADER),
            )
        })
}

/// Require a role allowed to import. Known but insufficient role → 403.
pub fn require_importer(headers: &HeaderMap) -> Result<Role, (StatusCode, String)> {
    let role = caller_role(headers)?;
    if role.can_import() {
        Ok(role)
    } else {
        tracing::warn!("Import denied for role {:?}", role);
        Err((
            StatusCode::FORBIDDEN,
            "Importing sub-activities requires the admin or planner role".to_string(),
        ))
    }
}
