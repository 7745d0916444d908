//! Security audit logging
//!
//! Authentication and authorization events are logged at INFO level with the
//! "audit" target so they can be filtered and shipped separately from
//! application logs. Each record carries the event as JSON plus a few
//! indexed fields.
//!
//! Author: hephaex@gmail.com

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Client metadata attached to every audit event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: i64,
        username: String,
        client: ClientInfo,
    },

    RegistrationFailure {
        username: String,
        reason: String,
        client: ClientInfo,
    },

    LoginSuccess {
        user_id: i64,
        username: String,
        client: ClientInfo,
    },

    LoginFailure {
        username: String,
        reason: String,
        client: ClientInfo,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh { user_id: i64, client: ClientInfo },

    /// Refresh attempt with an invalid, expired or superseded token
    RefreshRejected { reason: String, client: ClientInfo },

    Logout { user_id: i64, client: ClientInfo },

    /// Bearer token failed validation
    InvalidToken { reason: String, client: ClientInfo },

    /// Authenticated caller stopped by a permission gate
    AccessDenied {
        user_id: i64,
        resource: String,
        reason: String,
        client: ClientInfo,
    },

    AccountDeleted { user_id: i64, client: ClientInfo },
}

impl AuditEvent {
    fn summary(&self) -> (&'static str, Option<i64>, Option<&ClientInfo>) {
        match self {
            Self::RegistrationSuccess { user_id, client, .. } => {
                ("Registration successful", Some(*user_id), Some(client))
            }
            Self::RegistrationFailure { client, .. } => ("Registration failed", None, Some(client)),
            Self::LoginSuccess { user_id, client, .. } => {
                ("Login successful", Some(*user_id), Some(client))
            }
            Self::LoginFailure { client, .. } => ("Login failed", None, Some(client)),
            Self::TokenRefresh { user_id, client } => {
                ("Token refresh", Some(*user_id), Some(client))
            }
            Self::RefreshRejected { client, .. } => ("Token refresh rejected", None, Some(client)),
            Self::Logout { user_id, client } => ("User logout", Some(*user_id), Some(client)),
            Self::InvalidToken { client, .. } => ("Invalid token", None, Some(client)),
            Self::AccessDenied {
                user_id, client, ..
            } => ("Access denied", Some(*user_id), Some(client)),
            Self::AccountDeleted { user_id, client } => {
                ("Account deleted", Some(*user_id), Some(client))
            }
        }
    }
}

/// Log a security audit event
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    let (message, user_id, client) = event.summary();
    let ip_address = client.and_then(|c| c.ip_address.as_deref());

    info!(
        target: "audit",
        event = %event_json,
        user_id = ?user_id,
        ip_address = ?ip_address,
        "{message}"
    );
}

/// Client IP from `X-Forwarded-For` (first hop) or `X-Real-IP`
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: 3,
            username: "alice".to_string(),
            client: ClientInfo {
                ip_address: Some("192.168.1.1".to_string()),
                user_agent: None,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "login_success");
        assert_eq!(json["username"], "alice");
        assert_eq!(json["client"]["ip_address"], "192.168.1.1");
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::RefreshRejected {
            reason: "revoked".to_string(),
            client: ClientInfo::default(),
        });
        audit_log(&AuditEvent::AccessDenied {
            user_id: 1,
            resource: "relationship:9".to_string(),
            reason: "not a member".to_string(),
            client: ClientInfo::default(),
        });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );
        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());
        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_client_info_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Mozilla/5.0 (Test)".parse().unwrap(),
        );

        let client = ClientInfo::from_headers(&headers);
        assert_eq!(client.ip_address, None);
        assert_eq!(client.user_agent.as_deref(), Some("Mozilla/5.0 (Test)"));
    }
}
