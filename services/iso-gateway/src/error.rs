use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ErrorInformation;

pub type Result<T> = std::result::Result<T, GatewayError>;

pub const MALFORMED_SYNTAX: &str = "3101";
pub const MISSING_ELEMENT: &str = "3102";
pub const INTERNAL_SERVER_ERROR: &str = "2001";
pub const SERVER_TIMED_OUT: &str = "2004";
pub const DESTINATION_COMMUNICATION_ERROR: &str = "1001";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Translation error: required element {path} is missing or invalid")]
    Translation { path: String },

    #[error("Switch API error {}: {}", .info.error_code, .info.error_description)]
    SwitchApi {
        info: ErrorInformation,
        status: Option<u16>,
    },

    #[error("Timed out waiting for a correlated response on {channel}")]
    Timeout { channel: String },

    #[error("Internal error: {0}")]
    System(String),
}

impl GatewayError {
    pub fn translation(path: impl Into<String>) -> Self {
        GatewayError::Translation { path: path.into() }
    }

    /// Error in the switch's native shape
    pub fn error_information(&self) -> ErrorInformation {
        match self {
            GatewayError::Validation(msg) => {
                ErrorInformation::new(MALFORMED_SYNTAX, format!("Malformed syntax: {}", msg))
            }
            GatewayError::Translation { path } => ErrorInformation::new(
                MISSING_ELEMENT,
                format!("Missing mandatory element: {}", path),
            ),
            GatewayError::SwitchApi { info, .. } => info.clone(),
            GatewayError::Timeout { channel } => ErrorInformation::new(
                SERVER_TIMED_OUT,
                format!("Server timed out waiting on {}", channel),
            ),
            GatewayError::System(msg) => {
                ErrorInformation::new(INTERNAL_SERVER_ERROR, format!("Internal server error: {}", msg))
            }
        }
    }

    pub fn http_status(&self) -> u16 {
        self.error_information().http_status()
    }

    /// HTTP status the switch answered with, if it answered at all
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::SwitchApi { status, .. } => *status,
            _ => None,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            GatewayError::Validation(_) => "validation_error",
            GatewayError::Translation { .. } => "translation_error",
            GatewayError::SwitchApi { .. } => "switch_api_error",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::System(_) => "internal_error",
        }
    }
}

impl From<message_bus::Error> for GatewayError {
    fn from(err: message_bus::Error) -> Self {
        match err {
            message_bus::Error::Timeout { channel, .. } => GatewayError::Timeout { channel },
            other => GatewayError::System(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let info = self.error_information();

        (
            status,
            Json(json!({
                "errorInformation": info,
                "type": self.error_type(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GatewayError::Validation("bad".into()).error_information().error_code,
            "3101"
        );
        assert_eq!(
            GatewayError::translation("GrpHdr/MsgId").error_information().error_code,
            "3102"
        );
        assert_eq!(GatewayError::System("boom".into()).http_status(), 500);
        assert_eq!(GatewayError::Validation("bad".into()).http_status(), 400);
    }

    #[test]
    fn test_bus_timeout_converts_to_timeout() {
        let err: GatewayError = message_bus::Error::Timeout {
            channel: "credit-transfer-status-e2e-9".to_string(),
            timeout_ms: 50,
        }
        .into();

        match &err {
            GatewayError::Timeout { channel } => assert_eq!(channel, "credit-transfer-status-e2e-9"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.http_status(), 504);
    }

    #[test]
    fn test_switch_error_keeps_code() {
        let err = GatewayError::SwitchApi {
            info: ErrorInformation::new("3100", "Party not found"),
            status: Some(404),
        };
        assert_eq!(err.error_information().error_code, "3100");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_upstream_status_only_for_switch_errors() {
        let answered = GatewayError::SwitchApi {
            info: ErrorInformation::new("5105", "Payee transaction limit reached"),
            status: Some(500),
        };
        let unreachable = GatewayError::SwitchApi {
            info: ErrorInformation::new("1001", "Destination communication error"),
            status: None,
        };
        assert_eq!(answered.upstream_status(), Some(500));
        assert_eq!(unreachable.upstream_status(), None);
        assert_eq!(GatewayError::System("boom".into()).upstream_status(), None);
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = GatewayError::translation("CdtTrfTxInf/PmtId/EndToEndId").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["type"], "translation_error");
        assert_eq!(body["errorInformation"]["errorCode"], "3102");
    }
}
