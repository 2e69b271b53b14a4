use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{
    GatewayError, Result, DESTINATION_COMMUNICATION_ERROR, INTERNAL_SERVER_ERROR,
    SERVER_TIMED_OUT,
};
use crate::models::{
    CurrentState, ErrorInformation, Party, PartyLookupParams, TransferRequest, TransferResponse,
};

/// Calls the gateway makes against the payment switch
#[async_trait]
pub trait SwitchApi: Send + Sync {
    /// `POST /transfers`: start a transfer and obtain a quote
    async fn request_quote(&self, request: &TransferRequest) -> Result<TransferResponse>;

    /// `PUT /transfers/{id}` with `{"acceptQuote": true}`
    async fn accept_quote(&self, transfer_id: &str) -> Result<TransferResponse>;

    /// `GET /parties/{idType}/{idValue}[/{idSubValue}]`
    async fn lookup_party(&self, params: &PartyLookupParams) -> Result<Party>;
}

/// Error body the switch returns with non-2xx responses
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchErrorBody {
    status_code: Option<serde_json::Value>,
    message: Option<String>,
    error_information: Option<ErrorInformation>,
    transfer_state: Option<serde_json::Value>,
}

impl SwitchErrorBody {
    fn into_error_information(self, status: u16) -> ErrorInformation {
        if let Some(info) = self.error_information {
            return info;
        }
        let nested = self.transfer_state.as_ref().and_then(|state| {
            state
                .pointer("/lastError/mojaloopError/errorInformation")
                .and_then(|value| serde_json::from_value::<ErrorInformation>(value.clone()).ok())
        });
        if let Some(info) = nested {
            return info;
        }

        let code = match self.status_code {
            Some(serde_json::Value::String(code)) => code,
            Some(serde_json::Value::Number(code)) => code.to_string(),
            _ => INTERNAL_SERVER_ERROR.to_string(),
        };
        let description = self
            .message
            .unwrap_or_else(|| format!("Switch responded with HTTP {}", status));
        ErrorInformation::new(code, description)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyLookupResponse {
    party: Party,
    #[serde(default)]
    current_state: Option<CurrentState>,
}

/// `SwitchApi` over the switch's JSON HTTP API
pub struct HttpSwitchClient {
    base_url: Url,
    client: Client,
}

impl HttpSwitchClient {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|e| GatewayError::System(format!("Invalid switch base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::System(format!(
                "Switch base URL {} cannot carry a path",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::System(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL plus one percent-encoded path segment per item
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(segment.trim(), "" | "." | ".."))
        {
            return Err(GatewayError::Validation(format!(
                "Identifier {:?} cannot be used as a path segment",
                bad
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::System("Switch base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn transport_error(operation: &str, err: reqwest::Error) -> GatewayError {
        error!("Switch {} request failed: {}", operation, err);
        let info = if err.is_timeout() {
            ErrorInformation::new(SERVER_TIMED_OUT, format!("Switch {} timed out", operation))
        } else {
            ErrorInformation::new(
                DESTINATION_COMMUNICATION_ERROR,
                format!("Switch {} request failed: {}", operation, err),
            )
        };
        GatewayError::SwitchApi { info, status: None }
    }

    async fn read<T: for<'de> Deserialize<'de>>(operation: &str, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: SwitchErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let info = parsed.into_error_information(status.as_u16());
            error!(
                status = status.as_u16(),
                error_code = %info.error_code,
                "Switch {} failed: {}",
                operation,
                info.error_description
            );
            return Err(GatewayError::SwitchApi {
                info,
                status: Some(status.as_u16()),
            });
        }

        response.json::<T>().await.map_err(|e| GatewayError::SwitchApi {
            info: ErrorInformation::new(
                INTERNAL_SERVER_ERROR,
                format!("Failed to parse switch {} response: {}", operation, e),
            ),
            status: Some(status.as_u16()),
        })
    }
}

#[async_trait]
impl SwitchApi for HttpSwitchClient {
    async fn request_quote(&self, request: &TransferRequest) -> Result<TransferResponse> {
        let url = self.endpoint(&["transfers"])?;
        debug!(home_transaction_id = %request.home_transaction_id, "Requesting quote");

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::transport_error("quote", e))?;
        let transfer: TransferResponse = Self::read("quote", response).await?;

        info!(
            transfer_id = transfer.transfer_id.as_deref().unwrap_or(""),
            current_state = %transfer.current_state,
            "Quote received"
        );
        Ok(transfer)
    }

    async fn accept_quote(&self, transfer_id: &str) -> Result<TransferResponse> {
        let url = self.endpoint(&["transfers", transfer_id])?;

        let response = self
            .client
            .put(url)
            .json(&json!({ "acceptQuote": true }))
            .send()
            .await
            .map_err(|e| Self::transport_error("quote acceptance", e))?;
        let transfer: TransferResponse = Self::read("quote acceptance", response).await?;

        info!(transfer_id, current_state = %transfer.current_state, "Quote accepted");
        Ok(transfer)
    }

    async fn lookup_party(&self, params: &PartyLookupParams) -> Result<Party> {
        let mut segments = vec!["parties", params.id_type.as_str(), params.id_value.as_str()];
        if let Some(sub_value) = &params.id_sub_value {
            segments.push(sub_value.as_str());
        }
        let url = self.endpoint(&segments)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::transport_error("party lookup", e))?;
        let lookup: PartyLookupResponse = Self::read("party lookup", response).await?;

        if lookup.current_state == Some(CurrentState::ErrorOccurred) {
            return Err(GatewayError::SwitchApi {
                info: ErrorInformation::new(INTERNAL_SERVER_ERROR, "Party lookup failed"),
                status: None,
            });
        }

        debug!(id_type = %params.id_type, "Party resolved");
        Ok(lookup.party)
    }
}
