// Canonical Transfer Model - the switch's view of a transfer
// ISO 20022 documents are mapped onto these types and back; nothing outside
// the iso20022 module sees XML.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Extension keys carrying ISO identifiers and party contact data
pub mod keys {
    pub const MSG_ID: &str = "MSGID";
    pub const INSTR_ID: &str = "INSTRID";
    pub const TX_ID: &str = "TXID";
    pub const END_TO_END_ID: &str = "ENDTOENDID";
    pub const MSISDN: &str = "MSISDN";
    pub const EMAIL: &str = "EMAIL";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentState {
    WaitingForPartyAcceptance,
    WaitingForQuoteAcceptance,
    Completed,
    ErrorOccurred,
}

impl CurrentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CurrentState::Completed | CurrentState::ErrorOccurred)
    }

    /// Forward-only: party acceptance -> quote acceptance -> completed, or
    /// error from any non-terminal state.
    pub fn can_transition_to(&self, next: CurrentState) -> bool {
        use CurrentState::*;
        matches!(
            (self, next),
            (WaitingForPartyAcceptance, WaitingForQuoteAcceptance)
                | (WaitingForPartyAcceptance, ErrorOccurred)
                | (WaitingForQuoteAcceptance, Completed)
                | (WaitingForQuoteAcceptance, ErrorOccurred)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CurrentState::WaitingForPartyAcceptance => "WAITING_FOR_PARTY_ACCEPTANCE",
            CurrentState::WaitingForQuoteAcceptance => "WAITING_FOR_QUOTE_ACCEPTANCE",
            CurrentState::Completed => "COMPLETED",
            CurrentState::ErrorOccurred => "ERROR_OCCURRED",
        }
    }
}

impl std::fmt::Display for CurrentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AmountType {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionItem {
    pub key: String,
    pub value: String,
}

/// Ordered key/value list; keys are unique
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionList(Vec<ExtensionItem>);

impl ExtensionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    /// Set `key`, replacing any previous value in place
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|item| item.key == key) {
            Some(item) => item.value = value,
            None => self.0.push(ExtensionItem { key, value }),
        }
    }

    pub fn insert_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionItem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExtensionList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut list = ExtensionList::new();
        for (key, value) in iter {
            list.insert(key, value);
        }
        list
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id_type: String,
    pub id_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_sub_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsp_id: Option<String>,
    #[serde(default, skip_serializing_if = "ExtensionList::is_empty")]
    pub extension_list: ExtensionList,
}

impl Party {
    pub fn new(id_type: impl Into<String>, id_value: impl Into<String>) -> Self {
        Self {
            id_type: id_type.into(),
            id_value: id_value.into(),
            id_sub_value: None,
            display_name: None,
            fsp_id: None,
            extension_list: ExtensionList::new(),
        }
    }
}

/// Transfer payee: a single party or a list of candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    One(Party),
    Many(Vec<Party>),
}

impl Recipient {
    /// The party the transfer is addressed to
    pub fn primary(&self) -> Option<&Party> {
        match self {
            Recipient::One(party) => Some(party),
            Recipient::Many(parties) => parties.first(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInformation {
    pub error_code: String,
    pub error_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_list: Option<ExtensionList>,
}

impl ErrorInformation {
    pub fn new(error_code: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_description: error_description.into(),
            extension_list: None,
        }
    }

    /// HTTP status a caller sees for this error code
    pub fn http_status(&self) -> u16 {
        let Ok(code) = self.error_code.trim().parse::<u16>() else {
            return 500;
        };
        match code {
            3100 | 3200..=3299 => 404,
            3000..=5999 => 400,
            2004 => 504,
            1000..=1999 => 503,
            _ => 500,
        }
    }
}

/// Body of the switch quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub home_transaction_id: String,
    pub from: Party,
    pub to: Recipient,
    pub amount_type: AmountType,
    pub amount: Money,
    pub transaction_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "ExtensionList::is_empty")]
    pub quote_request_extensions: ExtensionList,
}

/// Switch reply to quote and acceptance calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    #[serde(default)]
    pub transfer_id: Option<String>,
    pub current_state: CurrentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfil: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<serde_json::Value>,
}

impl TransferResponse {
    /// Error details the switch attached to a failed transfer, if any
    pub fn error_information(&self) -> Option<ErrorInformation> {
        let last_error = self.last_error.as_ref()?;
        ["/mojaloopError/errorInformation", "/errorInformation", ""]
            .iter()
            .filter_map(|pointer| last_error.pointer(pointer))
            .find_map(|value| serde_json::from_value::<ErrorInformation>(value.clone()).ok())
    }
}

/// A transfer as it moves through the switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_transaction_id: Option<String>,
    pub from: Party,
    pub to: Recipient,
    pub amount: Money,
    pub amount_type: AmountType,
    pub transaction_type: String,
    pub current_state: CurrentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfilment: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorInformation>,
    #[serde(default)]
    pub extension_list: ExtensionList,
}

impl TransferState {
    pub fn new(request: &TransferRequest, extension_list: ExtensionList) -> Self {
        Self {
            transfer_id: None,
            home_transaction_id: Some(request.home_transaction_id.clone()),
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount.clone(),
            amount_type: request.amount_type,
            transaction_type: request.transaction_type.clone(),
            current_state: CurrentState::WaitingForPartyAcceptance,
            quote_response: None,
            fulfilment: None,
            last_error: None,
            extension_list,
        }
    }

    pub fn end_to_end_id(&self) -> Option<&str> {
        self.extension_list.get(keys::END_TO_END_ID)
    }

    pub fn advance(&mut self, next: CurrentState) -> Result<()> {
        if !self.current_state.can_transition_to(next) {
            return Err(GatewayError::System(format!(
                "Invalid transfer state transition {} -> {}",
                self.current_state, next
            )));
        }
        self.current_state = next;
        Ok(())
    }

    /// Move to ERROR_OCCURRED and record the cause
    pub fn fail(&mut self, error: ErrorInformation) -> Result<()> {
        self.advance(CurrentState::ErrorOccurred)?;
        self.last_error = Some(error);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyLookupParams {
    pub id_type: String,
    pub id_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_sub_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyLookupOutcome {
    Found(Party),
    Failed(ErrorInformation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusOutcome {
    Accepted,  // ACCP, ACSC, ACSP, ACTC, ACWC
    Pending,   // PDNG, PART
    Rejected,  // RJCT and anything unrecognised
}

/// Canonical form of a received pacs.002
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub extension_list: ExtensionList,
    pub status_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorInformation>,
}

impl StatusReport {
    pub fn end_to_end_id(&self) -> Option<&str> {
        self.extension_list.get(keys::END_TO_END_ID)
    }

    pub fn outcome(&self) -> StatusOutcome {
        match self.status_code.as_str() {
            "ACCP" | "ACSC" | "ACSP" | "ACTC" | "ACWC" => StatusOutcome::Accepted,
            "PDNG" | "PART" => StatusOutcome::Pending,
            _ => StatusOutcome::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request() -> TransferRequest {
        TransferRequest {
            home_transaction_id: "e2e-1".to_string(),
            from: Party::new("MSISDN", "111"),
            to: Recipient::One(Party::new("MSISDN", "222")),
            amount_type: AmountType::Send,
            amount: Money {
                currency: "USD".to_string(),
                value: Decimal::from_str("10.50").unwrap(),
            },
            transaction_type: "TRANSFER".to_string(),
            note: None,
            quote_request_extensions: ExtensionList::new(),
        }
    }

    #[test]
    fn test_state_moves_forward_only() {
        let mut state = TransferState::new(&request(), ExtensionList::new());
        assert_eq!(state.current_state, CurrentState::WaitingForPartyAcceptance);

        assert!(state.advance(CurrentState::Completed).is_err());
        state.advance(CurrentState::WaitingForQuoteAcceptance).unwrap();
        assert!(state.advance(CurrentState::WaitingForPartyAcceptance).is_err());
        state.advance(CurrentState::Completed).unwrap();

        assert!(state.current_state.is_terminal());
        assert!(state.fail(ErrorInformation::new("2001", "late")).is_err());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_fail_records_last_error() {
        let mut state = TransferState::new(&request(), ExtensionList::new());
        state.fail(ErrorInformation::new("3204", "Party not found")).unwrap();

        assert_eq!(state.current_state, CurrentState::ErrorOccurred);
        assert_eq!(state.last_error.unwrap().error_code, "3204");
    }

    #[test]
    fn test_http_status_mapping() {
        let status = |code: &str| ErrorInformation::new(code, "").http_status();
        assert_eq!(status("3100"), 404);
        assert_eq!(status("3204"), 404);
        assert_eq!(status("3101"), 400);
        assert_eq!(status("4001"), 400);
        assert_eq!(status("5105"), 400);
        assert_eq!(status("2004"), 504);
        assert_eq!(status("2001"), 500);
        assert_eq!(status("1001"), 503);
        assert_eq!(status("not-a-code"), 500);
    }

    #[test]
    fn test_extension_list_insert_replaces() {
        let mut list: ExtensionList = [(keys::MSG_ID, "m1"), (keys::END_TO_END_ID, "e1")]
            .into_iter()
            .collect();
        list.insert(keys::MSG_ID, "m2");

        assert_eq!(list.len(), 2);
        assert_eq!(list.get(keys::MSG_ID), Some("m2"));
        assert_eq!(list.iter().next().unwrap().key, keys::MSG_ID);
        assert_eq!(list.get(keys::TX_ID), None);
    }

    #[test]
    fn test_transfer_response_wire_format() {
        let body = serde_json::json!({
            "transferId": "t1",
            "currentState": "ERROR_OCCURRED",
            "lastError": {
                "httpStatusCode": 500,
                "mojaloopError": {
                    "errorInformation": {"errorCode": "5100", "errorDescription": "Payee rejected"}
                }
            }
        });
        let response: TransferResponse = serde_json::from_value(body).unwrap();

        assert_eq!(response.current_state, CurrentState::ErrorOccurred);
        assert_eq!(
            response.error_information(),
            Some(ErrorInformation::new("5100", "Payee rejected"))
        );
    }

    #[test]
    fn test_recipient_accepts_single_or_list() {
        let one: Recipient = serde_json::from_value(serde_json::json!(
            {"idType": "MSISDN", "idValue": "1"}
        ))
        .unwrap();
        let many: Recipient = serde_json::from_value(serde_json::json!([
            {"idType": "MSISDN", "idValue": "2"},
            {"idType": "MSISDN", "idValue": "3"}
        ]))
        .unwrap();

        assert_eq!(one.primary().unwrap().id_value, "1");
        assert_eq!(many.primary().unwrap().id_value, "2");
    }

    #[test]
    fn test_status_report_outcome() {
        let report = |code: &str| StatusReport {
            extension_list: ExtensionList::new(),
            status_code: code.to_string(),
            reason: None,
        };
        assert_eq!(report("ACSC").outcome(), StatusOutcome::Accepted);
        assert_eq!(report("PDNG").outcome(), StatusOutcome::Pending);
        assert_eq!(report("RJCT").outcome(), StatusOutcome::Rejected);
        assert_eq!(report("XXXX").outcome(), StatusOutcome::Rejected);
    }
}
