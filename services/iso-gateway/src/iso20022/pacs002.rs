// pacs.002.001.10 - FI to FI Payment Status Report
// Rendered as the answer to an inbound pacs.008; parsed when a
// counterparty reports on a pacs.008 we sent.

use serde::{Deserialize, Serialize};

use super::common::{
    creation_date_time, from_xml, new_message_id, optional, required, to_xml, NOT_PROVIDED,
};
use super::MessageFamily;
use crate::error::{GatewayError, Result, INTERNAL_SERVER_ERROR};
use crate::models::{keys, CurrentState, ErrorInformation, ExtensionList, StatusReport, TransferState};

pub const STATUS_ACCEPTED: &str = "ACSC";
pub const STATUS_REJECTED: &str = "RJCT";

/// pacs.002 Document root
#[derive(Debug, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "FIToFIPmtStsRpt", default, skip_serializing_if = "Option::is_none")]
    pub fi_to_fi_payment_status_report: Option<FIToFIPaymentStatusReport>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FIToFIPaymentStatusReport {
    #[serde(rename = "GrpHdr", default, skip_serializing_if = "Option::is_none")]
    pub grp_hdr: Option<GroupHeader>,

    #[serde(rename = "OrgnlGrpInfAndSts", default, skip_serializing_if = "Option::is_none")]
    pub original_group_info_and_status: Option<OriginalGroupInfoAndStatus>,

    #[serde(rename = "TxInfAndSts", default)]
    pub transaction_info_and_status: Vec<TransactionInfoAndStatus>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GroupHeader {
    #[serde(rename = "MsgId", default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,

    #[serde(rename = "CreDtTm", default, skip_serializing_if = "Option::is_none")]
    pub cre_dt_tm: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OriginalGroupInfoAndStatus {
    #[serde(rename = "OrgnlMsgId", default, skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<String>,

    #[serde(rename = "OrgnlMsgNmId", default, skip_serializing_if = "Option::is_none")]
    pub original_message_name_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TransactionInfoAndStatus {
    #[serde(rename = "OrgnlInstrId", default, skip_serializing_if = "Option::is_none")]
    pub original_instruction_id: Option<String>,

    #[serde(rename = "OrgnlEndToEndId", default, skip_serializing_if = "Option::is_none")]
    pub original_end_to_end_id: Option<String>,

    #[serde(rename = "OrgnlTxId", default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,

    #[serde(rename = "TxSts", default, skip_serializing_if = "Option::is_none")]
    pub transaction_status: Option<String>, // ACCP, ACSC, ACSP, ACTC, ACWC, PART, PDNG, RJCT

    #[serde(rename = "StsRsnInf", default, skip_serializing_if = "Option::is_none")]
    pub status_reason_info: Option<StatusReasonInfo>,

    #[serde(rename = "AccptncDtTm", default, skip_serializing_if = "Option::is_none")]
    pub acceptance_date_time: Option<String>,

    #[serde(rename = "ClrSysRef", default, skip_serializing_if = "Option::is_none")]
    pub clearing_system_reference: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusReasonInfo {
    #[serde(rename = "Rsn", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,

    #[serde(rename = "AddtlInf", default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Reason {
    #[serde(rename = "Cd", default, skip_serializing_if = "Option::is_none")]
    pub cd: Option<String>, // ISO 20022 reason code

    #[serde(rename = "Prtry", default, skip_serializing_if = "Option::is_none")]
    pub prtry: Option<String>, // switch error code
}

/// ISO transaction status for a canonical state
///
/// Only COMPLETED is accepted; every other state, including the waiting
/// ones, is reported as a rejection.
pub fn transaction_status(state: CurrentState) -> &'static str {
    match state {
        CurrentState::Completed => STATUS_ACCEPTED,
        CurrentState::ErrorOccurred
        | CurrentState::WaitingForPartyAcceptance
        | CurrentState::WaitingForQuoteAcceptance => STATUS_REJECTED,
    }
}

/// Parse pacs.002 XML message
pub fn parse_pacs002(xml: &str) -> Result<Document> {
    from_xml(xml, "pacs.002")
}

/// Render the status of a finished transfer against the original pacs.008
pub fn render_status_report(result: &TransferState, original: &ExtensionList) -> Result<String> {
    let status = transaction_status(result.current_state);
    let reason = if status == STATUS_REJECTED {
        Some(result.last_error.clone().unwrap_or_else(|| {
            ErrorInformation::new(
                INTERNAL_SERVER_ERROR,
                format!("Transfer ended in state {}", result.current_state),
            )
        }))
    } else {
        None
    };

    build(status, reason.as_ref(), result.transfer_id.as_deref(), original)
}

/// Render a rejection for a pacs.008 that never became a transfer
pub fn render_rejection(error: &ErrorInformation, original: &ExtensionList) -> Result<String> {
    build(STATUS_REJECTED, Some(error), None, original)
}

fn build(
    status: &str,
    reason: Option<&ErrorInformation>,
    transfer_id: Option<&str>,
    original: &ExtensionList,
) -> Result<String> {
    let original_id = |key: &str| original.get(key).unwrap_or(NOT_PROVIDED).to_string();

    let document = Document {
        xmlns: Some(MessageFamily::Pacs002.namespace().to_string()),
        fi_to_fi_payment_status_report: Some(FIToFIPaymentStatusReport {
            grp_hdr: Some(GroupHeader {
                msg_id: Some(new_message_id()),
                cre_dt_tm: Some(creation_date_time()),
            }),
            original_group_info_and_status: Some(OriginalGroupInfoAndStatus {
                original_message_id: Some(original_id(keys::MSG_ID)),
                original_message_name_id: Some(MessageFamily::Pacs008.schema_id().to_string()),
            }),
            transaction_info_and_status: vec![TransactionInfoAndStatus {
                original_instruction_id: original.get(keys::INSTR_ID).map(str::to_string),
                original_end_to_end_id: Some(original_id(keys::END_TO_END_ID)),
                original_transaction_id: original.get(keys::TX_ID).map(str::to_string),
                transaction_status: Some(status.to_string()),
                status_reason_info: reason.map(|info| StatusReasonInfo {
                    reason: Some(Reason {
                        cd: None,
                        prtry: Some(info.error_code.clone()),
                    }),
                    additional_info: Some(info.error_description.clone()),
                }),
                acceptance_date_time: (status == STATUS_ACCEPTED).then(creation_date_time),
                clearing_system_reference: transfer_id.map(str::to_string),
            }],
        }),
    };

    to_xml(&document)
}

/// Parse a pacs.002 into its canonical status report
pub fn parse_status_report(xml: &str) -> Result<StatusReport> {
    let document = parse_pacs002(xml)?;
    let report = document
        .fi_to_fi_payment_status_report
        .as_ref()
        .ok_or_else(|| GatewayError::translation("FIToFIPmtStsRpt"))?;

    let tx = match report.transaction_info_and_status.as_slice() {
        [tx] => tx,
        [] => return Err(GatewayError::translation("TxInfAndSts")),
        _ => return Err(GatewayError::translation("TxInfAndSts[2]")),
    };

    let end_to_end_id = required(tx.original_end_to_end_id.as_ref(), "TxInfAndSts/OrgnlEndToEndId")?;
    let status_code = required(tx.transaction_status.as_ref(), "TxInfAndSts/TxSts")?;

    let mut extension_list = ExtensionList::new();
    extension_list.insert_opt(
        keys::MSG_ID,
        report
            .original_group_info_and_status
            .as_ref()
            .and_then(|g| optional(g.original_message_id.as_ref())),
    );
    extension_list.insert_opt(keys::INSTR_ID, optional(tx.original_instruction_id.as_ref()));
    extension_list.insert_opt(keys::TX_ID, optional(tx.original_transaction_id.as_ref()));
    extension_list.insert(keys::END_TO_END_ID, end_to_end_id);

    let reason = tx.status_reason_info.as_ref().and_then(|info| {
        let code = info
            .reason
            .as_ref()
            .and_then(|r| optional(r.prtry.as_ref()).or(optional(r.cd.as_ref())))?;
        Some(ErrorInformation::new(
            code,
            optional(info.additional_info.as_ref()).unwrap_or_default(),
        ))
    });

    Ok(StatusReport {
        extension_list,
        status_code: status_code.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountType, Money, Party, Recipient, StatusOutcome};
    use rust_decimal::Decimal;

    fn state(current_state: CurrentState) -> TransferState {
        TransferState {
            transfer_id: Some("t1".to_string()),
            home_transaction_id: Some("e2e-1".to_string()),
            from: Party::new("MSISDN", "1"),
            to: Recipient::One(Party::new("MSISDN", "2")),
            amount: Money {
                currency: "USD".to_string(),
                value: Decimal::ONE,
            },
            amount_type: AmountType::Send,
            transaction_type: "TRANSFER".to_string(),
            current_state,
            quote_response: None,
            fulfilment: None,
            last_error: None,
            extension_list: ExtensionList::new(),
        }
    }

    fn original() -> ExtensionList {
        [
            (keys::MSG_ID, "MSG-001"),
            (keys::INSTR_ID, "INSTR-001"),
            (keys::TX_ID, "TX-001"),
            (keys::END_TO_END_ID, "e2e-1"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_completed_renders_accepted() {
        let xml = render_status_report(&state(CurrentState::Completed), &original()).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<TxSts>ACSC</TxSts>"));
        assert!(xml.contains("<OrgnlEndToEndId>e2e-1</OrgnlEndToEndId>"));
        assert!(xml.contains("<ClrSysRef>t1</ClrSysRef>"));
        assert!(!xml.contains("StsRsnInf"));

        let report = parse_status_report(&xml).unwrap();
        assert_eq!(report.outcome(), StatusOutcome::Accepted);
        assert_eq!(report.extension_list, original());
    }

    #[test]
    fn test_error_renders_rejection_with_reason() {
        let mut failed = state(CurrentState::WaitingForQuoteAcceptance);
        failed
            .fail(ErrorInformation::new("5100", "Payee rejected quote"))
            .unwrap();

        let xml = render_status_report(&failed, &original()).unwrap();
        let report = parse_status_report(&xml).unwrap();

        assert_eq!(report.status_code, STATUS_REJECTED);
        assert_eq!(
            report.reason,
            Some(ErrorInformation::new("5100", "Payee rejected quote"))
        );
    }

    #[test]
    fn test_waiting_states_default_to_rejection() {
        for waiting in [
            CurrentState::WaitingForPartyAcceptance,
            CurrentState::WaitingForQuoteAcceptance,
        ] {
            assert_eq!(transaction_status(waiting), STATUS_REJECTED);
            let xml = render_status_report(&state(waiting), &original()).unwrap();
            let report = parse_status_report(&xml).unwrap();
            assert_eq!(report.reason.unwrap().error_code, INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_rejection_without_identifiers() {
        let xml = render_rejection(
            &ErrorInformation::new("3101", "Malformed syntax"),
            &ExtensionList::new(),
        )
        .unwrap();

        assert!(xml.contains("<OrgnlMsgId>NOTPROVIDED</OrgnlMsgId>"));
        assert!(xml.contains("<OrgnlEndToEndId>NOTPROVIDED</OrgnlEndToEndId>"));
        assert!(xml.contains("<Prtry>3101</Prtry>"));
    }

    #[test]
    fn test_parse_status_report_requires_end_to_end_id() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.002.001.10">
  <FIToFIPmtStsRpt>
    <GrpHdr>
      <MsgId>STATUS456</MsgId>
      <CreDtTm>2025-01-19T10:00:00Z</CreDtTm>
    </GrpHdr>
    <TxInfAndSts>
      <TxSts>RJCT</TxSts>
    </TxInfAndSts>
  </FIToFIPmtStsRpt>
</Document>"#;

        match parse_status_report(xml) {
            Err(GatewayError::Translation { path }) => {
                assert_eq!(path, "TxInfAndSts/OrgnlEndToEndId")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_iso_reason_code() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.002.001.10">
  <FIToFIPmtStsRpt>
    <GrpHdr>
      <MsgId>STATUS456</MsgId>
      <CreDtTm>2025-01-19T10:00:00Z</CreDtTm>
    </GrpHdr>
    <TxInfAndSts>
      <OrgnlEndToEndId>E2E789012</OrgnlEndToEndId>
      <TxSts>RJCT</TxSts>
      <StsRsnInf>
        <Rsn>
          <Cd>AM04</Cd>
        </Rsn>
        <AddtlInf>Insufficient funds</AddtlInf>
      </StsRsnInf>
    </TxInfAndSts>
  </FIToFIPmtStsRpt>
</Document>"#;

        let report = parse_status_report(xml).unwrap();
        assert_eq!(report.end_to_end_id(), Some("E2E789012"));
        assert_eq!(report.outcome(), StatusOutcome::Rejected);
        assert_eq!(
            report.reason,
            Some(ErrorInformation::new("AM04", "Insufficient funds"))
        );
        assert_eq!(report.extension_list.get(keys::MSG_ID), None);
    }
}
