// pacs.008 - FI to FI Customer Credit Transfer
// Inbound: becomes a switch quote request. Outbound: rendered for
// transfers the switch initiates.

use serde::{Deserialize, Serialize};

use super::common::{
    creation_date_time, from_xml, new_message_id, optional, party_from_iso, party_to_iso,
    required, to_xml, ActiveCurrencyAndAmount, BranchAndFinancialInstitutionIdentification,
    PartyIdentification,
};
use super::MessageFamily;
use crate::error::{GatewayError, Result};
use crate::models::{keys, AmountType, ExtensionList, Recipient, TransferRequest};

pub const DEFAULT_TRANSACTION_TYPE: &str = "TRANSFER";

#[derive(Debug, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "FIToFICstmrCdtTrf", default, skip_serializing_if = "Option::is_none")]
    pub fi_to_fi_customer_credit_transfer: Option<FIToFICustomerCreditTransfer>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FIToFICustomerCreditTransfer {
    #[serde(rename = "GrpHdr", default, skip_serializing_if = "Option::is_none")]
    pub group_header: Option<GroupHeader>,

    #[serde(rename = "CdtTrfTxInf", default)]
    pub credit_transfer_transaction_information: Vec<CreditTransferTransaction>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GroupHeader {
    #[serde(rename = "MsgId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(rename = "CreDtTm", default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<String>,

    #[serde(rename = "NbOfTxs", default, skip_serializing_if = "Option::is_none")]
    pub number_of_transactions: Option<String>,

    #[serde(rename = "SttlmInf", default, skip_serializing_if = "Option::is_none")]
    pub settlement_information: Option<SettlementInformation>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SettlementInformation {
    #[serde(rename = "SttlmMtd", default, skip_serializing_if = "Option::is_none")]
    pub settlement_method: Option<String>, // INDA, INGA, COVE, CLRG
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreditTransferTransaction {
    #[serde(rename = "PmtId", default, skip_serializing_if = "Option::is_none")]
    pub payment_identification: Option<PaymentIdentification>,

    #[serde(rename = "IntrBkSttlmAmt", default, skip_serializing_if = "Option::is_none")]
    pub interbank_settlement_amount: Option<ActiveCurrencyAndAmount>,

    #[serde(rename = "ChrgBr", default, skip_serializing_if = "Option::is_none")]
    pub charge_bearer: Option<String>, // DEBT, CRED, SHAR, SLEV

    #[serde(rename = "Dbtr", default, skip_serializing_if = "Option::is_none")]
    pub debtor: Option<PartyIdentification>,

    #[serde(rename = "DbtrAgt", default, skip_serializing_if = "Option::is_none")]
    pub debtor_agent: Option<BranchAndFinancialInstitutionIdentification>,

    #[serde(rename = "CdtrAgt", default, skip_serializing_if = "Option::is_none")]
    pub creditor_agent: Option<BranchAndFinancialInstitutionIdentification>,

    #[serde(rename = "Cdtr", default, skip_serializing_if = "Option::is_none")]
    pub creditor: Option<PartyIdentification>,

    #[serde(rename = "Purp", default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,

    #[serde(rename = "RmtInf", default, skip_serializing_if = "Option::is_none")]
    pub remittance_information: Option<RemittanceInformation>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PaymentIdentification {
    #[serde(rename = "InstrId", default, skip_serializing_if = "Option::is_none")]
    pub instruction_id: Option<String>,

    #[serde(rename = "EndToEndId", default, skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,

    #[serde(rename = "TxId", default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Purpose {
    #[serde(rename = "Prtry", default, skip_serializing_if = "Option::is_none")]
    pub proprietary: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RemittanceInformation {
    #[serde(rename = "Ustrd", default, skip_serializing_if = "Option::is_none")]
    pub unstructured: Option<String>,
}

/// Inbound pacs.008 in canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCreditTransfer {
    pub request: TransferRequest,
    pub extension_list: ExtensionList,
}

/// Parse pacs.008 XML message
pub fn parse_pacs008(xml: &str) -> Result<Document> {
    from_xml(xml, "pacs.008")
}

/// Parse a pacs.008 into a quote request plus the ISO identifiers
pub fn parse_credit_transfer(xml: &str) -> Result<ParsedCreditTransfer> {
    let document = parse_pacs008(xml)?;
    to_canonical(&document)
}

pub fn to_canonical(document: &Document) -> Result<ParsedCreditTransfer> {
    let transfer = document
        .fi_to_fi_customer_credit_transfer
        .as_ref()
        .ok_or_else(|| GatewayError::translation("FIToFICstmrCdtTrf"))?;

    let header = transfer
        .group_header
        .as_ref()
        .ok_or_else(|| GatewayError::translation("FIToFICstmrCdtTrf/GrpHdr"))?;
    let message_id = required(header.message_id.as_ref(), "GrpHdr/MsgId")?;

    let tx = match transfer.credit_transfer_transaction_information.as_slice() {
        [tx] => tx,
        [] => return Err(GatewayError::translation("CdtTrfTxInf")),
        // One transfer per message
        _ => return Err(GatewayError::translation("CdtTrfTxInf[2]")),
    };

    let payment_id = tx
        .payment_identification
        .as_ref()
        .ok_or_else(|| GatewayError::translation("CdtTrfTxInf/PmtId"))?;
    let end_to_end_id = required(payment_id.end_to_end_id.as_ref(), "CdtTrfTxInf/PmtId/EndToEndId")?;
    let instruction_id = optional(payment_id.instruction_id.as_ref());
    let transaction_id = optional(payment_id.transaction_id.as_ref());

    let amount = tx
        .interbank_settlement_amount
        .as_ref()
        .ok_or_else(|| GatewayError::translation("CdtTrfTxInf/IntrBkSttlmAmt"))?
        .to_money("CdtTrfTxInf/IntrBkSttlmAmt")?;

    let from = party_from_iso(tx.debtor.as_ref(), tx.debtor_agent.as_ref(), "CdtTrfTxInf/Dbtr")?;
    let to = party_from_iso(tx.creditor.as_ref(), tx.creditor_agent.as_ref(), "CdtTrfTxInf/Cdtr")?;

    let mut extension_list = ExtensionList::new();
    extension_list.insert(keys::MSG_ID, message_id);
    extension_list.insert_opt(keys::INSTR_ID, instruction_id);
    extension_list.insert_opt(keys::TX_ID, transaction_id);
    extension_list.insert(keys::END_TO_END_ID, end_to_end_id);

    let transaction_type = tx
        .purpose
        .as_ref()
        .and_then(|p| optional(p.proprietary.as_ref()))
        .unwrap_or(DEFAULT_TRANSACTION_TYPE);
    let note = tx
        .remittance_information
        .as_ref()
        .and_then(|r| optional(r.unstructured.as_ref()))
        .map(str::to_string);

    let request = TransferRequest {
        home_transaction_id: end_to_end_id.to_string(),
        from,
        to: Recipient::One(to),
        amount_type: AmountType::Send,
        amount,
        transaction_type: transaction_type.to_string(),
        note,
        quote_request_extensions: extension_list.clone(),
    };

    Ok(ParsedCreditTransfer {
        request,
        extension_list,
    })
}

/// Render a pacs.008 for a switch-initiated transfer
///
/// The group header always gets a fresh MsgId. Instruction and transaction
/// ids come from `extensions`; missing ones are generated.
pub fn render_credit_transfer(request: &TransferRequest, extensions: &ExtensionList) -> Result<String> {
    let creditor = request
        .to
        .primary()
        .ok_or_else(|| GatewayError::translation("to"))?;
    let (debtor, debtor_agent) = party_to_iso(&request.from);
    let (creditor, creditor_agent) = party_to_iso(creditor);

    let id = |key: &str| {
        extensions
            .get(key)
            .map(str::to_string)
            .unwrap_or_else(new_message_id)
    };

    let document = Document {
        xmlns: Some(MessageFamily::Pacs008.namespace().to_string()),
        fi_to_fi_customer_credit_transfer: Some(FIToFICustomerCreditTransfer {
            group_header: Some(GroupHeader {
                message_id: Some(new_message_id()),
                creation_date_time: Some(creation_date_time()),
                number_of_transactions: Some("1".to_string()),
                settlement_information: Some(SettlementInformation {
                    settlement_method: Some("CLRG".to_string()),
                }),
            }),
            credit_transfer_transaction_information: vec![CreditTransferTransaction {
                payment_identification: Some(PaymentIdentification {
                    instruction_id: Some(id(keys::INSTR_ID)),
                    end_to_end_id: Some(
                        extensions
                            .get(keys::END_TO_END_ID)
                            .unwrap_or(&request.home_transaction_id)
                            .to_string(),
                    ),
                    transaction_id: Some(id(keys::TX_ID)),
                }),
                interbank_settlement_amount: Some(ActiveCurrencyAndAmount::from_money(&request.amount)),
                charge_bearer: Some("SLEV".to_string()),
                debtor: Some(debtor),
                debtor_agent,
                creditor_agent,
                creditor: Some(creditor),
                purpose: Some(Purpose {
                    proprietary: Some(request.transaction_type.clone()),
                }),
                remittance_information: request.note.as_ref().map(|note| RemittanceInformation {
                    unstructured: Some(note.clone()),
                }),
            }],
        }),
    };

    to_xml(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Money, Party};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const PACS008: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10">
  <FIToFICstmrCdtTrf>
    <GrpHdr>
      <MsgId>MSG-001</MsgId>
      <CreDtTm>2025-01-19T10:00:00Z</CreDtTm>
      <NbOfTxs>1</NbOfTxs>
      <SttlmInf><SttlmMtd>CLRG</SttlmMtd></SttlmInf>
    </GrpHdr>
    <CdtTrfTxInf>
      <PmtId>
        <InstrId>INSTR-001</InstrId>
        <EndToEndId>e2e-1</EndToEndId>
        <TxId>TX-001</TxId>
      </PmtId>
      <IntrBkSttlmAmt Ccy="USD">150.25</IntrBkSttlmAmt>
      <ChrgBr>SLEV</ChrgBr>
      <Dbtr>
        <Nm>Alice</Nm>
        <Id><PrvtId><Othr><Id>27710101010</Id><SchmeNm><Prtry>MSISDN</Prtry></SchmeNm></Othr></PrvtId></Id>
      </Dbtr>
      <DbtrAgt><FinInstnId><Othr><Id>dfsp-a</Id></Othr></FinInstnId></DbtrAgt>
      <CdtrAgt><FinInstnId><Othr><Id>dfsp-b</Id></Othr></FinInstnId></CdtrAgt>
      <Cdtr>
        <Nm>Bob</Nm>
        <Id><PrvtId><Othr><Id>27720202020</Id><SchmeNm><Prtry>MSISDN</Prtry></SchmeNm></Othr></PrvtId></Id>
      </Cdtr>
      <RmtInf><Ustrd>Rent</Ustrd></RmtInf>
    </CdtTrfTxInf>
  </FIToFICstmrCdtTrf>
</Document>"#;

    #[test]
    fn test_parse_credit_transfer() {
        let parsed = parse_credit_transfer(PACS008).unwrap();

        assert_eq!(parsed.extension_list.get(keys::MSG_ID), Some("MSG-001"));
        assert_eq!(parsed.extension_list.get(keys::INSTR_ID), Some("INSTR-001"));
        assert_eq!(parsed.extension_list.get(keys::TX_ID), Some("TX-001"));
        assert_eq!(parsed.extension_list.get(keys::END_TO_END_ID), Some("e2e-1"));

        let request = parsed.request;
        assert_eq!(request.home_transaction_id, "e2e-1");
        assert_eq!(request.amount.currency, "USD");
        assert_eq!(request.amount.value, Decimal::from_str("150.25").unwrap());
        assert_eq!(request.from.id_value, "27710101010");
        assert_eq!(request.from.display_name.as_deref(), Some("Alice"));
        assert_eq!(request.from.fsp_id.as_deref(), Some("dfsp-a"));
        assert_eq!(request.to.primary().unwrap().id_value, "27720202020");
        assert_eq!(request.transaction_type, "TRANSFER");
        assert_eq!(request.note.as_deref(), Some("Rent"));
    }

    #[test]
    fn test_missing_end_to_end_id_is_translation_error() {
        let xml = PACS008.replace("<EndToEndId>e2e-1</EndToEndId>", "");
        match parse_credit_transfer(&xml) {
            Err(GatewayError::Translation { path }) => {
                assert_eq!(path, "CdtTrfTxInf/PmtId/EndToEndId")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_amount_is_translation_error() {
        let xml = PACS008.replace(r#"<IntrBkSttlmAmt Ccy="USD">150.25</IntrBkSttlmAmt>"#, "");
        assert!(matches!(
            parse_credit_transfer(&xml),
            Err(GatewayError::Translation { .. })
        ));
    }

    #[test]
    fn test_optional_identifiers_may_be_absent() {
        let xml = PACS008
            .replace("<InstrId>INSTR-001</InstrId>", "")
            .replace("<TxId>TX-001</TxId>", "")
            .replace("<RmtInf><Ustrd>Rent</Ustrd></RmtInf>", "");
        let parsed = parse_credit_transfer(&xml).unwrap();

        assert_eq!(parsed.extension_list.len(), 2);
        assert_eq!(parsed.extension_list.get(keys::INSTR_ID), None);
        assert!(parsed.request.note.is_none());
    }

    #[test]
    fn test_multiple_transactions_rejected() {
        let start = PACS008.find("<CdtTrfTxInf>").unwrap();
        let end = PACS008.find("</CdtTrfTxInf>").unwrap() + "</CdtTrfTxInf>".len();
        let tx = &PACS008[start..end];
        let xml = PACS008.replace(tx, &format!("{}{}", tx, tx));

        match parse_credit_transfer(&xml) {
            Err(GatewayError::Translation { path }) => assert_eq!(path, "CdtTrfTxInf[2]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_credit_transfer_round_trip() {
        let request = TransferRequest {
            home_transaction_id: "home-1".to_string(),
            from: Party::new("MSISDN", "111"),
            to: Recipient::One(Party::new("ACCOUNT_ID", "222")),
            amount_type: AmountType::Send,
            amount: Money {
                currency: "KES".to_string(),
                value: Decimal::from_str("99.90").unwrap(),
            },
            transaction_type: "TRANSFER".to_string(),
            note: None,
            quote_request_extensions: ExtensionList::new(),
        };
        let extensions: ExtensionList = [(keys::END_TO_END_ID, "e2e-out")].into_iter().collect();

        let xml = render_credit_transfer(&request, &extensions).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10"));

        let parsed = parse_credit_transfer(&xml).unwrap();
        assert_eq!(parsed.extension_list.get(keys::END_TO_END_ID), Some("e2e-out"));
        assert_eq!(parsed.extension_list.get(keys::MSG_ID).map(str::len), Some(32));
        assert_eq!(parsed.request.amount, request.amount);
        assert_eq!(parsed.request.to.primary().unwrap().id_type, "ACCOUNT_ID");
    }

    #[test]
    fn test_render_credit_transfer_mints_message_id() {
        let request = TransferRequest {
            home_transaction_id: "home-2".to_string(),
            from: Party::new("MSISDN", "111"),
            to: Recipient::One(Party::new("MSISDN", "222")),
            amount_type: AmountType::Send,
            amount: Money {
                currency: "USD".to_string(),
                value: Decimal::from(5),
            },
            transaction_type: "TRANSFER".to_string(),
            note: None,
            quote_request_extensions: ExtensionList::new(),
        };
        let extensions: ExtensionList = [(keys::MSG_ID, "OLD-MSG"), (keys::INSTR_ID, "INSTR-1")]
            .into_iter()
            .collect();

        let first = parse_credit_transfer(&render_credit_transfer(&request, &extensions).unwrap()).unwrap();
        let second = parse_credit_transfer(&render_credit_transfer(&request, &extensions).unwrap()).unwrap();

        let first_id = first.extension_list.get(keys::MSG_ID).unwrap();
        let second_id = second.extension_list.get(keys::MSG_ID).unwrap();
        assert_ne!(first_id, "OLD-MSG");
        assert_ne!(second_id, "OLD-MSG");
        assert_ne!(first_id, second_id);
        assert_eq!(first.extension_list.get(keys::INSTR_ID), Some("INSTR-1"));
    }
}
