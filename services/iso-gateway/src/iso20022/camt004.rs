// camt.004.001.08 - Return Account
// Answer to camt.003: the party the switch resolved, or the lookup error,
// both echoing the queried identifier.

use serde::{Deserialize, Serialize};

use super::camt003::lookup_identification;
use super::common::{
    creation_date_time, from_xml, new_message_id, optional, party_from_iso, party_to_iso,
    required, to_xml, BranchAndFinancialInstitutionIdentification, GenericIdentification,
    PartyIdentification,
};
use super::MessageFamily;
use crate::error::{GatewayError, Result};
use crate::models::{ErrorInformation, PartyLookupOutcome, PartyLookupParams};

#[derive(Debug, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "RtrAcct", default, skip_serializing_if = "Option::is_none")]
    pub return_account: Option<ReturnAccount>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReturnAccount {
    #[serde(rename = "MsgHdr", default, skip_serializing_if = "Option::is_none")]
    pub message_header: Option<MessageHeader>,

    #[serde(rename = "RptOrErr", default, skip_serializing_if = "Option::is_none")]
    pub report_or_error: Option<ReportOrError>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageHeader {
    #[serde(rename = "MsgId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(rename = "CreDtTm", default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReportOrError {
    #[serde(rename = "AcctRpt", default, skip_serializing_if = "Option::is_none")]
    pub account_report: Option<AccountReport>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountReport {
    #[serde(rename = "AcctId", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountIdentification>,

    #[serde(rename = "AcctOrErr", default, skip_serializing_if = "Option::is_none")]
    pub account_or_error: Option<AccountOrError>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountIdentification {
    #[serde(rename = "Othr", default, skip_serializing_if = "Option::is_none")]
    pub other: Option<GenericIdentification>,
}

/// Exactly one of the two is present
#[derive(Debug, Deserialize, Serialize)]
pub struct AccountOrError {
    #[serde(rename = "Acct", default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,

    #[serde(rename = "BizErr", default, skip_serializing_if = "Option::is_none")]
    pub business_error: Option<BusinessError>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Account {
    #[serde(rename = "Nm", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "Ownr", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PartyIdentification>,

    #[serde(rename = "Svcr", default, skip_serializing_if = "Option::is_none")]
    pub servicer: Option<BranchAndFinancialInstitutionIdentification>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BusinessError {
    #[serde(rename = "Err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,

    #[serde(rename = "Desc", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorCode {
    #[serde(rename = "Prtry", default, skip_serializing_if = "Option::is_none")]
    pub proprietary: Option<String>,
}

/// Parse camt.004 XML message
pub fn parse_camt004(xml: &str) -> Result<Document> {
    from_xml(xml, "camt.004")
}

/// Render the result of a party lookup
pub fn render_account_report(
    query: &PartyLookupParams,
    outcome: &PartyLookupOutcome,
) -> Result<String> {
    let account_or_error = match outcome {
        PartyLookupOutcome::Found(party) => {
            let (owner, servicer) = party_to_iso(party);
            AccountOrError {
                account: Some(Account {
                    name: party.display_name.clone(),
                    owner: Some(owner),
                    servicer,
                }),
                business_error: None,
            }
        }
        PartyLookupOutcome::Failed(info) => AccountOrError {
            account: None,
            business_error: Some(BusinessError {
                error: Some(ErrorCode {
                    proprietary: Some(info.error_code.clone()),
                }),
                description: Some(info.error_description.clone()),
            }),
        },
    };

    let document = Document {
        xmlns: Some(MessageFamily::Camt004.namespace().to_string()),
        return_account: Some(ReturnAccount {
            message_header: Some(MessageHeader {
                message_id: Some(new_message_id()),
                creation_date_time: Some(creation_date_time()),
            }),
            report_or_error: Some(ReportOrError {
                account_report: Some(AccountReport {
                    account_id: Some(AccountIdentification {
                        other: Some(lookup_identification(query)),
                    }),
                    account_or_error: Some(account_or_error),
                }),
            }),
        }),
    };

    to_xml(&document)
}

/// Read a camt.004 back into a lookup outcome
pub fn parse_account_report(xml: &str) -> Result<PartyLookupOutcome> {
    let document = parse_camt004(xml)?;
    let account_or_error = document
        .return_account
        .as_ref()
        .and_then(|r| r.report_or_error.as_ref())
        .and_then(|r| r.account_report.as_ref())
        .and_then(|r| r.account_or_error.as_ref())
        .ok_or_else(|| GatewayError::translation("RtrAcct/RptOrErr/AcctRpt/AcctOrErr"))?;

    match (&account_or_error.account, &account_or_error.business_error) {
        (Some(account), _) => {
            let mut party = party_from_iso(
                account.owner.as_ref(),
                account.servicer.as_ref(),
                "AcctOrErr/Acct/Ownr",
            )?;
            if party.display_name.is_none() {
                party.display_name = optional(account.name.as_ref()).map(str::to_string);
            }
            Ok(PartyLookupOutcome::Found(party))
        }
        (None, Some(error)) => {
            let code = required(
                error.error.as_ref().and_then(|e| e.proprietary.as_ref()),
                "AcctOrErr/BizErr/Err/Prtry",
            )?;
            Ok(PartyLookupOutcome::Failed(ErrorInformation::new(
                code,
                optional(error.description.as_ref()).unwrap_or_default(),
            )))
        }
        (None, None) => Err(GatewayError::translation("AcctOrErr/Acct")),
    }
}
