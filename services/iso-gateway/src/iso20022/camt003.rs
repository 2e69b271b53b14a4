// camt.003.001.07 - Get Account
// Account inquiry; the queried identifier becomes a switch party lookup.

use serde::{Deserialize, Serialize};

use super::common::{
    creation_date_time, from_xml, new_message_id, optional, required, to_xml,
    GenericIdentification, SchemeName,
};
use super::MessageFamily;
use crate::error::Result;
use crate::models::PartyLookupParams;

/// Identifier type assumed when the inquiry names no scheme
pub const DEFAULT_ID_TYPE: &str = "MSISDN";

const ID_PATH: &str = "GetAcct/AcctQryDef/AcctCrit/NewCrit/SchCrit/AcctId/EQ/Othr/Id";

#[derive(Debug, Deserialize, Serialize)]
pub struct Document {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,

    #[serde(rename = "GetAcct", default, skip_serializing_if = "Option::is_none")]
    pub get_account: Option<GetAccount>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GetAccount {
    #[serde(rename = "MsgHdr", default, skip_serializing_if = "Option::is_none")]
    pub message_header: Option<MessageHeader>,

    #[serde(rename = "AcctQryDef", default, skip_serializing_if = "Option::is_none")]
    pub account_query_definition: Option<AccountQuery>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageHeader {
    #[serde(rename = "MsgId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(rename = "CreDtTm", default, skip_serializing_if = "Option::is_none")]
    pub creation_date_time: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountQuery {
    #[serde(rename = "AcctCrit", default, skip_serializing_if = "Option::is_none")]
    pub account_criteria: Option<AccountCriteria>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountCriteria {
    #[serde(rename = "NewCrit", default, skip_serializing_if = "Option::is_none")]
    pub new_criteria: Option<NewCriteria>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NewCriteria {
    #[serde(rename = "SchCrit", default, skip_serializing_if = "Option::is_none")]
    pub search_criteria: Option<SearchCriteria>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchCriteria {
    #[serde(rename = "AcctId", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountIdentificationSearch>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountIdentificationSearch {
    #[serde(rename = "EQ", default, skip_serializing_if = "Option::is_none")]
    pub equal: Option<AccountIdentification>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccountIdentification {
    #[serde(rename = "Othr", default, skip_serializing_if = "Option::is_none")]
    pub other: Option<GenericIdentification>,
}

/// Parse camt.003 XML message
pub fn parse_camt003(xml: &str) -> Result<Document> {
    from_xml(xml, "camt.003")
}

/// Extract the party lookup an account inquiry asks for
pub fn parse_account_inquiry(xml: &str) -> Result<PartyLookupParams> {
    let document = parse_camt003(xml)?;
    let other = document
        .get_account
        .as_ref()
        .and_then(|g| g.account_query_definition.as_ref())
        .and_then(|q| q.account_criteria.as_ref())
        .and_then(|c| c.new_criteria.as_ref())
        .and_then(|c| c.search_criteria.as_ref())
        .and_then(|c| c.account_id.as_ref())
        .and_then(|a| a.equal.as_ref())
        .and_then(|eq| eq.other.as_ref());

    let id_value = required(other.and_then(|o| o.id.as_ref()), ID_PATH)?;
    let id_type = other
        .and_then(|o| optional(o.scheme()))
        .unwrap_or(DEFAULT_ID_TYPE);
    let id_sub_value = other
        .and_then(|o| optional(o.issuer.as_ref()))
        .map(str::to_string);

    Ok(PartyLookupParams {
        id_type: id_type.to_string(),
        id_value: id_value.to_string(),
        id_sub_value,
    })
}

/// Render an account inquiry for `params`
pub fn render_account_inquiry(params: &PartyLookupParams) -> Result<String> {
    let document = Document {
        xmlns: Some(MessageFamily::Camt003.namespace().to_string()),
        get_account: Some(GetAccount {
            message_header: Some(MessageHeader {
                message_id: Some(new_message_id()),
                creation_date_time: Some(creation_date_time()),
            }),
            account_query_definition: Some(AccountQuery {
                account_criteria: Some(AccountCriteria {
                    new_criteria: Some(NewCriteria {
                        search_criteria: Some(SearchCriteria {
                            account_id: Some(AccountIdentificationSearch {
                                equal: Some(AccountIdentification {
                                    other: Some(lookup_identification(params)),
                                }),
                            }),
                        }),
                    }),
                }),
            }),
        }),
    };

    to_xml(&document)
}

/// The queried identifier in ISO form; camt.004 echoes it back
pub fn lookup_identification(params: &PartyLookupParams) -> GenericIdentification {
    GenericIdentification {
        id: Some(params.id_value.clone()),
        scheme_name: Some(SchemeName {
            code: None,
            proprietary: Some(params.id_type.clone()),
        }),
        issuer: params.id_sub_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;

    const CAMT003: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.003.001.07">
  <GetAcct>
    <MsgHdr>
      <MsgId>QRY-001</MsgId>
      <CreDtTm>2025-01-19T10:00:00Z</CreDtTm>
    </MsgHdr>
    <AcctQryDef>
      <AcctCrit>
        <NewCrit>
          <SchCrit>
            <AcctId>
              <EQ>
                <Othr>
                  <Id>1234567</Id>
                  <SchmeNm><Prtry>ACCOUNT_ID</Prtry></SchmeNm>
                </Othr>
              </EQ>
            </AcctId>
          </SchCrit>
        </NewCrit>
      </AcctCrit>
    </AcctQryDef>
  </GetAcct>
</Document>"#;

    #[test]
    fn test_parse_account_inquiry() {
        let params = parse_account_inquiry(CAMT003).unwrap();
        assert_eq!(params.id_type, "ACCOUNT_ID");
        assert_eq!(params.id_value, "1234567");
        assert_eq!(params.id_sub_value, None);
    }

    #[test]
    fn test_scheme_defaults_to_msisdn() {
        let xml = CAMT003.replace("<SchmeNm><Prtry>ACCOUNT_ID</Prtry></SchmeNm>", "");
        let params = parse_account_inquiry(&xml).unwrap();
        assert_eq!(params.id_type, DEFAULT_ID_TYPE);
    }

    #[test]
    fn test_missing_identifier_is_translation_error() {
        let xml = CAMT003.replace("<Id>1234567</Id>", "");
        match parse_account_inquiry(&xml) {
            Err(GatewayError::Translation { path }) => assert_eq!(path, ID_PATH),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_then_parse() {
        let params = PartyLookupParams {
            id_type: "MSISDN".to_string(),
            id_value: "27710101010".to_string(),
            id_sub_value: Some("sub-1".to_string()),
        };
        let xml = render_account_inquiry(&params).unwrap();
        assert!(xml.contains("camt.003.001.07"));
        assert_eq!(parse_account_inquiry(&xml).unwrap(), params);
    }
}
