// Building blocks shared by every ISO 20022 message family:
// currency amounts, party and agent identification, and the
// parse/render plumbing around quick-xml.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::models::{keys, ExtensionList, Money, Party};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// ISO placeholder for an identifier the originator did not supply
pub const NOT_PROVIDED: &str = "NOTPROVIDED";

/// Fresh MsgId (32 chars, within the 35 char limit)
pub fn new_message_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn creation_date_time() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Non-blank text at a mandatory path
pub fn required<'a>(value: Option<&'a String>, path: &str) -> Result<&'a str> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(GatewayError::translation(path)),
    }
}

/// Non-blank text at an optional path
pub fn optional(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

pub fn from_xml<T: DeserializeOwned>(xml: &str, family: &str) -> Result<T> {
    quick_xml::de::from_str(xml)
        .map_err(|e| GatewayError::Validation(format!("Failed to parse {} XML: {}", family, e)))
}

/// Serialise a `Document` and prefix the XML declaration
pub fn to_xml<T: Serialize>(document: &T) -> Result<String> {
    let body = quick_xml::se::to_string_with_root("Document", document)
        .map_err(|e| GatewayError::System(format!("Failed to render XML: {}", e)))?;
    Ok(format!("{}\n{}", XML_DECLARATION, body))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActiveCurrencyAndAmount {
    #[serde(rename = "@Ccy", default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ActiveCurrencyAndAmount {
    pub fn from_money(money: &Money) -> Self {
        Self {
            currency: Some(money.currency.clone()),
            value: Some(money.value.normalize().to_string()),
        }
    }

    pub fn to_money(&self, path: &str) -> Result<Money> {
        let currency = required(self.currency.as_ref(), &format!("{}/@Ccy", path))?;
        let value = required(self.value.as_ref(), path)?;
        let value = Decimal::from_str(value).map_err(|_| GatewayError::translation(path))?;
        if value.is_sign_negative() {
            return Err(GatewayError::translation(path));
        }

        Ok(Money {
            currency: currency.to_string(),
            value,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemeName {
    #[serde(rename = "Cd", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(rename = "Prtry", default, skip_serializing_if = "Option::is_none")]
    pub proprietary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GenericIdentification {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "SchmeNm", default, skip_serializing_if = "Option::is_none")]
    pub scheme_name: Option<SchemeName>,

    #[serde(rename = "Issr", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl GenericIdentification {
    pub fn scheme(&self) -> Option<&String> {
        self.scheme_name
            .as_ref()
            .and_then(|s| s.proprietary.as_ref().or(s.code.as_ref()))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersonIdentification {
    #[serde(rename = "Othr", default, skip_serializing_if = "Option::is_none")]
    pub other: Option<GenericIdentification>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Party38Choice {
    #[serde(rename = "PrvtId", default, skip_serializing_if = "Option::is_none")]
    pub private_id: Option<PersonIdentification>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactDetails {
    #[serde(rename = "MobNb", default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,

    #[serde(rename = "EmailAdr", default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl ContactDetails {
    fn from_extensions(extensions: &ExtensionList) -> Option<Self> {
        let details = ContactDetails {
            mobile_number: extensions.get(keys::MSISDN).map(str::to_string),
            email_address: extensions.get(keys::EMAIL).map(str::to_string),
        };
        (details.mobile_number.is_some() || details.email_address.is_some()).then_some(details)
    }

    fn to_extensions(&self, extensions: &mut ExtensionList) {
        extensions.insert_opt(keys::MSISDN, optional(self.mobile_number.as_ref()));
        extensions.insert_opt(keys::EMAIL, optional(self.email_address.as_ref()));
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PartyIdentification {
    #[serde(rename = "Nm", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Party38Choice>,

    #[serde(rename = "CtctDtls", default, skip_serializing_if = "Option::is_none")]
    pub contact_details: Option<ContactDetails>,
}

impl PartyIdentification {
    pub fn other_id(&self) -> Option<&GenericIdentification> {
        self.identification
            .as_ref()
            .and_then(|id| id.private_id.as_ref())
            .and_then(|id| id.other.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FinancialInstitutionIdentification {
    #[serde(rename = "BICFI", default, skip_serializing_if = "Option::is_none")]
    pub bicfi: Option<String>,

    #[serde(rename = "Othr", default, skip_serializing_if = "Option::is_none")]
    pub other: Option<GenericIdentification>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BranchAndFinancialInstitutionIdentification {
    #[serde(rename = "FinInstnId", default, skip_serializing_if = "Option::is_none")]
    pub financial_institution_id: Option<FinancialInstitutionIdentification>,
}

impl BranchAndFinancialInstitutionIdentification {
    pub fn for_fsp(fsp_id: &str) -> Self {
        Self {
            financial_institution_id: Some(FinancialInstitutionIdentification {
                bicfi: None,
                other: Some(GenericIdentification {
                    id: Some(fsp_id.to_string()),
                    ..Default::default()
                }),
            }),
        }
    }

    /// Participant id, falling back to the BIC
    pub fn fsp_id(&self) -> Option<&str> {
        let fin = self.financial_institution_id.as_ref()?;
        optional(fin.other.as_ref().and_then(|o| o.id.as_ref())).or(optional(fin.bicfi.as_ref()))
    }
}

/// Build a canonical party from an ISO party and its agent
pub fn party_from_iso(
    party: Option<&PartyIdentification>,
    agent: Option<&BranchAndFinancialInstitutionIdentification>,
    path: &str,
) -> Result<Party> {
    let party = party.ok_or_else(|| GatewayError::translation(path))?;
    let other = party.other_id();
    let id_path = format!("{}/Id/PrvtId/Othr", path);

    let id_value = required(other.and_then(|o| o.id.as_ref()), &format!("{}/Id", id_path))?;
    let id_type = required(
        other.and_then(|o| o.scheme()),
        &format!("{}/SchmeNm/Prtry", id_path),
    )?;

    let mut canonical = Party::new(id_type, id_value);
    canonical.id_sub_value = optional(other.and_then(|o| o.issuer.as_ref())).map(str::to_string);
    canonical.display_name = optional(party.name.as_ref()).map(str::to_string);
    canonical.fsp_id = agent.and_then(|a| a.fsp_id()).map(str::to_string);
    if let Some(contact) = &party.contact_details {
        contact.to_extensions(&mut canonical.extension_list);
    }

    Ok(canonical)
}

pub fn party_to_iso(
    party: &Party,
) -> (PartyIdentification, Option<BranchAndFinancialInstitutionIdentification>) {
    let identification = PartyIdentification {
        name: party.display_name.clone(),
        identification: Some(Party38Choice {
            private_id: Some(PersonIdentification {
                other: Some(GenericIdentification {
                    id: Some(party.id_value.clone()),
                    scheme_name: Some(SchemeName {
                        code: None,
                        proprietary: Some(party.id_type.clone()),
                    }),
                    issuer: party.id_sub_value.clone(),
                }),
            }),
        }),
        contact_details: ContactDetails::from_extensions(&party.extension_list),
    };
    let agent = party
        .fsp_id
        .as_deref()
        .map(BranchAndFinancialInstitutionIdentification::for_fsp);

    (identification, agent)
}
