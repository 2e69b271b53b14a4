// ISO 20022 Message Transformers
// Supports pacs.008, pacs.002, camt.003, camt.004

pub mod camt003;
pub mod camt004;
pub mod common;
pub mod pacs002;
pub mod pacs008;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

// Re-export commonly used functions
pub use camt003::parse_account_inquiry;
pub use camt004::{parse_account_report, render_account_report};
pub use pacs002::{parse_status_report, render_rejection, render_status_report};
pub use pacs008::{parse_credit_transfer, render_credit_transfer, ParsedCreditTransfer};

pub const NAMESPACE_PREFIX: &str = "urn:iso:std:iso:20022:tech:xsd:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageFamily {
    #[serde(rename = "pacs.008")]
    Pacs008,
    #[serde(rename = "pacs.002")]
    Pacs002,
    #[serde(rename = "camt.003")]
    Camt003,
    #[serde(rename = "camt.004")]
    Camt004,
}

impl MessageFamily {
    pub const ALL: [MessageFamily; 4] = [
        MessageFamily::Pacs008,
        MessageFamily::Pacs002,
        MessageFamily::Camt003,
        MessageFamily::Camt004,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFamily::Pacs008 => "pacs.008",
            MessageFamily::Pacs002 => "pacs.002",
            MessageFamily::Camt003 => "camt.003",
            MessageFamily::Camt004 => "camt.004",
        }
    }

    /// Message definition version this gateway renders
    pub fn schema_id(&self) -> &'static str {
        match self {
            MessageFamily::Pacs008 => "pacs.008.001.10",
            MessageFamily::Pacs002 => "pacs.002.001.10",
            MessageFamily::Camt003 => "camt.003.001.07",
            MessageFamily::Camt004 => "camt.004.001.08",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            MessageFamily::Pacs008 => "urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10",
            MessageFamily::Pacs002 => "urn:iso:std:iso:20022:tech:xsd:pacs.002.001.10",
            MessageFamily::Camt003 => "urn:iso:std:iso:20022:tech:xsd:camt.003.001.07",
            MessageFamily::Camt004 => "urn:iso:std:iso:20022:tech:xsd:camt.004.001.08",
        }
    }

    /// Family of any version of the message, e.g. `...:pacs.008.001.08`
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        let definition = namespace.trim().strip_prefix(NAMESPACE_PREFIX)?;
        Self::ALL.into_iter().find(|family| {
            definition
                .strip_prefix(family.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Identify the family from the root `Document` namespace
    pub fn detect(xml: &str) -> Result<Self> {
        let root = read_root(xml)?;
        if root.local_name != "Document" {
            return Err(GatewayError::Validation(format!(
                "Unexpected root element <{}>",
                root.local_name
            )));
        }
        let namespace = root
            .namespace
            .ok_or_else(|| GatewayError::Validation("Document has no namespace".to_string()))?;

        Self::from_namespace(&namespace).ok_or_else(|| {
            GatewayError::Validation(format!("Unsupported message namespace {}", namespace))
        })
    }
}

impl std::fmt::Display for MessageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and default namespace of a document's root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootElement {
    pub local_name: String,
    pub namespace: Option<String>,
}

pub fn read_root(xml: &str) -> Result<RootElement> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let mut namespace = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| {
                        GatewayError::Validation(format!("Malformed attribute: {}", e))
                    })?;
                    if attr.key.as_ref() == b"xmlns" {
                        let value = attr.unescape_value().map_err(|e| {
                            GatewayError::Validation(format!("Malformed namespace: {}", e))
                        })?;
                        namespace = Some(value.into_owned());
                    }
                }
                return Ok(RootElement {
                    local_name,
                    namespace,
                });
            }
            Ok(Event::Eof) => {
                return Err(GatewayError::Validation("Document is empty".to_string()))
            }
            Err(e) => {
                return Err(GatewayError::Validation(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_namespace() {
        let xml = r#"<?xml version="1.0"?><Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.002.001.12"><FIToFIPmtStsRpt/></Document>"#;
        assert_eq!(MessageFamily::detect(xml).unwrap(), MessageFamily::Pacs002);

        for family in MessageFamily::ALL {
            assert_eq!(MessageFamily::from_namespace(family.namespace()), Some(family));
        }
    }

    #[test]
    fn test_detect_rejects_unknown_documents() {
        let unknown = r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.001.001.09"/>"#;
        assert!(matches!(
            MessageFamily::detect(unknown),
            Err(GatewayError::Validation(_))
        ));

        let no_namespace = "<Document><GetAcct/></Document>";
        assert!(MessageFamily::detect(no_namespace).is_err());

        let wrong_root = r#"<Envelope xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10"/>"#;
        assert!(MessageFamily::detect(wrong_root).is_err());

        assert!(MessageFamily::detect("").is_err());
        assert!(MessageFamily::detect("not xml <<<").is_err());
    }

    #[test]
    fn test_family_prefix_must_end_at_version() {
        assert_eq!(
            MessageFamily::from_namespace("urn:iso:std:iso:20022:tech:xsd:pacs.0081.001.10"),
            None
        );
    }
}
