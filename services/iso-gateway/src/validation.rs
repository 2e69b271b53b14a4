// Schema validation seam
// Runs before any transformer touches a document. The bundled validator
// checks structure only; an XSD engine can sit behind the same trait.

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::iso20022::{read_root, MessageFamily};

#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Fails with `GatewayError::Validation` when `xml` is not a valid
    /// instance of `family`
    async fn validate(&self, xml: &str, family: MessageFamily) -> Result<()>;
}

/// Well-formedness, single `Document` root and namespace family check
#[derive(Debug, Clone, Default)]
pub struct StructuralValidator {
    max_depth: Option<usize>,
}

impl StructuralValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
        }
    }

    fn check(&self, xml: &str, family: MessageFamily) -> Result<()> {
        let root = read_root(xml)?;
        if root.local_name != "Document" {
            return Err(GatewayError::Validation(format!(
                "Expected <Document> root, found <{}>",
                root.local_name
            )));
        }
        let detected = root
            .namespace
            .as_deref()
            .and_then(MessageFamily::from_namespace);
        if detected != Some(family) {
            return Err(GatewayError::Validation(format!(
                "Namespace {} is not a {} schema",
                root.namespace.as_deref().unwrap_or("(none)"),
                family.schema_id()
            )));
        }

        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut depth = 0usize;
        let mut roots = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| {
                GatewayError::Validation(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;
            match event {
                Event::Start(_) => {
                    if depth == 0 {
                        roots += 1;
                    }
                    depth += 1;
                    if self.max_depth.is_some_and(|max| depth > max) {
                        return Err(GatewayError::Validation(
                            "Document nesting too deep".to_string(),
                        ));
                    }
                }
                Event::Empty(_) if depth == 0 => roots += 1,
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Text(_) | Event::CData(_) if depth == 0 => {
                    return Err(GatewayError::Validation(
                        "Text outside the root element".to_string(),
                    ))
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(GatewayError::Validation("Unclosed elements at end of document".to_string()));
        }
        if roots != 1 {
            return Err(GatewayError::Validation(format!(
                "Expected one root element, found {}",
                roots
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SchemaValidator for StructuralValidator {
    async fn validate(&self, xml: &str, family: MessageFamily) -> Result<()> {
        self.check(xml, family)?;
        debug!(schema = family.schema_id(), "Document passed structural validation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.003.001.07">
  <GetAcct><MsgHdr><MsgId>Q1</MsgId></MsgHdr></GetAcct>
</Document>"#;

    #[tokio::test]
    async fn test_accepts_well_formed_document() {
        let validator = StructuralValidator::new();
        assert!(validator.validate(VALID, MessageFamily::Camt003).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_family_mismatch() {
        let validator = StructuralValidator::new();
        let result = validator.validate(VALID, MessageFamily::Pacs008).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn test_rejects_mismatched_and_unclosed_tags() {
        let validator = StructuralValidator::new();

        let mismatched = VALID.replace("</MsgId>", "</MsgID>");
        assert!(validator.validate(&mismatched, MessageFamily::Camt003).await.is_err());

        let unclosed = VALID.replace("</Document>", "");
        assert!(validator.validate(&unclosed, MessageFamily::Camt003).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_second_root_and_deep_nesting() {
        let validator = StructuralValidator::new();
        let two_roots = format!("{}<Document/>", VALID);
        assert!(validator.validate(&two_roots, MessageFamily::Camt003).await.is_err());

        let shallow = StructuralValidator::with_max_depth(2);
        assert!(shallow.validate(VALID, MessageFamily::Camt003).await.is_err());
    }
}
