//! Property-based tests for identifier and amount preservation
//!
//! Whatever payment identifiers a credit transfer carries must come back
//! unchanged in the pacs.008 we render and in the pacs.002 answering it.
//! The pacs.008 group header gets a fresh MsgId on every render.

use proptest::prelude::*;
use rust_decimal::Decimal;

use iso_gateway::iso20022;
use iso_gateway::models::{
    keys, AmountType, CurrentState, ExtensionList, Money, Party, Recipient, TransferRequest,
    TransferState,
};

fn request(end_to_end_id: &str, cents: i64) -> TransferRequest {
    TransferRequest {
        home_transaction_id: end_to_end_id.to_string(),
        from: Party::new("MSISDN", "27710101010"),
        to: Recipient::One(Party::new("MSISDN", "27720202020")),
        amount_type: AmountType::Send,
        amount: Money {
            currency: "USD".to_string(),
            value: Decimal::from(cents) / Decimal::from(100),
        },
        transaction_type: "TRANSFER".to_string(),
        note: None,
        quote_request_extensions: ExtensionList::new(),
    }
}

/// Max35Text without surrounding whitespace, including markup characters
fn identifier() -> impl Strategy<Value = String> {
    "[A-Za-z0-9&<>'\"./:#-]{1,35}"
}

proptest! {
    /// Property: pacs.008 identifiers and amount survive render -> parse
    #[test]
    fn credit_transfer_preserves_identifiers(
        msg_id in identifier(),
        instr_id in identifier(),
        tx_id in identifier(),
        end_to_end_id in identifier(),
        cents in 1i64..1_000_000_000i64,
    ) {
        let extensions: ExtensionList = [
            (keys::MSG_ID, msg_id.as_str()),
            (keys::INSTR_ID, instr_id.as_str()),
            (keys::TX_ID, tx_id.as_str()),
            (keys::END_TO_END_ID, end_to_end_id.as_str()),
        ]
        .into_iter()
        .collect();
        let original = request(&end_to_end_id, cents);

        let xml = iso20022::render_credit_transfer(&original, &extensions).unwrap();
        let parsed = iso20022::parse_credit_transfer(&xml).unwrap();

        prop_assert_ne!(parsed.extension_list.get(keys::MSG_ID), Some(msg_id.as_str()));
        prop_assert_eq!(parsed.extension_list.get(keys::INSTR_ID), Some(instr_id.as_str()));
        prop_assert_eq!(parsed.extension_list.get(keys::TX_ID), Some(tx_id.as_str()));
        prop_assert_eq!(parsed.extension_list.get(keys::END_TO_END_ID), Some(end_to_end_id.as_str()));
        prop_assert_eq!(parsed.request.amount.value, original.amount.value);
        prop_assert_eq!(parsed.request.home_transaction_id, end_to_end_id);
    }

    /// Property: the pacs.002 for a transfer echoes its original identifiers
    #[test]
    fn status_report_echoes_original_identifiers(
        msg_id in identifier(),
        end_to_end_id in identifier(),
        completed in any::<bool>(),
    ) {
        let extensions: ExtensionList = [
            (keys::MSG_ID, msg_id.as_str()),
            (keys::END_TO_END_ID, end_to_end_id.as_str()),
        ]
        .into_iter()
        .collect();
        let mut state = TransferState::new(&request(&end_to_end_id, 100), extensions.clone());
        state.advance(CurrentState::WaitingForQuoteAcceptance).unwrap();
        if completed {
            state.advance(CurrentState::Completed).unwrap();
        }

        let xml = iso20022::render_status_report(&state, &extensions).unwrap();
        let report = iso20022::parse_status_report(&xml).unwrap();

        prop_assert_eq!(report.end_to_end_id(), Some(end_to_end_id.as_str()));
        prop_assert_eq!(report.extension_list.get(keys::MSG_ID), Some(msg_id.as_str()));
        prop_assert_eq!(report.reason.is_none(), completed);
    }
}
