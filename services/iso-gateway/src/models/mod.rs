// Models module

pub mod canonical;

// Re-export commonly used types
pub use canonical::{
    keys, AmountType, CurrentState, ErrorInformation, ExtensionItem, ExtensionList, Money, Party,
    PartyLookupOutcome, PartyLookupParams, Recipient, StatusOutcome, StatusReport,
    TransferRequest, TransferResponse, TransferState,
};
