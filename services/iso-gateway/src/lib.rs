// ISO 20022 Gateway Library
// Exposes modules for testing and integration

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod iso20022;
pub mod metrics;
pub mod models;
pub mod switch_client;
pub mod validation;

pub use coordinator::{RenderedResponse, TransferFlowCoordinator};
pub use error::{GatewayError, Result};
