// Transfer Flow Coordinator
// Drives a transfer through quote -> accept -> fulfil against the switch and
// renders every terminal state back into ISO 20022. The asynchronous
// (switch-initiated) leg waits on the correlation registry instead.

use message_bus::{ChannelKey, ChannelType, CorrelationRegistry, Message};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, Result, INTERNAL_SERVER_ERROR};
use crate::iso20022::{
    self, camt003, common::NOT_PROVIDED, MessageFamily, ParsedCreditTransfer,
};
use crate::metrics::METRICS;
use crate::models::{
    keys, CurrentState, ErrorInformation, ExtensionList, PartyLookupOutcome, PartyLookupParams,
    StatusOutcome, StatusReport, TransferRequest, TransferResponse, TransferState,
};
use crate::switch_client::SwitchApi;
use crate::validation::SchemaValidator;

/// Bus subject outbound pacs.008 documents are published on
pub const CREDIT_TRANSFER_OUTBOUND: &str = "iso20022.pacs008.outbound";

pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Error code used when the counterparty rejects without a reason
pub const PAYEE_REJECTED: &str = "5100";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Received,
    QuoteRequested,
    QuoteAcceptedRequested,
    Completed,
    Error,
}

impl FlowStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::Received => "RECEIVED",
            FlowStage::QuoteRequested => "QUOTE_REQUESTED",
            FlowStage::QuoteAcceptedRequested => "QUOTE_ACCEPTED_REQUESTED",
            FlowStage::Completed => "COMPLETED",
            FlowStage::Error => "ERROR",
        }
    }
}

/// What the HTTP layer sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl RenderedResponse {
    pub fn xml(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_XML,
            body,
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_JSON,
            body: body.to_string(),
        }
    }

    fn error_json(error: &GatewayError) -> Self {
        Self::json(
            error.http_status(),
            json!({
                "errorInformation": error.error_information(),
                "type": error.error_type(),
            }),
        )
    }
}

pub struct TransferFlowCoordinator {
    switch: Arc<dyn SwitchApi>,
    registry: CorrelationRegistry,
    validator: Arc<dyn SchemaValidator>,
    correlation_timeout: Duration,
}

impl TransferFlowCoordinator {
    pub fn new(
        switch: Arc<dyn SwitchApi>,
        registry: CorrelationRegistry,
        validator: Arc<dyn SchemaValidator>,
        correlation_timeout: Duration,
    ) -> Self {
        Self {
            switch,
            registry,
            validator,
            correlation_timeout,
        }
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Dispatch on the document's namespace
    pub async fn process_inbound(&self, xml: &str) -> RenderedResponse {
        match MessageFamily::detect(xml) {
            Ok(MessageFamily::Pacs008) => self.process_credit_transfer(xml).await,
            Ok(MessageFamily::Pacs002) => self.process_status_report(xml).await,
            Ok(MessageFamily::Camt003) => self.process_account_inquiry(xml).await,
            Ok(family @ MessageFamily::Camt004) => {
                warn!(family = %family, "Inbound message family is response-only");
                let err = GatewayError::Validation(format!("{} is not accepted inbound", family));
                RenderedResponse::error_json(&err)
            }
            Err(e) => {
                warn!("Could not identify inbound message: {}", e);
                METRICS
                    .iso_rejections_total
                    .with_label_values(&["unknown", "validation"])
                    .inc();
                RenderedResponse::error_json(&e)
            }
        }
    }

    async fn ingest<T>(
        &self,
        xml: &str,
        family: MessageFamily,
        parse: impl FnOnce(&str) -> Result<T>,
    ) -> Result<T> {
        METRICS.track_iso_message(family.as_str());
        let start = Instant::now();

        let parsed = match self.validator.validate(xml, family).await {
            Ok(()) => parse(xml),
            Err(e) => Err(e),
        };
        METRICS
            .iso_parse_duration_seconds
            .observe(start.elapsed().as_secs_f64());

        if let Err(e) = &parsed {
            let kind = match e {
                GatewayError::Translation { .. } => "translation",
                _ => "validation",
            };
            METRICS
                .iso_rejections_total
                .with_label_values(&[family.as_str(), kind])
                .inc();
            warn!(family = %family, "Rejecting inbound message: {}", e);
        }
        parsed
    }

    /// pacs.008 in, pacs.002 out
    pub async fn process_credit_transfer(&self, xml: &str) -> RenderedResponse {
        let ParsedCreditTransfer {
            request,
            extension_list,
        } = match self
            .ingest(xml, MessageFamily::Pacs008, iso20022::parse_credit_transfer)
            .await
        {
            Ok(parsed) => parsed,
            Err(e) => return Self::render_rejection(&e, &ExtensionList::new()),
        };

        let state = self.execute_transfer(&request, extension_list.clone()).await;

        let status = match state.current_state {
            CurrentState::Completed => 200,
            _ => state
                .last_error
                .as_ref()
                .map_or(500, ErrorInformation::http_status),
        };
        match iso20022::render_status_report(&state, &extension_list) {
            Ok(body) => RenderedResponse::xml(status, body),
            Err(e) => {
                error!(
                    end_to_end_id = state.end_to_end_id().unwrap_or(NOT_PROVIDED),
                    "Failed to render status report: {}", e
                );
                RenderedResponse::error_json(&e)
            }
        }
    }

    /// Run quote and acceptance against the switch until a terminal state
    pub async fn execute_transfer(
        &self,
        request: &TransferRequest,
        extension_list: ExtensionList,
    ) -> TransferState {
        let start = Instant::now();
        let mut state = TransferState::new(request, extension_list);
        let end_to_end_id = state.end_to_end_id().unwrap_or(NOT_PROVIDED).to_string();
        info!(
            end_to_end_id = %end_to_end_id,
            stage = FlowStage::Received.as_str(),
            "Credit transfer received"
        );

        debug!(end_to_end_id = %end_to_end_id, stage = FlowStage::QuoteRequested.as_str(), "Requesting quote");
        let quote = self.timed("quote", self.switch.request_quote(request)).await;
        match quote {
            Ok(response) => self.apply_quote(&mut state, response),
            Err(e) => self.record_failure(&mut state, FlowStage::QuoteRequested, &e),
        }

        if state.current_state == CurrentState::WaitingForQuoteAcceptance {
            let transfer_id = state.transfer_id.clone().unwrap_or_default();
            debug!(
                end_to_end_id = %end_to_end_id,
                transfer_id = %transfer_id,
                stage = FlowStage::QuoteAcceptedRequested.as_str(),
                "Accepting quote"
            );
            let accepted = self
                .timed("accept_quote", self.switch.accept_quote(&transfer_id))
                .await;
            match accepted {
                Ok(response) => self.apply_acceptance(&mut state, response),
                Err(e) => self.record_failure(&mut state, FlowStage::QuoteAcceptedRequested, &e),
            }
        }

        self.finish(&state, "sync", start).await;
        state
    }

    fn apply_quote(&self, state: &mut TransferState, response: TransferResponse) {
        if response.transfer_id.is_some() {
            state.transfer_id = response.transfer_id.clone();
        }
        state.quote_response = response.quote_response.clone();

        let outcome = match (response.current_state, state.transfer_id.is_some()) {
            (CurrentState::WaitingForQuoteAcceptance, true) => {
                state.advance(CurrentState::WaitingForQuoteAcceptance)
            }
            (CurrentState::WaitingForQuoteAcceptance, false) => Err(GatewayError::SwitchApi {
                info: ErrorInformation::new(
                    INTERNAL_SERVER_ERROR,
                    "Switch quote response carries no transferId",
                ),
                status: None,
            }),
            (other, _) => Err(Self::unexpected_state(&response, other)),
        };
        if let Err(e) = outcome {
            self.record_failure(state, FlowStage::QuoteRequested, &e);
        }
    }

    fn apply_acceptance(&self, state: &mut TransferState, response: TransferResponse) {
        state.fulfilment = response.fulfil.clone();

        let outcome = match response.current_state {
            CurrentState::Completed => state.advance(CurrentState::Completed),
            other => Err(Self::unexpected_state(&response, other)),
        };
        if let Err(e) = outcome {
            self.record_failure(state, FlowStage::QuoteAcceptedRequested, &e);
        }
    }

    fn unexpected_state(response: &TransferResponse, state: CurrentState) -> GatewayError {
        let info = response.error_information().unwrap_or_else(|| {
            ErrorInformation::new(
                INTERNAL_SERVER_ERROR,
                format!("Switch returned unexpected state {}", state),
            )
        });
        GatewayError::SwitchApi { info, status: None }
    }

    fn record_failure(&self, state: &mut TransferState, stage: FlowStage, err: &GatewayError) {
        let info = err.error_information();
        error!(
            end_to_end_id = state.end_to_end_id().unwrap_or(NOT_PROVIDED),
            transfer_id = state.transfer_id.as_deref().unwrap_or(""),
            stage = stage.as_str(),
            error_code = %info.error_code,
            switch_status = err.upstream_status(),
            "Transfer failed: {}",
            err
        );
        if let Err(e) = state.fail(info) {
            // Only reachable if the state was already terminal.
            warn!("{}", e);
        }
    }

    async fn timed<T>(
        &self,
        operation: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = call.await;
        METRICS.track_switch_call(operation, result.is_ok(), start.elapsed().as_secs_f64());
        result
    }

    /// Log the terminal state and publish it for any correlated waiter
    async fn finish(&self, state: &TransferState, flow: &str, start: Instant) {
        let stage = match state.current_state {
            CurrentState::Completed => FlowStage::Completed,
            _ => FlowStage::Error,
        };
        METRICS
            .transfers_total
            .with_label_values(&[flow, state.current_state.as_str()])
            .inc();
        METRICS
            .transfer_flow_duration_seconds
            .observe(start.elapsed().as_secs_f64());

        let Some(end_to_end_id) = state.end_to_end_id() else {
            warn!(stage = stage.as_str(), "Transfer finished without an end-to-end id");
            return;
        };
        info!(
            end_to_end_id,
            transfer_id = state.transfer_id.as_deref().unwrap_or(""),
            stage = stage.as_str(),
            "Transfer reached terminal state"
        );

        let key = ChannelKey::for_leg(ChannelType::TransferResult, end_to_end_id);
        let published = match Message::from_payload(state) {
            Ok(message) => self.registry.publish_correlated(&key, message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            let err = GatewayError::System(format!("Failed to publish transfer result: {}", e));
            error!(channel = %key, end_to_end_id, "{}", err);
        }
    }

    /// camt.003 in, camt.004 out
    pub async fn process_account_inquiry(&self, xml: &str) -> RenderedResponse {
        let params = match self
            .ingest(xml, MessageFamily::Camt003, iso20022::parse_account_inquiry)
            .await
        {
            Ok(params) => params,
            Err(e) => {
                let query = PartyLookupParams {
                    id_type: camt003::DEFAULT_ID_TYPE.to_string(),
                    id_value: NOT_PROVIDED.to_string(),
                    id_sub_value: None,
                };
                return Self::render_account_report(&query, &e.error_information());
            }
        };

        let lookup = self.timed("party_lookup", self.switch.lookup_party(&params)).await;
        match lookup {
            Ok(party) => {
                info!(id_type = %params.id_type, "Account inquiry resolved");
                let outcome = PartyLookupOutcome::Found(party);
                match iso20022::render_account_report(&params, &outcome) {
                    Ok(body) => RenderedResponse::xml(200, body),
                    Err(e) => RenderedResponse::error_json(&e),
                }
            }
            Err(e) => {
                let info = e.error_information();
                warn!(
                    id_type = %params.id_type,
                    error_code = %info.error_code,
                    "Account inquiry failed: {}",
                    e
                );
                Self::render_account_report(&params, &info)
            }
        }
    }

    fn render_account_report(query: &PartyLookupParams, info: &ErrorInformation) -> RenderedResponse {
        let outcome = PartyLookupOutcome::Failed(info.clone());
        match iso20022::render_account_report(query, &outcome) {
            Ok(body) => RenderedResponse::xml(info.http_status(), body),
            Err(e) => RenderedResponse::error_json(&e),
        }
    }

    fn render_rejection(err: &GatewayError, original: &ExtensionList) -> RenderedResponse {
        let info = err.error_information();
        match iso20022::render_rejection(&info, original) {
            Ok(body) => RenderedResponse::xml(info.http_status(), body),
            Err(e) => RenderedResponse::error_json(&e),
        }
    }

    /// pacs.002 callback: hand the report to whoever waits on it
    pub async fn process_status_report(&self, xml: &str) -> RenderedResponse {
        let report = match self
            .ingest(xml, MessageFamily::Pacs002, iso20022::parse_status_report)
            .await
        {
            Ok(report) => report,
            Err(e) => return RenderedResponse::error_json(&e),
        };

        match self.publish_status_report(&report).await {
            Ok(()) => RenderedResponse::json(
                202,
                json!({
                    "endToEndId": report.end_to_end_id(),
                    "status": report.status_code,
                }),
            ),
            Err(e) => RenderedResponse::error_json(&e),
        }
    }

    /// Publish a terminal status report on its credit-transfer-status channel
    ///
    /// Pending reports are acknowledged but not published; the waiter keeps
    /// waiting for a final status.
    pub async fn publish_status_report(&self, report: &StatusReport) -> Result<()> {
        let end_to_end_id = report
            .end_to_end_id()
            .ok_or_else(|| GatewayError::translation("TxInfAndSts/OrgnlEndToEndId"))?;

        if report.outcome() == StatusOutcome::Pending {
            info!(end_to_end_id, status = %report.status_code, "Pending status report acknowledged");
            return Ok(());
        }

        let key = ChannelKey::for_leg(ChannelType::CreditTransferStatus, end_to_end_id);
        let message = Message::from_payload(report)?;
        self.registry
            .publish_correlated(&key, message)
            .await
            .map_err(|e| {
                error!(channel = %key, end_to_end_id, "Failed to publish status report: {}", e);
                GatewayError::System(e.to_string())
            })?;

        METRICS.status_reports_published_total.inc();
        info!(channel = %key, end_to_end_id, status = %report.status_code, "Status report published");
        Ok(())
    }

    /// Switch-initiated transfer: publish a pacs.008 and wait for the
    /// counterparty's pacs.002
    pub async fn initiate_credit_transfer(&self, request: TransferRequest) -> TransferState {
        let start = Instant::now();
        let mut extensions = request.quote_request_extensions.clone();
        if extensions.get(keys::END_TO_END_ID).is_none() {
            extensions.insert(keys::END_TO_END_ID, request.home_transaction_id.clone());
        }
        let mut state = TransferState::new(&request, extensions.clone());
        let end_to_end_id = request_end_to_end_id(&extensions);

        if let Err(e) = self.run_outbound_leg(&request, &extensions, &mut state).await {
            if matches!(e, GatewayError::Timeout { .. }) {
                METRICS.correlation_timeouts_total.inc();
            }
            self.record_failure(&mut state, FlowStage::QuoteAcceptedRequested, &e);
        }

        debug!(end_to_end_id = %end_to_end_id, state = %state.current_state, "Outbound leg finished");
        self.finish(&state, "async", start).await;
        state
    }

    async fn run_outbound_leg(
        &self,
        request: &TransferRequest,
        extensions: &ExtensionList,
        state: &mut TransferState,
    ) -> Result<()> {
        let end_to_end_id = request_end_to_end_id(extensions);
        let key = ChannelKey::for_leg(ChannelType::CreditTransferStatus, end_to_end_id.as_str());

        // Subscribe first: the bus does not replay what we would miss.
        let pending = self.registry.register(&key).await?;

        let document = iso20022::render_credit_transfer(request, extensions)?;
        let message = Message::new(json!({
            "endToEndId": end_to_end_id,
            "family": MessageFamily::Pacs008.as_str(),
            "document": document,
        }))
        .with_correlation_id(end_to_end_id.as_str());
        self.registry
            .bus()
            .publish(CREDIT_TRANSFER_OUTBOUND, message)
            .await?;
        state.advance(CurrentState::WaitingForQuoteAcceptance)?;
        info!(
            end_to_end_id = %end_to_end_id,
            channel = %key,
            "pacs.008 published; waiting for status report"
        );

        let message = pending.wait(self.correlation_timeout).await?;
        let report: StatusReport = message.decode()?;

        match report.outcome() {
            StatusOutcome::Accepted => state.advance(CurrentState::Completed),
            StatusOutcome::Rejected | StatusOutcome::Pending => {
                let info = report.reason.clone().unwrap_or_else(|| {
                    ErrorInformation::new(
                        PAYEE_REJECTED,
                        format!("Counterparty reported {}", report.status_code),
                    )
                });
                Err(GatewayError::SwitchApi { info, status: None })
            }
        }
    }
}

fn request_end_to_end_id(extensions: &ExtensionList) -> String {
    extensions
        .get(keys::END_TO_END_ID)
        .unwrap_or(NOT_PROVIDED)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_carries_native_error() {
        let response = RenderedResponse::error_json(&GatewayError::translation("GrpHdr/MsgId"));

        assert_eq!(response.status, 400);
        assert_eq!(response.content_type, CONTENT_TYPE_JSON);
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["errorInformation"]["errorCode"], "3102");
    }

    #[test]
    fn test_outbound_end_to_end_id_falls_back() {
        let mut extensions = ExtensionList::new();
        assert_eq!(request_end_to_end_id(&extensions), NOT_PROVIDED);

        extensions.insert(keys::END_TO_END_ID, "e2e-7");
        assert_eq!(request_end_to_end_id(&extensions), "e2e-7");
    }
}
