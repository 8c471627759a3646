//! Error handler: classify, recover, report

use std::sync::Arc;

use chrono::Utc;
use resilience_core_types::ErrorId;
use resilience_event_bus::{EngineEvent, NullBus, SharedBus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classifier::ErrorClassifier;
use crate::diagnostics::{build_report, DiagnosticReport, DiagnosticsSettings, DiagnosticsStore, ReportInput};
use crate::errors::Result;
use crate::executor::{RecoveryExecutor, RecoveryReport};
use crate::types::{ContextMap, ErrorClassification, Failure, RecoveryContext};

/// Everything known about one handled failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandledError {
    pub error_id: ErrorId,
    pub classification: ErrorClassification,
    pub recovery: RecoveryReport,
    pub report: DiagnosticReport,
}

impl HandledError {
    pub fn recovered(&self) -> bool {
        self.recovery.recovered()
    }
}

pub struct ErrorHandler {
    classifier: Arc<ErrorClassifier>,
    executor: Arc<RecoveryExecutor>,
    diagnostics: Arc<DiagnosticsStore>,
    settings: DiagnosticsSettings,
    bus: SharedBus,
}

impl ErrorHandler {
    pub fn new(
        classifier: Arc<ErrorClassifier>,
        executor: Arc<RecoveryExecutor>,
        settings: DiagnosticsSettings,
    ) -> Self {
        Self {
            classifier,
            executor,
            diagnostics: Arc::new(DiagnosticsStore::new(settings.max_reports)),
            settings,
            bus: NullBus::<EngineEvent>::new(),
        }
    }

    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn classifier(&self) -> &Arc<ErrorClassifier> {
        &self.classifier
    }

    pub fn executor(&self) -> &Arc<RecoveryExecutor> {
        &self.executor
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticsStore> {
        &self.diagnostics
    }

    /// Classify and recover, then store a diagnostic report and announce the result
    pub async fn handle(&self, failure: &Failure, ctx: &RecoveryContext) -> Result<HandledError> {
        let classification = self.classifier.classify(failure, &ctx.values);
        self.handle_classified(failure, classification, ctx).await
    }

    /// Same as [`handle`](Self::handle) for a failure the caller already classified
    pub async fn handle_classified(
        &self,
        failure: &Failure,
        classification: ErrorClassification,
        ctx: &RecoveryContext,
    ) -> Result<HandledError> {
        let recovery = self.executor.recover(&classification, ctx).await?;
        let report = self.report(failure, &classification, &ctx.values, Some(&recovery));

        if recovery.recovered() {
            info!(
                "error {} ({}) recovered via {:?}",
                report.error_id, classification.kind, recovery.strategy
            );
        } else {
            warn!(
                "error {} ({}) not recovered: {}",
                report.error_id,
                classification.kind,
                recovery.outcome.reason.as_deref().unwrap_or("no reason given")
            );
        }

        self.bus.publish(EngineEvent::ErrorHandled {
            error_id: report.error_id.to_string(),
            kind: classification.kind.to_string(),
            confidence: classification.confidence,
            recovered: recovery.recovered(),
            strategy: recovery.strategy.clone(),
            action: recovery.outcome.action.to_string(),
            at: Utc::now(),
        });

        Ok(HandledError {
            error_id: report.error_id.clone(),
            classification,
            recovery,
            report,
        })
    }

    /// Build and store a diagnostic report without running recovery
    pub fn report(
        &self,
        failure: &Failure,
        classification: &ErrorClassification,
        context: &ContextMap,
        recovery: Option<&RecoveryReport>,
    ) -> DiagnosticReport {
        let input = ReportInput {
            failure,
            classification,
            context,
            recovery,
            recent_same_kind: self.classifier.recent_count(classification.kind),
        };
        let report = build_report(&input, &self.settings);
        self.diagnostics.push(report.clone());
        report
    }
}
