use anyhow::{bail, Context, Result};
use clap::Args;
use resilience_config::ResilienceConfig;
use resilience_engine::settings;
use resilience_recovery::diagnostics::{build_report, ReportInput};
use resilience_recovery::{
    ContextMap, DiagnosticReport, ErrorClassification, ErrorClassifier, Failure, PatternSet,
};
use serde::Serialize;
use serde_json::Value;

use super::{emit, OutputFormat};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Error message to classify
    pub message: String,

    /// Stack trace text
    #[arg(long)]
    pub stack: Option<String>,

    /// Error code (e.g. ECONNRESET, 403)
    #[arg(long)]
    pub code: Option<String>,

    /// Failure context as a JSON object (selector, url, action, ...)
    #[arg(long, value_name = "JSON")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassifyOutput {
    pub classification: ErrorClassification,
    pub report: DiagnosticReport,
}

pub fn parse_context(raw: Option<&str>) -> Result<ContextMap> {
    let Some(raw) = raw else {
        return Ok(ContextMap::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid --context JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--context must be a JSON object, got {}", other),
    }
}

pub fn cmd_classify(
    args: ClassifyArgs,
    config: &ResilienceConfig,
    format: OutputFormat,
) -> Result<()> {
    let context = parse_context(args.context.as_deref())?;
    let mut failure = Failure::new(args.message);
    if let Some(stack) = args.stack {
        failure = failure.with_stack(stack);
    }
    if let Some(code) = args.code {
        failure = failure.with_code(code);
    }

    let classifier =
        ErrorClassifier::new(PatternSet::builtin(), settings::classifier_settings(config));
    let classification = classifier.classify(&failure, &context);
    let report = build_report(
        &ReportInput {
            failure: &failure,
            classification: &classification,
            context: &context,
            recovery: None,
            recent_same_kind: classifier.recent_count(classification.kind),
        },
        &settings::diagnostics_settings(config),
    );

    let output = ClassifyOutput {
        classification,
        report,
    };
    emit(&output, format, |out| {
        let c = &out.classification;
        let mut lines = vec![
            format!("kind:        {}", c.kind),
            format!("confidence:  {:.2}", c.confidence),
            format!("severity:    {:?}", c.severity),
            format!("recoverable: {}", c.recoverable),
        ];
        if let Some(pattern) = &c.matched_pattern {
            lines.push(format!("pattern:     {pattern}"));
        }
        for rec in &out.report.recommendations {
            lines.push(format!("[{:?}] {}", rec.priority, rec.message));
        }
        lines.join("\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_requires_object() {
        assert!(parse_context(None).unwrap().is_empty());
        assert_eq!(
            parse_context(Some(r##"{"selector": "#go"}"##)).unwrap()["selector"],
            "#go"
        );
        assert!(parse_context(Some("[1, 2]")).is_err());
        assert!(parse_context(Some("{nope")).is_err());
    }
}
