//! Decision report extraction
//!
//! The service returns the full pipeline output as nested JSON. The report
//! lives at `stages.decision.data.decision`; every hop on the way may be
//! missing or have the wrong shape, and every field inside it is optional.
//! Extraction never fails: a broken path yields no report, a broken field
//! yields an empty field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const RECOMMENDED_DECISION: &str = "RECOMMENDED DECISION";
const DECISION_SUMMARY: &str = "decision_summary";
const CONFIDENCE_LEVEL: &str = "CONFIDENCE LEVEL";
const IMPLEMENTATION_PRIORITY: &str = "IMPLEMENTATION PRIORITY";
const SUPPORTING_FACTORS: &str = "KEY SUPPORTING FACTORS";
const NEXT_STEPS: &str = "NEXT STEPS";
const IDENTIFIED_RISKS: &str = "IDENTIFIED RISKS";
const SUCCESS_METRICS: &str = "SUCCESS METRICS";

const EXECUTION_REPORT_POINTER: &str = "/stages/execution/data/execution_plan/report";

/// One step on the path from the raw results to the decision node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadHop {
    /// The results value itself
    Results,
    /// `results.stages`
    Stages,
    /// `stages.decision`
    DecisionStage,
    /// `decision.data`
    DecisionData,
    /// `data.decision`
    Decision,
}

impl PayloadHop {
    /// Object key this hop descends into
    pub fn key(&self) -> Option<&'static str> {
        match self {
            PayloadHop::Results => None,
            PayloadHop::Stages => Some("stages"),
            PayloadHop::DecisionStage => Some("decision"),
            PayloadHop::DecisionData => Some("data"),
            PayloadHop::Decision => Some("decision"),
        }
    }
}

const DECISION_PATH: [PayloadHop; 4] = [
    PayloadHop::Stages,
    PayloadHop::DecisionStage,
    PayloadHop::DecisionData,
    PayloadHop::Decision,
];

/// Normalized view of the decision stage output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub recommended_decision: Option<String>,
    pub confidence_level: Option<String>,
    pub implementation_priority: Option<String>,
    pub supporting_factors: Vec<String>,
    pub next_steps: Vec<String>,
    /// Plain-text risks; structured entries are rendered as compact JSON
    pub risks: Vec<String>,
    pub success_metrics: Option<String>,
    /// Executive report from the execution planning stage
    pub execution_report: Option<String>,
}

impl DecisionReport {
    /// True when the decision node was present but carried none of the known fields
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Plain-text rendering for terminals
    pub fn render(&self) -> String {
        let mut lines = vec![
            "Recommended Decision".to_string(),
            format!("  {}", self.recommended_decision.as_deref().unwrap_or("N/A")),
            String::new(),
            format!(
                "Confidence Level: {}",
                self.confidence_level.as_deref().unwrap_or("N/A")
            ),
            format!(
                "Implementation Priority: {}",
                self.implementation_priority.as_deref().unwrap_or("N/A")
            ),
        ];

        push_numbered(&mut lines, "Key Supporting Factors", &self.supporting_factors);
        push_numbered(&mut lines, "Next Steps", &self.next_steps);

        if !self.risks.is_empty() {
            lines.push(String::new());
            lines.push("Risk Analysis & Mitigation".to_string());
            for risk in &self.risks {
                lines.push(format!("  - {}", risk));
            }
        }

        if let Some(metrics) = &self.success_metrics {
            lines.push(String::new());
            lines.push("Success Metrics".to_string());
            lines.push(format!("  {}", metrics));
        }

        if let Some(report) = &self.execution_report {
            lines.push(String::new());
            lines.push("Executive Report".to_string());
            for line in report.lines() {
                lines.push(format!("  {}", line));
            }
        }

        lines.join("\n")
    }
}

fn push_numbered(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push(title.to_string());
    for (idx, item) in items.iter().enumerate() {
        lines.push(format!("  {}. {}", idx + 1, item));
    }
}

/// Walk to the decision node, reporting the first hop that is missing or not an object
pub fn decision_node(raw: Option<&Value>) -> Result<&Map<String, Value>, PayloadHop> {
    let mut node = raw
        .and_then(Value::as_object)
        .ok_or(PayloadHop::Results)?;

    for hop in DECISION_PATH {
        node = hop
            .key()
            .and_then(|key| node.get(key))
            .and_then(Value::as_object)
            .ok_or(hop)?;
    }

    Ok(node)
}

/// Extract the decision report from raw job results
pub fn extract(raw: Option<&Value>) -> Option<DecisionReport> {
    let decision = match decision_node(raw) {
        Ok(node) => node,
        Err(hop) => {
            if raw.is_some() {
                debug!("No decision report: missing or malformed {:?}", hop);
            }
            return None;
        }
    };

    Some(DecisionReport {
        recommended_decision: text_field(decision, RECOMMENDED_DECISION)
            .or_else(|| text_field(decision, DECISION_SUMMARY)),
        confidence_level: text_field(decision, CONFIDENCE_LEVEL),
        implementation_priority: text_field(decision, IMPLEMENTATION_PRIORITY),
        supporting_factors: list_field(decision, SUPPORTING_FACTORS),
        next_steps: list_field(decision, NEXT_STEPS),
        risks: list_field(decision, IDENTIFIED_RISKS),
        success_metrics: text_field(decision, SUCCESS_METRICS),
        execution_report: raw
            .and_then(|r| r.pointer(EXECUTION_REPORT_POINTER))
            .and_then(scalar_text),
    })
}

fn text_field(node: &Map<String, Value>, key: &str) -> Option<String> {
    node.get(key).and_then(scalar_text)
}

/// Strings, numbers and booleans as text; anything else is absent
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn list_field(node: &Map<String, Value>, key: &str) -> Vec<String> {
    match node.get(key) {
        Some(Value::Array(items)) => items.iter().map(entry_text).collect(),
        Some(single @ Value::String(_)) => scalar_text(single).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// List entry as text; strings verbatim, anything else as compact JSON
fn entry_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
