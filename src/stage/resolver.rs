//! Stage resolution from free-text labels
//!
//! The service only tells us a label such as `"Reasoning: option 2"`. The
//! first registry stage whose name occurs in the label is active, everything
//! before it is completed and everything after it is pending. A label that
//! names no stage leaves every stage pending.

use serde::{Deserialize, Serialize};

use super::registry::StageRegistry;

/// Classification of a stage relative to the current label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not reached yet
    Pending,
    /// Currently running
    Active,
    /// Already finished
    Completed,
}

/// Derived view of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub name: String,
    pub order: usize,
    pub status: StageStatus,
}

/// Strategy for locating the stage a label refers to
pub trait StageMatcher: Send + Sync {
    /// Registry index of the referenced stage, if any
    fn match_stage(&self, label: &str, registry: &StageRegistry) -> Option<usize>;
}

/// Case-sensitive substring containment; first match in registry order wins
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl StageMatcher for SubstringMatcher {
    fn match_stage(&self, label: &str, registry: &StageRegistry) -> Option<usize> {
        // An empty name would be contained in every label
        registry
            .stages()
            .iter()
            .position(|s| !s.name.is_empty() && label.contains(s.name.as_str()))
    }
}

/// Resolve a label against the registry with substring matching
pub fn resolve(label: Option<&str>, registry: &StageRegistry) -> Vec<StageView> {
    resolve_with(&SubstringMatcher, label, registry)
}

/// Resolve a label with a custom matcher
pub fn resolve_with(
    matcher: &dyn StageMatcher,
    label: Option<&str>,
    registry: &StageRegistry,
) -> Vec<StageView> {
    let active = label.and_then(|l| matcher.match_stage(l, registry));

    registry
        .stages()
        .iter()
        .enumerate()
        .map(|(idx, stage)| {
            let status = match active {
                Some(a) if idx < a => StageStatus::Completed,
                Some(a) if idx == a => StageStatus::Active,
                _ => StageStatus::Pending,
            };
            StageView {
                name: stage.name.clone(),
                order: stage.order,
                status,
            }
        })
        .collect()
}

/// Every stage pending
pub fn all_pending(registry: &StageRegistry) -> Vec<StageView> {
    resolve(None, registry)
}

/// Every stage completed (used once the job has finished)
pub fn all_completed(registry: &StageRegistry) -> Vec<StageView> {
    registry
        .stages()
        .iter()
        .map(|stage| StageView {
            name: stage.name.clone(),
            order: stage.order,
            status: StageStatus::Completed,
        })
        .collect()
}

/// The active stage, if any
pub fn active_stage(views: &[StageView]) -> Option<&StageView> {
    views.iter().find(|v| v.status == StageStatus::Active)
}
