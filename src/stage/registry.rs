//! Stage registry

use serde::{Deserialize, Serialize};

use crate::config::StageConfig;

/// A known processing stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Stage name, matched against the service's stage label
    pub name: String,
    /// Position in the registry (0-based)
    pub order: usize,
    /// What the service does during this stage
    #[serde(default)]
    pub description: String,
}

/// Ordered sequence of stage descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<StageDescriptor>,
}

impl StageRegistry {
    /// Build a registry from `(name, description)` pairs, in order
    pub fn new<I, N, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        let stages = entries
            .into_iter()
            .enumerate()
            .map(|(order, (name, description))| StageDescriptor {
                name: name.into(),
                order,
                description: description.into(),
            })
            .collect();

        Self { stages }
    }

    /// Build a registry from bare stage names
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self::new(names.iter().map(|n| (n.as_ref().to_string(), String::new())))
    }

    /// Build a registry from configuration; an empty list means the built-in stages
    pub fn from_config(stages: &[StageConfig]) -> Self {
        if stages.is_empty() {
            return Self::default();
        }
        Self::new(
            stages
                .iter()
                .map(|s| (s.name.clone(), s.description.clone().unwrap_or_default())),
        )
    }

    /// All stages in order
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new([
            (
                "Data Ingestion",
                "Processing unstructured data from multiple sources",
            ),
            (
                "Analysis",
                "Identifying constraints, risks, and key insights",
            ),
            ("Reasoning", "Evaluating options against constraints"),
            ("Decision", "Synthesizing recommendations"),
            ("Execution Planning", "Generating action plans"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order() {
        let registry = StageRegistry::default();
        let names: Vec<_> = registry.stages().iter().map(|s| s.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "Data Ingestion",
                "Analysis",
                "Reasoning",
                "Decision",
                "Execution Planning"
            ]
        );
        for (i, stage) in registry.stages().iter().enumerate() {
            assert_eq!(stage.order, i);
        }
    }

    #[test]
    fn test_from_config_falls_back_to_default() {
        assert_eq!(StageRegistry::from_config(&[]), StageRegistry::default());

        let custom = StageRegistry::from_config(&[
            StageConfig {
                name: "Fetch".to_string(),
                description: None,
            },
            StageConfig {
                name: "Score".to_string(),
                description: Some("Scoring".to_string()),
            },
        ]);
        assert_eq!(custom.len(), 2);
        assert_eq!(custom.stages()[1].name, "Score");
        assert_eq!(custom.stages()[1].order, 1);
        assert_eq!(custom.stages()[0].description, "");
    }
}
