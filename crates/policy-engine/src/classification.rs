use serde::{Deserialize, Serialize};

/// Classifier output for one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub requires_consensus: bool,
    pub reason: String,
    /// Label of the rule that matched, sent to the backend as the classification tag.
    pub zone_label: Option<String>,
}

impl Classification {
    pub fn required(reason: impl Into<String>, label: &str) -> Self {
        Self {
            requires_consensus: true,
            reason: reason.into(),
            zone_label: Some(label.to_string()),
        }
    }

    pub fn passthrough(reason: impl Into<String>) -> Self {
        Self {
            requires_consensus: false,
            reason: reason.into(),
            zone_label: None,
        }
    }

    pub fn tag(&self) -> &str {
        self.zone_label.as_deref().unwrap_or("unclassified")
    }
}
