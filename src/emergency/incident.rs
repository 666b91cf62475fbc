//! SBAR incident report.

use serde::{Deserialize, Serialize};

/// Situation / Background / Assessment / Recommendation narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub situation: String,
    pub background: String,
    pub assessment: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl IncidentReport {
    /// Normalize the older free-text form. Blank text carries no report.
    pub fn from_legacy_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            situation: text.to_string(),
            background: String::new(),
            assessment: String::new(),
            recommendation: String::new(),
            timestamp: None,
        })
    }

    /// Locally synthesized report used when simulation mode raises an
    /// emergency and the server did not supply one.
    pub fn simulated(signal: &str, probability: f32, timestamp: impl Into<String>) -> Self {
        Self {
            situation: format!(
                "Gesture '{}' detected locally with {:.0}% probability.",
                signal,
                probability * 100.0
            ),
            background: "Simulation mode active; no server report was attached.".to_string(),
            assessment: "Possible distress signal, not confirmed by the inference service."
                .to_string(),
            recommendation: "Verify visually before dispatching responders.".to_string(),
            timestamp: Some(timestamp.into()),
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.background.is_empty() && self.assessment.is_empty() && self.recommendation.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_text_fills_situation_only() {
        let report = IncidentReport::from_legacy_text("  SYSTEM FAILURE: Manual Dispatch Required. ")
            .unwrap();
        assert_eq!(report.situation, "SYSTEM FAILURE: Manual Dispatch Required.");
        assert!(report.is_legacy());
        assert!(report.timestamp.is_none());
    }

    #[test]
    fn blank_legacy_text_is_no_report() {
        assert_eq!(IncidentReport::from_legacy_text(""), None);
        assert_eq!(IncidentReport::from_legacy_text("   "), None);
    }

    #[test]
    fn simulated_report_is_complete() {
        let report = IncidentReport::simulated("Help", 0.95, "12:00:01");
        assert!(!report.is_legacy());
        assert!(report.situation.contains("'Help'"));
        assert!(report.situation.contains("95%"));
        assert_eq!(report.timestamp.as_deref(), Some("12:00:01"));
    }
}
