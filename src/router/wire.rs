//! Inbound wire shapes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::emergency::IncidentReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCandidate {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub tag: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPerson {
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureDetection {
    pub tag: String,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub model_version: String,
}

/// Server-side monitoring status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Alert,
    Fallback,
    Monitoring,
    #[serde(other)]
    Other,
}

/// Decoded payload of one inbound result message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub captions: Vec<CaptionCandidate>,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub people: Vec<DetectedPerson>,
    #[serde(default)]
    pub gestures: Vec<GestureDetection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResultStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_sbar",
        skip_serializing_if = "Option::is_none"
    )]
    pub sbar: Option<IncidentReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_triggered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FrameMetadata>,
}

impl AnalysisResult {
    /// Best caption: the explicit `caption` field, else the top candidate.
    pub fn headline(&self) -> Option<&str> {
        self.caption
            .as_deref()
            .or_else(|| self.captions.first().map(|c| c.text.as_str()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SbarWire {
    Report(IncidentReport),
    Legacy(String),
}

fn deserialize_sbar<'de, D>(deserializer: D) -> Result<Option<IncidentReport>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<SbarWire>::deserialize(deserializer)? {
        Some(SbarWire::Report(report)) => Some(report),
        Some(SbarWire::Legacy(text)) => IncidentReport::from_legacy_text(&text),
        None => None,
    })
}

/// Protocol control message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Ping,
    Pong,
}

impl ControlKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "ping" => Some(ControlKind::Ping),
            "pong" => Some(ControlKind::Pong),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standardized_response_without_lists_decodes() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "status": "monitoring",
            "sign": "Neutral",
            "caption": "a person sitting on a couch",
            "sbar": "",
            "audio_ready": false
        }))
        .unwrap();
        assert!(result.gestures.is_empty());
        assert_eq!(result.status, Some(ResultStatus::Monitoring));
        assert_eq!(result.sbar, None);
        assert_eq!(result.headline(), Some("a person sitting on a couch"));
    }

    #[test]
    fn unknown_status_is_other() {
        let result: AnalysisResult =
            serde_json::from_value(json!({ "status": "calibrating" })).unwrap();
        assert_eq!(result.status, Some(ResultStatus::Other));
    }

    #[test]
    fn structured_sbar_decodes() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "sbar": {
                "situation": "s",
                "background": "b",
                "assessment": "a",
                "recommendation": "r"
            }
        }))
        .unwrap();
        let report = result.sbar.unwrap();
        assert_eq!(report.recommendation, "r");
        assert!(report.timestamp.is_none());
    }

    #[test]
    fn legacy_and_null_sbar_normalize() {
        let legacy: AnalysisResult =
            serde_json::from_value(json!({ "sbar": "Generating Report..." })).unwrap();
        assert_eq!(legacy.sbar.unwrap().situation, "Generating Report...");

        let null: AnalysisResult = serde_json::from_value(json!({ "sbar": null })).unwrap();
        assert_eq!(null.sbar, None);
    }

    #[test]
    fn wrong_field_types_are_rejected() {
        assert!(serde_json::from_value::<AnalysisResult>(json!({ "gestures": "Help" })).is_err());
        assert!(serde_json::from_value::<AnalysisResult>(json!({ "sbar": 42 })).is_err());
        assert!(
            serde_json::from_value::<AnalysisResult>(json!({ "emergency_triggered": "yes" }))
                .is_err()
        );
    }

    #[test]
    fn headline_falls_back_to_top_candidate() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "captions": [{ "text": "a kitchen", "confidence": 0.7 }]
        }))
        .unwrap();
        assert_eq!(result.headline(), Some("a kitchen"));
    }
}
