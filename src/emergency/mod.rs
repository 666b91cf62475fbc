//! Emergency evaluation.
//!
//! A pure decision over one [`AnalysisResult`]: the server's explicit signal
//! wins, then (in simulation mode only) a confident local help gesture.
//! There is no memory across frames and no debouncing.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::EmergencyConfig;
use crate::router::{AnalysisResult, ResultStatus};

pub mod incident;

pub use incident::IncidentReport;

/// Whether the local gesture heuristic is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Live,
    Simulation,
}

impl EvaluationMode {
    pub fn from_flag(simulation: bool) -> Self {
        if simulation {
            EvaluationMode::Simulation
        } else {
            EvaluationMode::Live
        }
    }
}

/// Outcome of evaluating one result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EmergencyDecision {
    /// Server flagged `emergency_triggered` or `status: "alert"`
    Explicit,
    /// Simulation mode matched the help gesture
    SimulatedGesture { probability: f32 },
    Clear,
}

impl EmergencyDecision {
    pub fn is_emergency(&self) -> bool {
        !matches!(self, EmergencyDecision::Clear)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyEvaluator {
    help_signal: String,
    threshold: f32,
}

impl Default for EmergencyEvaluator {
    fn default() -> Self {
        Self::from_config(&EmergencyConfig::default())
    }
}

impl EmergencyEvaluator {
    pub fn new(help_signal: impl Into<String>, threshold: f32) -> Self {
        Self {
            help_signal: help_signal.into(),
            threshold,
        }
    }

    pub fn from_config(config: &EmergencyConfig) -> Self {
        Self::new(config.help_signal.clone(), config.help_threshold)
    }

    pub fn help_signal(&self) -> &str {
        &self.help_signal
    }

    pub fn evaluate(&self, result: &AnalysisResult, mode: EvaluationMode) -> EmergencyDecision {
        if result.emergency_triggered == Some(true) || result.status == Some(ResultStatus::Alert) {
            return EmergencyDecision::Explicit;
        }
        if mode == EvaluationMode::Simulation {
            let strongest = result
                .gestures
                .iter()
                .filter(|g| g.tag == self.help_signal && g.probability > self.threshold)
                .map(|g| g.probability)
                .fold(None, |best: Option<f32>, p| {
                    Some(best.map_or(p, |b| b.max(p)))
                });
            if let Some(probability) = strongest {
                return EmergencyDecision::SimulatedGesture { probability };
            }
        }
        EmergencyDecision::Clear
    }
}

/// Published when a result evaluates to an emergency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub decision: EmergencyDecision,
    pub result: AnalysisResult,
    pub report: Option<IncidentReport>,
}

impl EmergencyEvent {
    /// The server's report is used when present; otherwise a local one is
    /// synthesized for simulated gestures only.
    pub fn new(decision: EmergencyDecision, result: AnalysisResult, help_signal: &str) -> Self {
        let report = match (&result.sbar, decision) {
            (Some(report), _) => Some(report.clone()),
            (None, EmergencyDecision::SimulatedGesture { probability }) => {
                let timestamp = Local::now().format("%H:%M:%S").to_string();
                Some(IncidentReport::simulated(help_signal, probability, timestamp))
            }
            (None, _) => None,
        };
        Self {
            decision,
            result,
            report,
        }
    }
}
