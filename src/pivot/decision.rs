use crate::pivot::coverage::PlatformCoverage;
use crate::pivot::gaps::AggregatedGap;
use crate::pivot::quality::{QualityBand, WaveQuality};
use crate::pivot::signals::DomainSignal;
use crate::pivot::worker_output::WorkerOutput;
use crate::sources::{QualityGateResult, RebalanceSpec};
use crate::types::{Allocation, AppError, Domain, Result, WorkerType};
use crate::utils::fs::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Why a wave-2 specialist was recommended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotTrack {
    Retry,
    Signal,
    GapFill,
    PlatformCoverage,
    Rebalance,
    CatchUp,
}

impl PivotTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            PivotTrack::Retry => "retry",
            PivotTrack::Signal => "signal",
            PivotTrack::GapFill => "gap_fill",
            PivotTrack::PlatformCoverage => "platform_coverage",
            PivotTrack::Rebalance => "rebalance",
            PivotTrack::CatchUp => "catch_up",
        }
    }
}

impl fmt::Display for PivotTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistRecommendation {
    /// None for source-balance and generic catch-up workers
    pub domain: Option<Domain>,
    pub track: PivotTrack,
    /// Rebalance sub-track (`independent_analysis`, `contrarian`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtrack: Option<String>,
    pub worker_type: WorkerType,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

impl SpecialistRecommendation {
    fn key(&self) -> (Option<Domain>, PivotTrack, Option<String>) {
        (self.domain, self.track, self.subtrack.clone())
    }
}

/// Summary numbers recorded with a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotMetrics {
    pub workers: usize,
    pub mean_quality: f64,
    pub poor_workers: usize,
    pub signals: usize,
    pub strong_signals: usize,
    pub promoted_gaps: usize,
    pub uncovered_perspectives: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_passed: Option<bool>,
    pub planned_workers: usize,
}

/// Go/no-go for a second wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotDecision {
    pub launch_wave2: bool,
    /// Triggering reasons in evaluation order
    pub reasons: Vec<String>,
    pub recommendations: Vec<SpecialistRecommendation>,
    pub wave: u8,
    pub decided_at: DateTime<Utc>,
    pub metrics: PivotMetrics,
}

/// Everything the engine looks at for one wave
#[derive(Debug, Clone, Copy)]
pub struct PivotInputs<'a> {
    pub wave: u8,
    pub outputs: &'a [WorkerOutput],
    pub quality: &'a WaveQuality,
    pub signals: &'a [DomainSignal],
    pub gaps: &'a [AggregatedGap],
    pub coverage: &'a [PlatformCoverage],
    pub gate: Option<&'a QualityGateResult>,
    /// Allocation the wave was planned with, if known
    pub planned: Option<&'a Allocation>,
}

/// Which trigger families are enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotConfig {
    #[serde(default = "default_true")]
    pub retry_poor_workers: bool,
    #[serde(default = "default_true")]
    pub catch_up: bool,
    /// Signal strength treated as strong
    #[serde(default = "default_strong_signal")]
    pub strong_signal: f64,
    /// Minimum signal strength
    #[serde(default = "default_signal_threshold")]
    pub signal_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_strong_signal() -> f64 {
    crate::pivot::signals::STRONG_SIGNAL
}

fn default_signal_threshold() -> f64 {
    crate::pivot::signals::SIGNAL_THRESHOLD
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            retry_poor_workers: true,
            catch_up: true,
            strong_signal: default_strong_signal(),
            signal_threshold: default_signal_threshold(),
        }
    }
}

/// Worker type encoded in an output name (`security-analyst-2` → security analyst)
pub fn agent_worker_type(agent: &str) -> Option<WorkerType> {
    let trimmed = agent.trim_end_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.trim_end_matches(['-', '_']);
    WorkerType::parse_lenient(trimmed)
}

#[derive(Debug, Clone, Default)]
pub struct PivotDecisionEngine {
    config: PivotConfig,
}

impl PivotDecisionEngine {
    pub fn new(config: PivotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PivotConfig {
        &self.config
    }

    /// Combine every trigger into one decision
    pub fn decide(&self, inputs: &PivotInputs<'_>) -> PivotDecision {
        let mut reasons = Vec::new();
        let mut recommendations = Vec::new();

        // 1. poor workers
        let poor: Vec<_> = inputs
            .quality
            .scores
            .iter()
            .filter(|s| s.band == QualityBand::Poor)
            .collect();
        if self.config.retry_poor_workers && !poor.is_empty() {
            reasons.push(format!(
                "{} worker(s) scored poor: {}",
                poor.len(),
                poor.iter().map(|s| s.agent.as_str()).collect::<Vec<_>>().join(", ")
            ));
            for score in &poor {
                let output = inputs.outputs.iter().find(|o| o.agent == score.agent);
                let worker_type =
                    agent_worker_type(&score.agent).unwrap_or(WorkerType::WebResearcher);
                let domain = worker_type
                    .domain()
                    .or_else(|| output.and_then(|o| o.domain));
                recommendations.push(SpecialistRecommendation {
                    domain,
                    track: PivotTrack::Retry,
                    subtrack: None,
                    worker_type,
                    rationale: format!(
                        "{} scored {} ({}); rerun the angle with more sources",
                        score.agent, score.total, score.band
                    ),
                    focus: None,
                });
            }
        }

        // 2. strong signals
        let strong: Vec<&DomainSignal> = inputs
            .signals
            .iter()
            .filter(|s| s.strength >= self.config.strong_signal)
            .collect();
        for signal in &strong {
            reasons.push(format!(
                "Strong {} signal (strength {:.1}) points to {}",
                signal.theme, signal.strength, signal.domain
            ));
            recommendations.push(SpecialistRecommendation {
                domain: Some(signal.domain),
                track: PivotTrack::Signal,
                subtrack: None,
                worker_type: signal.domain.specialist(),
                rationale: format!(
                    "{} theme mentioned {} time(s) across {} worker(s)",
                    signal.theme,
                    signal.hits,
                    signal.workers.len()
                ),
                focus: None,
            });
        }

        // 3. promoted gaps
        let promoted: Vec<&AggregatedGap> = inputs.gaps.iter().filter(|g| g.promoted).collect();
        for gap in &promoted {
            reasons.push(format!("Gap reported by {}: {}", gap.workers.join(", "), gap.text));
            recommendations.push(SpecialistRecommendation {
                domain: Some(gap.fill_domain),
                track: PivotTrack::GapFill,
                subtrack: None,
                worker_type: gap.fill_specialist,
                rationale: format!("Fill {} gap", serde_label(&gap.kind)),
                focus: Some(gap.text.clone()),
            });
        }

        // 4. perspectives whose platforms were never visited
        let uncovered: Vec<&PlatformCoverage> = inputs.coverage.iter().filter(|c| c.flagged).collect();
        for coverage in &uncovered {
            reasons.push(format!(
                "Perspective {} visited none of: {}",
                coverage.perspective_index,
                coverage.designated.join(", ")
            ));
            recommendations.push(SpecialistRecommendation {
                domain: Some(coverage.domain),
                track: PivotTrack::PlatformCoverage,
                subtrack: None,
                worker_type: coverage.specialist,
                rationale: format!("Cover the planned platforms for \"{}\"", coverage.perspective),
                focus: Some(coverage.designated.join(", ")),
            });
        }

        // 5. source balance
        if let Some(gate) = inputs.gate {
            if gate.rebalance {
                reasons.push(format!(
                    "Source quality gate failed: {}",
                    gate.report.flags.join(", ")
                ));
                for spec in &gate.agents {
                    recommendations.push(rebalance_recommendation(spec));
                }
            } else if !gate.passed {
                tracing::info!(
                    attempts = gate.attempts,
                    "Source quality gate failed but rebalancing is exhausted"
                );
            }
        }

        // 6. workers planned but never run
        let planned_workers = inputs
            .planned
            .map(|a| a.values().sum())
            .unwrap_or(inputs.outputs.len());
        if self.config.catch_up && inputs.outputs.len() < planned_workers {
            reasons.push(format!(
                "Wave {} ran {} of {} planned worker(s)",
                inputs.wave,
                inputs.outputs.len(),
                planned_workers
            ));
            recommendations.extend(catch_up(inputs));
        }

        let mut seen = HashSet::new();
        recommendations.retain(|r| seen.insert(r.key()));

        let launch_wave2 = !reasons.is_empty();
        let metrics = PivotMetrics {
            workers: inputs.outputs.len(),
            mean_quality: inputs.quality.mean,
            poor_workers: poor.len(),
            signals: inputs.signals.len(),
            strong_signals: strong.len(),
            promoted_gaps: promoted.len(),
            uncovered_perspectives: uncovered.len(),
            gate_passed: inputs.gate.map(|g| g.passed),
            planned_workers,
        };

        tracing::info!(
            wave = inputs.wave,
            launch_wave2,
            reasons = reasons.len(),
            recommendations = recommendations.len(),
            "Pivot decision made"
        );

        PivotDecision {
            launch_wave2,
            reasons,
            recommendations,
            wave: inputs.wave,
            decided_at: Utc::now(),
            metrics,
        }
    }

    /// Decide once per session.
    ///
    /// If `path` already holds a decision it is returned unchanged; otherwise
    /// the new decision is written atomically.
    pub fn decide_and_persist(&self, inputs: &PivotInputs<'_>, path: &Path) -> Result<PivotDecision> {
        if path.exists() {
            let stored: PivotDecision = read_json(path).map_err(|e| {
                AppError::Configuration(format!(
                    "existing pivot decision {} is unreadable: {}",
                    path.display(),
                    e
                ))
            })?;
            tracing::info!(path = %path.display(), "Pivot decision already recorded");
            return Ok(stored);
        }
        let decision = self.decide(inputs);
        write_json_atomic(path, &decision)?;
        Ok(decision)
    }
}

fn serde_label(kind: &crate::pivot::worker_output::GapKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.replace('_', " ")))
        .unwrap_or_else(|| "coverage".to_string())
}

fn rebalance_recommendation(spec: &RebalanceSpec) -> SpecialistRecommendation {
    let worker_type = match spec.track.as_str() {
        "academic_sources" => WorkerType::AcademicResearcher,
        "primary_sources" => WorkerType::DeepResearcher,
        _ => WorkerType::WebResearcher,
    };
    let tiers: Vec<String> = spec.tier_priority.iter().map(|t| t.to_string()).collect();
    SpecialistRecommendation {
        domain: None,
        track: PivotTrack::Rebalance,
        subtrack: Some(spec.track.clone()),
        worker_type,
        rationale: format!("{} (prefer {})", spec.trigger, tiers.join(", ")),
        focus: Some(spec.focus.clone()),
    }
}

/// Slots in the planned allocation that no output accounts for
fn catch_up(inputs: &PivotInputs<'_>) -> Vec<SpecialistRecommendation> {
    let Some(planned) = inputs.planned else {
        return vec![SpecialistRecommendation {
            domain: None,
            track: PivotTrack::CatchUp,
            subtrack: None,
            worker_type: WorkerType::WebResearcher,
            rationale: "Run the workers missing from the previous wave".to_string(),
            focus: None,
        }];
    };

    let mut executed: BTreeMap<WorkerType, usize> = BTreeMap::new();
    for output in inputs.outputs {
        if let Some(worker_type) = agent_worker_type(&output.agent) {
            *executed.entry(worker_type).or_insert(0) += 1;
        }
    }

    planned
        .iter()
        .filter_map(|(worker_type, count)| {
            let ran = executed.get(worker_type).copied().unwrap_or(0);
            (ran < *count).then(|| SpecialistRecommendation {
                domain: worker_type.domain(),
                track: PivotTrack::CatchUp,
                subtrack: None,
                worker_type: *worker_type,
                rationale: format!("{} of {} planned {} ran", ran, count, worker_type),
                focus: None,
            })
        })
        .collect()
}
