//! Dependency-gated pipeline stages
//!
//! Six stages run in a fixed order. Each completed stage leaves a small JSON
//! marker in `<session>/analysis/`; a stage may only be marked once its
//! direct predecessor's marker exists. Wave 2 is satisfied by either its
//! completion marker or an explicit skip marker.
//!
//! | # | Stage | Marker |
//! |---|---|---|
//! | 1 | `wave1` | `wave-1-complete.json` |
//! | 2 | `wave1-validated` | `wave-1-validated.json` |
//! | 3 | `pivot` | `pivot-decision-complete.json` |
//! | 4 | `wave2` | `wave-2-complete.json` or `wave-2-skipped.json` |
//! | 5 | `citations` | `citations-validated.json` |
//! | 6 | `synthesis` | `synthesis-complete.json` |

use crate::types::{AppError, Result};
use crate::utils::fs::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Marker written by `skip-wave2`
pub const WAVE2_SKIPPED_MARKER: &str = "wave-2-skipped.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "wave1")]
    Wave1,
    #[serde(rename = "wave1-validated")]
    Wave1Validated,
    #[serde(rename = "pivot")]
    Pivot,
    #[serde(rename = "wave2")]
    Wave2,
    #[serde(rename = "citations")]
    Citations,
    #[serde(rename = "synthesis")]
    Synthesis,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Wave1,
        Stage::Wave1Validated,
        Stage::Pivot,
        Stage::Wave2,
        Stage::Citations,
        Stage::Synthesis,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Stage::Wave1 => "wave1",
            Stage::Wave1Validated => "wave1-validated",
            Stage::Pivot => "pivot",
            Stage::Wave2 => "wave2",
            Stage::Citations => "citations",
            Stage::Synthesis => "synthesis",
        }
    }

    /// 1-based position in the pipeline
    pub fn number(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).map_or(0, |i| i + 1)
    }

    /// Marker written when the stage completes
    pub fn marker(&self) -> &'static str {
        match self {
            Stage::Wave1 => "wave-1-complete.json",
            Stage::Wave1Validated => "wave-1-validated.json",
            Stage::Pivot => "pivot-decision-complete.json",
            Stage::Wave2 => "wave-2-complete.json",
            Stage::Citations => "citations-validated.json",
            Stage::Synthesis => "synthesis-complete.json",
        }
    }

    /// Every marker that satisfies the stage
    pub fn accepted_markers(&self) -> Vec<&'static str> {
        match self {
            Stage::Wave2 => vec![self.marker(), WAVE2_SKIPPED_MARKER],
            _ => vec![self.marker()],
        }
    }

    pub fn predecessor(&self) -> Option<Stage> {
        let n = self.number();
        (n > 1).then(|| Stage::ALL[n - 2])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Stage {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Stage::ALL
            .into_iter()
            .find(|stage| {
                stage.id() == normalized
                    || stage.number().to_string() == normalized
                    || stage.id().replace('-', "") == normalized.replace('-', "")
            })
            .ok_or_else(|| {
                let ids: Vec<&str> = Stage::ALL.iter().map(|s| s.id()).collect();
                AppError::InvalidInput(format!(
                    "unknown stage '{}' (expected one of: {})",
                    s,
                    ids.join(", ")
                ))
            })
    }
}

/// Payload of a marker file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMarker {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub number: usize,
    pub completed: bool,
    /// Satisfied through the skip marker
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Whether `mark` would currently succeed
    pub ready: bool,
}

/// Snapshot of every stage in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub analysis_dir: PathBuf,
    pub stages: Vec<StageStatus>,
    pub completed: Vec<Stage>,
    /// First incomplete stage whose gate is open
    pub next: Option<Stage>,
}

/// Checks and writes stage markers for one session
#[derive(Debug, Clone)]
pub struct PhaseGate {
    analysis_dir: PathBuf,
}

impl PhaseGate {
    /// Gate over `<session>/analysis`
    pub fn for_session(session_dir: &Path) -> Self {
        Self::new(session_dir.join("analysis"))
    }

    pub fn new(analysis_dir: impl Into<PathBuf>) -> Self {
        Self {
            analysis_dir: analysis_dir.into(),
        }
    }

    pub fn analysis_dir(&self) -> &Path {
        &self.analysis_dir
    }

    pub fn marker_path(&self, marker: &str) -> PathBuf {
        self.analysis_dir.join(marker)
    }

    /// Marker currently satisfying `stage`, if any
    pub fn satisfying_marker(&self, stage: Stage) -> Option<&'static str> {
        stage
            .accepted_markers()
            .into_iter()
            .find(|m| self.marker_path(m).is_file())
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.satisfying_marker(stage).is_some()
    }

    /// Check the direct predecessor of `stage`.
    ///
    /// # Errors
    ///
    /// [`AppError::GateBlocked`] naming the missing marker(s).
    pub fn verify(&self, stage: Stage) -> Result<()> {
        let Some(previous) = stage.predecessor() else {
            return Ok(());
        };
        if self.is_complete(previous) {
            return Ok(());
        }
        let missing = previous
            .accepted_markers()
            .into_iter()
            .map(str::to_string)
            .collect();
        Err(AppError::GateBlocked {
            stage: stage.id().to_string(),
            missing,
        })
    }

    /// Verify the gate, then write the stage's completion marker.
    ///
    /// Re-marking a completed stage rewrites the marker with a fresh timestamp.
    pub fn mark(&self, stage: Stage, metrics: Option<serde_json::Value>) -> Result<PathBuf> {
        self.verify(stage)?;
        let path = self.marker_path(stage.marker());
        let marker = PhaseMarker {
            stage,
            timestamp: Utc::now(),
            metrics,
            reason: None,
        };
        write_json_atomic(&path, &marker)?;
        tracing::info!(stage = %stage, marker = %path.display(), "Stage marked complete");
        Ok(path)
    }

    /// Record that wave 2 was deliberately skipped
    pub fn skip_wave2(&self, reason: &str) -> Result<PathBuf> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput(
                "a reason is required to skip wave 2".to_string(),
            ));
        }
        self.verify(Stage::Wave2)?;
        let path = self.marker_path(WAVE2_SKIPPED_MARKER);
        let marker = PhaseMarker {
            stage: Stage::Wave2,
            timestamp: Utc::now(),
            metrics: None,
            reason: Some(reason.to_string()),
        };
        write_json_atomic(&path, &marker)?;
        tracing::info!(reason = %reason, "Wave 2 skipped");
        Ok(path)
    }

    /// Read the marker satisfying `stage`
    pub fn read_marker(&self, stage: Stage) -> Result<Option<PhaseMarker>> {
        match self.satisfying_marker(stage) {
            Some(marker) => read_json(&self.marker_path(marker)).map(Some),
            None => Ok(None),
        }
    }

    pub fn status(&self) -> PhaseStatus {
        let stages: Vec<StageStatus> = Stage::ALL
            .into_iter()
            .map(|stage| {
                let marker = self.satisfying_marker(stage);
                let timestamp = match self.read_marker(stage) {
                    Ok(marker) => marker.map(|m| m.timestamp),
                    Err(e) => {
                        tracing::warn!(stage = %stage, error = %e, "Unreadable marker");
                        None
                    }
                };
                StageStatus {
                    stage,
                    number: stage.number(),
                    completed: marker.is_some(),
                    skipped: marker == Some(WAVE2_SKIPPED_MARKER),
                    marker: marker.map(str::to_string),
                    timestamp,
                    ready: self.verify(stage).is_ok(),
                }
            })
            .collect();

        let completed = stages.iter().filter(|s| s.completed).map(|s| s.stage).collect();
        let next = stages
            .iter()
            .find(|s| !s.completed && s.ready)
            .map(|s| s.stage);

        PhaseStatus {
            analysis_dir: self.analysis_dir.clone(),
            stages,
            completed,
            next,
        }
    }
}
