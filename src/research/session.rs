use crate::phases::PhaseGate;
use crate::pivot::{load_wave, WorkerOutput};
use crate::types::Result;
use std::path::{Path, PathBuf};

pub const ANALYSIS_DIR: &str = "analysis";
pub const PLAN_FILE: &str = "plan.json";
pub const QUALITY_GATE_FILE: &str = "quality-gate.json";
pub const PIVOT_DECISION_FILE: &str = "pivot-decision.json";

/// Waves a session can hold
pub const WAVES: [u8; 2] = [1, 2];

/// One research session directory:
///
/// ```text
/// <root>/wave-1/*.md
/// <root>/wave-2/*.md
/// <root>/analysis/   markers, plan, gate and pivot reports
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    root: PathBuf,
}

impl Session {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn wave_dir(&self, wave: u8) -> PathBuf {
        self.root.join(format!("wave-{}", wave))
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.root.join(ANALYSIS_DIR)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.analysis_dir().join(PLAN_FILE)
    }

    pub fn quality_gate_path(&self) -> PathBuf {
        self.analysis_dir().join(QUALITY_GATE_FILE)
    }

    pub fn pivot_decision_path(&self) -> PathBuf {
        self.analysis_dir().join(PIVOT_DECISION_FILE)
    }

    pub fn wave_analysis_path(&self, wave: u8) -> PathBuf {
        self.analysis_dir().join(format!("wave-{}-analysis.json", wave))
    }

    /// Create the wave and analysis directories
    pub fn ensure_layout(&self) -> Result<()> {
        for wave in WAVES {
            std::fs::create_dir_all(self.wave_dir(wave))?;
        }
        std::fs::create_dir_all(self.analysis_dir())?;
        Ok(())
    }

    pub fn phase_gate(&self) -> PhaseGate {
        PhaseGate::new(self.analysis_dir())
    }

    pub fn load_wave(&self, wave: u8) -> Result<Vec<WorkerOutput>> {
        load_wave(&self.wave_dir(wave), wave)
    }

    /// Number of `*.md` worker outputs in a wave directory
    pub fn count_outputs(&self, wave: u8) -> Result<usize> {
        let dir = self.wave_dir(wave);
        if !dir.is_dir() {
            return Ok(0);
        }
        let count = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let path = entry.path();
                path.is_file() && path.extension().is_some_and(|ext| ext == "md")
            })
            .count();
        Ok(count)
    }
}
