use crate::sources::tiers::{SourceQualityReport, SourceTier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-balance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Vendor share above this fails the gate
    #[serde(default = "default_max_vendor_fraction")]
    pub max_vendor_fraction: f64,
    /// Independent (tier 1) share below this fails the gate
    #[serde(default = "default_min_independent_fraction")]
    pub min_independent_fraction: f64,
    /// Vendor share at or above this also requests opposing viewpoints
    #[serde(default = "default_contrarian_vendor_fraction")]
    pub contrarian_vendor_fraction: f64,
    /// Rebalancing attempts allowed per session
    #[serde(default = "default_max_rebalance_attempts")]
    pub max_rebalance_attempts: u32,
}

fn default_max_vendor_fraction() -> f64 {
    0.4
}

fn default_min_independent_fraction() -> f64 {
    0.1
}

fn default_contrarian_vendor_fraction() -> f64 {
    0.5
}

fn default_max_rebalance_attempts() -> u32 {
    1
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            max_vendor_fraction: default_max_vendor_fraction(),
            min_independent_fraction: default_min_independent_fraction(),
            contrarian_vendor_fraction: default_contrarian_vendor_fraction(),
            max_rebalance_attempts: default_max_rebalance_attempts(),
        }
    }
}

/// Qualitative gate findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    VendorHeavy,
    LowIndependent,
    NoTier1,
    NeedsContrarian,
    /// Advisory only, never fails the gate
    SuspectSources,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::VendorHeavy => "vendor_heavy",
            QualityFlag::LowIndependent => "low_independent",
            QualityFlag::NoTier1 => "no_tier1",
            QualityFlag::NeedsContrarian => "needs_contrarian",
            QualityFlag::SuspectSources => "suspect_sources",
        }
    }

    pub fn fails_gate(&self) -> bool {
        matches!(
            self,
            QualityFlag::VendorHeavy | QualityFlag::LowIndependent | QualityFlag::NoTier1
        )
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker the gate asks for to fix the source balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceSpec {
    pub track: String,
    pub focus: String,
    /// Source tiers the worker should favour, in order
    pub tier_priority: Vec<SourceTier>,
    pub trigger: QualityFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub passed: bool,
    pub flags: Vec<QualityFlag>,
    /// Whether a rebalancing wave should actually be launched
    pub rebalance: bool,
    pub agents: Vec<RebalanceSpec>,
    pub attempts: u32,
    pub report: SourceQualityReport,
}

impl QualityGateResult {
    pub fn has_flag(&self, flag: QualityFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Vendor/independent source-balance gate
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: GateThresholds,
}

impl QualityGate {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GateThresholds {
        &self.thresholds
    }

    /// Flags raised by a report
    pub fn flags(&self, report: &SourceQualityReport) -> Vec<QualityFlag> {
        let mut flags = Vec::new();
        if report.total == 0 {
            return flags;
        }
        if report.vendor_fraction > self.thresholds.max_vendor_fraction {
            flags.push(QualityFlag::VendorHeavy);
        }
        if report.independent_fraction < self.thresholds.min_independent_fraction {
            flags.push(QualityFlag::LowIndependent);
        }
        if report.count(SourceTier::Tier1) == 0 {
            flags.push(QualityFlag::NoTier1);
        }
        if report.vendor_fraction >= self.thresholds.contrarian_vendor_fraction {
            flags.push(QualityFlag::NeedsContrarian);
        }
        if report.count(SourceTier::Tier4) > 0 {
            flags.push(QualityFlag::SuspectSources);
        }
        flags
    }

    /// Fill `flags` and `recommendations` on a report
    pub fn annotate(&self, mut report: SourceQualityReport) -> SourceQualityReport {
        let flags = self.flags(&report);
        report.recommendations = flags
            .iter()
            .map(|flag| recommendation(*flag, &report))
            .collect();
        report.flags = flags.iter().map(|f| f.as_str().to_string()).collect();
        report
    }

    /// Evaluate a report.
    ///
    /// `attempts` is the number of rebalancing rounds already run this
    /// session; once it reaches the limit the gate never asks for another.
    pub fn evaluate(&self, report: &SourceQualityReport, attempts: u32) -> QualityGateResult {
        let flags = self.flags(report);
        let passed = !flags.iter().any(|f| f.fails_gate());

        let mut agents: Vec<RebalanceSpec> = flags.iter().filter_map(|f| rebalance_spec(*f)).collect();
        let exhausted = attempts >= self.thresholds.max_rebalance_attempts;
        let rebalance = !passed && !exhausted;

        let mut report = self.annotate(report.clone());
        if !passed && exhausted {
            agents.clear();
            report.recommendations.push(format!(
                "Rebalancing already attempted {} time(s); proceed and note the source imbalance",
                attempts
            ));
        }

        tracing::info!(
            passed,
            rebalance,
            attempts,
            vendor_fraction = report.vendor_fraction,
            independent_fraction = report.independent_fraction,
            flags = ?report.flags,
            "Quality gate evaluated"
        );

        QualityGateResult {
            passed,
            flags,
            rebalance,
            agents,
            attempts,
            report,
        }
    }
}

fn recommendation(flag: QualityFlag, report: &SourceQualityReport) -> String {
    match flag {
        QualityFlag::VendorHeavy => format!(
            "{:.0}% of sources are vendor-published; add independent analysis",
            report.vendor_fraction * 100.0
        ),
        QualityFlag::LowIndependent => format!(
            "Only {:.0}% of sources are independent; add academic or government sources",
            report.independent_fraction * 100.0
        ),
        QualityFlag::NoTier1 => "No tier-1 sources; find primary research or official data".to_string(),
        QualityFlag::NeedsContrarian => {
            "Vendor narrative dominates; look for opposing viewpoints and critiques".to_string()
        }
        QualityFlag::SuspectSources => format!(
            "Suspect hosts cited ({}); corroborate or drop their claims",
            report.suspect_hosts.join(", ")
        ),
    }
}

fn rebalance_spec(flag: QualityFlag) -> Option<RebalanceSpec> {
    let (track, focus, tier_priority) = match flag {
        QualityFlag::VendorHeavy => (
            "independent_analysis",
            "Independent assessments, benchmarks and press coverage not authored by vendors",
            vec![SourceTier::Tier1, SourceTier::Tier2],
        ),
        QualityFlag::LowIndependent => (
            "academic_sources",
            "Peer-reviewed research, standards bodies and government publications",
            vec![SourceTier::Tier1],
        ),
        QualityFlag::NoTier1 => (
            "primary_sources",
            "Primary data: official statistics, filings, advisories and original papers",
            vec![SourceTier::Tier1],
        ),
        QualityFlag::NeedsContrarian => (
            "contrarian",
            "Find opposing viewpoints, criticism and documented failures",
            vec![SourceTier::Tier2, SourceTier::Tier1],
        ),
        QualityFlag::SuspectSources => return None,
    };
    Some(RebalanceSpec {
        track: track.to_string(),
        focus: focus.to_string(),
        tier_priority,
        trigger: flag,
    })
}
