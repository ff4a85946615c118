//! Wave analysis end to end: worker files on disk to a pivot decision.

use waveplan::classify::KeywordClassifier;
use waveplan::consensus::ConsensusResolver;
use waveplan::perspectives::PerspectiveEngine;
use waveplan::pivot::{PivotDecision, PivotTrack};
use waveplan::sources::QualityFlag;
use waveplan::types::{Domain, WorkerType};
use waveplan::utils::fs::read_json;
use waveplan::{ResearchCoordinator, Session};

const FILLER: &str = "Observed activity across the sector continued. ";

fn coordinator() -> ResearchCoordinator {
    let keyword = KeywordClassifier::new();
    let resolver = ConsensusResolver::keyword_only(keyword.clone());
    let perspectives =
        PerspectiveEngine::new(None, keyword.clone(), resolver.clone(), Default::default());
    ResearchCoordinator::new(keyword, resolver, perspectives)
}

/// ~3.9k chars, ten tier-1 citations, 90% confidence: scores excellent
fn strong_report(extra: &str, gaps: &str) -> String {
    let mut body = String::from("# Findings\n\n");
    body.push_str(&FILLER.repeat(70));
    body.push('\n');
    for n in 1..=10 {
        body.push_str(&format!("- https://www.nist.gov/publications/report-{}\n", n));
    }
    body.push_str(extra);
    body.push_str("\n\n## Metadata\n- **Confidence**: 90%\n- **Domain**: security\n");
    body.push_str(gaps);
    body
}

fn write_output(session: &Session, wave: u8, agent: &str, content: &str) {
    let dir = session.wave_dir(wave);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.md", agent)), content).unwrap();
}

fn tracks(decision: &PivotDecision) -> Vec<PivotTrack> {
    decision.recommendations.iter().map(|r| r.track).collect()
}

#[test]
fn test_wave_with_signal_gap_and_poor_worker_launches_wave2() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(dir.path());
    write_output(
        &session,
        1,
        "security-analyst-1",
        &strong_report(
            &"New GDPR compliance regulation. ".repeat(3),
            "\n### Limited coverage\n- Non-English vendor advisories\n",
        ),
    );
    write_output(&session, 1, "technical-researcher-1", "Nothing found.\n");

    let analysis = coordinator().analyze_wave(&session, 1).unwrap();

    assert_eq!(analysis.primary_domain, Domain::Security);
    assert_eq!(analysis.outputs.len(), 2);
    assert_eq!(analysis.quality.scores[0].total, 87);

    let regulatory = analysis
        .signals
        .iter()
        .find(|s| s.theme == "regulatory")
        .expect("regulatory signal");
    assert_eq!(regulatory.hits, 9);
    assert!(regulatory.strong);
    assert_eq!(regulatory.workers, vec!["security-analyst-1".to_string()]);

    assert!(analysis.gate.passed);
    assert!(!analysis.gate.rebalance);

    let decision = &analysis.decision;
    assert!(decision.launch_wave2);
    assert_eq!(decision.metrics.poor_workers, 1);
    assert_eq!(decision.metrics.strong_signals, 1);
    assert_eq!(decision.metrics.promoted_gaps, 1);
    assert_eq!(decision.metrics.gate_passed, Some(true));

    let tracks = tracks(decision);
    assert!(tracks.contains(&PivotTrack::Retry));
    assert!(tracks.contains(&PivotTrack::Signal));
    assert!(tracks.contains(&PivotTrack::GapFill));
    assert!(!tracks.contains(&PivotTrack::Rebalance));

    let retry = decision
        .recommendations
        .iter()
        .find(|r| r.track == PivotTrack::Retry)
        .unwrap();
    assert_eq!(retry.worker_type, WorkerType::TechnicalResearcher);

    let gap = decision
        .recommendations
        .iter()
        .find(|r| r.track == PivotTrack::GapFill)
        .unwrap();
    assert_eq!(gap.focus.as_deref(), Some("Non-English vendor advisories"));
}

#[test]
fn test_quiet_wave_skips_wave2() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(dir.path());
    write_output(&session, 1, "security-analyst-1", &strong_report("", ""));

    let analysis = coordinator().analyze_wave(&session, 1).unwrap();

    assert!(analysis.signals.is_empty());
    assert!(analysis.gaps.is_empty());
    assert!(!analysis.decision.launch_wave2);
    assert!(analysis.decision.reasons.is_empty());
    assert!(analysis.decision.recommendations.is_empty());
}

#[test]
fn test_wave1_decision_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(dir.path());
    write_output(&session, 1, "security-analyst-1", &strong_report("", ""));

    let coordinator = coordinator();
    let first = coordinator.analyze_wave(&session, 1).unwrap();
    assert!(!first.decision.launch_wave2);

    // a late, poor worker would change the outcome
    write_output(&session, 1, "web-researcher-1", "Late.\n");
    let second = coordinator.analyze_wave(&session, 1).unwrap();
    assert_eq!(second.outputs.len(), 2);
    assert_eq!(second.decision, first.decision);

    let stored: PivotDecision = read_json(&session.pivot_decision_path()).unwrap();
    assert_eq!(stored, first.decision);
}

#[test]
fn test_wave2_analysis_is_not_persisted_as_pivot() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(dir.path());
    write_output(&session, 2, "security-analyst-2", "Nothing found.\n");

    let analysis = coordinator().analyze_wave(&session, 2).unwrap();

    assert_eq!(analysis.decision.wave, 2);
    assert!(analysis.coverage.is_empty());
    assert!(session.wave_analysis_path(2).exists());
    assert!(!session.pivot_decision_path().exists());
}

#[test]
fn test_vendor_heavy_wave_requests_rebalance() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::new(dir.path());
    let citations = [
        "https://www.crowdstrike.com/blog/a",
        "https://www.fortinet.com/blog/b",
        "https://www.paloaltonetworks.com/blog/c",
        "https://www.mandiant.com/resources/d",
        "https://www.microsoft.com/security/e",
        "https://www.reuters.com/technology/f",
        "https://github.com/org/g",
        "https://www.wired.com/story/h",
        "https://www.bbc.com/news/i",
        "https://arstechnica.com/security/j",
    ];
    write_output(&session, 1, "security-analyst-1", &citations.join("\n"));

    let analysis = coordinator().analyze_wave(&session, 1).unwrap();

    let gate = &analysis.gate;
    assert!(!gate.passed);
    assert!(gate.rebalance);
    for flag in [
        QualityFlag::VendorHeavy,
        QualityFlag::LowIndependent,
        QualityFlag::NoTier1,
        QualityFlag::NeedsContrarian,
    ] {
        assert!(gate.has_flag(flag), "missing {}", flag);
    }
    assert!(gate.agents.len() >= 2);
    assert!(tracks(&analysis.decision).contains(&PivotTrack::Rebalance));
    assert_eq!(analysis.decision.metrics.gate_passed, Some(false));
}
