//! Command handlers
//!
//! Every handler returns `Ok(())` for exit code 0. Failures, including a
//! blocked stage gate or a failed source gate, come back as errors and the
//! binary exits with 1 after printing one line naming the cause.

use super::output::{Output, StageState};
use super::{CacheCommands, Cli, Commands};
use crate::cache::ResultCache;
use crate::phases::{PhaseStatus, Stage};
use crate::research::{ResearchCoordinator, Session, WaveAnalysis};
use crate::sources::{QualityGate, QualityGateResult, SourceTierClassifier};
use crate::utils::config::{ConfigManager, WaveplanConfig, DEFAULT_CONFIG_FILE};
use anyhow::{bail, Context};
use std::path::PathBuf;

/// Load the configuration named on the command line, or `waveplan.toml`
/// from the working directory when it exists.
pub fn load_config(cli: &Cli) -> anyhow::Result<ConfigManager> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::open(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigManager::new(DEFAULT_CONFIG_FILE)?,
    };
    Ok(manager)
}

/// `--session`, then `[session].root`, then the working directory
pub fn resolve_session(cli: &Cli, config: &WaveplanConfig) -> Session {
    let root = cli
        .session
        .clone()
        .or_else(|| config.session.root.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    Session::new(root)
}

/// Dispatch one parsed command
pub async fn run(cli: &Cli, config: &WaveplanConfig, output: &Output) -> anyhow::Result<()> {
    let session = resolve_session(cli, config);
    tracing::debug!(session = %session.root().display(), command = ?cli.command, "Running command");

    match &cli.command {
        Commands::Verify { stage } => verify(&session, stage, output),
        Commands::Mark { stage } => mark(&session, stage, output),
        Commands::SkipWave2 { reason } => skip_wave2(&session, reason, output),
        Commands::Status { json } => status(&session, *json, output),
        Commands::Count => count(&session, output),
        Commands::Classify {
            query,
            keyword_only,
            json,
        } => classify(config, query, *keyword_only, *json, output).await,
        Commands::Plan {
            query,
            keyword_only,
        } => plan(config, &session, query, *keyword_only, output).await,
        Commands::Analyze { wave, json } => analyze(config, &session, *wave, *json, output),
        Commands::Sources { urls, json } => sources(config, urls, *json, output),
        Commands::Cache(command) => cache(config, command, output),
    }
}

// ============= Phase gate =============

fn verify(session: &Session, stage: &str, output: &Output) -> anyhow::Result<()> {
    let stage: Stage = stage.parse()?;
    session.phase_gate().verify(stage)?;
    output.success(&format!("{} may proceed", stage));
    Ok(())
}

fn mark(session: &Session, stage: &str, output: &Output) -> anyhow::Result<()> {
    let stage: Stage = stage.parse()?;
    let metrics = match stage {
        Stage::Wave1 => Some(serde_json::json!({ "outputs": session.count_outputs(1)? })),
        Stage::Wave2 => Some(serde_json::json!({ "outputs": session.count_outputs(2)? })),
        _ => None,
    };
    let path = session.phase_gate().mark(stage, metrics)?;
    output.success(&format!("{} complete ({})", stage, path.display()));
    Ok(())
}

fn skip_wave2(session: &Session, reason: &str, output: &Output) -> anyhow::Result<()> {
    let path = session.phase_gate().skip_wave2(reason)?;
    output.success(&format!("wave2 skipped: {} ({})", reason.trim(), path.display()));
    Ok(())
}

fn status(session: &Session, json: bool, output: &Output) -> anyhow::Result<()> {
    let status = session.phase_gate().status();
    if json {
        output.json(&status)?;
    } else {
        print_status(&status, output);
    }
    Ok(())
}

fn print_status(status: &PhaseStatus, output: &Output) {
    output.header(&format!("Session {}", status.analysis_dir.display()));
    for stage in &status.stages {
        let state = if stage.skipped {
            StageState::Skipped
        } else if stage.completed {
            StageState::Done
        } else if stage.ready {
            StageState::Ready
        } else {
            StageState::Waiting
        };
        let detail = match (&stage.marker, &stage.timestamp) {
            (Some(marker), Some(ts)) => format!("{} at {}", marker, ts.format("%Y-%m-%d %H:%M:%S")),
            (Some(marker), None) => marker.clone(),
            _ => String::new(),
        };
        output.stage(stage.number, stage.stage.id(), state, &detail);
    }
    match status.next {
        Some(next) => output.hint(&format!("next stage: {}", next)),
        None if status.completed.len() == Stage::ALL.len() => output.success("all stages complete"),
        None => {}
    }
}

fn count(session: &Session, output: &Output) -> anyhow::Result<()> {
    for wave in crate::research::session::WAVES {
        output.kv(&format!("wave-{}", wave), &session.count_outputs(wave)?.to_string());
    }
    Ok(())
}

// ============= Classification & planning =============

async fn classify(
    config: &WaveplanConfig,
    query: &str,
    keyword_only: bool,
    json: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let coordinator = ResearchCoordinator::from_config(config, keyword_only)?;
    let report = coordinator.classify(query).await?;
    if json {
        output.json(&report)?;
        return Ok(());
    }

    let result = &report.result;
    output.header("Classification");
    output.kv("primary", result.primary_domain.as_str());
    let secondary: Vec<&str> = result.secondary_domains.iter().map(|d| d.as_str()).collect();
    output.kv("secondary", &secondary.join(", "));
    output.kv("complexity", &result.complexity.to_string());
    output.kv("workers", &result.worker_count.to_string());
    output.kv("provenance", result.provenance.as_str());
    if report.cached {
        output.kv("source", "cache");
    }
    if let Some(outcome) = &report.outcome {
        output.kv(
            "consensus",
            &format!("{} ({} of {} sources valid)", outcome.method, outcome.valid_sources, outcome.sources.len()),
        );
        for source in outcome.sources.iter().filter(|s| s.result.is_none()) {
            output.warning(&format!(
                "{} failed: {}",
                source.source,
                source.error.as_deref().unwrap_or("no result")
            ));
        }
    }

    output.subheader("Allocation");
    for (worker, slots) in &result.allocation {
        output.list_item(&format!("{} × {}", worker, slots));
    }
    if !result.pivot_scenarios.is_empty() {
        output.subheader("Possible pivots");
        for scenario in &result.pivot_scenarios {
            output.list_item(scenario);
        }
    }
    Ok(())
}

async fn plan(
    config: &WaveplanConfig,
    session: &Session,
    query: &str,
    keyword_only: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let coordinator = ResearchCoordinator::from_config(config, keyword_only)?;
    let plan = coordinator.plan(query, session).await?;

    output.header("Perspective plan");
    output.kv("complexity", &plan.complexity.to_string());
    output.kv("provenance", plan.provenance.as_str());
    if plan.time_sensitive {
        output.kv("time sensitive", "yes");
    }
    output.table_header(&["Domain", "Agent", "Confidence"]);
    for validation in &plan.validations {
        let perspective = &validation.perspective;
        output.table_row(&[
            perspective.domain.as_str(),
            perspective.recommended_agent.as_str(),
            validation.adjusted_confidence.to_string().as_str(),
        ]);
        output.list_item(&perspective.text);
    }
    output.subheader("Allocation");
    for (worker, slots) in &plan.allocation {
        output.list_item(&format!("{} × {}", worker, slots));
    }
    output.success(&format!("plan written to {}", session.plan_path().display()));
    Ok(())
}

// ============= Wave analysis =============

fn analyze(
    config: &WaveplanConfig,
    session: &Session,
    wave: u8,
    json: bool,
    output: &Output,
) -> anyhow::Result<()> {
    if !crate::research::session::WAVES.contains(&wave) {
        bail!("wave must be 1 or 2, got {}", wave);
    }
    let coordinator = ResearchCoordinator::from_config(config, true)?;
    let analysis = coordinator.analyze_wave(session, wave)?;
    if json {
        output.json(&analysis)?;
    } else {
        print_analysis(&analysis, output);
    }
    Ok(())
}

fn print_analysis(analysis: &WaveAnalysis, output: &Output) {
    output.header(&format!("Wave {} analysis", analysis.wave));
    output.kv("primary domain", analysis.primary_domain.as_str());
    output.kv("mean quality", &format!("{:.1}", analysis.quality.mean));

    output.table_header(&["Agent", "Score", "Band"]);
    for score in &analysis.quality.scores {
        output.table_row(&[
            score.agent.as_str(),
            score.total.to_string().as_str(),
            score.band.to_string().as_str(),
        ]);
    }

    if !analysis.signals.is_empty() {
        output.subheader("Emergent signals");
        for signal in &analysis.signals {
            output.list_item(&format!(
                "{} → {} (strength {:.1}{})",
                signal.theme,
                signal.domain,
                signal.strength,
                if signal.strong { ", strong" } else { "" }
            ));
        }
    }

    let promoted: Vec<_> = analysis.gaps.iter().filter(|g| g.promoted).collect();
    if !promoted.is_empty() {
        output.subheader("Promoted gaps");
        for gap in promoted {
            output.list_item(&format!("{} ({} workers)", gap.text, gap.workers.len()));
        }
    }

    let uncovered: Vec<_> = analysis.coverage.iter().filter(|c| c.flagged).collect();
    if !uncovered.is_empty() {
        output.subheader("Uncovered platforms");
        for coverage in uncovered {
            output.list_item(&format!(
                "perspective {}: {:.0}% of designated platforms visited",
                coverage.perspective_index,
                coverage.coverage * 100.0
            ));
        }
    }

    print_gate(&analysis.gate, output);

    output.subheader("Pivot decision");
    for reason in &analysis.decision.reasons {
        output.list_item(reason);
    }
    for rec in &analysis.decision.recommendations {
        output.list_item(&format!("[{}] {}: {}", rec.track, rec.worker_type, rec.rationale));
    }
    if analysis.decision.launch_wave2 {
        output.warning(&format!(
            "launch wave 2 with {} specialist(s)",
            analysis.decision.recommendations.len()
        ));
    } else {
        output.success("wave 2 not needed");
        output.hint("record it with: waveplan skip-wave2 \"<reason>\"");
    }
}

fn print_gate(gate: &QualityGateResult, output: &Output) {
    output.subheader("Source quality");
    output.kv("sources", &gate.report.total.to_string());
    output.kv("vendor", &format!("{:.0}%", gate.report.vendor_fraction * 100.0));
    output.kv("independent", &format!("{:.0}%", gate.report.independent_fraction * 100.0));
    for recommendation in &gate.report.recommendations {
        output.list_item(recommendation);
    }
    if gate.passed {
        output.success("quality gate passed");
    } else if gate.rebalance {
        output.warning(&format!("quality gate failed, {} rebalance worker(s) requested", gate.agents.len()));
    } else {
        output.warning("quality gate failed, rebalancing exhausted");
    }
}

// ============= Sources & cache =============

fn sources(config: &WaveplanConfig, urls: &[String], json: bool, output: &Output) -> anyhow::Result<()> {
    let report = SourceTierClassifier::new().report(urls);
    let gate = QualityGate::new(config.quality.clone()).evaluate(&report, 0);
    if json {
        output.json(&gate)?;
    } else {
        print_gate(&gate, output);
    }
    if !gate.passed {
        let flags: Vec<String> = gate.flags.iter().map(|f| f.to_string()).collect();
        bail!("source quality gate failed: {}", flags.join(", "));
    }
    Ok(())
}

fn cache(config: &WaveplanConfig, command: &CacheCommands, output: &Output) -> anyhow::Result<()> {
    let cache = ResultCache::new(config.cache.clone());
    match command {
        CacheCommands::Stats { json } => {
            let stats = cache.stats()?;
            if *json {
                output.json(&stats)?;
                return Ok(());
            }
            output.header("Classification cache");
            output.kv("root", &stats.root.display().to_string());
            output.kv("enabled", &stats.enabled.to_string());
            output.kv("entries", &stats.entry_count.to_string());
            output.kv("expired", &stats.expired_count.to_string());
            output.kv("total hits", &stats.total_hits.to_string());
        }
        CacheCommands::Clear => {
            let removed = cache.clear()?;
            output.success(&format!("removed {} cache entries", removed));
        }
        CacheCommands::Prune => {
            let removed = cache.prune_expired()?;
            output.success(&format!("pruned {} expired entries", removed));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("waveplan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_session_resolution_order() {
        let mut config = WaveplanConfig::default();
        assert_eq!(resolve_session(&cli(&["count"]), &config).root(), PathBuf::from(".").as_path());

        config.session.root = Some(PathBuf::from("from-config"));
        assert_eq!(
            resolve_session(&cli(&["count"]), &config).root(),
            PathBuf::from("from-config").as_path()
        );
        assert_eq!(
            resolve_session(&cli(&["--session", "flag", "count"]), &config).root(),
            PathBuf::from("flag").as_path()
        );
    }

    #[test]
    fn test_load_config_through_manager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let flag = path.to_string_lossy().to_string();
        assert!(load_config(&cli(&["--config", &flag, "count"])).is_err());

        std::fs::write(&path, "[quality]\nmax_rebalance_attempts = 2\n").unwrap();
        let manager = load_config(&cli(&["--config", &flag, "count"])).unwrap();
        assert_eq!(manager.path(), Some(path.as_path()));
        assert_eq!(manager.config().quality.max_rebalance_attempts, 2);
    }

    #[tokio::test]
    async fn test_verify_blocked_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let session_arg = dir.path().to_str().unwrap();
        let config = WaveplanConfig::default();
        let output = Output::no_color();

        let err = run(&cli(&["--session", session_arg, "verify", "pivot"]), &config, &output)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wave-1-validated.json"));

        run(&cli(&["--session", session_arg, "mark", "wave1"]), &config, &output)
            .await
            .unwrap();
        run(&cli(&["--session", session_arg, "verify", "wave1-validated"]), &config, &output)
            .await
            .unwrap();
    }

    #[test]
    fn test_sources_fails_on_vendor_heavy_list() {
        let config = WaveplanConfig::default();
        let urls = vec![
            "https://crowdstrike.com/report".to_string(),
            "https://fortinet.com/blog".to_string(),
        ];
        assert!(sources(&config, &urls, true, &Output::no_color()).is_err());
    }
}
