use crate::cache::ResultCache;
use crate::classify::KeywordClassifier;
use crate::consensus::{ClassifierSource, ConsensusOutcome, ConsensusResolver};
use crate::llm::{
    AnthropicAnalyzer, CachedCredentials, CredentialProvider, EnvCredentials, ManagedAnalyzer,
    OpenAIAnalyzer, RetryPolicy, SemanticAnalyzer,
};
use crate::perspectives::{PerspectiveEngine, PerspectivePlan};
use crate::pivot::{
    AggregatedGap, DomainSignal, GapAnalyzer, PivotDecision, PivotDecisionEngine, PivotInputs,
    PlatformCoverage, PlatformCoverageValidator, QualityScorer, SignalDetector, WaveQuality,
    WorkerOutput,
};
use crate::research::session::Session;
use crate::sources::{QualityGate, QualityGateResult, SourceTierClassifier};
use crate::types::{AppError, ClassificationResult, Domain, Result};
use crate::utils::config::{AnalyzerConfig, ProviderKind, WaveplanConfig};
use crate::utils::fs::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Classification plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyReport {
    pub result: ClassificationResult,
    pub cached: bool,
    /// Per-source detail, absent for cache hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ConsensusOutcome>,
}

/// Contents of `analysis/quality-gate.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateRecord {
    /// Rebalancing rounds already requested this session
    #[serde(default)]
    pub rebalance_attempts: u32,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QualityGateResult>,
}

/// Everything learned from one wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveAnalysis {
    pub wave: u8,
    pub primary_domain: Domain,
    pub outputs: Vec<WorkerOutput>,
    pub quality: WaveQuality,
    pub signals: Vec<DomainSignal>,
    pub gaps: Vec<AggregatedGap>,
    pub coverage: Vec<PlatformCoverage>,
    pub gate: QualityGateResult,
    pub decision: PivotDecision,
}

/// Wires cache, consensus, perspectives and wave analysis together
pub struct ResearchCoordinator {
    keyword: KeywordClassifier,
    resolver: ConsensusResolver,
    perspectives: PerspectiveEngine,
    cache: Option<Arc<ResultCache>>,
    tiers: SourceTierClassifier,
    gate: QualityGate,
    scorer: QualityScorer,
    signals: SignalDetector,
    gaps: GapAnalyzer,
    coverage: PlatformCoverageValidator,
    pivot: PivotDecisionEngine,
}

impl ResearchCoordinator {
    pub fn new(
        keyword: KeywordClassifier,
        resolver: ConsensusResolver,
        perspectives: PerspectiveEngine,
    ) -> Self {
        Self {
            gaps: GapAnalyzer::new(keyword.clone()),
            keyword,
            resolver,
            perspectives,
            cache: None,
            tiers: SourceTierClassifier::new(),
            gate: QualityGate::default(),
            scorer: QualityScorer,
            signals: SignalDetector::new(),
            coverage: PlatformCoverageValidator,
            pivot: PivotDecisionEngine::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_pivot(mut self, pivot: PivotDecisionEngine) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn with_signal_detector(mut self, signals: SignalDetector) -> Self {
        self.signals = signals;
        self
    }

    /// Build everything from configuration.
    ///
    /// Analyzers whose API key variable is unset are skipped with a warning;
    /// with `keyword_only` no analyzer is built at all.
    pub fn from_config(config: &WaveplanConfig, keyword_only: bool) -> Result<Self> {
        let mut keyword = KeywordClassifier::new();
        for (domain, words) in &config.consensus.extra_keywords {
            if let Some(domain) = Domain::parse_lenient(domain) {
                keyword = keyword.with_extra_keywords(domain, words.iter().cloned());
            }
        }

        let policy = config.retry.policy();
        let mut analyzers: BTreeMap<String, ManagedAnalyzer> = BTreeMap::new();
        if !keyword_only {
            for (name, analyzer) in config.analyzers.iter().filter(|(_, a)| a.enabled) {
                if let Some(managed) = build_analyzer(name, analyzer, &policy) {
                    analyzers.insert(name.clone(), managed);
                }
            }
        }

        let mut sources = vec![ClassifierSource::Keyword(keyword.clone())];
        for (name, _) in config.consensus_analyzers() {
            if let Some(managed) = analyzers.get(name) {
                sources.push(ClassifierSource::Semantic(managed.clone()));
            }
        }
        let resolver = ConsensusResolver::new(sources)
            .with_source_timeout(Duration::from_secs(config.consensus.source_timeout_secs));

        let generator = config
            .perspective_analyzer()
            .and_then(|(name, _)| analyzers.get(name).cloned());
        let perspectives = PerspectiveEngine::new(
            generator,
            keyword.clone(),
            resolver.clone(),
            config.perspectives.engine.clone(),
        );

        let mut coordinator = Self::new(keyword, resolver, perspectives)
            .with_gate(QualityGate::new(config.quality.clone()))
            .with_pivot(PivotDecisionEngine::new(config.pivot.clone()))
            .with_signal_detector(
                SignalDetector::new()
                    .with_thresholds(config.pivot.signal_threshold, config.pivot.strong_signal),
            );
        if config.cache.enabled {
            coordinator = coordinator.with_cache(Arc::new(ResultCache::new(config.cache.clone())));
        }

        tracing::info!(
            sources = coordinator.resolver.sources().len(),
            analyzers = analyzers.len(),
            cache = config.cache.enabled,
            "Research coordinator ready"
        );
        Ok(coordinator)
    }

    pub fn resolver(&self) -> &ConsensusResolver {
        &self.resolver
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Cache lookup, then consensus, then cache store
    pub async fn classify(&self, query: &str) -> Result<ClassifyReport> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("query is empty".to_string()));
        }

        if let Some(cache) = &self.cache {
            if let Some(result) = cache.get::<ClassificationResult>(query) {
                tracing::info!(primary = %result.primary_domain, "Classification served from cache");
                return Ok(ClassifyReport {
                    result,
                    cached: true,
                    outcome: None,
                });
            }
        }

        let outcome = self.resolver.resolve(query).await?;
        if let Some(cache) = &self.cache {
            cache.set(query, &outcome.result);
        }
        Ok(ClassifyReport {
            result: outcome.result.clone(),
            cached: false,
            outcome: Some(outcome),
        })
    }

    /// Build the perspective plan and store it in `analysis/plan.json`
    pub async fn plan(&self, query: &str, session: &Session) -> Result<PerspectivePlan> {
        let plan = self.perspectives.plan_with_fallback(query).await?;
        write_json_atomic(&session.plan_path(), &plan)?;
        tracing::info!(
            perspectives = plan.validations.len(),
            provenance = ?plan.provenance,
            path = %session.plan_path().display(),
            "Perspective plan written"
        );
        Ok(plan)
    }

    pub fn load_plan(session: &Session) -> Result<Option<PerspectivePlan>> {
        let path = session.plan_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn load_gate_record(session: &Session) -> Result<Option<QualityGateRecord>> {
        let path = session.quality_gate_path();
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Gate a list of URLs without touching a session
    pub fn evaluate_sources<I, S>(&self, urls: I, attempts: u32) -> QualityGateResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.gate.evaluate(&self.tiers.report(urls), attempts)
    }

    /// Score, scan and gate a wave, then decide on wave 2.
    ///
    /// Writes `analysis/quality-gate.json` (carrying the rebalance attempt
    /// counter) and `analysis/wave-N-analysis.json`. For wave 1 the decision
    /// goes to `analysis/pivot-decision.json`, which is never overwritten.
    pub fn analyze_wave(&self, session: &Session, wave: u8) -> Result<WaveAnalysis> {
        let outputs = session.load_wave(wave)?;
        if outputs.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "no worker outputs in {}",
                session.wave_dir(wave).display()
            )));
        }
        let plan = Self::load_plan(session)?;
        let primary_domain = self.primary_domain(plan.as_ref(), &outputs);

        let quality = self.scorer.score_wave(&outputs);
        let signals = self.signals.detect(&outputs, &quality, primary_domain);
        let gaps = self.gaps.analyze(&outputs, &quality);
        let coverage = match &plan {
            Some(plan) if wave == 1 => self.coverage.validate(plan, &outputs),
            _ => Vec::new(),
        };

        let previous = Self::load_gate_record(session)?;
        let attempts = previous.map(|r| r.rebalance_attempts).unwrap_or(0);
        let citations = outputs.iter().flat_map(|o| o.citations.iter());
        let gate = self.gate.evaluate(&self.tiers.report(citations), attempts);

        let decision_path = session.pivot_decision_path();
        let already_decided = wave == 1 && decision_path.exists();
        let inputs = PivotInputs {
            wave,
            outputs: &outputs,
            quality: &quality,
            signals: &signals,
            gaps: &gaps,
            coverage: &coverage,
            gate: Some(&gate),
            planned: plan.as_ref().filter(|_| wave == 1).map(|p| &p.allocation),
        };
        let decision = if wave == 1 {
            self.pivot.decide_and_persist(&inputs, &decision_path)?
        } else {
            self.pivot.decide(&inputs)
        };

        let consumed = gate.rebalance && !already_decided && decision.launch_wave2;
        let record = QualityGateRecord {
            rebalance_attempts: attempts + u32::from(consumed),
            evaluated_at: Utc::now(),
            result: Some(gate.clone()),
        };
        write_json_atomic(&session.quality_gate_path(), &record)?;

        let analysis = WaveAnalysis {
            wave,
            primary_domain,
            outputs,
            quality,
            signals,
            gaps,
            coverage,
            gate,
            decision,
        };
        write_json_atomic(&session.wave_analysis_path(wave), &analysis)?;

        tracing::info!(
            wave,
            workers = analysis.outputs.len(),
            mean_quality = analysis.quality.mean,
            launch_wave2 = analysis.decision.launch_wave2,
            rebalance_attempts = record.rebalance_attempts,
            "Wave analysed"
        );
        Ok(analysis)
    }

    /// The query's own domain: from the plan's query if there is one,
    /// otherwise the most common domain the workers reported.
    fn primary_domain(&self, plan: Option<&PerspectivePlan>, outputs: &[WorkerOutput]) -> Domain {
        if let Some(plan) = plan {
            return self.keyword.primary_domain(&plan.query);
        }
        let mut counts: BTreeMap<Domain, usize> = BTreeMap::new();
        for domain in outputs.iter().filter_map(|o| o.domain) {
            *counts.entry(domain).or_insert(0) += 1;
        }
        let best = counts.values().copied().max().unwrap_or(0);
        counts
            .into_iter()
            .find(|(_, count)| *count == best && best > 0)
            .map(|(domain, _)| domain)
            .unwrap_or(Domain::FALLBACK)
    }
}

/// One configured analyzer with throttle, retry policy and timeouts applied
pub fn build_analyzer(
    name: &str,
    config: &AnalyzerConfig,
    policy: &RetryPolicy,
) -> Option<ManagedAnalyzer> {
    let key_env = config.key_env();
    if std::env::var(key_env).map(|v| v.trim().is_empty()).unwrap_or(true) {
        tracing::warn!(analyzer = name, env = key_env, "API key not set, analyzer disabled");
        return None;
    }
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(CachedCredentials::new(Arc::new(EnvCredentials::new(key_env))));

    let analyzer: Arc<dyn SemanticAnalyzer> = match config.provider {
        ProviderKind::Anthropic => {
            let mut analyzer = AnthropicAnalyzer::new(name, &config.model, credentials);
            if let Some(url) = &config.base_url {
                analyzer = analyzer.with_base_url(url);
            }
            Arc::new(analyzer)
        }
        ProviderKind::OpenAI => {
            let mut analyzer = OpenAIAnalyzer::new(name, &config.model, credentials);
            if let Some(url) = &config.base_url {
                analyzer = analyzer.with_api_base(url);
            }
            Arc::new(analyzer)
        }
    };

    Some(
        ManagedAnalyzer::new(analyzer, policy.clone())
            .with_min_interval(Duration::from_secs(config.min_interval_secs))
            .with_attempt_timeout(Duration::from_secs(config.timeout_secs))
            .with_generation(config.max_tokens, config.temperature),
    )
}
