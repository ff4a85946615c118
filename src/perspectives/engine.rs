use crate::classify::KeywordClassifier;
use crate::consensus::{parse_perspective_batch, ConsensusResolver};
use crate::llm::ManagedAnalyzer;
use crate::types::{
    Allocation, AppError, Complexity, Domain, PerspectiveBatch, PlatformSuggestion, Provenance,
    ResearchPerspective, Result, WorkerType,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

const GENERATE_SYSTEM_PROMPT: &str = "You plan multi-angle research. \
Answer with a single JSON object and nothing else.";

/// Validation knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveConfig {
    #[serde(default = "default_match_boost")]
    pub match_boost: u8,
    #[serde(default = "default_mismatch_penalty")]
    pub mismatch_penalty: u8,
    /// Adjusted confidence below this needs consensus resolution
    #[serde(default = "default_resolution_threshold")]
    pub resolution_threshold: u8,
    /// Adjusted confidence below this also gets a backup specialist
    #[serde(default = "default_backup_threshold")]
    pub backup_threshold: u8,
    #[serde(default = "default_true")]
    pub mismatch_triggers_resolution: bool,
    #[serde(default = "default_backup_specialist")]
    pub backup_specialist: WorkerType,
}

fn default_match_boost() -> u8 {
    10
}

fn default_mismatch_penalty() -> u8 {
    20
}

fn default_resolution_threshold() -> u8 {
    60
}

fn default_backup_threshold() -> u8 {
    40
}

fn default_true() -> bool {
    true
}

fn default_backup_specialist() -> WorkerType {
    WorkerType::WebResearcher
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            match_boost: default_match_boost(),
            mismatch_penalty: default_mismatch_penalty(),
            resolution_threshold: default_resolution_threshold(),
            backup_threshold: default_backup_threshold(),
            mismatch_triggers_resolution: true,
            backup_specialist: default_backup_specialist(),
        }
    }
}

/// A perspective checked against the keyword classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveValidation {
    pub perspective: ResearchPerspective,
    /// Keyword classifier's domain for the perspective text
    pub keyword_domain: Domain,
    pub domain_match: bool,
    pub adjusted_confidence: u8,
    pub needs_resolution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_specialist: Option<WorkerType>,
    /// Set once consensus re-resolution replaced the label
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
}

/// Validated perspectives plus the resulting worker allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectivePlan {
    pub query: String,
    pub complexity: Complexity,
    pub time_sensitive: bool,
    pub reasoning: String,
    pub validations: Vec<PerspectiveValidation>,
    pub allocation: Allocation,
    pub provenance: Provenance,
}

impl PerspectivePlan {
    pub fn perspectives(&self) -> impl Iterator<Item = &ResearchPerspective> {
        self.validations.iter().map(|v| &v.perspective)
    }
}

/// Prompt sent to the perspective generator
pub fn generation_prompt(query: &str) -> String {
    let domains: Vec<&str> = Domain::ALL.iter().map(|d| d.as_str()).collect();
    let agents: Vec<&str> = WorkerType::ALL.iter().map(|w| w.as_str()).collect();
    format!(
        "Break the research query below into {min}-{max} distinct research perspectives.\n\n\
         Query: {query}\n\n\
         Respond with JSON of the form:\n\
         {{\"perspectives\": [{{\"text\": \"the angle\", \"domain\": one of {domains:?},\n  \
         \"confidence\": 0-100, \"recommended_agent\": one of {agents:?},\n  \
         \"rationale\": \"why\", \"platforms\": [{{\"name\": \"site or database\", \"reason\": \"why\"}}] (1-3)}}],\n \
         \"complexity\": \"SIMPLE\" | \"MODERATE\" | \"COMPLEX\",\n \
         \"time_sensitive\": true | false,\n \
         \"reasoning\": \"one sentence\"}}",
        min = PerspectiveBatch::MIN_PERSPECTIVES,
        max = PerspectiveBatch::MAX_PERSPECTIVES,
    )
}

/// Default information sources per domain, used for keyword-derived plans
fn default_platforms(domain: Option<Domain>) -> Vec<PlatformSuggestion> {
    let names: &[&str] = match domain {
        Some(Domain::Security) => &["nvd.nist.gov", "attack.mitre.org", "cisa.gov"],
        Some(Domain::Technical) => &["github.com", "stackoverflow.com", "docs.rs"],
        Some(Domain::Academic) => &["arxiv.org", "scholar.google.com", "semanticscholar.org"],
        Some(Domain::Business) => &["sec.gov", "crunchbase.com", "reuters.com"],
        Some(Domain::SocialMedia) => &["reddit.com", "news.ycombinator.com", "youtube.com"],
        Some(Domain::Investigative) => &["courtlistener.com", "opencorporates.com", "archive.org"],
        None => &["web search", "wikipedia.org"],
    };
    names
        .iter()
        .map(|name| PlatformSuggestion {
            name: name.to_string(),
            reason: "default source for this specialisation".to_string(),
        })
        .collect()
}

/// Generates, validates and selectively re-resolves research perspectives
pub struct PerspectiveEngine {
    generator: Option<ManagedAnalyzer>,
    keyword: KeywordClassifier,
    resolver: ConsensusResolver,
    config: PerspectiveConfig,
}

impl PerspectiveEngine {
    pub fn new(
        generator: Option<ManagedAnalyzer>,
        keyword: KeywordClassifier,
        resolver: ConsensusResolver,
        config: PerspectiveConfig,
    ) -> Self {
        Self {
            generator,
            keyword,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &PerspectiveConfig {
        &self.config
    }

    /// One semantic call producing 4-8 perspectives
    pub async fn generate(&self, query: &str) -> Result<PerspectiveBatch> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("query is empty".to_string()));
        }
        let generator = self.generator.as_ref().ok_or_else(|| {
            AppError::Configuration("no perspective generator configured".to_string())
        })?;

        let baseline = self.keyword.classify(query)?;
        let request = generator
            .request(generation_prompt(query))
            .with_system(GENERATE_SYSTEM_PROMPT);
        let text = generator.submit(&request).await?;
        let batch = parse_perspective_batch(&text, baseline.complexity)?;

        tracing::debug!(
            count = batch.perspectives.len(),
            complexity = %batch.complexity,
            "Generated perspectives"
        );
        Ok(batch)
    }

    /// Check one perspective against the keyword classifier
    pub fn validate(&self, perspective: &ResearchPerspective) -> PerspectiveValidation {
        let keyword_domain = self.keyword.primary_domain(&perspective.text);
        let domain_match = keyword_domain == perspective.domain;

        let adjusted_confidence = if domain_match {
            perspective.confidence.saturating_add(self.config.match_boost).min(100)
        } else {
            perspective.confidence.saturating_sub(self.config.mismatch_penalty)
        };

        let needs_resolution = (!domain_match && self.config.mismatch_triggers_resolution)
            || adjusted_confidence < self.config.resolution_threshold;

        let backup_specialist = (adjusted_confidence < self.config.backup_threshold
            && perspective.recommended_agent != self.config.backup_specialist)
            .then_some(self.config.backup_specialist);

        PerspectiveValidation {
            perspective: perspective.clone(),
            keyword_domain,
            domain_match,
            adjusted_confidence,
            needs_resolution,
            backup_specialist,
            resolved: false,
            resolution_error: None,
        }
    }

    /// Run consensus on exactly the flagged perspectives, once.
    ///
    /// A successful run replaces the domain and specialist with the winner and
    /// marks the perspective as matching. A failed run leaves the original
    /// assignment. Either way the flag is cleared and nothing is re-validated.
    pub async fn resolve_uncertain(
        &self,
        mut validations: Vec<PerspectiveValidation>,
    ) -> Vec<PerspectiveValidation> {
        let flagged: Vec<usize> = validations
            .iter()
            .enumerate()
            .filter(|(_, v)| v.needs_resolution)
            .map(|(i, _)| i)
            .collect();
        if flagged.is_empty() {
            return validations;
        }

        tracing::info!(count = flagged.len(), "Re-resolving uncertain perspectives");
        let texts: Vec<(usize, String)> = flagged
            .iter()
            .map(|&i| (i, validations[i].perspective.text.clone()))
            .collect();
        let runs = texts
            .into_iter()
            .map(|(i, text)| async move { (i, self.resolver.resolve(&text).await) });

        for (i, outcome) in join_all(runs).await {
            let validation = &mut validations[i];
            match outcome {
                Ok(outcome) => {
                    let winner = outcome.result.primary_domain;
                    validation.perspective.domain = winner;
                    validation.perspective.recommended_agent = winner.specialist();
                    validation.domain_match = true;
                    validation.resolved = true;
                }
                Err(e) => {
                    tracing::warn!(
                        perspective = i,
                        error = %e,
                        "Perspective re-resolution failed, keeping original assignment"
                    );
                    validation.resolution_error = Some(e.to_string());
                }
            }
            validation.needs_resolution = false;
        }
        validations
    }

    /// Per-perspective specialist tally plus backups
    pub fn allocation(validations: &[PerspectiveValidation]) -> Allocation {
        let mut allocation = Allocation::new();
        for validation in validations {
            *allocation
                .entry(validation.perspective.recommended_agent)
                .or_insert(0) += 1;
            if let Some(backup) = validation.backup_specialist {
                *allocation.entry(backup).or_insert(0) += 1;
            }
        }
        allocation
    }

    /// Generate → validate → re-resolve
    pub async fn plan(&self, query: &str) -> Result<PerspectivePlan> {
        let batch = self.generate(query).await?;
        Ok(self.finish_plan(query, batch, Provenance::Semantic).await)
    }

    /// Like [`PerspectiveEngine::plan`], but falls back to keyword-derived
    /// perspectives when generation fails
    pub async fn plan_with_fallback(&self, query: &str) -> Result<PerspectivePlan> {
        match self.plan(query).await {
            Ok(plan) => Ok(plan),
            Err(AppError::InvalidInput(msg)) => Err(AppError::InvalidInput(msg)),
            Err(e) => {
                tracing::warn!(error = %e, "Perspective generation failed, using keyword perspectives");
                let batch = self.keyword_perspectives(query)?;
                Ok(self.finish_plan(query, batch, Provenance::KeywordFallback).await)
            }
        }
    }

    /// One perspective per worker slot of the keyword allocation
    pub fn keyword_perspectives(&self, query: &str) -> Result<PerspectiveBatch> {
        let classification = self.keyword.classify(query)?;
        let query = query.trim();

        let mut perspectives = Vec::with_capacity(classification.worker_count);
        for (worker, slots) in &classification.allocation {
            for slot in 0..*slots {
                let domain = worker.domain().unwrap_or(classification.primary_domain);
                let text = if slot == 0 {
                    format!("{} ({} angle)", query, domain)
                } else {
                    format!("{} ({} angle, part {})", query, domain, slot + 1)
                };
                perspectives.push(ResearchPerspective {
                    text,
                    domain,
                    confidence: 50,
                    recommended_agent: *worker,
                    rationale: format!("keyword allocation assigned a {}", worker),
                    platforms: default_platforms(worker.domain()),
                });
            }
        }

        Ok(PerspectiveBatch {
            perspectives,
            complexity: classification.complexity,
            time_sensitive: false,
            reasoning: "derived from keyword classification".to_string(),
        })
    }

    async fn finish_plan(
        &self,
        query: &str,
        batch: PerspectiveBatch,
        provenance: Provenance,
    ) -> PerspectivePlan {
        let validations: Vec<PerspectiveValidation> =
            batch.perspectives.iter().map(|p| self.validate(p)).collect();
        let validations = if provenance == Provenance::KeywordFallback {
            // keyword-derived perspectives already follow the keyword allocation
            validations
                .into_iter()
                .map(|mut v| {
                    v.needs_resolution = false;
                    v.backup_specialist = None;
                    v
                })
                .collect()
        } else {
            self.resolve_uncertain(validations).await
        };
        let allocation = Self::allocation(&validations);

        PerspectivePlan {
            query: query.to_string(),
            complexity: batch.complexity,
            time_sensitive: batch.time_sensitive,
            reasoning: batch.reasoning,
            validations,
            allocation,
            provenance,
        }
    }
}
