use crate::classify::{allocate_workers, predict_pivot_scenarios, rank_secondary, KeywordClassifier};
use crate::consensus::schema::parse_classification;
use crate::llm::ManagedAnalyzer;
use crate::types::{AppError, ClassificationResult, Complexity, Domain, Provenance, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify research queries. \
Answer with a single JSON object and nothing else.";

/// Prompt sent to semantic sources
pub fn classification_prompt(query: &str) -> String {
    let domains: Vec<&str> = Domain::ALL.iter().map(|d| d.as_str()).collect();
    format!(
        "Classify the research query below.\n\n\
         Query: {query}\n\n\
         Respond with JSON of the form:\n\
         {{\"primary_domain\": one of {domains:?},\n  \
         \"secondary_domains\": [domains scoring above 40],\n  \
         \"domain_scores\": {{domain: score 0-100}},\n  \
         \"complexity\": \"SIMPLE\" | \"MODERATE\" | \"COMPLEX\",\n  \
         \"confidence\": 0-100,\n  \
         \"reasoning\": \"one sentence\"}}"
    )
}

/// One way of classifying a query.
///
/// The resolver does not care how many of each variant it holds.
#[derive(Debug, Clone)]
pub enum ClassifierSource {
    Keyword(KeywordClassifier),
    Semantic(ManagedAnalyzer),
}

impl ClassifierSource {
    pub fn name(&self) -> &str {
        match self {
            ClassifierSource::Keyword(_) => "keyword",
            ClassifierSource::Semantic(analyzer) => analyzer.name(),
        }
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self, ClassifierSource::Semantic(_))
    }

    pub async fn classify(&self, query: &str) -> Result<ClassificationResult> {
        match self {
            ClassifierSource::Keyword(classifier) => classifier.classify(query),
            ClassifierSource::Semantic(analyzer) => {
                let request = analyzer
                    .request(classification_prompt(query))
                    .with_system(CLASSIFY_SYSTEM_PROMPT);
                let text = analyzer.submit(&request).await?;
                parse_classification(&text, query, analyzer.name())
            }
        }
    }
}

/// How the final classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Unanimous,
    Majority,
    Weighted,
    Fallback,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionMethod::Unanimous => "unanimous",
            ResolutionMethod::Majority => "majority",
            ResolutionMethod::Weighted => "weighted",
            ResolutionMethod::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// What one source produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Option<ClassificationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of reconciling every source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// One entry per attempted source, in configuration order
    pub sources: Vec<SourceOutcome>,
    pub method: ResolutionMethod,
    pub valid_sources: usize,
    /// Sources voting for the winning primary domain
    pub domain_agreement: usize,
    /// Sources voting for the winning complexity
    pub complexity_agreement: usize,
    pub result: ClassificationResult,
}

/// Runs every classifier source concurrently and votes on the outcome
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    sources: Vec<ClassifierSource>,
    source_timeout: Duration,
}

impl ConsensusResolver {
    pub fn new(sources: Vec<ClassifierSource>) -> Self {
        Self {
            sources,
            source_timeout: Duration::from_secs(180),
        }
    }

    /// A resolver with only the keyword baseline
    pub fn keyword_only(classifier: KeywordClassifier) -> Self {
        Self::new(vec![ClassifierSource::Keyword(classifier)])
    }

    /// Upper bound on how long one source may take, retries included
    pub fn with_source_timeout(mut self, source_timeout: Duration) -> Self {
        self.source_timeout = source_timeout;
        self
    }

    pub fn sources(&self) -> &[ClassifierSource] {
        &self.sources
    }

    /// Classify `query` with every source and reconcile.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidInput`] for an empty query
    /// - [`AppError::AllSourcesFailed`] when no source produced a valid result
    pub async fn resolve(&self, query: &str) -> Result<ConsensusOutcome> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("query is empty".to_string()));
        }

        let runs = self.sources.iter().map(|source| async move {
            let outcome = match timeout(self.source_timeout, source.classify(query)).await {
                Ok(Ok(result)) => SourceOutcome {
                    source: source.name().to_string(),
                    result: Some(result),
                    error: None,
                },
                Ok(Err(e)) => SourceOutcome {
                    source: source.name().to_string(),
                    result: None,
                    error: Some(e.to_string()),
                },
                Err(_) => SourceOutcome {
                    source: source.name().to_string(),
                    result: None,
                    error: Some(format!(
                        "timed out after {}s",
                        self.source_timeout.as_secs()
                    )),
                },
            };
            if let Some(error) = &outcome.error {
                tracing::warn!(source = %outcome.source, error = %error, "Consensus source failed");
            }
            outcome
        });

        let outcomes = join_all(runs).await;
        let resolved = reconcile(query, outcomes)?;

        tracing::info!(
            method = %resolved.method,
            primary = %resolved.result.primary_domain,
            complexity = %resolved.result.complexity,
            valid = resolved.valid_sources,
            total = resolved.sources.len(),
            "Consensus resolved"
        );
        Ok(resolved)
    }
}

/// Voting weight order: semantic by confidence (highest first), keyword last
fn weight_order(valid: &[&ClassificationResult]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..valid.len()).collect();
    order.sort_by_key(|&i| {
        let r = valid[i];
        let is_keyword = matches!(r.provenance, Provenance::Keyword | Provenance::KeywordFallback);
        (is_keyword, std::cmp::Reverse(r.confidence.unwrap_or(0)))
    });
    order
}

/// Most-voted value; ties go to the candidate first seen in weight order
fn vote<T: PartialEq + Copy>(ranked: &[T]) -> (T, usize) {
    let mut best: Option<(T, usize)> = None;
    for candidate in ranked {
        let count = ranked.iter().filter(|v| *v == candidate).count();
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((*candidate, count)),
        }
    }
    // ranked is never empty here
    best.unwrap_or((ranked[0], 1))
}

/// Reconcile settled source outcomes into one classification
pub fn reconcile(query: &str, sources: Vec<SourceOutcome>) -> Result<ConsensusOutcome> {
    let valid: Vec<&ClassificationResult> = sources.iter().filter_map(|s| s.result.as_ref()).collect();

    if valid.is_empty() {
        let reasons: Vec<String> = sources
            .iter()
            .map(|s| format!("{}: {}", s.source, s.error.as_deref().unwrap_or("no result")))
            .collect();
        return Err(AppError::AllSourcesFailed(reasons.join("; ")));
    }

    if valid.len() == 1 {
        let mut result = valid[0].clone();
        result.clamp_scores();
        if matches!(result.provenance, Provenance::Keyword) {
            result.provenance = Provenance::KeywordFallback;
        }
        return Ok(ConsensusOutcome {
            valid_sources: 1,
            domain_agreement: 1,
            complexity_agreement: 1,
            method: ResolutionMethod::Fallback,
            result,
            sources,
        });
    }

    let order = weight_order(&valid);
    let ranked: Vec<&ClassificationResult> = order.iter().map(|&i| valid[i]).collect();

    let domains: Vec<Domain> = ranked.iter().map(|r| r.primary_domain).collect();
    let complexities: Vec<Complexity> = ranked.iter().map(|r| r.complexity).collect();
    let (primary_domain, domain_agreement) = vote(&domains);
    let (complexity, complexity_agreement) = vote(&complexities);

    let method = if domain_agreement == valid.len() && complexity_agreement == valid.len() {
        ResolutionMethod::Unanimous
    } else if domain_agreement >= 2 || complexity_agreement >= 2 {
        ResolutionMethod::Majority
    } else {
        ResolutionMethod::Weighted
    };

    // ranked[0] is the highest-confidence semantic result when one exists,
    // otherwise the keyword result
    let base = ranked
        .iter()
        .find(|r| r.primary_domain == primary_domain && r.complexity == complexity)
        .copied()
        .unwrap_or(ranked[0]);

    let mut result = base.clone();
    result.query = query.to_string();
    result.clamp_scores();
    result.primary_domain = primary_domain;
    result.complexity = complexity;
    result.secondary_domains = rank_secondary(&result.domain_scores, primary_domain);
    result.worker_count = complexity.worker_count();
    result.allocation = allocate_workers(primary_domain, &result.secondary_domains, result.worker_count);
    result.pivot_scenarios =
        predict_pivot_scenarios(primary_domain, &result.secondary_domains, complexity);
    result.provenance = Provenance::Consensus;
    result.source = "consensus".to_string();

    Ok(ConsensusOutcome {
        valid_sources: valid.len(),
        domain_agreement,
        complexity_agreement,
        method,
        result,
        sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn semantic(domain: Domain, complexity: Complexity, confidence: u8, name: &str) -> ClassificationResult {
        let mut scores = BTreeMap::new();
        scores.insert(domain, 90);
        ClassificationResult {
            query: "q".to_string(),
            domain_scores: scores,
            primary_domain: domain,
            secondary_domains: vec![],
            complexity,
            worker_count: complexity.worker_count(),
            allocation: allocate_workers(domain, &[], complexity.worker_count()),
            pivot_scenarios: vec![],
            confidence: Some(confidence),
            provenance: Provenance::Semantic,
            source: name.to_string(),
        }
    }

    fn ok(result: ClassificationResult) -> SourceOutcome {
        SourceOutcome {
            source: result.source.clone(),
            result: Some(result),
            error: None,
        }
    }

    fn failed(name: &str) -> SourceOutcome {
        SourceOutcome {
            source: name.to_string(),
            result: None,
            error: Some("boom".to_string()),
        }
    }

    fn keyword(query: &str) -> ClassificationResult {
        KeywordClassifier::new().classify(query).unwrap()
    }

    #[test]
    fn test_all_failed_is_error() {
        let result = reconcile("q", vec![failed("a"), failed("b")]);
        match result {
            Err(AppError::AllSourcesFailed(msg)) => {
                assert!(msg.contains("a: boom"));
                assert!(msg.contains("b: boom"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_valid_is_fallback() {
        let outcome = reconcile(
            "malware",
            vec![ok(keyword("malware")), failed("claude"), failed("gpt")],
        )
        .unwrap();
        assert_eq!(outcome.method, ResolutionMethod::Fallback);
        assert_eq!(outcome.result.provenance, Provenance::KeywordFallback);
        assert_eq!(outcome.sources.len(), 3);
    }

    #[test]
    fn test_unanimous() {
        let query = "Research OSINT tools for threat intelligence";
        let outcome = reconcile(
            query,
            vec![
                ok(keyword(query)),
                ok(semantic(Domain::Security, Complexity::Complex, 90, "claude")),
                ok(semantic(Domain::Security, Complexity::Complex, 80, "gpt")),
            ],
        )
        .unwrap();

        assert_eq!(outcome.method, ResolutionMethod::Unanimous);
        assert_eq!(outcome.result.worker_count, 6);
        assert_eq!(outcome.result.allocation_total(), 6);
        assert_eq!(outcome.result.provenance, Provenance::Consensus);
        assert_eq!(outcome.domain_agreement, 3);
    }

    #[test]
    fn test_majority_on_one_field() {
        let outcome = reconcile(
            "q",
            vec![
                ok(semantic(Domain::Security, Complexity::Simple, 90, "a")),
                ok(semantic(Domain::Academic, Complexity::Simple, 80, "b")),
                ok(semantic(Domain::Business, Complexity::Complex, 70, "c")),
            ],
        )
        .unwrap();

        assert_eq!(outcome.method, ResolutionMethod::Majority);
        assert_eq!(outcome.result.complexity, Complexity::Simple);
        // domain tie broken by highest confidence
        assert_eq!(outcome.result.primary_domain, Domain::Security);
        assert_eq!(outcome.result.worker_count, 4);
    }

    #[test]
    fn test_weighted_prefers_highest_confidence_semantic() {
        let outcome = reconcile(
            "q",
            vec![
                ok(semantic(Domain::Academic, Complexity::Simple, 60, "a")),
                ok(semantic(Domain::Business, Complexity::Complex, 95, "b")),
            ],
        )
        .unwrap();

        assert_eq!(outcome.method, ResolutionMethod::Weighted);
        assert_eq!(outcome.result.primary_domain, Domain::Business);
        assert_eq!(outcome.result.complexity, Complexity::Complex);
        assert_eq!(outcome.result.worker_count, 6);
    }

    #[test]
    fn test_keyword_loses_ties() {
        let outcome = reconcile(
            "malware",
            vec![
                ok(keyword("malware")),
                ok(semantic(Domain::Academic, Complexity::Simple, 10, "a")),
            ],
        )
        .unwrap();
        assert_eq!(outcome.result.primary_domain, Domain::Academic);
    }

    #[test]
    fn test_worker_count_recomputed_from_complexity() {
        let mut odd = semantic(Domain::Security, Complexity::Moderate, 90, "a");
        odd.worker_count = 9;
        let outcome = reconcile(
            "q",
            vec![ok(odd), ok(semantic(Domain::Security, Complexity::Moderate, 80, "b"))],
        )
        .unwrap();
        assert_eq!(outcome.result.worker_count, 5);
        assert_eq!(outcome.result.allocation_total(), 5);
    }

    #[test]
    fn test_combined_scores_are_clamped() {
        let query = "malware malware malware malware malware malware malware malware malware malware malware";
        let outcome = reconcile(
            query,
            vec![
                ok(keyword(query)),
                ok(semantic(Domain::Security, Complexity::Complex, 10, "a")),
            ],
        )
        .unwrap();
        assert!(outcome.result.scores_in_range());
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_query() {
        let resolver = ConsensusResolver::keyword_only(KeywordClassifier::new());
        assert!(matches!(resolver.resolve("  ").await, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_resolve_keyword_only_falls_back() {
        let resolver = ConsensusResolver::keyword_only(KeywordClassifier::new());
        let outcome = resolver.resolve("ransomware breach").await.unwrap();
        assert_eq!(outcome.method, ResolutionMethod::Fallback);
        assert_eq!(outcome.result.primary_domain, Domain::Security);
    }

    #[test]
    fn test_prompt_lists_domains() {
        let prompt = classification_prompt("abc");
        assert!(prompt.contains("Query: abc"));
        assert!(prompt.contains("social_media"));
    }
}
