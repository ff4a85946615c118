//! Deserialize-then-validate for analyzer responses
//!
//! Analyzer output is untrusted text. It is parsed into loose `Raw*` structs and
//! then validated into the crate's typed results; nothing downstream ever sees
//! the raw shape.

use crate::classify::{allocate_workers, predict_pivot_scenarios, rank_secondary};
use crate::types::{
    AppError, ClassificationResult, Complexity, Domain, PerspectiveBatch, PlatformSuggestion,
    Provenance, ResearchPerspective, Result, WorkerType,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Expected shape of a classification response
#[derive(Debug, Deserialize)]
struct RawClassification {
    primary_domain: String,
    #[serde(default)]
    secondary_domains: Vec<String>,
    #[serde(default)]
    domain_scores: BTreeMap<String, f64>,
    complexity: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    perspectives: Vec<RawPerspective>,
    #[serde(default)]
    complexity: Option<String>,
    #[serde(default)]
    time_sensitive: bool,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawPerspective {
    #[serde(alias = "perspective", alias = "angle")]
    text: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "recommendedAgent", alias = "specialist")]
    recommended_agent: Option<String>,
    #[serde(default)]
    rationale: String,
    #[serde(default, alias = "platforms", alias = "sources")]
    suggested_platforms: Vec<RawPlatform>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlatform {
    Named {
        name: String,
        #[serde(default)]
        reason: String,
    },
    Bare(String),
}

/// Pull the first JSON object out of a model response.
///
/// Handles fenced code blocks and leading/trailing prose.
pub fn extract_json_object(text: &str) -> Result<Value> {
    let start = text
        .find('{')
        .ok_or_else(|| AppError::Schema("response contains no JSON object".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AppError::Schema("response JSON object is not closed".to_string()))?;

    let value: Value = serde_json::from_str(&text[start..=end])
        .map_err(|e| AppError::Schema(format!("response is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(AppError::Schema("response is not a JSON object".to_string()));
    }
    Ok(value)
}

fn score_in_range(value: f64, field: &str) -> Result<u32> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(AppError::Schema(format!(
            "{} must be within [0, 100], got {}",
            field, value
        )));
    }
    Ok(value.round() as u32)
}

/// Validate a classification response from analyzer `source`
pub fn parse_classification(text: &str, query: &str, source: &str) -> Result<ClassificationResult> {
    let value = extract_json_object(text)?;
    let raw: RawClassification = serde_json::from_value(value)
        .map_err(|e| AppError::Schema(format!("classification shape: {}", e)))?;

    let primary_domain = Domain::parse_lenient(&raw.primary_domain).ok_or_else(|| {
        AppError::Schema(format!("unknown primary_domain '{}'", raw.primary_domain))
    })?;
    let complexity = Complexity::parse_lenient(&raw.complexity)
        .ok_or_else(|| AppError::Schema(format!("unknown complexity '{}'", raw.complexity)))?;

    let mut domain_scores = BTreeMap::new();
    for (name, score) in &raw.domain_scores {
        let domain = Domain::parse_lenient(name)
            .ok_or_else(|| AppError::Schema(format!("unknown domain '{}' in domain_scores", name)))?;
        domain_scores.insert(domain, score_in_range(*score, "domain score")?);
    }

    let confidence = raw
        .confidence
        .map(|c| {
            // some models answer 0.85 instead of 85
            let c = if c > 0.0 && c <= 1.0 { c * 100.0 } else { c };
            score_in_range(c, "confidence").map(|c| c as u8)
        })
        .transpose()?;

    let mut secondary_domains: Vec<Domain> = Vec::new();
    for name in &raw.secondary_domains {
        if let Some(domain) = Domain::parse_lenient(name) {
            if domain != primary_domain && !secondary_domains.contains(&domain) {
                secondary_domains.push(domain);
            }
        }
    }
    if secondary_domains.is_empty() {
        secondary_domains = rank_secondary(&domain_scores, primary_domain);
    }

    let worker_count = complexity.worker_count();
    Ok(ClassificationResult {
        query: query.to_string(),
        allocation: allocate_workers(primary_domain, &secondary_domains, worker_count),
        pivot_scenarios: predict_pivot_scenarios(primary_domain, &secondary_domains, complexity),
        domain_scores,
        primary_domain,
        secondary_domains,
        complexity,
        worker_count,
        confidence,
        provenance: Provenance::Semantic,
        source: source.to_string(),
    })
}

/// Validate a perspective-generation response.
///
/// The batch must hold 4-8 perspectives, each with text and at least one
/// platform. Unknown domain and specialist values fall back to safe defaults:
/// the specialist's domain (or technical) and the domain's specialist (or
/// web-researcher). Extra platforms beyond three are dropped.
pub fn parse_perspective_batch(text: &str, fallback_complexity: Complexity) -> Result<PerspectiveBatch> {
    let value = extract_json_object(text)?;
    let raw: RawBatch = serde_json::from_value(value)
        .map_err(|e| AppError::Schema(format!("perspective batch shape: {}", e)))?;

    let count = raw.perspectives.len();
    if !(PerspectiveBatch::MIN_PERSPECTIVES..=PerspectiveBatch::MAX_PERSPECTIVES).contains(&count) {
        return Err(AppError::Schema(format!(
            "expected {}-{} perspectives, got {}",
            PerspectiveBatch::MIN_PERSPECTIVES,
            PerspectiveBatch::MAX_PERSPECTIVES,
            count
        )));
    }

    let perspectives = raw
        .perspectives
        .into_iter()
        .enumerate()
        .map(|(index, p)| validate_perspective(index, p))
        .collect::<Result<Vec<_>>>()?;

    let complexity = raw
        .complexity
        .as_deref()
        .and_then(Complexity::parse_lenient)
        .unwrap_or(fallback_complexity);

    Ok(PerspectiveBatch {
        perspectives,
        complexity,
        time_sensitive: raw.time_sensitive,
        reasoning: raw.reasoning,
    })
}

fn validate_perspective(index: usize, raw: RawPerspective) -> Result<ResearchPerspective> {
    if raw.text.trim().is_empty() {
        return Err(AppError::Schema(format!("perspective {} has no text", index)));
    }

    let mut platforms: Vec<PlatformSuggestion> = raw
        .suggested_platforms
        .into_iter()
        .map(|p| match p {
            RawPlatform::Named { name, reason } => PlatformSuggestion { name, reason },
            RawPlatform::Bare(name) => PlatformSuggestion {
                name,
                reason: String::new(),
            },
        })
        .filter(|p| !p.name.trim().is_empty())
        .collect();
    if platforms.is_empty() {
        return Err(AppError::Schema(format!(
            "perspective {} suggests no platforms",
            index
        )));
    }
    platforms.truncate(PerspectiveBatch::MAX_PLATFORMS);

    let parsed_domain = raw.domain.as_deref().and_then(Domain::parse_lenient);
    let parsed_agent = raw.recommended_agent.as_deref().and_then(WorkerType::parse_lenient);

    let domain = parsed_domain
        .or_else(|| parsed_agent.and_then(|a| a.domain()))
        .unwrap_or(Domain::FALLBACK);
    let recommended_agent = parsed_agent.unwrap_or_else(|| {
        if parsed_domain.is_some() {
            domain.specialist()
        } else {
            WorkerType::WebResearcher
        }
    });

    if parsed_domain.is_none() || parsed_agent.is_none() {
        tracing::debug!(
            index,
            domain = ?raw.domain,
            agent = ?raw.recommended_agent,
            "Coerced perspective enum fields to defaults"
        );
    }

    let confidence = raw
        .confidence
        .map(|c| if c > 0.0 && c <= 1.0 { c * 100.0 } else { c })
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 100.0).round() as u8)
        .unwrap_or(50);

    Ok(ResearchPerspective {
        text: raw.text.trim().to_string(),
        domain,
        confidence,
        recommended_agent,
        rationale: raw.rationale,
        platforms,
    })
}
