use crate::types::{
    Allocation, AppError, ClassificationResult, Complexity, Domain, Provenance, Result, WorkerType,
};
use std::collections::BTreeMap;

/// Points awarded per keyword occurrence
pub const POINTS_PER_MATCH: u32 = 10;

/// Share of the workers given to the primary domain's specialist
const PRIMARY_SHARE: f64 = 0.35;

/// Maximum number of secondary domains that receive a dedicated slot
const MAX_SECONDARY_SLOTS: usize = 2;

const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "cyber",
    "threat",
    "osint",
    "intelligence",
    "threat intel",
    "vulnerab",
    "exploit",
    "malware",
    "ransomware",
    "phishing",
    "breach",
    "pentest",
    "penetration test",
    "forensic",
    "incident response",
    "zero-day",
    "attack surface",
    "red team",
    "threat actor",
    "dark web",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "software",
    "architecture",
    "framework",
    "library",
    "programming",
    "code",
    "database",
    "infrastructure",
    "cloud",
    "kubernetes",
    "deploy",
    "algorithm",
    "performance",
    "benchmark",
    "open source",
    "tool",
    "integration",
    "protocol",
    "python",
    "implementation",
];

const ACADEMIC_KEYWORDS: &[&str] = &[
    "research",
    "study",
    "studies",
    "paper",
    "journal",
    "peer-review",
    "peer review",
    "academic",
    "university",
    "scholar",
    "literature review",
    "meta-analysis",
    "citation",
    "theory",
    "experiment",
    "dataset",
    "arxiv",
    "thesis",
];

const BUSINESS_KEYWORDS: &[&str] = &[
    "market",
    "business",
    "revenue",
    "pricing",
    "competitor",
    "competitive",
    "startup",
    "funding",
    "investment",
    "investor",
    "acquisition",
    "industry",
    "customer",
    "strategy",
    "valuation",
    "enterprise",
    "vendor",
    "profit",
];

const SOCIAL_MEDIA_KEYWORDS: &[&str] = &[
    "social media",
    "twitter",
    "reddit",
    "tiktok",
    "instagram",
    "facebook",
    "linkedin",
    "youtube",
    "influencer",
    "viral",
    "sentiment",
    "community",
    "hashtag",
    "discord",
    "mastodon",
    "forum",
    "public opinion",
    "trend",
];

const INVESTIGATIVE_KEYWORDS: &[&str] = &[
    "investigat",
    "journalis",
    "leak",
    "whistleblow",
    "corruption",
    "fraud",
    "scandal",
    "public record",
    "court record",
    "lawsuit",
    "due diligence",
    "background check",
    "money laundering",
    "disinformation",
    "propaganda",
    "fact-check",
];

/// Dictionary-driven domain/complexity scorer.
///
/// Pure and deterministic: the same query always yields the same result.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    dictionaries: Vec<(Domain, Vec<String>)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    /// Create a classifier with the built-in dictionaries
    pub fn new() -> Self {
        let builtin = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        Self {
            dictionaries: vec![
                (Domain::Security, builtin(SECURITY_KEYWORDS)),
                (Domain::Technical, builtin(TECHNICAL_KEYWORDS)),
                (Domain::Academic, builtin(ACADEMIC_KEYWORDS)),
                (Domain::Business, builtin(BUSINESS_KEYWORDS)),
                (Domain::SocialMedia, builtin(SOCIAL_MEDIA_KEYWORDS)),
                (Domain::Investigative, builtin(INVESTIGATIVE_KEYWORDS)),
            ],
        }
    }

    /// Extend a domain's dictionary (e.g. from configuration)
    pub fn with_extra_keywords<I, S>(mut self, domain: Domain, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some((_, words)) = self.dictionaries.iter_mut().find(|(d, _)| *d == domain) {
            for keyword in keywords {
                let keyword = keyword.into().trim().to_lowercase();
                if !keyword.is_empty() && !words.contains(&keyword) {
                    words.push(keyword);
                }
            }
        }
        self
    }

    /// Number of keyword occurrences per domain (non-zero domains only)
    pub fn match_counts(&self, query: &str) -> BTreeMap<Domain, u32> {
        let lowered = query.to_lowercase();
        self.dictionaries
            .iter()
            .filter_map(|(domain, words)| {
                let count: usize = words.iter().map(|w| lowered.matches(w.as_str()).count()).sum();
                (count > 0).then_some((*domain, count as u32))
            })
            .collect()
    }

    /// Raw per-domain scores: 10 points per match, unbounded
    pub fn raw_scores(&self, query: &str) -> BTreeMap<Domain, u32> {
        self.match_counts(query)
            .into_iter()
            .map(|(domain, count)| (domain, count * POINTS_PER_MATCH))
            .collect()
    }

    /// Primary domain only (fallback when nothing matches)
    pub fn primary_domain(&self, query: &str) -> Domain {
        rank_primary(&self.raw_scores(query)).unwrap_or(Domain::FALLBACK)
    }

    /// Classify a query.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidInput`] for empty or whitespace-only input.
    pub fn classify(&self, query: &str) -> Result<ClassificationResult> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("query is empty".to_string()));
        }

        let domain_scores = self.raw_scores(query);
        let total_matches: u32 = domain_scores.values().sum::<u32>() / POINTS_PER_MATCH;

        let (primary_domain, secondary_domains) = match rank_primary(&domain_scores) {
            Some(primary) => (primary, rank_secondary(&domain_scores, primary)),
            None => (Domain::FALLBACK, Vec::new()),
        };

        let complexity = Complexity::from_matches(total_matches);
        let worker_count = complexity.worker_count();
        let allocation = allocate_workers(primary_domain, &secondary_domains, worker_count);
        let pivot_scenarios = predict_pivot_scenarios(primary_domain, &secondary_domains, complexity);

        tracing::debug!(
            primary = %primary_domain,
            complexity = %complexity,
            total_matches,
            "Keyword classification"
        );

        Ok(ClassificationResult {
            query: query.to_string(),
            domain_scores,
            primary_domain,
            secondary_domains,
            complexity,
            worker_count,
            allocation,
            pivot_scenarios,
            confidence: None,
            provenance: Provenance::Keyword,
            source: "keyword".to_string(),
        })
    }
}

/// Highest-scoring domain; ties go to the first-declared domain.
/// Zero scores are excluded from ranking.
fn rank_primary(scores: &BTreeMap<Domain, u32>) -> Option<Domain> {
    Domain::ALL
        .into_iter()
        .filter_map(|d| scores.get(&d).copied().filter(|s| *s > 0).map(|s| (d, s)))
        .fold(None, |best: Option<(Domain, u32)>, (domain, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((domain, score)),
        })
        .map(|(domain, _)| domain)
}

/// Domains scoring above the secondary threshold, best first, primary excluded.
pub fn rank_secondary(scores: &BTreeMap<Domain, u32>, primary: Domain) -> Vec<Domain> {
    let mut secondary: Vec<(Domain, u32)> = scores
        .iter()
        .filter(|(d, s)| **d != primary && **s > ClassificationResult::SECONDARY_THRESHOLD)
        .map(|(d, s)| (*d, *s))
        .collect();
    // BTreeMap iteration is already in declaration order, so a stable sort
    // keeps the tie-break.
    secondary.sort_by(|a, b| b.1.cmp(&a.1));
    secondary.into_iter().map(|(d, _)| d).collect()
}

/// Distribute `worker_count` slots across worker types.
///
/// 1. The primary specialist gets `round(worker_count × 0.35)` (at least 1).
/// 2. Up to two secondary specialists get one slot each if not already allocated.
/// 3. Generalists get one slot each in priority order.
/// 4. Remaining slots go round-robin over every worker type.
///
/// The returned counts always sum to exactly `worker_count`.
pub fn allocate_workers(primary: Domain, secondary: &[Domain], worker_count: usize) -> Allocation {
    let mut allocation = Allocation::new();
    if worker_count == 0 {
        return allocation;
    }

    let primary_slots = ((worker_count as f64 * PRIMARY_SHARE).round() as usize)
        .max(1)
        .min(worker_count);
    allocation.insert(primary.specialist(), primary_slots);
    let mut remaining = worker_count - primary_slots;

    for domain in secondary.iter().take(MAX_SECONDARY_SLOTS) {
        if remaining == 0 {
            break;
        }
        let specialist = domain.specialist();
        if allocation.contains_key(&specialist) {
            continue;
        }
        allocation.insert(specialist, 1);
        remaining -= 1;
    }

    for generalist in WorkerType::GENERALISTS {
        if remaining == 0 {
            break;
        }
        *allocation.entry(generalist).or_insert(0) += 1;
        remaining -= 1;
    }

    let mut cursor = WorkerType::ALL.iter().cycle();
    while remaining > 0 {
        if let Some(worker) = cursor.next() {
            *allocation.entry(*worker).or_insert(0) += 1;
            remaining -= 1;
        }
    }

    allocation
}

/// Scenarios in which a second wave would likely be needed
pub fn predict_pivot_scenarios(
    primary: Domain,
    secondary: &[Domain],
    complexity: Complexity,
) -> Vec<String> {
    let mut scenarios: Vec<String> = secondary
        .iter()
        .map(|d| {
            format!(
                "{} signals may warrant a {} in wave 2",
                d,
                d.specialist()
            )
        })
        .collect();

    if complexity == Complexity::Complex {
        scenarios.push(format!(
            "Complex {} query: coverage gaps likely, consider a deep-researcher follow-up",
            primary
        ));
    }

    scenarios
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_query_is_rejected() {
        let classifier = KeywordClassifier::new();
        assert!(matches!(
            classifier.classify(""),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            classifier.classify("   \n\t"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_osint_query_is_complex_security() {
        let classifier = KeywordClassifier::new();
        let result = classifier
            .classify("Research OSINT tools for threat intelligence")
            .unwrap();

        // osint, threat, intelligence, "threat intel"
        assert_eq!(result.score(Domain::Security), 40);
        assert_eq!(result.score(Domain::Technical), 10);
        assert_eq!(result.score(Domain::Academic), 10);
        assert_eq!(result.primary_domain, Domain::Security);
        assert_eq!(result.complexity, Complexity::Complex);
        assert_eq!(result.worker_count, 6);
        assert_eq!(result.provenance, Provenance::Keyword);
    }

    #[test]
    fn test_no_matches_falls_back_to_technical() {
        let classifier = KeywordClassifier::new();
        let result = classifier.classify("hello there").unwrap();

        assert_eq!(result.primary_domain, Domain::Technical);
        assert!(result.secondary_domains.is_empty());
        assert!(result.domain_scores.is_empty());
        assert_eq!(result.complexity, Complexity::Simple);
        assert_eq!(result.worker_count, 4);
    }

    #[test]
    fn test_raw_scores_are_not_capped() {
        let classifier = KeywordClassifier::new();
        let query = "malware malware malware malware malware malware malware malware malware malware malware malware";
        let result = classifier.classify(query).unwrap();

        assert_eq!(result.score(Domain::Security), 120);
        assert!(!result.scores_in_range());
    }

    #[test]
    fn test_repeated_substrings_count_each_occurrence() {
        let classifier = KeywordClassifier::new();
        let counts = classifier.match_counts("Reddit and reddit threads on Reddit");
        assert_eq!(counts.get(&Domain::SocialMedia), Some(&3));
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let classifier = KeywordClassifier::new();
        // one academic match, one business match
        let result = classifier.classify("journal pricing").unwrap();
        assert_eq!(result.primary_domain, Domain::Academic);
    }

    #[test]
    fn test_secondary_domains_need_more_than_forty() {
        let classifier = KeywordClassifier::new();
        let query = "malware exploit breach phishing ransomware cyber \
                     market revenue pricing funding startup \
                     reddit";
        let result = classifier.classify(query).unwrap();

        assert_eq!(result.primary_domain, Domain::Security);
        assert_eq!(result.secondary_domains, vec![Domain::Business]);
        assert!(!result.secondary_domains.contains(&Domain::SocialMedia));
    }

    #[test]
    fn test_extra_keywords_extend_dictionary() {
        let classifier =
            KeywordClassifier::new().with_extra_keywords(Domain::Business, ["tariff", "Tariff"]);
        let counts = classifier.match_counts("new tariff schedule");
        assert_eq!(counts.get(&Domain::Business), Some(&1));
    }

    #[rstest]
    #[case(Domain::Security, &[], 4)]
    #[case(Domain::Security, &[Domain::Business], 5)]
    #[case(Domain::Academic, &[Domain::Technical, Domain::Business, Domain::SocialMedia], 6)]
    #[case(Domain::Technical, &[], 6)]
    #[case(Domain::Investigative, &[Domain::Investigative], 5)]
    #[case(Domain::Business, &[Domain::Academic], 1)]
    fn test_allocation_sums_to_worker_count(
        #[case] primary: Domain,
        #[case] secondary: &[Domain],
        #[case] workers: usize,
    ) {
        let allocation = allocate_workers(primary, secondary, workers);
        assert_eq!(allocation.values().sum::<usize>(), workers);
        assert!(allocation.get(&primary.specialist()).copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_allocation_shape_for_complex_query() {
        let allocation = allocate_workers(Domain::Security, &[Domain::Business], 6);

        assert_eq!(allocation.get(&WorkerType::SecurityAnalyst), Some(&2));
        assert_eq!(allocation.get(&WorkerType::MarketAnalyst), Some(&1));
        assert_eq!(allocation.get(&WorkerType::WebResearcher), Some(&1));
        assert_eq!(allocation.get(&WorkerType::DeepResearcher), Some(&1));
        // last slot goes round-robin, starting with the first worker type
        assert_eq!(allocation.values().sum::<usize>(), 6);
    }

    #[test]
    fn test_allocation_skips_duplicate_secondary_specialist() {
        let allocation = allocate_workers(Domain::Security, &[Domain::Security], 5);
        assert_eq!(allocation.get(&WorkerType::SecurityAnalyst), Some(&2));
        assert_eq!(allocation.get(&WorkerType::WebResearcher), Some(&1));
        assert_eq!(allocation.get(&WorkerType::DeepResearcher), Some(&1));
        assert_eq!(allocation.values().sum::<usize>(), 5);
    }

    #[test]
    fn test_allocation_sums_for_many_queries() {
        let classifier = KeywordClassifier::new();
        let queries = [
            "x",
            "Compare cloud database pricing for startups",
            "Investigate money laundering leak in public records and court records",
            "Sentiment on reddit and twitter about the new python framework",
            "peer review of arxiv papers on malware detection datasets",
            "research study journal paper thesis academic university scholar",
        ];
        for query in queries {
            let result = classifier.classify(query).unwrap();
            assert_eq!(result.allocation_total(), result.worker_count, "query: {}", query);
        }
    }

    #[test]
    fn test_pivot_scenarios_follow_secondary_domains() {
        let scenarios =
            predict_pivot_scenarios(Domain::Security, &[Domain::Business], Complexity::Complex);
        assert_eq!(scenarios.len(), 2);
        assert!(scenarios[0].contains("market-analyst"));
    }
}
