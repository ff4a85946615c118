use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============= Domain Types =============

/// Subject-matter category used to classify queries, perspectives and sources.
///
/// Declaration order is significant: it is the tie-break order whenever two
/// domains score equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Security,
    Technical,
    Academic,
    Business,
    SocialMedia,
    Investigative,
}

impl Domain {
    /// All domains in tie-break order
    pub const ALL: [Domain; 6] = [
        Domain::Security,
        Domain::Technical,
        Domain::Academic,
        Domain::Business,
        Domain::SocialMedia,
        Domain::Investigative,
    ];

    /// Primary domain used when nothing else matches
    pub const FALLBACK: Domain = Domain::Technical;

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Security => "security",
            Domain::Technical => "technical",
            Domain::Academic => "academic",
            Domain::Business => "business",
            Domain::SocialMedia => "social_media",
            Domain::Investigative => "investigative",
        }
    }

    /// The specialist worker mapped to this domain
    pub fn specialist(&self) -> WorkerType {
        match self {
            Domain::Security => WorkerType::SecurityAnalyst,
            Domain::Technical => WorkerType::TechnicalResearcher,
            Domain::Academic => WorkerType::AcademicResearcher,
            Domain::Business => WorkerType::MarketAnalyst,
            Domain::SocialMedia => WorkerType::SocialMediaAnalyst,
            Domain::Investigative => WorkerType::InvestigativeJournalist,
        }
    }

    /// Parse a domain name as produced by a model, accepting common spellings.
    pub fn parse_lenient(value: &str) -> Option<Domain> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "security" | "cybersecurity" | "infosec" => Some(Domain::Security),
            "technical" | "technology" | "tech" | "engineering" => Some(Domain::Technical),
            "academic" | "research" | "science" | "scientific" => Some(Domain::Academic),
            "business" | "market" | "finance" | "financial" | "commercial" => {
                Some(Domain::Business)
            }
            "social_media" | "social" | "socialmedia" | "community" => Some(Domain::SocialMedia),
            "investigative" | "investigation" | "journalism" | "osint_investigation" => {
                Some(Domain::Investigative)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::parse_lenient(s)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown domain '{}'", s)))
    }
}

/// Query complexity tier; determines how many workers are commissioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// All tiers in ascending order
    pub const ALL: [Complexity; 3] = [Complexity::Simple, Complexity::Moderate, Complexity::Complex];

    /// Highest total match count still considered SIMPLE
    pub const SIMPLE_MAX_MATCHES: u32 = 2;
    /// Highest total match count still considered MODERATE
    pub const MODERATE_MAX_MATCHES: u32 = 5;

    /// Worker count, one-to-one with the tier
    pub fn worker_count(&self) -> usize {
        match self {
            Complexity::Simple => 4,
            Complexity::Moderate => 5,
            Complexity::Complex => 6,
        }
    }

    /// Tier for a total keyword match count
    pub fn from_matches(total_matches: u32) -> Complexity {
        if total_matches <= Self::SIMPLE_MAX_MATCHES {
            Complexity::Simple
        } else if total_matches <= Self::MODERATE_MAX_MATCHES {
            Complexity::Moderate
        } else {
            Complexity::Complex
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "SIMPLE",
            Complexity::Moderate => "MODERATE",
            Complexity::Complex => "COMPLEX",
        }
    }

    /// Lenient parse for model output ("complex", "High", ...)
    pub fn parse_lenient(value: &str) -> Option<Complexity> {
        match value.trim().to_lowercase().as_str() {
            "simple" | "low" | "basic" => Some(Complexity::Simple),
            "moderate" | "medium" | "intermediate" => Some(Complexity::Moderate),
            "complex" | "high" | "advanced" => Some(Complexity::Complex),
            _ => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of research worker that can be commissioned.
///
/// The first six are domain specialists, the last two are generalists.
/// Declaration order is the round-robin order used when filling slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    SecurityAnalyst,
    TechnicalResearcher,
    AcademicResearcher,
    MarketAnalyst,
    SocialMediaAnalyst,
    InvestigativeJournalist,
    WebResearcher,
    DeepResearcher,
}

impl WorkerType {
    pub const ALL: [WorkerType; 8] = [
        WorkerType::SecurityAnalyst,
        WorkerType::TechnicalResearcher,
        WorkerType::AcademicResearcher,
        WorkerType::MarketAnalyst,
        WorkerType::SocialMediaAnalyst,
        WorkerType::InvestigativeJournalist,
        WorkerType::WebResearcher,
        WorkerType::DeepResearcher,
    ];

    /// Generalists in fill-priority order
    pub const GENERALISTS: [WorkerType; 2] = [WorkerType::WebResearcher, WorkerType::DeepResearcher];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::SecurityAnalyst => "security-analyst",
            WorkerType::TechnicalResearcher => "technical-researcher",
            WorkerType::AcademicResearcher => "academic-researcher",
            WorkerType::MarketAnalyst => "market-analyst",
            WorkerType::SocialMediaAnalyst => "social-media-analyst",
            WorkerType::InvestigativeJournalist => "investigative-journalist",
            WorkerType::WebResearcher => "web-researcher",
            WorkerType::DeepResearcher => "deep-researcher",
        }
    }

    pub fn is_generalist(&self) -> bool {
        Self::GENERALISTS.contains(self)
    }

    /// Domain this worker specialises in, if any
    pub fn domain(&self) -> Option<Domain> {
        Domain::ALL.into_iter().find(|d| d.specialist() == *self)
    }

    pub fn parse_lenient(value: &str) -> Option<WorkerType> {
        let normalized = value.trim().to_lowercase().replace(['_', ' '], "-");
        WorkerType::ALL
            .into_iter()
            .find(|w| w.as_str() == normalized)
            .or_else(|| Domain::parse_lenient(&normalized).map(|d| d.specialist()))
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which engine produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Keyword,
    Semantic,
    Consensus,
    KeywordFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Keyword => "keyword",
            Provenance::Semantic => "semantic",
            Provenance::Consensus => "consensus",
            Provenance::KeywordFallback => "keyword_fallback",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker allocation: worker type → number of slots
pub type Allocation = BTreeMap<WorkerType, usize>;

// ============= Classification =============

/// Result of classifying one query (or one perspective text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub query: String,
    /// Per-domain score. Semantic results are within [0, 100]; raw keyword
    /// scores are 10 points per match and unbounded.
    pub domain_scores: BTreeMap<Domain, u32>,
    pub primary_domain: Domain,
    pub secondary_domains: Vec<Domain>,
    pub complexity: Complexity,
    pub worker_count: usize,
    pub allocation: Allocation,
    #[serde(default)]
    pub pivot_scenarios: Vec<String>,
    /// Self-reported confidence (0-100), semantic sources only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    pub provenance: Provenance,
    /// Name of the concrete source ("keyword", analyzer name, ...)
    pub source: String,
}

impl ClassificationResult {
    /// Score above which a non-primary domain counts as secondary
    pub const SECONDARY_THRESHOLD: u32 = 40;

    /// Sum of all allocated slots
    pub fn allocation_total(&self) -> usize {
        self.allocation.values().sum()
    }

    /// Whether every domain score lies in [0, 100]
    pub fn scores_in_range(&self) -> bool {
        self.domain_scores.values().all(|s| *s <= 100)
    }

    /// Clamp every domain score into [0, 100]
    pub fn clamp_scores(&mut self) {
        for score in self.domain_scores.values_mut() {
            *score = (*score).min(100);
        }
    }

    pub fn score(&self, domain: Domain) -> u32 {
        self.domain_scores.get(&domain).copied().unwrap_or(0)
    }
}

// ============= Perspectives =============

/// An information source a worker should consult for one perspective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSuggestion {
    pub name: String,
    #[serde(default)]
    pub reason: String,
}

/// One research angle derived from the original query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPerspective {
    /// Free-text angle description
    pub text: String,
    pub domain: Domain,
    /// 0-100
    pub confidence: u8,
    pub recommended_agent: WorkerType,
    #[serde(default)]
    pub rationale: String,
    /// 1-3 suggested information sources
    pub platforms: Vec<PlatformSuggestion>,
}

/// Output of one perspective-generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveBatch {
    pub perspectives: Vec<ResearchPerspective>,
    pub complexity: Complexity,
    #[serde(default)]
    pub time_sensitive: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl PerspectiveBatch {
    pub const MIN_PERSPECTIVES: usize = 4;
    pub const MAX_PERSPECTIVES: usize = 8;
    pub const MAX_PLATFORMS: usize = 3;
}

// ============= Error Types =============

/// Transient provider failure classes (retried with backoff)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Timeout,
    RateLimit,
    Quota,
    Server,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransientKind::Timeout => "timeout",
            TransientKind::RateLimit => "rate limit",
            TransientKind::Quota => "quota",
            TransientKind::Server => "server",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transient provider error ({kind}): {message}")]
    Transient {
        kind: TransientKind,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("All consensus sources failed: {0}")]
    AllSourcesFailed(String),

    #[error("Gate blocked for '{stage}': missing {}", .missing.join(" or "))]
    GateBlocked { stage: String, missing: Vec<String> },

    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Transient error without a retry-after hint
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        AppError::Transient {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_tie_break_order() {
        let mut domains = vec![Domain::Investigative, Domain::Academic, Domain::Security];
        domains.sort();
        assert_eq!(
            domains,
            vec![Domain::Security, Domain::Academic, Domain::Investigative]
        );
    }

    #[test]
    fn test_domain_parse_lenient() {
        assert_eq!(Domain::parse_lenient("Security"), Some(Domain::Security));
        assert_eq!(Domain::parse_lenient("social media"), Some(Domain::SocialMedia));
        assert_eq!(Domain::parse_lenient("social-media"), Some(Domain::SocialMedia));
        assert_eq!(Domain::parse_lenient("astrology"), None);
        assert!("astrology".parse::<Domain>().is_err());
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(Complexity::from_matches(0), Complexity::Simple);
        assert_eq!(Complexity::from_matches(2), Complexity::Simple);
        assert_eq!(Complexity::from_matches(3), Complexity::Moderate);
        assert_eq!(Complexity::from_matches(5), Complexity::Moderate);
        assert_eq!(Complexity::from_matches(6), Complexity::Complex);
        assert_eq!(Complexity::Complex.worker_count(), 6);
    }

    #[test]
    fn test_worker_type_domain_mapping() {
        for domain in Domain::ALL {
            assert_eq!(domain.specialist().domain(), Some(domain));
            assert!(!domain.specialist().is_generalist());
        }
        assert_eq!(WorkerType::WebResearcher.domain(), None);
        assert_eq!(
            WorkerType::parse_lenient("academic_researcher"),
            Some(WorkerType::AcademicResearcher)
        );
        assert_eq!(
            WorkerType::parse_lenient("security"),
            Some(WorkerType::SecurityAnalyst)
        );
    }

    #[test]
    fn test_classification_serialization_uses_domain_keys() {
        let mut scores = BTreeMap::new();
        scores.insert(Domain::Security, 120);
        let mut result = ClassificationResult {
            query: "q".to_string(),
            domain_scores: scores,
            primary_domain: Domain::Security,
            secondary_domains: vec![],
            complexity: Complexity::Simple,
            worker_count: 4,
            allocation: Allocation::new(),
            pivot_scenarios: vec![],
            confidence: None,
            provenance: Provenance::Keyword,
            source: "keyword".to_string(),
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"security\":120"));
        assert!(json.contains("\"SIMPLE\""));

        assert!(!result.scores_in_range());
        result.clamp_scores();
        assert_eq!(result.score(Domain::Security), 100);
    }

    #[test]
    fn test_gate_blocked_message_names_missing_markers() {
        let err = AppError::GateBlocked {
            stage: "citations".to_string(),
            missing: vec![
                "wave-2-complete.json".to_string(),
                "wave-2-skipped.json".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Gate blocked for 'citations': missing wave-2-complete.json or wave-2-skipped.json"
        );
    }
}
