use crate::pivot::quality::WaveQuality;
use crate::pivot::worker_output::WorkerOutput;
use crate::types::Domain;
use serde::{Deserialize, Serialize};

/// Minimum weighted strength for a theme to count as a signal
pub const SIGNAL_THRESHOLD: f64 = 3.0;
/// Strength at which a signal triggers a specialist on its own
pub const STRONG_SIGNAL: f64 = 6.0;

/// A cross-domain theme: keyword dictionary plus the domain it points to
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub domain: Domain,
    pub keywords: Vec<String>,
}

impl Theme {
    pub fn new(name: &str, domain: Domain, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            domain,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn hits(&self, lowered: &str) -> usize {
        self.keywords
            .iter()
            .map(|k| lowered.matches(k.as_str()).count())
            .sum()
    }
}

fn builtin_themes() -> Vec<Theme> {
    vec![
        Theme::new(
            "regulatory",
            Domain::Business,
            &["regulation", "regulatory", "compliance", "gdpr", "legislation", "lawsuit", "fine", "sanction"],
        ),
        Theme::new(
            "financial",
            Domain::Business,
            &["revenue", "funding", "valuation", "investment", "acquisition", "market share", "ipo", "earnings"],
        ),
        Theme::new(
            "academic",
            Domain::Academic,
            &["peer-reviewed", "peer reviewed", "study", "paper", "journal", "arxiv", "researchers", "dataset"],
        ),
        Theme::new(
            "security",
            Domain::Security,
            &["vulnerability", "exploit", "breach", "malware", "cve", "attack", "ransomware", "threat actor"],
        ),
        Theme::new(
            "social",
            Domain::SocialMedia,
            &["twitter", "reddit", "tiktok", "viral", "influencer", "hashtag", "community", "sentiment"],
        ),
        Theme::new(
            "technical",
            Domain::Technical,
            &["architecture", "benchmark", "api", "implementation", "framework", "latency", "github", "open source"],
        ),
        Theme::new(
            "investigative",
            Domain::Investigative,
            &["leak", "whistleblower", "investigation", "undisclosed", "allegation", "shell company", "cover-up", "fraud"],
        ),
    ]
}

/// Emergent cross-domain theme found in a wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSignal {
    pub theme: String,
    pub domain: Domain,
    /// Raw keyword hits across the wave
    pub hits: usize,
    /// Hits weighted by each output's quality total / 100
    pub strength: f64,
    pub strong: bool,
    /// Outputs that contributed at least one hit
    pub workers: Vec<String>,
}

/// Quality-weighted theme detector
#[derive(Debug, Clone)]
pub struct SignalDetector {
    themes: Vec<Theme>,
    threshold: f64,
    strong: f64,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalDetector {
    pub fn new() -> Self {
        Self {
            themes: builtin_themes(),
            threshold: SIGNAL_THRESHOLD,
            strong: STRONG_SIGNAL,
        }
    }

    pub fn with_thresholds(mut self, threshold: f64, strong: f64) -> Self {
        self.threshold = threshold;
        self.strong = strong;
        self
    }

    pub fn themes(&self) -> &[Theme] {
        &self.themes
    }

    /// Detect signals, strongest first.
    ///
    /// Themes that map to `primary` are the query's own subject and are
    /// dropped. Outputs without a quality score contribute nothing.
    pub fn detect(
        &self,
        outputs: &[WorkerOutput],
        quality: &WaveQuality,
        primary: Domain,
    ) -> Vec<DomainSignal> {
        let bodies: Vec<(String, String, f64)> = outputs
            .iter()
            .map(|o| {
                let weight = quality
                    .score_for(&o.agent)
                    .map(|s| f64::from(s.total) / 100.0)
                    .unwrap_or(0.0);
                (o.agent.clone(), o.body().to_lowercase(), weight)
            })
            .collect();

        let mut signals: Vec<DomainSignal> = self
            .themes
            .iter()
            .filter(|theme| theme.domain != primary)
            .filter_map(|theme| {
                let mut hits = 0;
                let mut strength = 0.0;
                let mut workers = Vec::new();
                for (agent, body, weight) in &bodies {
                    let count = theme.hits(body);
                    if count > 0 {
                        hits += count;
                        strength += count as f64 * weight;
                        workers.push(agent.clone());
                    }
                }
                (strength >= self.threshold).then(|| DomainSignal {
                    theme: theme.name.clone(),
                    domain: theme.domain,
                    hits,
                    strength,
                    strong: strength >= self.strong,
                    workers,
                })
            })
            .collect();

        signals.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        for signal in &signals {
            tracing::debug!(
                theme = %signal.theme,
                domain = %signal.domain,
                strength = signal.strength,
                strong = signal.strong,
                "Domain signal detected"
            );
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::quality::QualityScorer;

    fn scored(agent: &str, body: &str, total: u8) -> (WorkerOutput, WaveQuality) {
        let output = WorkerOutput::parse(agent, 1, body);
        let mut quality = QualityScorer.score_wave(std::slice::from_ref(&output));
        quality.scores[0].total = total;
        (output, quality)
    }

    #[test]
    fn test_quality_weights_hits() {
        let body = "New regulation and compliance rules. Regulatory fines. GDPR sanction.";
        // 6 regulatory hits: "regulation", "compliance", "regulatory", "fine", "gdpr", "sanction"
        let (output, quality) = scored("w1", body, 100);
        let signals = SignalDetector::new().detect(&[output], &quality, Domain::Security);
        let regulatory = signals.iter().find(|s| s.theme == "regulatory").unwrap();
        assert_eq!(regulatory.hits, 6);
        assert_eq!(regulatory.strength, 6.0);
        assert!(regulatory.strong);
        assert_eq!(regulatory.domain, Domain::Business);

        let (output, quality) = scored("w1", body, 50);
        let signals = SignalDetector::new().detect(&[output], &quality, Domain::Security);
        let regulatory = signals.iter().find(|s| s.theme == "regulatory").unwrap();
        assert_eq!(regulatory.strength, 3.0);
        assert!(!regulatory.strong);
    }

    #[test]
    fn test_below_threshold_is_dropped() {
        let (output, quality) = scored("w1", "One regulation mentioned.", 100);
        let signals = SignalDetector::new().detect(&[output], &quality, Domain::Security);
        assert!(signals.iter().all(|s| s.theme != "regulatory"));
    }

    #[test]
    fn test_primary_domain_is_not_emergent() {
        let body = "ransomware exploit breach malware attack vulnerability cve";
        let (output, quality) = scored("w1", body, 100);
        let signals = SignalDetector::new().detect(&[output.clone()], &quality, Domain::Security);
        assert!(signals.iter().all(|s| s.domain != Domain::Security));

        let signals = SignalDetector::new().detect(&[output], &quality, Domain::Business);
        assert!(signals.iter().any(|s| s.domain == Domain::Security));
    }

    #[test]
    fn test_metadata_section_is_ignored() {
        let body = "Plain text.\n## Metadata\n- Platforms searched: reddit, twitter, tiktok, reddit\n";
        let (output, quality) = scored("w1", body, 100);
        let signals = SignalDetector::new().detect(&[output], &quality, Domain::Security);
        assert!(signals.is_empty());
    }
}
