use crate::classify::KeywordClassifier;
use crate::pivot::quality::WaveQuality;
use crate::pivot::worker_output::{GapKind, WorkerOutput};
use crate::types::{Domain, WorkerType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of distinct workers naming a gap for it to be promoted
pub const PROMOTION_MIN_WORKERS: usize = 2;

/// A gap statement aggregated across a wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedGap {
    pub kind: GapKind,
    /// Text as first written by a worker
    pub text: String,
    /// Distinct workers naming the gap
    pub workers: Vec<String>,
    pub mentions: usize,
    pub promoted: bool,
    pub fill_domain: Domain,
    pub fill_specialist: WorkerType,
}

/// Aggregates self-reported gaps and picks a specialist to fill each
#[derive(Debug, Clone, Default)]
pub struct GapAnalyzer {
    keyword: KeywordClassifier,
}

impl GapAnalyzer {
    pub fn new(keyword: KeywordClassifier) -> Self {
        Self { keyword }
    }

    /// Domain best placed to fill a gap
    pub fn fill_domain(&self, kind: GapKind, text: &str) -> Domain {
        if kind == GapKind::AlternativeDomain {
            if let Some(domain) = Domain::parse_lenient(text) {
                return domain;
            }
        }
        self.keyword.primary_domain(text)
    }

    /// Group gaps by kind and normalized text.
    ///
    /// A gap is promoted when at least two workers name it, or when any
    /// worker naming it scored good or excellent. Promoted gaps sort first,
    /// then by mentions.
    pub fn analyze(&self, outputs: &[WorkerOutput], quality: &WaveQuality) -> Vec<AggregatedGap> {
        let mut groups: BTreeMap<(GapKind, String), AggregatedGap> = BTreeMap::new();
        let mut order: Vec<(GapKind, String)> = Vec::new();

        for output in outputs {
            for gap in &output.gaps {
                let key = (gap.kind, normalize(&gap.text));
                if key.1.is_empty() {
                    continue;
                }
                let entry = groups.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    let fill_domain = self.fill_domain(gap.kind, &gap.text);
                    AggregatedGap {
                        kind: gap.kind,
                        text: gap.text.trim().to_string(),
                        workers: Vec::new(),
                        mentions: 0,
                        promoted: false,
                        fill_domain,
                        fill_specialist: fill_domain.specialist(),
                    }
                });
                entry.mentions += 1;
                if !entry.workers.contains(&output.agent) {
                    entry.workers.push(output.agent.clone());
                }
            }
        }

        let mut gaps: Vec<AggregatedGap> = order
            .into_iter()
            .filter_map(|key| groups.remove(&key))
            .map(|mut gap| {
                let high_quality = gap.workers.iter().any(|agent| {
                    quality
                        .score_for(agent)
                        .is_some_and(|score| score.band.is_high())
                });
                gap.promoted = gap.workers.len() >= PROMOTION_MIN_WORKERS || high_quality;
                gap
            })
            .collect();

        gaps.sort_by(|a, b| b.promoted.cmp(&a.promoted).then(b.mentions.cmp(&a.mentions)));
        tracing::debug!(
            total = gaps.len(),
            promoted = gaps.iter().filter(|g| g.promoted).count(),
            "Gaps aggregated"
        );
        gaps
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::quality::{QualityBand, QualityScorer};

    fn with_gaps(agent: &str, gaps: &str) -> WorkerOutput {
        WorkerOutput::parse(agent, 1, &format!("Body.\n## Metadata\n{}", gaps))
    }

    fn poor_quality(outputs: &[WorkerOutput]) -> WaveQuality {
        QualityScorer.score_wave(outputs)
    }

    #[test]
    fn test_gap_named_by_two_workers_is_promoted() {
        let outputs = vec![
            with_gaps("a", "### Limited coverage\n- Peer-reviewed studies on detection accuracy\n"),
            with_gaps("b", "### Limited coverage\n- peer-reviewed studies on detection accuracy.\n"),
            with_gaps("c", "### Tool gaps\n- Reddit and Discord communities\n"),
        ];
        let quality = poor_quality(&outputs);
        assert!(quality.scores.iter().all(|s| s.band == QualityBand::Poor));

        let gaps = GapAnalyzer::default().analyze(&outputs, &quality);
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0].promoted);
        assert_eq!(gaps[0].mentions, 2);
        assert_eq!(gaps[0].workers, vec!["a", "b"]);
        assert_eq!(gaps[0].fill_domain, Domain::Academic);
        assert_eq!(gaps[0].fill_specialist, WorkerType::AcademicResearcher);

        assert!(!gaps[1].promoted);
        assert_eq!(gaps[1].fill_domain, Domain::SocialMedia);
    }

    #[test]
    fn test_high_quality_worker_promotes_alone() {
        let outputs = vec![with_gaps("a", "### Tool gaps\n- Reddit and Discord communities\n")];
        let mut quality = poor_quality(&outputs);
        quality.scores[0].band = QualityBand::Good;

        let gaps = GapAnalyzer::default().analyze(&outputs, &quality);
        assert!(gaps[0].promoted);
    }

    #[test]
    fn test_alternative_domain_names_a_domain() {
        let outputs = vec![with_gaps("a", "### Alternative domains\n- Business\n")];
        let gaps = GapAnalyzer::default().analyze(&outputs, &poor_quality(&outputs));
        assert_eq!(gaps[0].kind, GapKind::AlternativeDomain);
        assert_eq!(gaps[0].fill_domain, Domain::Business);
        assert_eq!(gaps[0].fill_specialist, WorkerType::MarketAnalyst);
    }

    #[test]
    fn test_same_worker_repeating_is_one_worker() {
        let outputs = vec![with_gaps(
            "a",
            "### Limited coverage\n- Court records\n- Court records\n",
        )];
        let gaps = GapAnalyzer::default().analyze(&outputs, &poor_quality(&outputs));
        assert_eq!(gaps[0].mentions, 2);
        assert_eq!(gaps[0].workers.len(), 1);
        assert!(!gaps[0].promoted);
        assert_eq!(gaps[0].fill_domain, Domain::Investigative);
    }
}
