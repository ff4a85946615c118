use crate::pivot::worker_output::WorkerOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityBand {
    pub fn from_total(total: u8) -> Self {
        match total {
            80.. => QualityBand::Excellent,
            60..=79 => QualityBand::Good,
            40..=59 => QualityBand::Fair,
            _ => QualityBand::Poor,
        }
    }

    /// Good or excellent
    pub fn is_high(&self) -> bool {
        *self >= QualityBand::Good
    }
}

impl fmt::Display for QualityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityBand::Poor => "poor",
            QualityBand::Fair => "fair",
            QualityBand::Good => "good",
            QualityBand::Excellent => "excellent",
        };
        f.write_str(name)
    }
}

/// Per-worker quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentQualityScore {
    pub agent: String,
    /// 0-40
    pub size_score: u8,
    /// 0-30
    pub citation_score: u8,
    /// 0-30
    pub confidence_score: u8,
    pub total: u8,
    pub band: QualityBand,
    pub char_count: usize,
    pub citation_count: usize,
    pub confidence: Option<u8>,
}

/// Aggregate over one wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveQuality {
    pub scores: Vec<AgentQualityScore>,
    pub mean: f64,
    pub band_counts: BTreeMap<QualityBand, usize>,
}

impl WaveQuality {
    pub fn score_for(&self, agent: &str) -> Option<&AgentQualityScore> {
        self.scores.iter().find(|s| s.agent == agent)
    }

    pub fn count(&self, band: QualityBand) -> usize {
        self.band_counts.get(&band).copied().unwrap_or(0)
    }
}

pub fn size_score(chars: usize) -> u8 {
    match chars {
        6000.. => 40,
        3000..=5999 => 30,
        1500..=2999 => 20,
        500..=1499 => 10,
        _ => 0,
    }
}

pub fn citation_score(citations: usize) -> u8 {
    match citations {
        10.. => 30,
        5..=9 => 20,
        2..=4 => 10,
        1 => 5,
        _ => 0,
    }
}

pub fn confidence_score(confidence: Option<u8>) -> u8 {
    confidence
        .map(|c| (f64::from(c.min(100)) * 0.3).round() as u8)
        .unwrap_or(0)
}

/// Scores worker outputs on size, citations and self-reported confidence
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn score(&self, output: &WorkerOutput) -> AgentQualityScore {
        let size = size_score(output.char_count);
        let citations = citation_score(output.citations.len());
        let confidence = confidence_score(output.confidence);
        let total = size + citations + confidence;

        AgentQualityScore {
            agent: output.agent.clone(),
            size_score: size,
            citation_score: citations,
            confidence_score: confidence,
            total,
            band: QualityBand::from_total(total),
            char_count: output.char_count,
            citation_count: output.citations.len(),
            confidence: output.confidence,
        }
    }

    pub fn score_wave(&self, outputs: &[WorkerOutput]) -> WaveQuality {
        let scores: Vec<AgentQualityScore> = outputs.iter().map(|o| self.score(o)).collect();
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|s| f64::from(s.total)).sum::<f64>() / scores.len() as f64
        };
        let mut band_counts = BTreeMap::new();
        for score in &scores {
            *band_counts.entry(score.band).or_insert(0) += 1;
        }
        WaveQuality {
            scores,
            mean,
            band_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn output(chars: usize, citations: usize, confidence: Option<u8>) -> WorkerOutput {
        let mut output = WorkerOutput::parse("agent", 1, "");
        output.char_count = chars;
        output.citations = (0..citations).map(|i| format!("https://e.org/{}", i)).collect();
        output.confidence = confidence;
        output
    }

    #[rstest]
    #[case(0, 0)]
    #[case(499, 0)]
    #[case(500, 10)]
    #[case(1500, 20)]
    #[case(3000, 30)]
    #[case(5999, 30)]
    #[case(6000, 40)]
    #[case(100_000, 40)]
    fn test_size_score(#[case] chars: usize, #[case] expected: u8) {
        assert_eq!(size_score(chars), expected);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(5, 20)]
    #[case(10, 30)]
    #[case(50, 30)]
    fn test_citation_score(#[case] citations: usize, #[case] expected: u8) {
        assert_eq!(citation_score(citations), expected);
    }

    #[rstest]
    #[case(None, 0)]
    #[case(Some(0), 0)]
    #[case(Some(85), 26)]
    #[case(Some(100), 30)]
    fn test_confidence_score(#[case] confidence: Option<u8>, #[case] expected: u8) {
        assert_eq!(confidence_score(confidence), expected);
    }

    #[rstest]
    #[case(100, QualityBand::Excellent)]
    #[case(80, QualityBand::Excellent)]
    #[case(79, QualityBand::Good)]
    #[case(60, QualityBand::Good)]
    #[case(40, QualityBand::Fair)]
    #[case(39, QualityBand::Poor)]
    #[case(0, QualityBand::Poor)]
    fn test_bands(#[case] total: u8, #[case] band: QualityBand) {
        assert_eq!(QualityBand::from_total(total), band);
    }

    #[test]
    fn test_score_is_bounded_sum() {
        let score = QualityScorer.score(&output(7000, 12, Some(100)));
        assert_eq!(score.total, 100);
        assert_eq!(score.band, QualityBand::Excellent);

        let score = QualityScorer.score(&output(2000, 3, Some(50)));
        assert_eq!(score.total, 20 + 10 + 15);
        assert_eq!(score.band, QualityBand::Fair);
    }

    #[test]
    fn test_wave_aggregate() {
        let wave = QualityScorer.score_wave(&[
            output(7000, 12, Some(100)),
            output(100, 0, None),
        ]);
        assert_eq!(wave.mean, 50.0);
        assert_eq!(wave.count(QualityBand::Excellent), 1);
        assert_eq!(wave.count(QualityBand::Poor), 1);
        assert_eq!(wave.count(QualityBand::Good), 0);
    }

    #[test]
    fn test_empty_wave() {
        let wave = QualityScorer.score_wave(&[]);
        assert_eq!(wave.mean, 0.0);
        assert!(wave.scores.is_empty());
    }
}
