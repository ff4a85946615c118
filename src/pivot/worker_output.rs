//! Worker markdown parsing
//!
//! Workers write one markdown file each (`wave-N/<agent>.md`). The body is free
//! text; a trailing section headed `Metadata` carries
//! structured lines:
//!
//! ```text
//! ## Metadata
//! - **Confidence**: 85%
//! - **Perspective**: 2
//! - **Domain**: security
//! - **Platforms searched**: nvd.nist.gov, attack.mitre.org
//!
//! ### Limited coverage
//! - Non-English vendor advisories
//! ### Tool gaps
//! - No access to paid threat feeds
//! ```

use crate::types::{Domain, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("url pattern is valid")
});

/// Category of a self-reported gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    LimitedCoverage,
    AlternativeDomain,
    ToolGap,
    PlatformGap,
}

impl GapKind {
    fn from_label(label: &str) -> Option<GapKind> {
        let label = label.to_lowercase();
        if label.contains("limited coverage") {
            Some(GapKind::LimitedCoverage)
        } else if label.contains("alternative domain") {
            Some(GapKind::AlternativeDomain)
        } else if label.contains("tool gap") {
            Some(GapKind::ToolGap)
        } else if label.contains("platform gap") {
            Some(GapKind::PlatformGap)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapStatement {
    pub kind: GapKind,
    pub text: String,
}

/// One parsed worker output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// File stem, e.g. `security-analyst-1`
    pub agent: String,
    pub wave: u8,
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(skip)]
    pub content: String,
    pub char_count: usize,
    pub confidence: Option<u8>,
    pub perspective_index: Option<usize>,
    pub domain: Option<Domain>,
    pub platforms_searched: Vec<String>,
    pub citations: Vec<String>,
    pub gaps: Vec<GapStatement>,
}

impl WorkerOutput {
    pub fn parse(agent: impl Into<String>, wave: u8, content: &str) -> Self {
        let mut output = Self {
            agent: agent.into(),
            wave,
            path: PathBuf::new(),
            content: content.to_string(),
            char_count: content.chars().count(),
            confidence: None,
            perspective_index: None,
            domain: None,
            platforms_searched: Vec::new(),
            citations: extract_citations(content),
            gaps: Vec::new(),
        };
        output.parse_metadata(content);
        output
    }

    /// Read one worker file
    pub fn load(path: &Path, wave: u8) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let agent = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut output = Self::parse(agent, wave, &content);
        output.path = path.to_path_buf();
        Ok(output)
    }

    /// Body text without the metadata section
    pub fn body(&self) -> &str {
        match metadata_start(&self.content) {
            Some(offset) => &self.content[..offset],
            None => &self.content,
        }
    }

    fn parse_metadata(&mut self, content: &str) {
        let Some(offset) = metadata_start(content) else {
            return;
        };

        let mut current_gap: Option<GapKind> = None;
        for raw_line in content[offset..].lines().skip(1) {
            let line = clean_line(raw_line);
            if line.is_empty() {
                current_gap = None;
                continue;
            }
            let is_heading = raw_line.trim_start().starts_with('#');
            let is_bullet = is_bullet(raw_line);

            let (label, value) = match line.split_once(':') {
                Some((label, value)) if !label.contains("http") => (label.trim(), value.trim()),
                _ => (line.as_str(), ""),
            };

            if let Some(kind) = GapKind::from_label(label) {
                current_gap = Some(kind);
                if !value.is_empty() {
                    self.gaps.push(GapStatement {
                        kind,
                        text: value.to_string(),
                    });
                }
                continue;
            }

            if is_heading {
                current_gap = None;
                continue;
            }

            if let Some(key) = MetadataKey::from_label(label) {
                current_gap = None;
                self.apply(key, value);
                continue;
            }

            if let (Some(kind), true) = (current_gap, is_bullet) {
                self.gaps.push(GapStatement {
                    kind,
                    text: line.clone(),
                });
                continue;
            }

            current_gap = None;
        }
    }

    fn apply(&mut self, key: MetadataKey, value: &str) {
        match key {
            MetadataKey::Confidence => self.confidence = parse_confidence(value),
            MetadataKey::Perspective => {
                self.perspective_index = value
                    .trim_start_matches('#')
                    .split(|c: char| !c.is_ascii_digit())
                    .next()
                    .and_then(|digits| digits.parse().ok());
            }
            MetadataKey::Domain => self.domain = Domain::parse_lenient(value),
            MetadataKey::Platforms => {
                self.platforms_searched = value
                    .split([',', ';'])
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect();
            }
        }
    }
}

/// Structured metadata lines; these are never read as gap statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKey {
    Confidence,
    Perspective,
    Domain,
    Platforms,
}

impl MetadataKey {
    fn from_label(label: &str) -> Option<MetadataKey> {
        match label.to_lowercase().as_str() {
            "confidence" | "confidence score" | "self-reported confidence" => {
                Some(MetadataKey::Confidence)
            }
            "perspective" | "perspective index" => Some(MetadataKey::Perspective),
            "domain" => Some(MetadataKey::Domain),
            "platforms searched" | "platforms" | "sources searched" => Some(MetadataKey::Platforms),
            _ => None,
        }
    }
}

/// Byte offset of the metadata heading line, if any
fn metadata_start(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if is_metadata_heading(line) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// `## Metadata` or `## Metadata: <suffix>`, any heading level
fn is_metadata_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return false;
    }
    let text = clean_line(trimmed).to_lowercase();
    let title = text.split_once(':').map_or(text.as_str(), |(title, _)| title);
    title.trim() == "metadata"
}

fn is_bullet(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ")
}

/// Strip heading hashes, bullets and bold markers
fn clean_line(line: &str) -> String {
    let trimmed = line
        .trim()
        .trim_start_matches('#')
        .trim_start()
        .trim_start_matches(['-', '*', '+'])
        .trim();
    trimmed.replace("**", "").replace("__", "").trim().to_string()
}

/// `85`, `85%`, `0.85` → 85. Out-of-range or non-numeric → `None`.
pub fn parse_confidence(value: &str) -> Option<u8> {
    let number: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let parsed: f64 = number.parse().ok()?;
    let percent = if value.trim().contains('%') || parsed > 1.0 {
        parsed
    } else {
        parsed * 100.0
    };
    (0.0..=100.0)
        .contains(&percent)
        .then(|| percent.round() as u8)
}

/// Distinct http(s) URLs in order of first appearance
pub fn extract_citations(content: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in URL_PATTERN.find_iter(content) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '*']);
        if !seen.iter().any(|s: &String| s == url) {
            seen.push(url.to_string());
        }
    }
    seen
}

/// Load every `*.md` output in `dir`, sorted by file name
pub fn load_wave(dir: &Path, wave: u8) -> Result<Vec<WorkerOutput>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();
    paths.iter().map(|p| WorkerOutput::load(p, wave)).collect()
}
