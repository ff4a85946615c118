use crate::perspectives::PerspectivePlan;
use crate::pivot::worker_output::WorkerOutput;
use crate::sources::normalize_host;
use crate::types::{Domain, WorkerType};
use serde::{Deserialize, Serialize};

/// Whether one perspective's designated platforms were visited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCoverage {
    /// 1-based, matching the `Perspective:` metadata line workers write
    pub perspective_index: usize,
    pub perspective: String,
    pub domain: Domain,
    pub specialist: WorkerType,
    /// Worker output matched to the perspective, if any
    pub agent: Option<String>,
    pub designated: Vec<String>,
    pub visited: Vec<String>,
    /// visited / designated, 0.0-1.0
    pub coverage: f64,
    /// No designated platform was visited
    pub flagged: bool,
}

/// Checks planned platforms against what workers actually searched and cited
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformCoverageValidator;

impl PlatformCoverageValidator {
    /// Validate every perspective of a plan.
    ///
    /// Outputs are matched by their `perspective_index` metadata first; the
    /// remaining outputs are assigned to the remaining perspectives in order.
    pub fn validate(&self, plan: &PerspectivePlan, outputs: &[WorkerOutput]) -> Vec<PlatformCoverage> {
        let count = plan.validations.len();
        let mut assigned: Vec<Option<usize>> = vec![None; count];
        let mut used = vec![false; outputs.len()];

        for (i, output) in outputs.iter().enumerate() {
            if let Some(index) = output.perspective_index {
                if (1..=count).contains(&index) && assigned[index - 1].is_none() {
                    assigned[index - 1] = Some(i);
                    used[i] = true;
                }
            }
        }
        let mut unused = (0..outputs.len()).filter(|i| !used[*i]);
        for slot in assigned.iter_mut().filter(|s| s.is_none()) {
            *slot = unused.next();
        }

        plan.validations
            .iter()
            .zip(assigned)
            .enumerate()
            .map(|(i, (validation, output))| {
                let perspective = &validation.perspective;
                let output = output.map(|o| &outputs[o]);
                let designated: Vec<String> =
                    perspective.platforms.iter().map(|p| p.name.clone()).collect();
                let visited: Vec<String> = match output {
                    Some(output) => designated
                        .iter()
                        .filter(|name| was_visited(name, output))
                        .cloned()
                        .collect(),
                    None => Vec::new(),
                };
                let coverage = if designated.is_empty() {
                    1.0
                } else {
                    visited.len() as f64 / designated.len() as f64
                };
                let flagged = !designated.is_empty() && visited.is_empty();
                if flagged {
                    tracing::warn!(
                        perspective = i + 1,
                        agent = output.map(|o| o.agent.as_str()).unwrap_or("none"),
                        "No designated platform was visited"
                    );
                }
                PlatformCoverage {
                    perspective_index: i + 1,
                    perspective: perspective.text.clone(),
                    domain: perspective.domain,
                    specialist: perspective.recommended_agent,
                    agent: output.map(|o| o.agent.clone()),
                    designated,
                    visited,
                    coverage,
                    flagged,
                }
            })
            .collect()
    }
}

/// Short matching key for a platform name: the host for anything that looks
/// like a domain, otherwise the first word.
fn platform_key(name: &str) -> String {
    let name = name.trim().to_lowercase();
    let first = name.split_whitespace().next().unwrap_or("");
    if first.contains('.') || first.contains("://") {
        normalize_host(first)
    } else {
        first
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .collect()
    }
}

fn was_visited(platform: &str, output: &WorkerOutput) -> bool {
    let key = platform_key(platform);
    if key.is_empty() {
        return false;
    }
    let bare = key.split('.').next().unwrap_or(&key).to_string();

    let searched = output
        .platforms_searched
        .iter()
        .map(|p| platform_key(p))
        .any(|p| p == key || has_label(&p, &bare));
    searched
        || output.citations.iter().any(|url| {
            let host = normalize_host(url);
            host == key || host.ends_with(&format!(".{}", key)) || has_label(&host, &bare)
        })
}

/// Whole-label match on a host or name split at `.` and `-`
fn has_label(name: &str, label: &str) -> bool {
    !label.is_empty() && name.split(['.', '-']).any(|part| part == label)
}
