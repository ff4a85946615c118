use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Trust tier of an information source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Independent / academic / government
    Tier1,
    /// Quasi-independent (press, community); the default for unknown hosts
    Tier2,
    /// Vendor
    Tier3,
    /// Suspect
    Tier4,
}

impl SourceTier {
    pub const ALL: [SourceTier; 4] = [
        SourceTier::Tier1,
        SourceTier::Tier2,
        SourceTier::Tier3,
        SourceTier::Tier4,
    ];

    pub fn number(&self) -> u8 {
        match self {
            SourceTier::Tier1 => 1,
            SourceTier::Tier2 => 2,
            SourceTier::Tier3 => 3,
            SourceTier::Tier4 => 4,
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

/// How a host was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Subdomain,
    Suffix,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierClassification {
    pub url: String,
    pub host: String,
    pub tier: SourceTier,
    pub category: String,
    pub confidence: MatchConfidence,
}

const TIER1: &[(&str, &str)] = &[
    ("arxiv.org", "academic"),
    ("nature.com", "academic"),
    ("science.org", "academic"),
    ("ieee.org", "academic"),
    ("acm.org", "academic"),
    ("springer.com", "academic"),
    ("sciencedirect.com", "academic"),
    ("jstor.org", "academic"),
    ("plos.org", "academic"),
    ("ssrn.com", "academic"),
    ("aclanthology.org", "academic"),
    ("usenix.org", "academic"),
    ("semanticscholar.org", "academic"),
    ("scholar.google.com", "academic"),
    ("nih.gov", "government"),
    ("nist.gov", "government"),
    ("cisa.gov", "government"),
    ("europa.eu", "government"),
    ("who.int", "international"),
    ("oecd.org", "international"),
    ("mitre.org", "research"),
    ("cert.org", "research"),
    ("first.org", "standards"),
    ("owasp.org", "standards"),
    ("ietf.org", "standards"),
    ("w3.org", "standards"),
    ("iso.org", "standards"),
];

const TIER2: &[(&str, &str)] = &[
    ("reuters.com", "news"),
    ("apnews.com", "news"),
    ("bbc.com", "news"),
    ("bbc.co.uk", "news"),
    ("nytimes.com", "news"),
    ("theguardian.com", "news"),
    ("ft.com", "news"),
    ("arstechnica.com", "tech_press"),
    ("wired.com", "tech_press"),
    ("techcrunch.com", "tech_press"),
    ("theregister.com", "tech_press"),
    ("bleepingcomputer.com", "tech_press"),
    ("krebsonsecurity.com", "independent_analysis"),
    ("wikipedia.org", "reference"),
    ("github.com", "community"),
    ("stackoverflow.com", "community"),
    ("news.ycombinator.com", "community"),
    ("reddit.com", "community"),
];

const TIER3: &[(&str, &str)] = &[
    ("microsoft.com", "vendor"),
    ("google.com", "vendor"),
    ("amazon.com", "vendor"),
    ("ibm.com", "vendor"),
    ("oracle.com", "vendor"),
    ("cisco.com", "vendor"),
    ("paloaltonetworks.com", "security_vendor"),
    ("crowdstrike.com", "security_vendor"),
    ("fortinet.com", "security_vendor"),
    ("checkpoint.com", "security_vendor"),
    ("mandiant.com", "security_vendor"),
    ("sentinelone.com", "security_vendor"),
    ("trendmicro.com", "security_vendor"),
    ("kaspersky.com", "security_vendor"),
    ("sophos.com", "security_vendor"),
    ("rapid7.com", "security_vendor"),
    ("tenable.com", "security_vendor"),
    ("recordedfuture.com", "security_vendor"),
    ("darktrace.com", "security_vendor"),
    ("splunk.com", "vendor"),
    ("datadoghq.com", "vendor"),
    ("cloudflare.com", "vendor"),
    ("okta.com", "vendor"),
    ("salesforce.com", "vendor"),
    ("hubspot.com", "vendor"),
    ("gartner.com", "analyst_firm"),
    ("forrester.com", "analyst_firm"),
];

const TIER4: &[(&str, &str)] = &[
    ("sites.google.com", "user_content"),
    ("blogspot.com", "user_content"),
    ("medium.com", "user_content"),
    ("quora.com", "user_content"),
    ("answers.com", "content_farm"),
    ("ehow.com", "content_farm"),
    ("pinterest.com", "aggregator"),
    ("scribd.com", "aggregator"),
    ("slideshare.net", "aggregator"),
    ("prnewswire.com", "press_release"),
    ("businesswire.com", "press_release"),
    ("globenewswire.com", "press_release"),
];

/// Reduce a URL (or bare host) to a lower-case host without `www.`
pub fn normalize_host(url: &str) -> String {
    let mut rest = url.trim();
    if let Some(pos) = rest.find("://") {
        rest = &rest[pos + 3..];
    }
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let mut host = &rest[..end];
    if let Some(at) = host.rfind('@') {
        host = &host[at + 1..];
    }
    if let Some(colon) = host.find(':') {
        host = &host[..colon];
    }
    let host = host.trim_end_matches('.').to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn host_matches(host: &str, listed: &str) -> Option<MatchConfidence> {
    if host == listed {
        Some(MatchConfidence::Exact)
    } else if host.len() > listed.len()
        && host.ends_with(listed)
        && host.as_bytes()[host.len() - listed.len() - 1] == b'.'
    {
        Some(MatchConfidence::Subdomain)
    } else {
        None
    }
}

/// Academic / government suffixes: `.edu`, `.gov`, `.mil` and their
/// country-code forms (`.ac.uk`, `.gov.au`, ...)
fn institutional_suffix(host: &str) -> Option<&'static str> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let last = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let is_country_form = last.len() == 2 && labels.len() >= 3;
    match (last, second) {
        ("edu", _) => Some("academic"),
        ("gov", _) | ("mil", _) => Some("government"),
        (_, "edu") | (_, "ac") if is_country_form => Some("academic"),
        (_, "gov") | (_, "mil") if is_country_form => Some("government"),
        _ => None,
    }
}

/// Static-list host classifier
#[derive(Debug, Clone)]
pub struct SourceTierClassifier {
    tiers: Vec<(SourceTier, Vec<(String, String)>)>,
}

impl Default for SourceTierClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceTierClassifier {
    pub fn new() -> Self {
        let owned = |list: &[(&str, &str)]| {
            list.iter()
                .map(|(host, category)| (host.to_string(), category.to_string()))
                .collect::<Vec<_>>()
        };
        Self {
            // precedence order
            tiers: vec![
                (SourceTier::Tier1, owned(TIER1)),
                (SourceTier::Tier4, owned(TIER4)),
                (SourceTier::Tier3, owned(TIER3)),
                (SourceTier::Tier2, owned(TIER2)),
            ],
        }
    }

    /// Add hosts to a tier (e.g. from configuration)
    pub fn with_hosts<I, S>(mut self, tier: SourceTier, category: &str, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some((_, list)) = self.tiers.iter_mut().find(|(t, _)| *t == tier) {
            for host in hosts {
                let host = normalize_host(host.as_ref());
                if !host.is_empty() {
                    list.push((host, category.to_string()));
                }
            }
        }
        self
    }

    pub fn classify(&self, url: &str) -> TierClassification {
        let host = normalize_host(url);
        let classification = |tier, category: &str, confidence| TierClassification {
            url: url.to_string(),
            host: host.clone(),
            tier,
            category: category.to_string(),
            confidence,
        };

        for (index, (tier, list)) in self.tiers.iter().enumerate() {
            for (listed, category) in list {
                if let Some(confidence) = host_matches(&host, listed) {
                    return classification(*tier, category, confidence);
                }
            }
            // institutional suffixes rank with the tier-1 lists
            if index == 0 {
                if let Some(category) = institutional_suffix(&host) {
                    return classification(SourceTier::Tier1, category, MatchConfidence::Suffix);
                }
            }
        }

        classification(SourceTier::Tier2, "unknown", MatchConfidence::Default)
    }

    pub fn classify_all<I, S>(&self, urls: I) -> Vec<TierClassification>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter().map(|u| self.classify(u.as_ref())).collect()
    }

    /// Classify every URL and aggregate into a report
    pub fn report<I, S>(&self, urls: I) -> SourceQualityReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SourceQualityReport::from_classifications(&self.classify_all(urls))
    }
}

/// Per-batch source statistics.
///
/// `flags` and `recommendations` are filled in by the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQualityReport {
    pub total: usize,
    pub tier_counts: BTreeMap<SourceTier, usize>,
    pub vendor_fraction: f64,
    pub independent_fraction: f64,
    #[serde(default)]
    pub suspect_hosts: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl SourceQualityReport {
    pub fn from_classifications(items: &[TierClassification]) -> Self {
        let mut tier_counts: BTreeMap<SourceTier, usize> =
            SourceTier::ALL.into_iter().map(|t| (t, 0)).collect();
        let mut suspect_hosts = Vec::new();
        for item in items {
            *tier_counts.entry(item.tier).or_insert(0) += 1;
            if item.tier == SourceTier::Tier4 && !suspect_hosts.contains(&item.host) {
                suspect_hosts.push(item.host.clone());
            }
        }

        let total = items.len();
        let fraction = |tier| {
            if total == 0 {
                0.0
            } else {
                tier_counts.get(&tier).copied().unwrap_or(0) as f64 / total as f64
            }
        };

        Self {
            total,
            vendor_fraction: fraction(SourceTier::Tier3),
            independent_fraction: fraction(SourceTier::Tier1),
            tier_counts,
            suspect_hosts,
            flags: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn count(&self, tier: SourceTier) -> usize {
        self.tier_counts.get(&tier).copied().unwrap_or(0)
    }
}
