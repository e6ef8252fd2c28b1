//! Keyword relevance filter for PropTech content.
//!
//! Text is lower-cased and tested for substring membership against a fixed
//! vocabulary. A match count at or above the threshold (1 by default) makes
//! the text relevant. The bar is deliberately low: recall over precision.

use itertools::Itertools;
use once_cell::sync::Lazy;

/// Vocabulary of topical phrases, grouped by theme.
pub const PROPTECH_KEYWORDS: &[&str] = &[
    // People & roles
    "renters", "tenants", "landlords", "property managers", "property management",
    "real estate agents", "real estate brokers", "realtors", "leasing agents",
    "property owners", "homeowners", "buyers", "sellers", "investors",
    "developers", "contractors", "architects", "property inspectors",
    "agent", "agents", "broker", "brokers", "brokerage", "brokerages",
    // Jargon & industry terms
    "MLS", "escrow", "title insurance", "closing costs", "listing agent", "buyer agent",
    "dual agency", "commission", "open house", "walkthrough", "staging", "zoning", "permit",
    "deed", "foreclosure", "short sale", "flip", "fixer-upper", "turnkey", "cap rate", "NOI",
    "cash flow", "1031 exchange", "syndication", "crowdfunding", "fractional ownership",
    "blockchain real estate", "tokenization", "smart contract",
    // Property types
    "real estate", "property", "properties", "housing", "homes", "houses",
    "apartments", "condos", "condominiums", "townhomes", "single family",
    "multi family", "commercial property", "commercial real estate",
    "office buildings", "office space", "retail space", "warehouses",
    "industrial property", "land", "lots", "vacant land",
    // Financial & transactions
    "property values", "home values", "property valuation", "appraisal",
    "mortgage", "mortgages", "lending", "loan", "refinancing",
    "down payment", "escrow", "title",
    "rent", "rental", "lease", "leasing", "rent control",
    "property taxes", "hoa fees", "maintenance costs",
    "investment property", "property investment", "real estate investment",
    "reit", "real estate funds", "crowdfunding real estate",
    // Technology & platforms
    "proptech", "property technology", "real estate tech", "real estate technology",
    "real estate platform", "rental platform", "property platform",
    "real estate app", "property app", "rental app",
    "property management software", "real estate software",
    "smart building", "smart home", "iot building", "building automation",
    "property analytics", "real estate data", "property data",
    "virtual tours", "digital property", "online real estate",
    // Business models & services
    "facility management", "building management",
    "real estate services", "property services", "leasing services",
    "co-living", "co-working", "flexible space", "shared space",
    "short term rental", "vacation rental", "corporate housing",
    "build to rent", "rent to own", "lease to own",
    "property marketplace", "real estate marketplace",
    // Construction & development
    "construction", "construction tech", "building", "development",
    "new construction", "renovation", "remodeling", "home improvement",
    "general contractor", "subcontractor", "construction management",
    "building materials", "construction software", "project management",
    // Market segments
    "residential real estate", "commercial real estate", "industrial real estate",
    "luxury real estate", "affordable housing", "student housing",
    "senior housing", "hospitality real estate", "retail real estate",
    "mixed use", "urban development", "suburban development",
];

static DEFAULT_FILTER: Lazy<RelevanceFilter> = Lazy::new(RelevanceFilter::default);

/// Classify `text` with the default vocabulary and threshold.
pub fn is_relevant(text: &str) -> bool {
    DEFAULT_FILTER.is_relevant(text)
}

/// Substring-membership classifier over a lower-cased keyword vocabulary.
///
/// Immutable after construction, so a shared reference can be used from any
/// number of tasks at once.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
    threshold: usize,
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(PROPTECH_KEYWORDS.iter().copied(), 1)
    }
}

impl RelevanceFilter {
    /// Build a filter from `keywords`, matching when at least `threshold`
    /// distinct phrases occur. A threshold of 0 is treated as 1.
    pub fn new<I, S>(keywords: I, threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .unique()
            .collect();
        Self {
            keywords,
            threshold: threshold.max(1),
        }
    }

    /// The default vocabulary plus `extra` phrases, with a custom threshold.
    pub fn with_extra_keywords<I, S>(extra: I, threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra: Vec<String> = extra.into_iter().map(|s| s.as_ref().to_string()).collect();
        let all = PROPTECH_KEYWORDS
            .iter()
            .map(|s| s.to_string())
            .chain(extra);
        Self::new(all, threshold)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Number of distinct vocabulary phrases contained in `text`.
    pub fn score(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| lower.contains(k.as_str()))
            .count()
    }

    /// `true` once `threshold` phrases have been found. Stops scanning early.
    pub fn is_relevant(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let lower = text.to_lowercase();
        let mut hits = 0;
        for keyword in &self.keywords {
            if lower.contains(keyword.as_str()) {
                hits += 1;
                if hits >= self.threshold {
                    return true;
                }
            }
        }
        false
    }
}
