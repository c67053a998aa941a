//! Intent classification: ordered keyword rules, then the provider gateway as a fallback.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use floatchart_llm::ProviderGateway;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extractor::ExtractedEntities;
use crate::plan::{Aggregation, Breakdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Proximity,
    RegionalStatistic,
    TimeTrend,
    Trajectory,
    Comparison,
    Listing,
    Unknown,
}

impl QueryIntent {
    /// The six tags a provider may answer with.
    pub const ANSWERABLE: [QueryIntent; 6] = [
        QueryIntent::Proximity,
        QueryIntent::RegionalStatistic,
        QueryIntent::TimeTrend,
        QueryIntent::Trajectory,
        QueryIntent::Comparison,
        QueryIntent::Listing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Proximity => "proximity",
            QueryIntent::RegionalStatistic => "regional_statistic",
            QueryIntent::TimeTrend => "time_trend",
            QueryIntent::Trajectory => "trajectory",
            QueryIntent::Comparison => "comparison",
            QueryIntent::Listing => "listing",
            QueryIntent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase().replace([' ', '-'], "_");
        [QueryIntent::Unknown].iter()
            .chain(QueryIntent::ANSWERABLE.iter())
            .find(|i| i.as_str() == tag)
            .copied()
            .ok_or_else(|| format!("unrecognized intent tag {:?}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Rule,
    Provider,
    /// Neither rules nor a provider produced a tag.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: QueryIntent,
    pub source: IntentSource,
    /// Provider that supplied the tag, when one did.
    pub provider: Option<String>,
    /// Why the result is `unknown`, when it is.
    pub cause: Option<String>,
}

impl Classification {
    fn rule(intent: QueryIntent) -> Self {
        Self { intent, source: IntentSource::Rule, provider: None, cause: None }
    }

    fn unknown(source: IntentSource, provider: Option<String>, cause: impl Into<String>) -> Self {
        Self { intent: QueryIntent::Unknown, source, provider, cause: Some(cause.into()) }
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

fn keyword_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

fn has_trajectory_keyword(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    keyword_regex(&RE, r"\b(?:trajectory|trajectories|path|paths|route|routes|track|tracks|tracked|drift|drifted)\b").is_match(text)
}

fn has_comparison_keyword(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    keyword_regex(&RE, r"\b(?:vs|versus|compare|compared|comparing|comparison|correlation|relationship)\b").is_match(text)
}

fn has_proximity_keyword(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    keyword_regex(&RE, r"\b(?:near|nearest|nearby|closest|close to)\b").is_match(text)
}

fn has_trend_keyword(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    keyword_regex(&RE, r"\b(?:trends?|over time|time series|changed|changing|evolution|variation)\b").is_match(text)
}

fn has_listing_keyword(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    keyword_regex(&RE, r"\b(?:list|show|display|which floats|what floats|all floats|give me)\b").is_match(text)
}

/// Deterministic rule pass. `None` means no rule fired.
/// A count plus a superlative over a named variable ("top 20 warmest floats")
/// asks for ranked rows, not a single extreme value.
fn is_ranked_listing(entities: &ExtractedEntities) -> bool {
    entities.requested_limit.is_some()
        && !entities.variables.is_empty()
        && matches!(entities.aggregation, Some(Aggregation::Max | Aggregation::Min))
}

pub fn classify_by_rules(normalized: &str, entities: &ExtractedEntities) -> Option<QueryIntent> {
    if !entities.float_ids.is_empty() && has_trajectory_keyword(normalized) {
        return Some(QueryIntent::Trajectory);
    }
    if entities.variables.len() >= 2 && has_comparison_keyword(normalized) {
        return Some(QueryIntent::Comparison);
    }
    if !entities.locations.is_empty() && has_proximity_keyword(normalized) {
        return Some(QueryIntent::Proximity);
    }
    if is_ranked_listing(entities) {
        return Some(QueryIntent::Listing);
    }
    if entities.aggregation.is_some() {
        return Some(QueryIntent::RegionalStatistic);
    }
    let listing = has_listing_keyword(normalized);
    let trend = has_trend_keyword(normalized) || entities.breakdown == Some(Breakdown::Monthly);
    if trend || (entities.time_range.is_some() && !listing) {
        return Some(QueryIntent::TimeTrend);
    }
    if listing {
        return Some(QueryIntent::Listing);
    }
    None
}

// ── Provider fallback ─────────────────────────────────────────────────────────

pub const INTENT_INSTRUCTION: &str = "You classify questions about ARGO ocean float data. \
Answer with exactly one of these tags and nothing else: \
proximity, regional_statistic, time_trend, trajectory, comparison, listing. \
proximity: floats near a place. regional_statistic: an average, maximum, minimum or count over an area. \
time_trend: how a measurement changes over time. trajectory: the path of a specific float. \
comparison: two or more measured variables against each other. listing: list or show floats or records.";

/// Read a provider reply as an intent tag. Anything outside the six tags is `unknown`.
pub fn parse_provider_tag(reply: &str) -> QueryIntent {
    let first_line = reply.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let cleaned = first_line.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
    match cleaned.parse::<QueryIntent>() {
        Ok(intent) if intent != QueryIntent::Unknown => intent,
        _ => QueryIntent::Unknown,
    }
}

pub struct IntentClassifier {
    gateway: Option<Arc<ProviderGateway>>,
}

impl IntentClassifier {
    pub fn new(gateway: Option<Arc<ProviderGateway>>) -> Self {
        Self { gateway }
    }

    /// Rules first; the gateway sees the raw text only when no rule fires.
    pub async fn classify(&self, raw: &str, normalized: &str, entities: &ExtractedEntities) -> Classification {
        if let Some(intent) = classify_by_rules(normalized, entities) {
            debug!(%intent, "intent from rules");
            return Classification::rule(intent);
        }

        let Some(gateway) = self.gateway.as_ref().filter(|g| !g.is_empty()) else {
            debug!("no rule matched and no provider configured");
            return Classification::unknown(IntentSource::Fallback, None, "no rule matched and no provider is configured");
        };

        match gateway.complete(raw, INTENT_INSTRUCTION).await {
            Ok(reply) => {
                let intent = parse_provider_tag(&reply.content);
                debug!(%intent, provider = %reply.provider, "intent from provider");
                if intent == QueryIntent::Unknown {
                    let cause = format!("provider {} replied with an unrecognized tag", reply.provider);
                    Classification::unknown(IntentSource::Provider, Some(reply.provider), cause)
                } else {
                    Classification {
                        intent,
                        source: IntentSource::Provider,
                        provider: Some(reply.provider),
                        cause: None,
                    }
                }
            }
            Err(unavailable) => {
                warn!(attempts = unavailable.attempts.len(), "intent fallback failed: {}", unavailable);
                Classification::unknown(IntentSource::Fallback, None, unavailable.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::EntityExtractor;
    use crate::gazetteer::Gazetteer;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use floatchart_llm::{GatewaySettings, LlmBackend, LlmError, LlmRequest, LlmResponse};

    fn entities(text: &str) -> ExtractedEntities {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();
        EntityExtractor::new(Arc::new(Gazetteer::builtin())).extract_at(text, now)
    }

    fn rules(text: &str) -> Option<QueryIntent> {
        classify_by_rules(text, &entities(text))
    }

    struct Scripted(&'static str);

    #[async_trait]
    impl LlmBackend for Scripted {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                content: self.0.to_string(),
                model: "scripted".to_string(),
                prompt_tokens: 0,
                completion_tokens: 1,
            })
        }
        fn model_id(&self) -> &str { "scripted" }
        fn is_local(&self) -> bool { true }
    }

    struct Down;

    #[async_trait]
    impl LlmBackend for Down {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
            Err(LlmError::Unavailable("connection refused".to_string()))
        }
        fn model_id(&self) -> &str { "down" }
        fn is_local(&self) -> bool { true }
    }

    fn gateway_with(backend: Arc<dyn LlmBackend>) -> Option<Arc<ProviderGateway>> {
        let mut gw = ProviderGateway::new(GatewaySettings::default());
        gw.register_backend("scripted", backend);
        Some(Arc::new(gw))
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(rules("trajectory of float 2902115"), Some(QueryIntent::Trajectory));
        assert_eq!(rules("compare temperature and salinity in arabian sea"), Some(QueryIntent::Comparison));
        assert_eq!(rules("find 5 nearest floats to chennai"), Some(QueryIntent::Proximity));
        assert_eq!(rules("average temperature in bay of bengal"), Some(QueryIntent::RegionalStatistic));
        assert_eq!(rules("maximum salinity"), Some(QueryIntent::RegionalStatistic));
        assert_eq!(rules("salinity in 2023"), Some(QueryIntent::TimeTrend));
        assert_eq!(rules("temperature trends in the arabian sea"), Some(QueryIntent::TimeTrend));
        assert_eq!(rules("show floats in the last 30 days"), Some(QueryIntent::Listing));
        assert_eq!(rules("list all floats"), Some(QueryIntent::Listing));
    }

    #[test]
    fn test_count_with_superlative_is_ranked_listing() {
        assert_eq!(rules("top 20 warmest floats"), Some(QueryIntent::Listing));
        assert_eq!(rules("top 5 lowest salinity readings"), Some(QueryIntent::Listing));
        assert_eq!(rules("warmest water in the arabian sea"), Some(QueryIntent::RegionalStatistic));
        assert_eq!(rules("top 10 average temperature"), Some(QueryIntent::RegionalStatistic));
    }

    #[test]
    fn test_rule_preconditions() {
        // trajectory keyword without a float id
        assert_eq!(rules("what path do floats take"), None);
        // comparison with a single variable
        assert_eq!(rules("compare salinity"), None);
        // proximity keyword with nothing resolved
        assert_eq!(rules("floats near here"), None);
    }

    #[test]
    fn test_rules_are_idempotent() {
        for text in ["trajectory of float 2902115", "average temperature in bay of bengal", "hello there"] {
            let e = entities(text);
            assert_eq!(classify_by_rules(text, &e), classify_by_rules(text, &e));
        }
    }

    #[test]
    fn test_parse_provider_tag() {
        assert_eq!(parse_provider_tag("time_trend"), QueryIntent::TimeTrend);
        assert_eq!(parse_provider_tag("  Regional_Statistic.\n"), QueryIntent::RegionalStatistic);
        assert_eq!(parse_provider_tag("\"listing\""), QueryIntent::Listing);
        assert_eq!(parse_provider_tag("regional statistic"), QueryIntent::RegionalStatistic);
        assert_eq!(parse_provider_tag("I think it is a trend"), QueryIntent::Unknown);
        assert_eq!(parse_provider_tag("unknown"), QueryIntent::Unknown);
        assert_eq!(parse_provider_tag(""), QueryIntent::Unknown);
    }

    #[tokio::test]
    async fn test_rule_match_skips_provider() {
        let clf = IntentClassifier::new(gateway_with(Arc::new(Scripted("listing"))));
        let text = "trajectory of float 2902115";
        let c = clf.classify(text, text, &entities(text)).await;
        assert_eq!(c.intent, QueryIntent::Trajectory);
        assert_eq!(c.source, IntentSource::Rule);
    }

    #[tokio::test]
    async fn test_provider_fallback_validates_tag() {
        let text = "where do argo floats usually go";
        let clf = IntentClassifier::new(gateway_with(Arc::new(Scripted("listing"))));
        let c = clf.classify(text, text, &entities(text)).await;
        assert_eq!(c.intent, QueryIntent::Listing);
        assert_eq!(c.provider.as_deref(), Some("scripted"));

        let clf = IntentClassifier::new(gateway_with(Arc::new(Scripted("SELECT * FROM argo_data"))));
        let c = clf.classify(text, text, &entities(text)).await;
        assert_eq!(c.intent, QueryIntent::Unknown);
        assert!(c.cause.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_gateway_is_unknown() {
        let text = "where do argo floats usually go";
        let c = IntentClassifier::new(None).classify(text, text, &entities(text)).await;
        assert_eq!(c.intent, QueryIntent::Unknown);
        assert_eq!(c.source, IntentSource::Fallback);

        let c = IntentClassifier::new(gateway_with(Arc::new(Down))).classify(text, text, &entities(text)).await;
        assert_eq!(c.intent, QueryIntent::Unknown);
        assert_eq!(c.source, IntentSource::Fallback);
    }
}
