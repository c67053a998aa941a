//! Query plans: intent plus entities, with aggregation, ordering and limits decided.

use floatchart_common::{FloatChartError, GeoRegion, Variable, OBSERVATIONS_TABLE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QueryError;
use crate::extractor::{ExtractedEntities, Threshold, TimeRange};
use crate::intent::QueryIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Count,
}

impl Aggregation {
    pub fn sql_fn(&self) -> &'static str {
        match self {
            Aggregation::Avg => "AVG",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Count => "COUNT",
        }
    }

    /// Column alias prefix, e.g. `avg_temperature`.
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Avg => "avg",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Count => "count",
        }
    }
}

/// Grouping implied by the wording of a statistic question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakdown {
    Monthly,
    PerFloat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrder {
    TimestampAsc,
    TimestampDesc,
    DistanceAsc,
    PeriodAsc,
    FloatIdAsc,
    LastSeenDesc,
    /// Ranked listings ("top 20 warmest floats").
    ValueDesc(Variable),
    ValueAsc(Variable),
}

impl PlanOrder {
    pub fn sql(&self) -> String {
        match self {
            PlanOrder::TimestampAsc => "\"timestamp\" ASC".to_string(),
            PlanOrder::TimestampDesc => "\"timestamp\" DESC".to_string(),
            PlanOrder::DistanceAsc => "distance_km ASC".to_string(),
            PlanOrder::PeriodAsc => "period ASC".to_string(),
            PlanOrder::FloatIdAsc => "float_id ASC".to_string(),
            PlanOrder::LastSeenDesc => "last_seen DESC".to_string(),
            PlanOrder::ValueDesc(v) => format!("{} DESC NULLS LAST", v.column()),
            PlanOrder::ValueAsc(v) => format!("{} ASC NULLS LAST", v.column()),
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

fn default_table() -> String { OBSERVATIONS_TABLE.to_string() }
fn default_row_cap() -> u32 { 10_000 }
fn default_listing_limit() -> u32 { 100 }
fn default_proximity_limit() -> u32 { 10 }

/// Limits and the target table, read from the `[query]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySettings {
    #[serde(default = "default_table")]
    pub table: String,
    /// Hard ceiling on returned rows, whatever the question asks for.
    #[serde(default = "default_row_cap")]
    pub row_cap: u32,
    #[serde(default = "default_listing_limit")]
    pub default_listing_limit: u32,
    #[serde(default = "default_proximity_limit")]
    pub default_proximity_limit: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            row_cap: default_row_cap(),
            default_listing_limit: default_listing_limit(),
            default_proximity_limit: default_proximity_limit(),
        }
    }
}

impl QuerySettings {
    /// The table name is spliced into SQL text, so it must be a plain identifier.
    pub fn validate(&self) -> floatchart_common::Result<()> {
        let valid_ident = |s: &str| {
            let mut chars = s.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        if self.table.split('.').count() > 2 || !self.table.split('.').all(valid_ident) {
            return Err(FloatChartError::Config(format!("invalid table name {:?}", self.table)));
        }
        if self.row_cap == 0 {
            return Err(FloatChartError::Config("row_cap must be at least 1".to_string()));
        }
        Ok(())
    }
}

// ── Plan ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: QueryIntent,
    pub table: String,
    pub float_ids: Vec<i64>,
    pub time_range: Option<TimeRange>,
    pub variables: Vec<Variable>,
    pub locations: Vec<GeoRegion>,
    pub threshold: Option<Threshold>,
    pub aggregation: Option<Aggregation>,
    pub breakdown: Option<Breakdown>,
    pub order: Option<PlanOrder>,
    pub limit: u32,
    /// Set when the plan was downgraded to `unknown` for lack of an entity.
    pub downgraded_from: Option<QueryIntent>,
    pub missing: Option<String>,
}

impl QueryPlan {
    /// The error to report for a plan that was downgraded, if any.
    pub fn insufficiency(&self) -> Option<QueryError> {
        match (self.downgraded_from, &self.missing) {
            (Some(intent), Some(missing)) => Some(QueryError::InsufficientEntities {
                intent,
                missing: missing.clone(),
            }),
            _ => None,
        }
    }
}

fn minimum_entity_missing(intent: QueryIntent, entities: &ExtractedEntities) -> Option<&'static str> {
    match intent {
        QueryIntent::Trajectory if entities.float_ids.is_empty() => Some("a float identifier"),
        QueryIntent::Proximity if entities.locations.is_empty() => Some("a resolved location"),
        _ => None,
    }
}

/// Combine intent and entities into a plan. Total for every intent.
pub fn build(intent: QueryIntent, entities: ExtractedEntities, settings: &QuerySettings) -> QueryPlan {
    let cap = settings.row_cap.max(1);

    let missing = minimum_entity_missing(intent, &entities);
    let ExtractedEntities {
        float_ids, time_range, variables, mut locations, threshold,
        requested_limit, aggregation, breakdown, ..
    } = entities;

    if let Some(missing) = missing {
        debug!(%intent, missing, "plan downgraded to unknown");
        return QueryPlan {
            intent: QueryIntent::Unknown,
            table: settings.table.clone(),
            float_ids,
            time_range,
            variables,
            locations,
            threshold,
            aggregation: None,
            breakdown: None,
            order: None,
            limit: cap,
            downgraded_from: Some(intent),
            missing: Some(missing.to_string()),
        };
    }

    if intent != QueryIntent::Listing {
        locations.truncate(1);
    }

    let (aggregation, breakdown, order, limit) = match intent {
        QueryIntent::RegionalStatistic => {
            let order = match breakdown {
                Some(Breakdown::Monthly) => Some(PlanOrder::PeriodAsc),
                Some(Breakdown::PerFloat) => Some(PlanOrder::FloatIdAsc),
                None => None,
            };
            (Some(aggregation.unwrap_or(Aggregation::Count)), breakdown, order, cap)
        }
        QueryIntent::TimeTrend | QueryIntent::Trajectory | QueryIntent::Comparison => {
            (None, None, Some(PlanOrder::TimestampAsc), cap)
        }
        QueryIntent::Proximity => {
            let limit = requested_limit.unwrap_or(settings.default_proximity_limit);
            (None, None, Some(PlanOrder::DistanceAsc), limit)
        }
        QueryIntent::Listing => {
            let order = match (aggregation, variables.first()) {
                (Some(Aggregation::Max), Some(&v)) => PlanOrder::ValueDesc(v),
                (Some(Aggregation::Min), Some(&v)) => PlanOrder::ValueAsc(v),
                _ if variables.is_empty() => PlanOrder::LastSeenDesc,
                _ => PlanOrder::TimestampDesc,
            };
            let limit = requested_limit.unwrap_or(settings.default_listing_limit);
            (None, None, Some(order), limit)
        }
        QueryIntent::Unknown => (None, None, None, cap),
    };

    QueryPlan {
        intent,
        table: settings.table.clone(),
        float_ids,
        time_range,
        variables,
        locations,
        threshold,
        aggregation,
        breakdown,
        order,
        limit: limit.clamp(1, cap),
        downgraded_from: None,
        missing: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gazetteer::Gazetteer;

    fn entities_with_location(name: &str) -> ExtractedEntities {
        let gaz = Gazetteer::builtin();
        ExtractedEntities {
            locations: vec![gaz.resolve(name).unwrap().clone()],
            ..Default::default()
        }
    }

    #[test]
    fn test_statistic_defaults_to_count() {
        let plan = build(QueryIntent::RegionalStatistic, entities_with_location("bengal"), &QuerySettings::default());
        assert_eq!(plan.aggregation, Some(Aggregation::Count));
        assert_eq!(plan.order, None);
        assert_eq!(plan.limit, 10_000);
    }

    #[test]
    fn test_statistic_breakdown_orders_groups() {
        let mut e = entities_with_location("arabian sea");
        e.aggregation = Some(Aggregation::Avg);
        e.breakdown = Some(Breakdown::Monthly);
        let plan = build(QueryIntent::RegionalStatistic, e, &QuerySettings::default());
        assert_eq!(plan.aggregation, Some(Aggregation::Avg));
        assert_eq!(plan.order, Some(PlanOrder::PeriodAsc));
    }

    #[test]
    fn test_trajectory_without_float_downgrades() {
        let plan = build(QueryIntent::Trajectory, ExtractedEntities::default(), &QuerySettings::default());
        assert_eq!(plan.intent, QueryIntent::Unknown);
        assert_eq!(plan.downgraded_from, Some(QueryIntent::Trajectory));
        assert_eq!(
            plan.insufficiency(),
            Some(QueryError::InsufficientEntities {
                intent: QueryIntent::Trajectory,
                missing: "a float identifier".to_string(),
            })
        );
    }

    #[test]
    fn test_proximity_without_location_downgrades() {
        let plan = build(QueryIntent::Proximity, ExtractedEntities::default(), &QuerySettings::default());
        assert_eq!(plan.intent, QueryIntent::Unknown);
        assert!(plan.insufficiency().is_some());
    }

    #[test]
    fn test_proximity_limits() {
        let plan = build(QueryIntent::Proximity, entities_with_location("chennai"), &QuerySettings::default());
        assert_eq!(plan.limit, 10);
        assert_eq!(plan.order, Some(PlanOrder::DistanceAsc));

        let mut e = entities_with_location("chennai");
        e.requested_limit = Some(5);
        assert_eq!(build(QueryIntent::Proximity, e, &QuerySettings::default()).limit, 5);
    }

    #[test]
    fn test_requested_limit_is_capped() {
        let settings = QuerySettings { row_cap: 500, ..Default::default() };
        let e = ExtractedEntities { requested_limit: Some(50_000), ..Default::default() };
        let plan = build(QueryIntent::Listing, e, &settings);
        assert_eq!(plan.limit, 500);
    }

    #[test]
    fn test_listing_keeps_all_locations_others_keep_primary() {
        let gaz = Gazetteer::builtin();
        let e = ExtractedEntities {
            locations: vec![
                gaz.resolve("arabian sea").unwrap().clone(),
                gaz.resolve("bay of bengal").unwrap().clone(),
            ],
            ..Default::default()
        };
        assert_eq!(build(QueryIntent::Listing, e.clone(), &QuerySettings::default()).locations.len(), 2);
        let stat = build(QueryIntent::RegionalStatistic, e, &QuerySettings::default());
        assert_eq!(stat.locations.len(), 1);
        assert_eq!(stat.locations[0].name, "Arabian Sea");
    }

    #[test]
    fn test_ranked_listing_orders_by_value() {
        let p = build(QueryIntent::Listing, ExtractedEntities {
            variables: vec![Variable::Temperature],
            aggregation: Some(Aggregation::Max),
            requested_limit: Some(20),
            ..Default::default()
        }, &QuerySettings::default());
        assert_eq!(p.order, Some(PlanOrder::ValueDesc(Variable::Temperature)));
        assert_eq!(p.aggregation, None);
        assert_eq!(p.limit, 20);
        assert_eq!(PlanOrder::ValueAsc(Variable::Salinity).sql(), "salinity ASC NULLS LAST");
    }

    #[test]
    fn test_settings_validation() {
        assert!(QuerySettings::default().validate().is_ok());
        assert!(QuerySettings { table: "public.argo_data".into(), ..Default::default() }.validate().is_ok());
        assert!(QuerySettings { table: "argo; drop".into(), ..Default::default() }.validate().is_err());
        assert!(QuerySettings { row_cap: 0, ..Default::default() }.validate().is_err());
    }
}
