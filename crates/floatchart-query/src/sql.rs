//! SQL synthesis. Plans compile to PostgreSQL text with `$n` placeholders.
//!
//! Only closed enums (variables, aggregates, orderings) and the configured table
//! name contribute to the SQL text. Every value taken from the question is bound.

use chrono::{DateTime, Utc};
use floatchart_common::{BoundingBox, GeoExtent, GeoPoint, GeoRegion, Observation, Variable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::QueryError;
use crate::intent::QueryIntent;
use crate::plan::{Aggregation, Breakdown, QueryPlan};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

/// Chart hint for the caller, derived from the intent alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    MapTable,
    TimeseriesTable,
    ScalarTable,
    ScatterTable,
    TableOnly,
}

impl ResultShape {
    pub fn for_intent(intent: QueryIntent) -> Option<Self> {
        match intent {
            QueryIntent::Trajectory | QueryIntent::Proximity => Some(ResultShape::MapTable),
            QueryIntent::TimeTrend => Some(ResultShape::TimeseriesTable),
            QueryIntent::RegionalStatistic => Some(ResultShape::ScalarTable),
            QueryIntent::Comparison => Some(ResultShape::ScatterTable),
            QueryIntent::Listing => Some(ResultShape::TableOnly),
            QueryIntent::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub shape: ResultShape,
    pub columns: Vec<String>,
    /// Physical unit per column, `None` for identifiers, timestamps and counts.
    pub units: Vec<Option<String>>,
}

/// Unit of a result column, whether it is a raw variable or an `<agg>_<variable>` alias.
fn column_unit(column: &str) -> Option<String> {
    if column == "distance_km" {
        return Some("km".to_string());
    }
    let variable = Variable::from_column(column).or_else(|| {
        let (prefix, rest) = column.split_once('_')?;
        if prefix == Aggregation::Count.label() {
            return None;
        }
        Variable::from_column(rest)
    })?;
    Some(variable.unit().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<SqlValue>,
    pub result: ResultDescriptor,
    /// Row limit bound into the statement.
    pub limit: u32,
}

/// Hands out placeholders in bind order.
#[derive(Debug, Default)]
struct Binder {
    values: Vec<SqlValue>,
}

impl Binder {
    fn bind(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    fn float(&mut self, v: f64) -> String {
        self.bind(SqlValue::Float(v))
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in km from each row to the point bound at `lat`/`lon`.
pub fn haversine_sql(lat: &str, lon: &str) -> String {
    format!(
        "{r:.1} * 2 * ASIN(SQRT(POWER(SIN(RADIANS(latitude - {lat}) / 2), 2) + \
         COS(RADIANS({lat})) * COS(RADIANS(latitude)) * POWER(SIN(RADIANS(longitude - {lon}) / 2), 2)))",
        r = EARTH_RADIUS_KM,
    )
}

fn bbox_predicate(bbox: &BoundingBox, b: &mut Binder) -> String {
    let (lat_lo, lat_hi) = (b.float(bbox.min_lat), b.float(bbox.max_lat));
    let (lon_lo, lon_hi) = (b.float(bbox.min_lon), b.float(bbox.max_lon));
    if bbox.crosses_antimeridian() {
        format!("(latitude BETWEEN {lat_lo} AND {lat_hi} AND (longitude >= {lon_lo} OR longitude <= {lon_hi}))")
    } else {
        format!("(latitude BETWEEN {lat_lo} AND {lat_hi} AND longitude BETWEEN {lon_lo} AND {lon_hi})")
    }
}

fn point_predicate(point: &GeoPoint, radius_km: f64, b: &mut Binder) -> String {
    let (lat, lon) = (b.float(point.lat), b.float(point.lon));
    let radius = b.float(radius_km);
    format!("({} <= {radius})", haversine_sql(&lat, &lon))
}

fn location_predicate(locations: &[GeoRegion], b: &mut Binder) -> Option<String> {
    let parts: Vec<String> = locations.iter()
        .map(|region| match &region.extent {
            GeoExtent::BoundingBox(bbox) => bbox_predicate(bbox, b),
            GeoExtent::Point { point, radius_km } => point_predicate(point, *radius_km, b),
        })
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(" OR "))),
    }
}

/// WHERE conditions shared by every intent.
fn filters(plan: &QueryPlan, b: &mut Binder, with_location: bool) -> Vec<String> {
    let mut out = Vec::new();

    if !plan.float_ids.is_empty() {
        let placeholders: Vec<String> = plan.float_ids.iter().map(|id| b.bind(SqlValue::Int(*id))).collect();
        out.push(format!("float_id IN ({})", placeholders.join(", ")));
    }
    if let Some(range) = &plan.time_range {
        let start = b.bind(SqlValue::Timestamp(range.start));
        let end = b.bind(SqlValue::Timestamp(range.end));
        out.push(format!("\"timestamp\" BETWEEN {start} AND {end}"));
    }
    if with_location {
        if let Some(loc) = location_predicate(&plan.locations, b) {
            out.push(loc);
        }
    }
    if let Some(t) = &plan.threshold {
        if let Some(var) = t.variable {
            let value = b.float(t.value);
            out.push(format!("{} {} {value}", var.column(), t.op.sql()));
        }
    }
    if matches!(plan.intent, QueryIntent::Comparison | QueryIntent::TimeTrend) {
        for var in &plan.variables {
            out.push(format!("{} IS NOT NULL", var.column()));
        }
    }
    out
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn row_columns(variables: &[Variable]) -> Vec<String> {
    let mut cols: Vec<String> = Observation::KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
    cols.extend(variables.iter().map(|v| v.column().to_string()));
    cols
}

fn select_list(columns: &[String]) -> String {
    columns.iter()
        .map(|c| if c == "timestamp" { "\"timestamp\"".to_string() } else { c.clone() })
        .collect::<Vec<_>>()
        .join(", ")
}

fn variables_or_all(plan: &QueryPlan) -> Vec<Variable> {
    if plan.variables.is_empty() { Variable::ALL.to_vec() } else { plan.variables.clone() }
}

fn tail(plan: &QueryPlan, b: &mut Binder) -> String {
    let mut s = String::new();
    if let Some(order) = plan.order {
        s.push_str(" ORDER BY ");
        s.push_str(&order.sql());
    }
    let limit = b.bind(SqlValue::Int(i64::from(plan.limit)));
    s.push_str(&format!(" LIMIT {limit}"));
    s
}

fn compile_rows(plan: &QueryPlan, variables: &[Variable], b: &mut Binder) -> (String, Vec<String>) {
    let columns = row_columns(variables);
    let conditions = filters(plan, b, true);
    let sql = format!(
        "SELECT {} FROM {}{}{}",
        select_list(&columns), plan.table, where_clause(&conditions), tail(plan, b),
    );
    (sql, columns)
}

fn compile_statistic(plan: &QueryPlan, b: &mut Binder) -> (String, Vec<String>) {
    let aggregation = plan.aggregation.unwrap_or(Aggregation::Count);
    let mut select = Vec::new();
    let mut columns = Vec::new();
    let group = match plan.breakdown {
        Some(Breakdown::Monthly) => {
            select.push("DATE_TRUNC('month', \"timestamp\") AS period".to_string());
            columns.push("period".to_string());
            Some("period")
        }
        Some(Breakdown::PerFloat) => {
            select.push("float_id".to_string());
            columns.push("float_id".to_string());
            Some("float_id")
        }
        None => None,
    };

    if aggregation == Aggregation::Count && plan.variables.is_empty() {
        select.push("COUNT(*) AS observation_count".to_string());
        select.push("COUNT(DISTINCT float_id) AS float_count".to_string());
        columns.push("observation_count".to_string());
        columns.push("float_count".to_string());
    } else {
        for var in variables_or_all(plan) {
            let alias = format!("{}_{}", aggregation.label(), var.column());
            select.push(format!("{}({}) AS {alias}", aggregation.sql_fn(), var.column()));
            columns.push(alias);
        }
    }

    let conditions = filters(plan, b, true);
    let group_by = group.map(|g| format!(" GROUP BY {g}")).unwrap_or_default();
    let sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select.join(", "), plan.table, where_clause(&conditions), group_by, tail(plan, b),
    );
    (sql, columns)
}

fn compile_proximity(plan: &QueryPlan, b: &mut Binder) -> Result<(String, Vec<String>), QueryError> {
    let origin = plan.locations.first()
        .map(GeoRegion::center)
        .ok_or_else(|| QueryError::InsufficientEntities {
            intent: QueryIntent::Proximity,
            missing: "a resolved location".to_string(),
        })?;

    let (lat, lon) = (b.float(origin.lat), b.float(origin.lon));
    let mut columns = row_columns(&plan.variables);
    let inner_select = select_list(&columns);
    columns.push("distance_km".to_string());

    let conditions = filters(plan, b, false);
    let sql = format!(
        "SELECT {inner_select}, distance_km FROM (SELECT DISTINCT ON (float_id) {inner_select}, {} AS distance_km FROM {}{} \
         ORDER BY float_id, \"timestamp\" DESC) AS nearest{}",
        haversine_sql(&lat, &lon), plan.table, where_clause(&conditions), tail(plan, b),
    );
    Ok((sql, columns))
}

fn compile_listing(plan: &QueryPlan, b: &mut Binder) -> (String, Vec<String>) {
    if !plan.variables.is_empty() {
        return compile_rows(plan, &plan.variables, b);
    }
    let columns: Vec<String> = ["float_id", "observation_count", "first_seen", "last_seen", "last_latitude", "last_longitude"]
        .iter().map(|c| c.to_string()).collect();
    let conditions = filters(plan, b, true);
    let sql = format!(
        "SELECT float_id, COUNT(*) AS observation_count, MIN(\"timestamp\") AS first_seen, \
         MAX(\"timestamp\") AS last_seen, \
         (ARRAY_AGG(latitude ORDER BY \"timestamp\" DESC))[1] AS last_latitude, \
         (ARRAY_AGG(longitude ORDER BY \"timestamp\" DESC))[1] AS last_longitude \
         FROM {}{} GROUP BY float_id{}",
        plan.table, where_clause(&conditions), tail(plan, b),
    );
    (sql, columns)
}

fn unknown_plan_error(plan: &QueryPlan) -> QueryError {
    plan.insufficiency().unwrap_or_else(|| QueryError::AmbiguousIntent {
        cause: "plan has no recognized intent".to_string(),
    })
}

/// Compile a plan. Fails only for `unknown` plans, which must never run.
pub fn compile(plan: &QueryPlan) -> Result<CompiledQuery, QueryError> {
    let Some(shape) = ResultShape::for_intent(plan.intent) else {
        return Err(unknown_plan_error(plan));
    };

    let mut b = Binder::default();
    let (sql, columns) = match plan.intent {
        QueryIntent::RegionalStatistic => compile_statistic(plan, &mut b),
        QueryIntent::Proximity => compile_proximity(plan, &mut b)?,
        QueryIntent::Listing => compile_listing(plan, &mut b),
        QueryIntent::TimeTrend => compile_rows(plan, &variables_or_all(plan), &mut b),
        QueryIntent::Trajectory | QueryIntent::Comparison => compile_rows(plan, &plan.variables, &mut b),
        QueryIntent::Unknown => return Err(unknown_plan_error(plan)),
    };

    debug!(intent = %plan.intent, binds = b.values.len(), "compiled plan");
    Ok(CompiledQuery {
        sql,
        binds: b.values,
        result: ResultDescriptor {
            shape,
            units: columns.iter().map(|c| column_unit(c)).collect(),
            columns,
        },
        limit: plan.limit,
    })
}
