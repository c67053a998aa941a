//! ARGO observation schema as stored by the loader.
//! The query engine only ever reads these rows through synthesized SQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical table holding one row per float measurement.
pub const OBSERVATIONS_TABLE: &str = "argo_data";

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub float_id: i64,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    pub dissolved_oxygen: Option<f64>,
    pub chlorophyll: Option<f64>,
}

impl Observation {
    /// Identity and position columns, in table order.
    pub const KEY_COLUMNS: [&'static str; 4] = ["float_id", "timestamp", "latitude", "longitude"];
}

// ---------------------------------------------------------------------------
// Measured variables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Salinity,
    Pressure,
    DissolvedOxygen,
    Chlorophyll,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::Temperature,
        Variable::Salinity,
        Variable::Pressure,
        Variable::DissolvedOxygen,
        Variable::Chlorophyll,
    ];

    /// Column name in `argo_data`. The only source of variable identifiers in SQL.
    pub fn column(&self) -> &'static str {
        match self {
            Variable::Temperature     => "temperature",
            Variable::Salinity        => "salinity",
            Variable::Pressure        => "pressure",
            Variable::DissolvedOxygen => "dissolved_oxygen",
            Variable::Chlorophyll     => "chlorophyll",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Variable::Temperature     => "°C",
            Variable::Salinity        => "PSU",
            Variable::Pressure        => "dbar",
            Variable::DissolvedOxygen => "µmol/kg",
            Variable::Chlorophyll     => "mg/m³",
        }
    }

    pub fn from_column(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.column() == s)
    }
}
