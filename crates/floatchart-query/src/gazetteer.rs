//! Gazetteer: named ocean regions and coastal cities.
//!
//! Built once at startup and shared read-only behind an `Arc`. Two lookups:
//! - `resolve` for a single phrase (exact → prefix → substring, registration order breaks ties)
//! - `scan` for every name occurring in a text (Aho-Corasick, longest match wins)

use std::path::Path;

use aho_corasick::{AhoCorasick, MatchKind};
use floatchart_common::{
    BoundingBox, FloatChartError, GeoExtent, GeoPoint, GeoRegion, RegionKind,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Prefix and substring matching only apply to phrases at least this long.
const MIN_PARTIAL_MATCH_LEN: usize = 3;

/// Search radius used for point locations that do not declare one.
pub const DEFAULT_CITY_RADIUS_KM: f64 = 300.0;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("location \"{0}\" is not in the gazetteer")]
pub struct UnresolvedLocation(pub String);

/// A gazetteer name found inside a text.
#[derive(Debug, Clone)]
pub struct LocationMatch<'g> {
    pub region: &'g GeoRegion,
    pub start: usize,
    pub end: usize,
}

pub struct Gazetteer {
    regions: Vec<GeoRegion>,
    /// Lower-cased names and aliases with their region index, in registration order.
    names: Vec<(String, usize)>,
    automaton: AhoCorasick,
}

impl std::fmt::Debug for Gazetteer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gazetteer")
            .field("regions", &self.regions.len())
            .field("names", &self.names.len())
            .finish()
    }
}

impl Gazetteer {
    pub fn new(regions: Vec<GeoRegion>) -> floatchart_common::Result<Self> {
        let mut names = Vec::new();
        for (idx, region) in regions.iter().enumerate() {
            if let GeoExtent::BoundingBox(bbox) = &region.extent {
                if !bbox.is_valid() {
                    return Err(FloatChartError::Gazetteer(format!(
                        "region {} has an invalid bounding box", region.name
                    )));
                }
            }
            for name in std::iter::once(&region.name).chain(region.aliases.iter()) {
                let key = normalize_name(name);
                if !key.is_empty() {
                    names.push((key, idx));
                }
            }
        }

        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .ascii_case_insensitive(true)
            .build(names.iter().map(|(n, _)| n.as_str()))
            .map_err(|e| FloatChartError::Gazetteer(e.to_string()))?;

        Ok(Self { regions, names, automaton })
    }

    /// Regions bundled with the engine, covering the seas the loader fetches plus major ports.
    pub fn builtin() -> Self {
        Self::new(builtin_regions()).expect("Failed to build gazetteer from embedded data")
    }

    /// Parse a TOML gazetteer made of `[[region]]` tables.
    pub fn from_toml_str(content: &str) -> floatchart_common::Result<Self> {
        let file: GazetteerFile = toml::from_str(content)?;
        let regions = file.regions
            .into_iter()
            .map(RegionRecord::into_region)
            .collect::<floatchart_common::Result<Vec<_>>>()?;
        Self::new(regions)
    }

    pub fn load(path: impl AsRef<Path>) -> floatchart_common::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let gazetteer = Self::from_toml_str(&content)?;
        info!("Gazetteer loaded from {:?}: {} regions", path.as_ref(), gazetteer.len());
        Ok(gazetteer)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[GeoRegion] {
        &self.regions
    }

    /// Resolve one phrase. Exact name or alias first, then prefix, then substring.
    pub fn resolve(&self, name: &str) -> Result<&GeoRegion, UnresolvedLocation> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Err(UnresolvedLocation(name.trim().to_string()));
        }

        let hit = self.names.iter().find(|(n, _)| *n == key).or_else(|| {
            if key.len() < MIN_PARTIAL_MATCH_LEN {
                return None;
            }
            self.names.iter()
                .find(|(n, _)| n.starts_with(&key))
                .or_else(|| self.names.iter().find(|(n, _)| n.contains(&key)))
        });

        hit.map(|(_, idx)| &self.regions[*idx])
            .ok_or_else(|| UnresolvedLocation(name.trim().to_string()))
    }

    /// Every gazetteer name occurring in `text` on word boundaries. Overlaps keep the longest.
    pub fn scan<'g>(&'g self, text: &str) -> Vec<LocationMatch<'g>> {
        self.automaton
            .find_iter(text)
            .filter(|m| is_word_boundary(text, m.start(), m.end()))
            .map(|m| LocationMatch {
                region: &self.regions[self.names[m.pattern().as_usize()].1],
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }
}

fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.strip_prefix("the ").map(str::to_string).unwrap_or(collapsed)
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

// ── File format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GazetteerFile {
    #[serde(rename = "region", default)]
    regions: Vec<RegionRecord>,
}

#[derive(Debug, Deserialize)]
struct RegionRecord {
    name: String,
    kind: Option<RegionKind>,
    #[serde(default)]
    aliases: Vec<String>,
    bbox: Option<BoundingBox>,
    point: Option<GeoPoint>,
    radius_km: Option<f64>,
}

impl RegionRecord {
    fn into_region(self) -> floatchart_common::Result<GeoRegion> {
        let (kind, extent) = match (self.bbox, self.point) {
            (Some(bbox), None) => (
                self.kind.unwrap_or(RegionKind::Region),
                GeoExtent::BoundingBox(bbox),
            ),
            (None, Some(point)) => (
                self.kind.unwrap_or(RegionKind::City),
                GeoExtent::Point {
                    point,
                    radius_km: self.radius_km.unwrap_or(DEFAULT_CITY_RADIUS_KM),
                },
            ),
            _ => {
                return Err(FloatChartError::Gazetteer(format!(
                    "region {} needs exactly one of `bbox` or `point`", self.name
                )))
            }
        };
        Ok(GeoRegion { name: self.name, kind, aliases: self.aliases, extent })
    }
}

// ── Embedded data ─────────────────────────────────────────────────────────────

fn region(name: &str, aliases: &[&str], lat: (f64, f64), lon: (f64, f64)) -> GeoRegion {
    GeoRegion {
        name: name.to_string(),
        kind: RegionKind::Region,
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        extent: GeoExtent::BoundingBox(BoundingBox {
            min_lat: lat.0,
            max_lat: lat.1,
            min_lon: lon.0,
            max_lon: lon.1,
        }),
    }
}

fn city(name: &str, aliases: &[&str], lat: f64, lon: f64) -> GeoRegion {
    GeoRegion {
        name: name.to_string(),
        kind: RegionKind::City,
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        extent: GeoExtent::Point {
            point: GeoPoint { lat, lon },
            radius_km: DEFAULT_CITY_RADIUS_KM,
        },
    }
}

fn builtin_regions() -> Vec<GeoRegion> {
    vec![
        // Indian Ocean basins first: ties resolve in their favour
        region("Bay of Bengal", &["bengal", "bengal bay"], (5.0, 22.0), (80.0, 95.0)),
        region("Arabian Sea", &["arabian"], (5.0, 25.0), (50.0, 75.0)),
        region("Laccadive Sea", &["lakshadweep sea"], (6.0, 14.0), (71.0, 79.0)),
        region("Andaman Sea", &["andaman"], (5.0, 17.0), (92.0, 99.0)),
        region("Indian Ocean", &["indian"], (-40.0, 25.0), (30.0, 120.0)),
        region("Red Sea", &[], (14.0, 28.0), (34.0, 42.0)),
        region("Persian Gulf", &["arabian gulf"], (24.0, 30.0), (48.0, 56.0)),
        region("South China Sea", &[], (0.0, 25.0), (100.0, 121.0)),
        region("Pacific Ocean", &["pacific"], (-60.0, 60.0), (100.0, -70.0)),
        region("Atlantic Ocean", &["atlantic"], (-60.0, 60.0), (-80.0, 0.0)),
        region("Mediterranean Sea", &["mediterranean"], (30.0, 46.0), (-6.0, 36.0)),
        region("Caribbean Sea", &["caribbean"], (10.0, 22.0), (-88.0, -60.0)),
        region("Gulf of Mexico", &["mexican gulf"], (18.0, 31.0), (-98.0, -80.0)),
        region("Southern Ocean", &["antarctic ocean"], (-80.0, -45.0), (-180.0, 180.0)),
        // Coastal cities
        city("Chennai", &["madras"], 13.08, 80.27),
        city("Mumbai", &["bombay"], 19.08, 72.88),
        city("Kochi", &["cochin"], 9.93, 76.27),
        city("Visakhapatnam", &["vizag"], 17.69, 83.22),
        city("Kolkata", &["calcutta"], 22.57, 88.36),
        city("Goa", &[], 15.30, 73.80),
        city("Port Blair", &[], 11.62, 92.73),
        city("Colombo", &[], 6.93, 79.84),
        city("Karachi", &[], 24.86, 67.01),
        city("Muscat", &[], 23.59, 58.41),
        city("Singapore", &[], 1.29, 103.85),
        city("Perth", &[], -31.95, 115.86),
    ]
}
