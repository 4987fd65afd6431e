//! Named imagery product queries.
//!
//! Products are identified the Earth Engine way
//! (`LANDSAT/LC09/C02/T1_L2`) and mapped onto the STAC Landsat Collection 2
//! Level-2 collection, filtered by platform and tier.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PipelineError, Result};

/// STAC collection holding every Landsat Collection 2 Level-2 scene.
pub const LANDSAT_COLLECTION: &str = "landsat-c2-l2";

/// Landsat sensor generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Landsat 5 Thematic Mapper
    Lt05,
    /// Landsat 7 Enhanced Thematic Mapper Plus
    Le07,
    /// Landsat 8 OLI/TIRS
    Lc08,
    /// Landsat 9 OLI-2/TIRS-2
    Lc09,
}

impl Sensor {
    pub fn code(self) -> &'static str {
        match self {
            Sensor::Lt05 => "LT05",
            Sensor::Le07 => "LE07",
            Sensor::Lc08 => "LC08",
            Sensor::Lc09 => "LC09",
        }
    }

    /// STAC `platform` value.
    pub fn platform(self) -> &'static str {
        match self {
            Sensor::Lt05 => "landsat-5",
            Sensor::Le07 => "landsat-7",
            Sensor::Lc08 => "landsat-8",
            Sensor::Lc09 => "landsat-9",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "LT05" => Some(Sensor::Lt05),
            "LE07" => Some(Sensor::Le07),
            "LC08" => Some(Sensor::Lc08),
            "LC09" => Some(Sensor::Lc09),
            _ => None,
        }
    }
}

/// Landsat collection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    T1,
    T2,
}

impl Tier {
    /// STAC `landsat:collection_category` value.
    pub fn category(self) -> &'static str {
        match self {
            Tier::T1 => "T1",
            Tier::T2 => "T2",
        }
    }
}

/// `LANDSAT/<sensor>/C02/<tier>_L2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProductId {
    pub sensor: Sensor,
    pub tier: Tier,
}

impl ProductId {
    pub fn new(sensor: Sensor, tier: Tier) -> Self {
        Self { sensor, tier }
    }

    pub fn collection(&self) -> &'static str {
        LANDSAT_COLLECTION
    }

    pub fn platform(&self) -> &'static str {
        self.sensor.platform()
    }

    pub fn category(&self) -> &'static str {
        self.tier.category()
    }
}

impl FromStr for ProductId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PipelineError::InvalidProductId(s.to_string());
        let parts: Vec<&str> = s.trim().split('/').collect();
        let [mission, sensor, collection, level] = parts.as_slice() else {
            return Err(invalid());
        };
        if *mission != "LANDSAT" || *collection != "C02" {
            return Err(invalid());
        }
        let sensor = Sensor::from_code(sensor).ok_or_else(invalid)?;
        let tier = match *level {
            "T1_L2" => Tier::T1,
            "T2_L2" => Tier::T2,
            _ => return Err(invalid()),
        };
        Ok(Self { sensor, tier })
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LANDSAT/{}/C02/{}_L2", self.sensor.code(), self.tier.category())
    }
}

impl Serialize for ProductId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One named query: product and `[start_date, end_date)` range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductQuery {
    pub name: String,
    pub id: ProductId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ProductQuery {
    pub fn new(
        name: impl Into<String>,
        id: ProductId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self> {
        let name = name.into();
        if start_date >= end_date {
            return Err(PipelineError::InvalidDateRange {
                product: name,
                reason: format!("start {start_date} is not before end {end_date}"),
            });
        }
        Ok(Self {
            name,
            id,
            start_date,
            end_date,
        })
    }

    /// Parse id and `YYYY-MM-DD` dates.
    pub fn parse(name: &str, id: &str, start_date: &str, end_date: &str) -> Result<Self> {
        let date = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
                PipelineError::InvalidDateRange {
                    product: name.to_string(),
                    reason: format!("'{value}': {e}"),
                }
            })
        };
        Self::new(name, id.parse()?, date(start_date)?, date(end_date)?)
    }

    /// Inclusive start, midnight UTC.
    pub fn start(&self) -> DateTime<Utc> {
        self.start_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Exclusive end, midnight UTC.
    pub fn end(&self) -> DateTime<Utc> {
        self.end_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// STAC `datetime` interval.
    pub fn datetime_range(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T00:00:00Z",
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d")
        )
    }

    /// Whether `t` falls in `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start() <= t && t < self.end()
    }
}

/// Built-in product lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Landsat 9, both tiers
    #[default]
    Default,
    /// Landsat 9, 8 and 7, both tiers
    All,
}

impl Preset {
    /// Product queries of this preset, in plotting order.
    pub fn products(self) -> Result<Vec<ProductQuery>> {
        let mut table = vec![
            ("LANDSAT 9 Tier 2", "LANDSAT/LC09/C02/T2_L2", "2021-10-31", "2024-04-18"),
            ("LANDSAT 9 Tier 1", "LANDSAT/LC09/C02/T1_L2", "2021-10-31", "2024-04-18"),
        ];
        if self == Preset::All {
            table.extend([
                ("LANDSAT 8 Tier 2", "LANDSAT/LC08/C02/T2_L2", "2013-03-18", "2024-04-13"),
                ("LANDSAT 8 Tier 1", "LANDSAT/LC08/C02/T1_L2", "2013-03-18", "2024-04-13"),
                ("LANDSAT 7 Tier 2", "LANDSAT/LE07/C02/T2_L2", "2013-01-01", "2024-01-19"),
                ("LANDSAT 7 Tier 1", "LANDSAT/LE07/C02/T1_L2", "2013-01-01", "2024-01-19"),
            ]);
        }
        table
            .into_iter()
            .map(|(name, id, start, end)| ProductQuery::parse(name, id, start, end))
            .collect()
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Preset::Default),
            "all" => Ok(Preset::All),
            other => Err(format!("unknown preset '{other}' (expected 'default' or 'all')")),
        }
    }
}

/// Entry of a products file.
#[derive(Debug, Deserialize)]
struct ProductEntry {
    id: String,
    start_date: String,
    end_date: String,
}

/// Parse a products file: a JSON object mapping product name to
/// `{ "id", "start_date", "end_date" }`. File order is kept.
pub fn parse_products(json: &str) -> Result<Vec<ProductQuery>> {
    let entries: IndexMap<String, ProductEntry> = serde_json::from_str(json)?;
    entries
        .iter()
        .map(|(name, e)| ProductQuery::parse(name, &e.id, &e.start_date, &e.end_date))
        .collect()
}

/// Read and parse a products file.
pub fn load_products(path: impl AsRef<Path>) -> Result<Vec<ProductQuery>> {
    let json = std::fs::read_to_string(path)?;
    parse_products(&json)
}
