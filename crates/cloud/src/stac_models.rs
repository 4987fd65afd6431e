//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (`POST /search`) requests and
//! responses, covering what a Landsat time series needs: bbox, datetime,
//! collection and property filters, pagination links, and asset hrefs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tile_index::BBox;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Query extension: `{ "<property>": { "<op>": <value> } }`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,

    /// Pagination token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[west, south, east, north]` in WGS84 degrees.
    pub fn bbox(mut self, bbox: &BBox) -> Self {
        self.bbox = Some(bbox.to_array());
        self
    }

    /// Datetime or interval, e.g. `"2021-10-31T00:00:00Z/2024-04-18T00:00:00Z"`.
    pub fn datetime(mut self, dt: impl Into<String>) -> Self {
        self.datetime = Some(dt.into());
        self
    }

    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a query-extension condition, e.g. `("platform", "eq", "landsat-9")`.
    pub fn query(mut self, property: &str, op: &str, value: impl Into<Value>) -> Self {
        let query = self.query.get_or_insert_with(Map::new);
        let ops = query
            .entry(property.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ops) = ops {
            ops.insert(op.to_string(), value.into());
        }
        self
    }

    pub fn token(mut self, tok: &str) -> Self {
        self.token = Some(tok.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One page of search results (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,
}

impl StacItemCollection {
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A single STAC Item (one Landsat scene).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Acquisition time.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.properties.datetime
    }

    pub fn platform(&self) -> Option<&str> {
        self.properties.platform.as_deref()
    }

    /// Landsat tier, `"T1"` or `"T2"`.
    pub fn collection_category(&self) -> Option<&str> {
        self.properties.collection_category.as_deref()
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }

    /// EPSG code from `proj:epsg`, or from `proj:code` (`"EPSG:32615"`).
    pub fn epsg(&self) -> Option<u32> {
        let props = &self.properties.extra;
        props
            .get("proj:epsg")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or_else(|| {
                props
                    .get("proj:code")
                    .and_then(Value::as_str)
                    .and_then(|c| c.strip_prefix("EPSG:"))
                    .and_then(|c| c.parse().ok())
            })
    }

    /// Footprint envelope in WGS84.
    pub fn bbox(&self) -> Option<BBox> {
        match self.bbox.as_deref()? {
            [w, s, e, n] => Some(BBox::new(*w, *s, *e, *n)),
            // 3D bbox: west, south, min z, east, north, max z
            [w, s, _, e, n, _] => Some(BBox::new(*w, *s, *e, *n)),
            _ => None,
        }
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// Nominal acquisition time; `null` for interval items.
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,

    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(rename = "landsat:collection_category", skip_serializing_if = "Option::is_none")]
    pub collection_category: Option<String>,

    /// Everything else.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A file referenced by an item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// A link; `next` links drive pagination.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    pub rel: String,
    pub href: String,

    /// `GET` when absent; `next` links often use `POST`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Merge `body` into the previous request body instead of replacing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "stac_version": "1.0.0",
      "id": "LC09_L2SP_025028_20230714_02_T1",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[-92.9, 47.4], [-90.5, 47.0], [-91.1, 45.3], [-93.4, 45.7], [-92.9, 47.4]]]
      },
      "bbox": [-93.43, 45.29, -90.49, 47.44],
      "properties": {
        "datetime": "2023-07-14T16:50:25.117264Z",
        "platform": "landsat-9",
        "eo:cloud_cover": 12.5,
        "landsat:collection_category": "T1",
        "landsat:wrs_path": "025",
        "proj:epsg": 32615
      },
      "assets": {
        "red": {
          "href": "https://landsateuwest.blob.core.windows.net/landsat-c2/level-2/LC09_SR_B4.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Red Band",
          "roles": ["data"]
        },
        "nir08": {
          "href": "https://landsateuwest.blob.core.windows.net/landsat-c2/level-2/LC09_SR_B5.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Near Infrared Band 0.8",
          "roles": ["data", "reflectance"]
        }
      },
      "collection": "landsat-c2-l2",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search",
      "method": "POST",
      "body": {"token": "next:LC09_L2SP_025028_20230714_02_T1"},
      "merge": true
    }
  ],
  "numberMatched": 57
}"#;

    fn item() -> StacItem {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        col.features.into_iter().next().unwrap()
    }

    #[test]
    fn parse_landsat_item() {
        let item = item();
        assert_eq!(item.id, "LC09_L2SP_025028_20230714_02_T1");
        assert_eq!(item.collection.as_deref(), Some("landsat-c2-l2"));
        assert_eq!(item.platform(), Some("landsat-9"));
        assert_eq!(item.collection_category(), Some("T1"));
        assert_eq!(item.cloud_cover(), Some(12.5));
        assert_eq!(item.epsg(), Some(32615));
        assert!(item.properties.extra.contains_key("landsat:wrs_path"));
    }

    #[test]
    fn datetime_is_parsed_as_utc() {
        let dt = item().datetime().unwrap();
        let day = Utc.with_ymd_and_hms(2023, 7, 14, 0, 0, 0).unwrap();
        assert!(dt > day && dt < day + chrono::Duration::days(1));
    }

    #[test]
    fn common_name_assets() {
        let item = item();
        assert!(item.asset("red").unwrap().href.ends_with("SR_B4.TIF"));
        assert!(item.asset("nir08").unwrap().href.ends_with("SR_B5.TIF"));
        assert!(item.asset("nir").is_none());
    }

    #[test]
    fn footprint_bbox() {
        let bbox = item().bbox().unwrap();
        assert_eq!(bbox, BBox::new(-93.43, 45.29, -90.49, 47.44));
        assert!(bbox.intersects(&BBox::new(-91.3625, 46.1416, -91.33, 46.1597)));
    }

    #[test]
    fn proj_code_fallback() {
        let mut item = item();
        item.properties.extra.remove("proj:epsg");
        item.properties
            .extra
            .insert("proj:code".into(), Value::String("EPSG:32616".into()));
        assert_eq!(item.epsg(), Some(32616));
    }

    #[test]
    fn null_datetime_is_accepted() {
        let json = r#"{"id": "x", "properties": {"datetime": null}, "assets": {}}"#;
        let item: StacItem = serde_json::from_str(json).unwrap();
        assert!(item.datetime().is_none());
    }

    #[test]
    fn pagination_link() {
        let col: StacItemCollection = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(col.number_matched, Some(57));
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
        assert!(next.body.as_ref().unwrap().get("token").is_some());
    }

    #[test]
    fn search_body_with_query_extension() {
        let params = StacSearchParams::new()
            .bbox(&BBox::new(-91.3625, 46.1416, -91.33, 46.1597))
            .datetime("2021-10-31T00:00:00Z/2024-04-18T00:00:00Z")
            .collections(&["landsat-c2-l2"])
            .limit(100)
            .query("platform", "eq", "landsat-9")
            .query("landsat:collection_category", "eq", "T2")
            .query("eo:cloud_cover", "lte", 40.0);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["bbox"], serde_json::json!([-91.3625, 46.1416, -91.33, 46.1597]));
        assert_eq!(json["collections"], serde_json::json!(["landsat-c2-l2"]));
        assert_eq!(json["query"]["platform"]["eq"], "landsat-9");
        assert_eq!(json["query"]["landsat:collection_category"]["eq"], "T2");
        assert_eq!(json["query"]["eo:cloud_cover"]["lte"], 40.0);
        assert!(json.get("token").is_none());
    }

    #[test]
    fn empty_params_serialize_to_empty_object() {
        let json = serde_json::to_value(StacSearchParams::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }
}
