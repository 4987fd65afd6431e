//! Collection query: STAC search for one product over the AOI.
//!
//! The server-side `query` filter narrows the search by platform and tier;
//! results are filtered again client-side because not every STAC API
//! honours the query extension.

use std::collections::HashSet;

use ndvits_cloud::{BBox, StacItem, StacSearchParams};
use tracing::{debug, info};

use crate::aoi::Aoi;
use crate::error::Result;
use crate::product::ProductQuery;
use crate::session::ImagerySession;

/// Client-side filters on top of the product query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Maximum `eo:cloud_cover` in percent; items without a value are kept.
    pub max_cloud_cover: Option<f64>,
}

/// Search request for `product` over the AOI bounds.
pub fn search_params(product: &ProductQuery, bounds: &BBox, options: &QueryOptions) -> StacSearchParams {
    let mut params = StacSearchParams::new()
        .bbox(bounds)
        .datetime(product.datetime_range())
        .collections(&[product.id.collection()])
        .query("platform", "eq", product.id.platform())
        .query("landsat:collection_category", "eq", product.id.category());
    if let Some(max) = options.max_cloud_cover {
        params = params.query("eo:cloud_cover", "lte", max);
    }
    params
}

/// All items matching `product` over `aoi`, sorted by acquisition time.
pub async fn search(
    session: &ImagerySession,
    product: &ProductQuery,
    aoi: &Aoi,
    options: &QueryOptions,
) -> Result<Vec<StacItem>> {
    let bounds = aoi.bounds();
    let params = search_params(product, &bounds, options);
    let raw = session.client().search_all(&params).await?;
    let fetched = raw.len();
    let items = filter_items(raw, product, &bounds, options);
    info!(
        "{}: {} items ({} returned by the catalog)",
        product.name,
        items.len(),
        fetched
    );
    Ok(items)
}

/// Apply the client-side filters, drop duplicate ids and sort by datetime.
pub fn filter_items(
    items: Vec<StacItem>,
    product: &ProductQuery,
    bounds: &BBox,
    options: &QueryOptions,
) -> Vec<StacItem> {
    let mut seen = HashSet::new();
    let mut kept: Vec<StacItem> = items
        .into_iter()
        .filter(|item| {
            let keep = matches(item, product, bounds, options);
            if !keep {
                debug!("dropping {}", item.id);
            }
            keep
        })
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    kept.sort_by_key(|item| item.datetime());
    kept
}

fn matches(item: &StacItem, product: &ProductQuery, bounds: &BBox, options: &QueryOptions) -> bool {
    if item.platform().is_some_and(|p| p != product.id.platform()) {
        return false;
    }
    if item.collection_category().is_some_and(|c| c != product.id.category()) {
        return false;
    }
    if !item.datetime().is_some_and(|t| product.contains(t)) {
        return false;
    }
    if let (Some(max), Some(cc)) = (options.max_cloud_cover, item.cloud_cover()) {
        if cc > max {
            return false;
        }
    }
    item.bbox().map_or(true, |b| b.intersects(bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::Aoi;
    use crate::product::Preset;
    use serde_json::json;

    fn item(id: &str, datetime: &str, platform: &str, tier: &str, cc: f64) -> StacItem {
        serde_json::from_value(json!({
            "type": "Feature",
            "id": id,
            "collection": "landsat-c2-l2",
            "bbox": [-92.0, 45.5, -90.5, 47.0],
            "properties": {
                "datetime": datetime,
                "platform": platform,
                "landsat:collection_category": tier,
                "eo:cloud_cover": cc
            },
            "assets": {}
        }))
        .unwrap()
    }

    fn landsat9_t1() -> ProductQuery {
        Preset::Default.products().unwrap().remove(1)
    }

    #[test]
    fn params_carry_product_filters() {
        let product = landsat9_t1();
        let params = search_params(
            &product,
            &Aoi::default().bounds(),
            &QueryOptions { max_cloud_cover: Some(20.0) },
        );
        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(body["collections"], json!(["landsat-c2-l2"]));
        assert_eq!(body["datetime"], "2021-10-31T00:00:00Z/2024-04-18T00:00:00Z");
        assert_eq!(body["bbox"], json!([-91.3625, 46.1416, -91.33, 46.1597]));
        assert_eq!(body["query"]["platform"], json!({"eq": "landsat-9"}));
        assert_eq!(body["query"]["landsat:collection_category"], json!({"eq": "T1"}));
        assert_eq!(body["query"]["eo:cloud_cover"], json!({"lte": 20.0}));
    }

    #[test]
    fn filters_sorts_and_dedupes() {
        let product = landsat9_t1();
        let bounds = Aoi::default().bounds();
        let items = vec![
            item("b", "2023-07-10T16:50:00Z", "landsat-9", "T1", 5.0),
            item("a", "2022-05-01T16:50:00Z", "landsat-9", "T1", 50.0),
            item("b", "2023-07-10T16:50:00Z", "landsat-9", "T1", 5.0),
            item("wrong-tier", "2023-01-01T16:50:00Z", "landsat-9", "T2", 5.0),
            item("wrong-platform", "2023-01-01T16:50:00Z", "landsat-8", "T1", 5.0),
            item("too-late", "2024-04-18T00:00:00Z", "landsat-9", "T1", 5.0),
            item("too-early", "2021-10-30T23:59:59Z", "landsat-9", "T1", 5.0),
        ];

        let kept = filter_items(items, &product, &bounds, &QueryOptions::default());
        let ids: Vec<&str> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn cloud_cover_filter() {
        let product = landsat9_t1();
        let bounds = Aoi::default().bounds();
        let items = vec![
            item("clear", "2023-07-10T16:50:00Z", "landsat-9", "T1", 5.0),
            item("cloudy", "2023-07-26T16:50:00Z", "landsat-9", "T1", 80.0),
        ];
        let kept = filter_items(
            items,
            &product,
            &bounds,
            &QueryOptions { max_cloud_cover: Some(30.0) },
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "clear");
    }

    #[test]
    fn drops_items_outside_aoi() {
        let product = landsat9_t1();
        let far = BBox::new(10.0, 10.0, 11.0, 11.0);
        let items = vec![item("x", "2023-07-10T16:50:00Z", "landsat-9", "T1", 5.0)];
        assert!(filter_items(items, &product, &far, &QueryOptions::default()).is_empty());
    }
}
