//! End-to-end extraction against Planetary Computer.
//!
//! Ignored by default; run with `cargo test -p ndvits-pipeline -- --ignored`.

use ndvits_cloud::StacCatalog;
use ndvits_pipeline::{
    extract_ndvi_timeseries, search, Aoi, ExtractOptions, ImagerySession, ProductQuery,
    QueryOptions, SessionOptions,
};

fn summer_2023() -> ProductQuery {
    ProductQuery::parse(
        "LANDSAT 9 Tier 1",
        "LANDSAT/LC09/C02/T1_L2",
        "2023-06-01",
        "2023-09-01",
    )
    .unwrap()
}

async fn session() -> ImagerySession {
    ImagerySession::connect(StacCatalog::PlanetaryComputer, SessionOptions::from_env())
        .await
        .expect("connect failed")
}

#[tokio::test]
#[ignore]
async fn search_returns_sorted_landsat9_items() {
    let session = session().await;
    let product = summer_2023();
    let items = search(&session, &product, &Aoi::default(), &QueryOptions::default())
        .await
        .expect("search failed");

    assert!(!items.is_empty());
    for pair in items.windows(2) {
        assert!(pair[0].datetime() <= pair[1].datetime());
    }
    for item in &items {
        assert_eq!(item.platform(), Some("landsat-9"));
        assert_eq!(item.collection_category(), Some("T1"));
        assert!(item.datetime().is_some_and(|t| product.contains(t)));
    }
}

#[tokio::test]
#[ignore]
async fn summer_ndvi_over_forest_is_high() {
    let session = session().await;
    let options = ExtractOptions {
        query: QueryOptions {
            max_cloud_cover: Some(10.0),
        },
        ..ExtractOptions::default()
    };
    let series = extract_ndvi_timeseries(&session, &Aoi::default(), &summer_2023(), &options, &())
        .await
        .expect("extraction failed");

    println!("{}", serde_json::to_string_pretty(&series).unwrap());
    let (_, hi) = series.value_range().expect("no valid sample");
    // mixed forest and wetland in northern Wisconsin
    assert!(hi > 0.5, "peak summer NDVI {hi}");
    assert!(series.samples.iter().all(|s| s.valid_pixels <= 90 * 70));
}
