//! End-to-end COG reader tests against GeoTIFFs built in memory.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndvits_cloud::{
    read_lonlat_window, reproject_bbox, BBox, CloudError, CogReader, CogReaderOptions, MemorySource,
    RangeSource,
};
use ndvits_core::{Raster, CRS};

const TILE: usize = 16;
const ORIGIN_X: f64 = 600_000.0;
const ORIGIN_Y: f64 = 5_120_000.0;
const PIXEL: f64 = 30.0;

#[derive(Clone, Copy)]
enum Order {
    Little,
    Big,
}

enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Double(Vec<f64>),
    Ascii(String),
}

impl Value {
    fn type_and_count(&self) -> (u16, u32) {
        match self {
            Value::Short(v) => (3, v.len() as u32),
            Value::Long(v) => (4, v.len() as u32),
            Value::Double(v) => (12, v.len() as u32),
            Value::Ascii(s) => (2, s.len() as u32 + 1),
        }
    }

    fn bytes(&self, o: Order) -> Vec<u8> {
        match self {
            Value::Short(v) => v.iter().flat_map(|x| u16b(*x, o)).collect(),
            Value::Long(v) => v.iter().flat_map(|x| u32b(*x, o)).collect(),
            Value::Double(v) => v
                .iter()
                .flat_map(|x| match o {
                    Order::Little => x.to_le_bytes(),
                    Order::Big => x.to_be_bytes(),
                })
                .collect(),
            Value::Ascii(s) => {
                let mut b = s.as_bytes().to_vec();
                b.push(0);
                b
            }
        }
    }
}

fn u16b(v: u16, o: Order) -> [u8; 2] {
    match o {
        Order::Little => v.to_le_bytes(),
        Order::Big => v.to_be_bytes(),
    }
}

fn u32b(v: u32, o: Order) -> [u8; 4] {
    match o {
        Order::Little => v.to_le_bytes(),
        Order::Big => v.to_be_bytes(),
    }
}

struct Layout {
    order: Order,
    deflate: bool,
    predictor: bool,
    nodata: Option<&'static str>,
    /// Level-0 tile written with byte count 0.
    sparse_tile: Option<usize>,
    overview: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            order: Order::Little,
            deflate: true,
            predictor: true,
            nodata: Some("0"),
            sparse_tile: None,
            overview: true,
        }
    }
}

/// Full resolution: 40 x 24 pixels, value 1000 + 100 * row + col.
fn level0(row: usize, col: usize) -> u16 {
    (1000 + 100 * row + col) as u16
}

/// 2x overview: 20 x 12 pixels, value 5000 + 10 * row + col.
fn level1(row: usize, col: usize) -> u16 {
    (5000 + 10 * row + col) as u16
}

fn encode_tile(layout: &Layout, width: usize, height: usize, tr: usize, tc: usize, f: fn(usize, usize) -> u16) -> Vec<u8> {
    let mut raw = Vec::with_capacity(TILE * TILE * 2);
    for r in 0..TILE {
        let mut prev = 0u16;
        for c in 0..TILE {
            let (row, col) = (tr * TILE + r, tc * TILE + c);
            let v = if row < height && col < width { f(row, col) } else { 0 };
            let stored = if layout.predictor && c > 0 { v.wrapping_sub(prev) } else { v };
            prev = v;
            raw.extend_from_slice(&u16b(stored, layout.order));
        }
    }
    if layout.deflate {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&raw).unwrap();
        enc.finish().unwrap()
    } else {
        raw
    }
}

fn build_cog(layout: &Layout) -> Vec<u8> {
    let o = layout.order;
    let mut file = match o {
        Order::Little => b"II".to_vec(),
        Order::Big => b"MM".to_vec(),
    };
    file.extend_from_slice(&u16b(42, o));
    file.extend_from_slice(&u32b(0, o)); // patched below

    let mut levels: Vec<(usize, usize, fn(usize, usize) -> u16)> = vec![(40, 24, level0)];
    if layout.overview {
        levels.push((20, 12, level1));
    }

    // tile data first, IFDs after
    let mut tables = Vec::new();
    for (li, &(w, h, f)) in levels.iter().enumerate() {
        let (across, down) = (w.div_ceil(TILE), h.div_ceil(TILE));
        let (mut offsets, mut counts) = (Vec::new(), Vec::new());
        for tr in 0..down {
            for tc in 0..across {
                let idx = tr * across + tc;
                if li == 0 && layout.sparse_tile == Some(idx) {
                    offsets.push(0);
                    counts.push(0);
                    continue;
                }
                let tile = encode_tile(layout, w, h, tr, tc, f);
                offsets.push(file.len() as u32);
                counts.push(tile.len() as u32);
                file.extend_from_slice(&tile);
            }
        }
        tables.push((offsets, counts));
    }

    let first_ifd = file.len() as u32;
    file[4..8].copy_from_slice(&u32b(first_ifd, o));

    for (li, (&(w, h, _), (offsets, counts))) in levels.iter().zip(tables).enumerate() {
        let mut entries: Vec<(u16, Value)> = Vec::new();
        if li > 0 {
            entries.push((254, Value::Long(vec![1])));
        }
        entries.push((256, Value::Short(vec![w as u16])));
        entries.push((257, Value::Short(vec![h as u16])));
        entries.push((258, Value::Short(vec![16])));
        entries.push((259, Value::Short(vec![if layout.deflate { 8 } else { 1 }])));
        entries.push((277, Value::Short(vec![1])));
        entries.push((317, Value::Short(vec![if layout.predictor { 2 } else { 1 }])));
        entries.push((322, Value::Short(vec![TILE as u16])));
        entries.push((323, Value::Short(vec![TILE as u16])));
        entries.push((324, Value::Long(offsets)));
        entries.push((325, Value::Long(counts)));
        entries.push((339, Value::Short(vec![1])));
        if li == 0 {
            entries.push((33550, Value::Double(vec![PIXEL, PIXEL, 0.0])));
            entries.push((33922, Value::Double(vec![0.0, 0.0, 0.0, ORIGIN_X, ORIGIN_Y, 0.0])));
            entries.push((
                34735,
                Value::Short(vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32615]),
            ));
            if let Some(nd) = layout.nodata {
                entries.push((42113, Value::Ascii(nd.to_string())));
            }
        }

        let ifd_start = file.len();
        let mut external_at = ifd_start + 2 + entries.len() * 12 + 4;
        let mut block = u16b(entries.len() as u16, o).to_vec();
        let mut external = Vec::new();
        for (tag, value) in &entries {
            let (type_id, count) = value.type_and_count();
            let bytes = value.bytes(o);
            block.extend_from_slice(&u16b(*tag, o));
            block.extend_from_slice(&u16b(type_id, o));
            block.extend_from_slice(&u32b(count, o));
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                block.extend_from_slice(&inline);
            } else {
                block.extend_from_slice(&u32b(external_at as u32, o));
                external_at += bytes.len();
                external.extend_from_slice(&bytes);
            }
        }
        let next = if li + 1 < levels.len() { external_at as u32 } else { 0 };
        block.extend_from_slice(&u32b(next, o));
        file.extend_from_slice(&block);
        file.extend_from_slice(&external);
    }

    file
}

fn window(col0: f64, row0: f64, col1: f64, row1: f64) -> BBox {
    BBox::new(
        ORIGIN_X + col0 * PIXEL,
        ORIGIN_Y - row1 * PIXEL,
        ORIGIN_X + col1 * PIXEL,
        ORIGIN_Y - row0 * PIXEL,
    )
}

async fn open(layout: &Layout) -> CogReader<MemorySource> {
    let source = MemorySource::new("memory.tif", build_cog(layout));
    CogReader::open(source, CogReaderOptions::default()).await.unwrap()
}

#[tokio::test]
async fn metadata_and_levels() {
    let reader = open(&Layout::default()).await;
    let meta = reader.metadata();
    assert_eq!((meta.width, meta.height), (40, 24));
    assert_eq!((meta.tile_width, meta.tile_height), (16, 16));
    assert_eq!(meta.compression, 8);
    assert_eq!(meta.predictor, 2);
    assert_eq!(meta.crs, Some(CRS::from_epsg(32615)));
    assert_eq!(meta.nodata, Some(0.0));
    assert_eq!(meta.num_overviews, 1);

    let sizes: Vec<f64> = reader.levels().iter().map(|l| l.pixel_size).collect();
    assert_eq!(sizes, vec![30.0, 60.0]);
    assert_eq!(reader.select_level(30.0), 0);
    assert_eq!(reader.select_level(60.0), 1);
    assert_eq!(reader.select_level(10.0), 0);
}

#[tokio::test]
async fn full_resolution_window_spans_tiles() {
    let reader = open(&Layout::default()).await;
    // cols 5..25 and rows 2..20 cross tile boundaries in both directions
    let raster: Raster<u16> = reader.read_window(&window(5.0, 2.0, 25.0, 20.0), 0).await.unwrap();

    assert_eq!(raster.shape(), (18, 20));
    assert_eq!(raster.get(0, 0).unwrap(), level0(2, 5));
    assert_eq!(raster.get(13, 10).unwrap(), level0(15, 15));
    assert_eq!(raster.get(14, 11).unwrap(), level0(16, 16));
    assert_eq!(raster.get(17, 19).unwrap(), level0(19, 24));

    let gt = raster.transform();
    assert_eq!(gt.origin_x, ORIGIN_X + 5.0 * PIXEL);
    assert_eq!(gt.origin_y, ORIGIN_Y - 2.0 * PIXEL);
    assert_eq!(raster.crs(), Some(&CRS::from_epsg(32615)));
    assert_eq!(raster.nodata(), Some(0));
}

#[tokio::test]
async fn overview_window() {
    let reader = open(&Layout::default()).await;
    let raster: Raster<f64> = reader.read_window(&window(5.0, 2.0, 25.0, 20.0), 1).await.unwrap();

    // 60 m pixels: cols 2..13, rows 1..10
    assert_eq!(raster.shape(), (9, 11));
    assert_eq!(raster.get(0, 0).unwrap(), level1(1, 2) as f64);
    assert_eq!(raster.get(8, 10).unwrap(), level1(9, 12) as f64);
    assert_eq!(raster.transform().pixel_width, 60.0);
}

#[tokio::test]
async fn big_endian_uncompressed() {
    let layout = Layout {
        order: Order::Big,
        deflate: false,
        predictor: false,
        nodata: None,
        ..Layout::default()
    };
    let reader = open(&layout).await;
    assert!(reader.metadata().nodata.is_none());

    let raster: Raster<u16> = reader.read_window(&window(30.0, 10.0, 40.0, 24.0), 0).await.unwrap();
    assert_eq!(raster.shape(), (14, 10));
    assert_eq!(raster.get(0, 0).unwrap(), level0(10, 30));
    assert_eq!(raster.get(13, 9).unwrap(), level0(23, 39));
}

#[tokio::test]
async fn big_endian_with_predictor() {
    let layout = Layout {
        order: Order::Big,
        ..Layout::default()
    };
    let reader = open(&layout).await;
    let raster: Raster<u16> = reader.read_window(&window(0.0, 0.0, 40.0, 24.0), 0).await.unwrap();
    assert_eq!(raster.get(23, 39).unwrap(), level0(23, 39));
    assert_eq!(raster.get(7, 17).unwrap(), level0(7, 17));
}

#[tokio::test]
async fn window_clipped_at_image_edge() {
    let reader = open(&Layout::default()).await;
    let raster: Raster<u16> = reader
        .read_window(&window(35.0, -5.0, 60.0, 3.0), 0)
        .await
        .unwrap();
    assert_eq!(raster.shape(), (3, 5));
    assert_eq!(raster.get(0, 0).unwrap(), level0(0, 35));
}

#[tokio::test]
async fn window_outside_image() {
    let reader = open(&Layout::default()).await;
    let res = reader.read_window::<u16>(&window(100.0, 100.0, 120.0, 120.0), 0).await;
    assert!(matches!(res, Err(CloudError::BBoxOutside)));
}

#[tokio::test]
async fn sparse_tile_reads_as_nodata() {
    let layout = Layout {
        sparse_tile: Some(0),
        ..Layout::default()
    };
    let reader = open(&layout).await;
    let raster: Raster<u16> = reader.read_window(&window(10.0, 10.0, 20.0, 20.0), 0).await.unwrap();

    // rows/cols < 16 fall in the missing tile
    assert_eq!(raster.get(0, 0).unwrap(), 0);
    assert!(raster.is_nodata(raster.get(5, 5).unwrap()));
    assert_eq!(raster.get(6, 6).unwrap(), level0(16, 16));
    assert_eq!(raster.valid_count(), 100 - 36);
}

/// Lon/lat box whose corners project to about (600300, 5119400) and
/// (600900, 5119700) in UTM 15N: cols 10..30, rows 10..20.
fn lonlat_window() -> BBox {
    BBox::new(-91.69942, 46.22069, -91.69171, 46.22348)
}

#[tokio::test]
async fn lonlat_window_is_reprojected_before_reading() {
    let reader = open(&Layout::default()).await;
    let lonlat = lonlat_window();

    let raster: Raster<u16> = read_lonlat_window(&reader, &lonlat, None, None).await.unwrap();
    let utm = reproject_bbox(&lonlat, &CRS::from_epsg(32615));
    let direct: Raster<u16> = reader.read_window(&utm, 0).await.unwrap();

    assert_eq!(raster.shape(), direct.shape());
    assert_eq!(raster.data(), direct.data());
    assert_eq!(raster.transform().origin_x, direct.transform().origin_x);
    assert_eq!(raster.crs(), Some(&CRS::from_epsg(32615)));

    let (rows, cols) = raster.shape();
    assert!((9..=12).contains(&rows), "rows {rows}");
    assert!((19..=22).contains(&cols), "cols {cols}");
    assert!((ORIGIN_X + 9.0 * PIXEL..=ORIGIN_X + 11.0 * PIXEL).contains(&raster.transform().origin_x));
}

#[tokio::test]
async fn scale_selects_the_overview() {
    let reader = open(&Layout::default()).await;
    let lonlat = lonlat_window();

    let full: Raster<f64> = read_lonlat_window(&reader, &lonlat, Some(30.0), None).await.unwrap();
    assert_eq!(full.transform().pixel_width, 30.0);

    let coarse: Raster<f64> = read_lonlat_window(&reader, &lonlat, Some(60.0), None).await.unwrap();
    assert_eq!(coarse.transform().pixel_width, 60.0);
    assert!(coarse.shape().0 < full.shape().0);
    assert!(coarse.data().iter().all(|&v| v >= 5000.0));
}

#[tokio::test]
async fn lonlat_window_away_from_the_scene() {
    let reader = open(&Layout::default()).await;
    let elsewhere = BBox::new(-91.3625, 46.1597, -91.3525, 46.1697);
    let res = read_lonlat_window::<_, u16>(&reader, &elsewhere, Some(30.0), Some(CRS::from_epsg(32615))).await;
    assert!(matches!(res, Err(CloudError::BBoxOutside)));
}

/// Memory source that counts range requests.
struct Counting {
    inner: MemorySource,
    fetches: Arc<AtomicUsize>,
}

impl RangeSource for Counting {
    fn location(&self) -> &str {
        self.inner.location()
    }

    async fn size(&self) -> ndvits_cloud::Result<Option<u64>> {
        self.inner.size().await
    }

    async fn fetch(&self, offset: u64, length: u64) -> ndvits_cloud::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(offset, length).await
    }
}

#[tokio::test]
async fn cached_tiles_are_not_refetched() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let source = Counting {
        inner: MemorySource::new("memory.tif", build_cog(&Layout::default())),
        fetches: Arc::clone(&fetches),
    };
    let reader = CogReader::open(source, CogReaderOptions::default()).await.unwrap();

    let bbox = window(5.0, 2.0, 25.0, 20.0);
    let before = fetches.load(Ordering::SeqCst);
    let first: Raster<u16> = reader.read_window(&bbox, 0).await.unwrap();
    let after_first = fetches.load(Ordering::SeqCst);
    assert_eq!(after_first - before, 4);

    let second: Raster<u16> = reader.read_window(&bbox, 0).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), after_first);
    assert_eq!(first.data(), second.data());
}

#[tokio::test]
async fn striped_tiff_is_rejected() {
    // header + one IFD with strip tags only
    let mut file = b"II".to_vec();
    file.extend_from_slice(&42u16.to_le_bytes());
    file.extend_from_slice(&8u32.to_le_bytes());
    let entries: [(u16, u16, u32, u32); 4] = [
        (256, 3, 1, 4),
        (257, 3, 1, 4),
        (273, 4, 1, 0),
        (279, 4, 1, 16),
    ];
    file.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, ty, count, value) in entries {
        file.extend_from_slice(&tag.to_le_bytes());
        file.extend_from_slice(&ty.to_le_bytes());
        file.extend_from_slice(&count.to_le_bytes());
        file.extend_from_slice(&value.to_le_bytes());
    }
    file.extend_from_slice(&0u32.to_le_bytes());

    let res = CogReader::open(MemorySource::new("strips.tif", file), CogReaderOptions::default()).await;
    assert!(matches!(res, Err(CloudError::UnsupportedLayout(_))));
}

#[tokio::test]
async fn garbage_is_not_a_tiff() {
    let res = CogReader::open(
        MemorySource::new("notes.txt", b"just some text, not an image".to_vec()),
        CogReaderOptions::default(),
    )
    .await;
    assert!(matches!(res, Err(CloudError::InvalidTiff { .. })));
}
