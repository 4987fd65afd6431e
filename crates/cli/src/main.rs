//! ndvits CLI - Landsat NDVI time series over an area of interest

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ndvits_cloud::{StacCatalog, SubscriptionKey};
use ndvits_pipeline::{
    extract_ndvi_timeseries, load_products, search, Aoi, ExtractOptions, ExtractProgress,
    ImagerySession, NdviSeries, Preset, ProductQuery, QueryOptions, SessionOptions,
    DEFAULT_SCALE,
};
use ndvits_plot::{combined_path, plot_combined, plot_series, series_path};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ndvits")]
#[command(author, version, about = "Landsat NDVI time series from STAC imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract NDVI time series and save the plots
    Run {
        #[command(flatten)]
        products: ProductArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Ground resolution in metres
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: f64,
        /// Directory for the PNG plots
        #[arg(short, long, env = "NDVITS_OUTPUT_DIR", default_value = ".")]
        output_dir: PathBuf,
        /// Also write every series as JSON
        #[arg(long)]
        series_json: Option<PathBuf>,
    },
    /// List the product queries and their STAC mapping
    Products {
        #[command(flatten)]
        products: ProductArgs,
    },
    /// List the items matching one product, without reading pixels
    Search {
        /// Product name, as listed by `ndvits products`
        name: String,
        #[command(flatten)]
        products: ProductArgs,
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    /// Landsat 9, Tier 1 and Tier 2
    Default,
    /// Landsat 9, 8 and 7, Tier 1 and Tier 2
    All,
}

impl From<PresetArg> for Preset {
    fn from(p: PresetArg) -> Self {
        match p {
            PresetArg::Default => Preset::Default,
            PresetArg::All => Preset::All,
        }
    }
}

#[derive(Args)]
struct ProductArgs {
    /// Built-in product list
    #[arg(long, value_enum, default_value = "default", conflicts_with = "products")]
    preset: PresetArg,
    /// JSON file mapping product names to {id, start_date, end_date}
    #[arg(long)]
    products: Option<PathBuf>,
}

#[derive(Args)]
struct SourceArgs {
    /// STAC catalog: pc (Planetary Computer), es (Earth Search) or an API URL
    #[arg(long, env = "NDVITS_CATALOG", default_value = "pc")]
    catalog: String,
    /// Planetary Computer subscription key
    #[arg(long, env = "PC_SDK_SUBSCRIPTION_KEY", hide_env_values = true)]
    subscription_key: Option<String>,
    /// Area of interest as "lon,lat;lon,lat;..." (default: the study site)
    #[arg(long)]
    aoi: Option<String>,
    /// Drop scenes with more cloud cover than this, in percent
    #[arg(long)]
    max_cloud_cover: Option<f64>,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Turns the search spinner into a per-item bar.
struct ItemProgress(ProgressBar);

impl ExtractProgress for ItemProgress {
    fn items_found(&self, count: usize) {
        self.0.set_length(count as u64);
        self.0.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} scenes")
                .unwrap()
                .progress_chars("=> "),
        );
    }

    fn item_done(&self, _item_id: &str) {
        self.0.inc(1);
    }
}

fn resolve_products(args: &ProductArgs) -> Result<Vec<ProductQuery>> {
    let products = match &args.products {
        Some(path) => load_products(path)
            .with_context(|| format!("Failed to load products from {}", path.display()))?,
        None => Preset::from(args.preset)
            .products()
            .context("Invalid built-in product preset")?,
    };
    if products.is_empty() {
        bail!("No products to process");
    }
    Ok(products)
}

fn resolve_aoi(args: &SourceArgs) -> Result<Aoi> {
    match &args.aoi {
        Some(s) => s.parse().context("Invalid --aoi"),
        None => Ok(Aoi::default()),
    }
}

fn query_options(args: &SourceArgs) -> Result<QueryOptions> {
    if let Some(cc) = args.max_cloud_cover {
        if !(0.0..=100.0).contains(&cc) {
            bail!("--max-cloud-cover must be within 0..100, got {}", cc);
        }
    }
    Ok(QueryOptions {
        max_cloud_cover: args.max_cloud_cover,
    })
}

async fn connect(args: &SourceArgs) -> Result<ImagerySession> {
    let catalog = StacCatalog::from_str_or_url(&args.catalog);
    let options = SessionOptions {
        subscription_key: args
            .subscription_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(SubscriptionKey::new),
        ..SessionOptions::default()
    };

    let pb = spinner(&format!("Connecting to {}...", catalog));
    let session = ImagerySession::connect(catalog, options)
        .await
        .context("Failed to initialize the imagery session")?;
    pb.finish_and_clear();
    Ok(session)
}

fn print_series(series: &NdviSeries) {
    let valid = series.finite_points().count();
    match series.value_range() {
        Some((lo, hi)) => println!(
            "{}: {} scenes, {} with valid NDVI (range {:.3} to {:.3})",
            series.product,
            series.len(),
            valid,
            lo,
            hi
        ),
        None => println!("{}: {} scenes, none with valid NDVI", series.product, series.len()),
    }
}

fn write_series_json(all: &[NdviSeries], path: &PathBuf) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), all).context("Failed to write series")?;
    println!("Series saved to: {}", path.display());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            products,
            source,
            scale,
            output_dir,
            series_json,
        } => {
            if !(scale.is_finite() && scale > 0.0) {
                bail!("--scale must be a positive number of metres, got {}", scale);
            }
            let products = resolve_products(&products)?;
            let aoi = resolve_aoi(&source)?;
            let options = ExtractOptions {
                scale,
                query: query_options(&source)?,
            };
            fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;

            let session = connect(&source).await?;
            info!("AOI bounds: {}", aoi);

            let start = Instant::now();
            let mut all = Vec::with_capacity(products.len());
            for product in &products {
                let progress = ItemProgress(spinner(&format!("{}...", product.name)));
                let series =
                    extract_ndvi_timeseries(&session, &aoi, product, &options, &progress)
                        .await
                        .with_context(|| format!("Failed to extract {}", product.name))?;
                progress.0.finish_and_clear();
                print_series(&series);

                let path = series_path(&output_dir, &product.name);
                plot_series(&series, &path)
                    .with_context(|| format!("Failed to plot {}", product.name))?;
                println!("Plot saved to: {}", path.display());
                all.push(series);
            }

            let path = combined_path(&output_dir);
            plot_combined(&all, &path).context("Failed to plot the combined series")?;
            println!("Combined plot saved to: {}", path.display());

            if let Some(json) = series_json {
                write_series_json(&all, &json)?;
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        Commands::Products { products } => {
            for p in resolve_products(&products)? {
                println!("{}", p.name);
                println!("  id:         {}", p.id);
                println!(
                    "  stac:       {} platform={} category={}",
                    p.id.collection(),
                    p.id.platform(),
                    p.id.category()
                );
                println!("  dates:      {} .. {} (end exclusive)", p.start_date, p.end_date);
            }
        }

        Commands::Search {
            name,
            products,
            source,
        } => {
            let products = resolve_products(&products)?;
            let Some(product) = products.iter().find(|p| p.name == name) else {
                let known: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
                bail!("Unknown product '{}'. Known: {}", name, known.join(", "));
            };
            let aoi = resolve_aoi(&source)?;
            let options = query_options(&source)?;
            let session = connect(&source).await?;

            let pb = spinner(&format!("Searching {}...", product.name));
            let items = search(&session, product, &aoi, &options).await?;
            pb.finish_and_clear();

            println!("{:<44} {:<22} {:>7}", "item", "datetime", "cloud %");
            for item in &items {
                let datetime = item
                    .datetime()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                let cloud = item
                    .cloud_cover()
                    .map(|c| format!("{:.1}", c))
                    .unwrap_or_else(|| "-".into());
                println!("{:<44} {:<22} {:>7}", item.id, datetime, cloud);
            }
            println!("{} items", items.len());
        }
    }

    Ok(())
}
