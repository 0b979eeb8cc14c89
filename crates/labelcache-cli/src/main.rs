//! `labelcache`: seed, refresh, look up and query the known-beverage
//! reference cache.

mod display;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use labelcache_core::{
    Category, CheckPolicy, LabelFacts, Normalizer, REGISTRY_BASE_URL, Source, check_label,
};
use labelcache_store::DuckStore;
use labelcache_sync::{
    ApprovalQuery, CancelFlag, ClientConfig, Reconciler, RefreshConfig, Refresher, SyncError,
    TtbClient, search_candidates, seed_category,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "labelcache")]
#[command(about = "Beverage-label reference cache built from the TTB COLA registry")]
#[command(version)]
struct Cli {
    /// DuckDB cache file
    #[arg(long, env = "LABELCACHE_DB")]
    db: PathBuf,

    /// Registry base URL
    #[arg(long, env = "LABELCACHE_REGISTRY_URL", default_value = REGISTRY_BASE_URL)]
    registry_url: String,

    /// Minimum delay between registry requests, in milliseconds
    #[arg(long, env = "LABELCACHE_REQUEST_DELAY_MS", default_value_t = 1000)]
    request_delay_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed the cache with recent registry approvals
    Seed {
        #[arg(long, value_enum, default_value_t = CategoryArg::All)]
        category: CategoryArg,
        /// Records fetched per category
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Look-back period in months
        #[arg(long, default_value_t = 6)]
        months: u32,
        /// Report what would change without writing
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Re-check stale registry entries and refresh their provenance
    Refresh {
        /// Age in days after which an entry is stale
        #[arg(long, default_value_t = 30)]
        stale_days: u32,
        /// Maximum stale entries examined
        #[arg(long, default_value_t = 100)]
        max_candidates: usize,
        /// Registry rows searched per stale entry
        #[arg(long, default_value_t = 10)]
        window: usize,
        /// Look-back of the per-entry search, in months
        #[arg(long, default_value_t = 12)]
        window_months: u32,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Search the registry for one brand and show or cache the inferred records
    Lookup {
        /// Exact product or fanciful name
        #[arg(long)]
        brand: String,
        #[arg(long, value_enum, default_value_t = CategoryArg::All)]
        category: CategoryArg,
        /// Registry rows fetched
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Write the inferred records to the cache
        #[arg(long, default_value_t = false)]
        cache: bool,
        /// With --cache, report what would change without writing
        #[arg(long, default_value_t = false, requires = "cache")]
        dry_run: bool,
    },
    /// Validate label facts against the cache
    Check {
        #[arg(long)]
        brand: String,
        #[arg(long)]
        class_type: String,
        /// Stated alcohol by volume, percent
        #[arg(long)]
        abv: f64,
        /// Warn when the matched entry is older than this many days
        #[arg(long, default_value_t = 30)]
        stale_days: u32,
    },
    /// Per-category counts and average ABV of registry entries
    Summary,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    #[value(name = "wine")]
    Wine,
    #[value(name = "distilled_spirits")]
    DistilledSpirits,
    #[value(name = "malt_beverage")]
    MaltBeverage,
    #[value(name = "all")]
    All,
}

impl CategoryArg {
    fn categories(self) -> Vec<Category> {
        match self {
            Self::Wine => vec![Category::Wine],
            Self::DistilledSpirits => vec![Category::DistilledSpirits],
            Self::MaltBeverage => vec![Category::MaltBeverage],
            Self::All => Category::ALL.to_vec(),
        }
    }

    /// Single-category search filter; `None` searches every category.
    fn filter(self) -> Option<Category> {
        match self {
            Self::Wine => Some(Category::Wine),
            Self::DistilledSpirits => Some(Category::DistilledSpirits),
            Self::MaltBeverage => Some(Category::MaltBeverage),
            Self::All => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store = DuckStore::open_persistent(&cli.db)
        .with_context(|| format!("opening cache at {}", cli.db.display()))?;

    match cli.command {
        Commands::Seed {
            category,
            limit,
            months,
            dry_run,
        } => {
            let client = registry_client(&cli.registry_url, cli.request_delay_ms)?;
            let normalizer = Normalizer::new(client.base_url());
            cmd_seed(&store, &client, &normalizer, category, limit, months, dry_run).await
        }
        Commands::Refresh {
            stale_days,
            max_candidates,
            window,
            window_months,
            dry_run,
        } => {
            let client = registry_client(&cli.registry_url, cli.request_delay_ms)?;
            let config = RefreshConfig {
                window_rows: window,
                window_months,
            };
            let refresher = Refresher::new(&store, &client)
                .with_config(config)
                .with_normalizer(Normalizer::new(client.base_url()))
                .dry_run(dry_run)
                .with_cancel(interrupt_flag());
            if dry_run {
                println!("DRY RUN: no changes will be written\n");
            }
            let report = refresher
                .refresh(stale_days, max_candidates)
                .await
                .context("refresh failed")?;
            println!("{}", display::format_refresh_report(&report));
            Ok(())
        }
        Commands::Lookup {
            brand,
            category,
            limit,
            cache,
            dry_run,
        } => {
            let client = registry_client(&cli.registry_url, cli.request_delay_ms)?;
            let normalizer = Normalizer::new(client.base_url());
            let query = ApprovalQuery::for_brand(&brand, category.filter(), limit);
            if query.brand.as_deref().is_none_or(str::is_empty) {
                bail!("--brand must not be blank");
            }
            cmd_lookup(&store, &client, &normalizer, &query, cache, dry_run).await
        }
        Commands::Check {
            brand,
            class_type,
            abv,
            stale_days,
        } => {
            let facts = LabelFacts {
                brand_name: brand,
                class_type,
                abv,
            };
            let exact = store.find_by_brand_and_class(&facts.brand_name, &facts.class_type)?;
            let by_brand = store.find_by_brand(&facts.brand_name)?;
            let policy = CheckPolicy {
                staleness_threshold_days: i64::from(stale_days),
                ..CheckPolicy::default()
            };
            let check = check_label(&facts, &exact, &by_brand, &policy, Utc::now());
            println!("{}", display::format_label_check(&facts, &check));
            Ok(())
        }
        Commands::Summary => {
            let total = store.entry_count()?;
            let batches = store.category_summary(Source::TtbCola)?;
            display::print_summary(total, &batches)
        }
    }
}

fn registry_client(base_url: &str, delay_ms: u64) -> Result<TtbClient> {
    let config = ClientConfig {
        base_url: base_url.to_string(),
        request_delay: Duration::from_millis(delay_ms),
        ..ClientConfig::default()
    };
    TtbClient::new(config).context("building registry client")
}

/// Flag set on the first Ctrl-C; batches check it between records.
fn interrupt_flag() -> CancelFlag {
    let flag = CancelFlag::new();
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, rolling back the current batch");
            handle.cancel();
        }
    });
    flag
}

async fn cmd_seed(
    store: &DuckStore,
    client: &TtbClient,
    normalizer: &Normalizer,
    category: CategoryArg,
    limit: usize,
    months: u32,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("DRY RUN: no changes will be written\n");
    }
    let mut reconciler = Reconciler::new(store)
        .dry_run(dry_run)
        .with_cancel(interrupt_flag());

    let categories = category.categories();
    let mut failed = Vec::new();
    for category in &categories {
        let query = ApprovalQuery {
            category: Some(*category),
            brand: None,
            months_back: months,
            limit,
        };
        info!(%category, limit, months, "seeding category");
        match seed_category(client, normalizer, &mut reconciler, &query).await {
            Ok(report) => display::print_batch_report(category.as_str(), &report),
            Err(SyncError::Registry(e)) => {
                warn!(%category, error = %e, "registry search failed");
                println!("{category}: registry search failed: {e}");
                failed.push(*category);
            }
            Err(e) => return Err(e).with_context(|| format!("seeding {category}")),
        }
    }

    if !dry_run {
        let batches = store.category_summary(Source::TtbCola)?;
        display::print_summary(store.entry_count()?, &batches)?;
    }

    if !failed.is_empty() {
        bail!(
            "registry search failed for {} of {} categories",
            failed.len(),
            categories.len()
        );
    }
    Ok(())
}

async fn cmd_lookup(
    store: &DuckStore,
    client: &TtbClient,
    normalizer: &Normalizer,
    query: &ApprovalQuery,
    cache: bool,
    dry_run: bool,
) -> Result<()> {
    let brand = query.brand.as_deref().unwrap_or_default();
    info!(brand, category = ?query.category, limit = query.limit, cache, "looking up brand");

    if !cache {
        let (candidates, rejected) = search_candidates(client, normalizer, query)
            .await
            .with_context(|| format!("searching registry for {brand}"))?;
        println!("{}", display::format_candidates(brand, &candidates, rejected));
        return Ok(());
    }

    if dry_run {
        println!("DRY RUN: no changes will be written\n");
    }
    let mut reconciler = Reconciler::new(store)
        .dry_run(dry_run)
        .with_cancel(interrupt_flag());
    let report = seed_category(client, normalizer, &mut reconciler, query)
        .await
        .with_context(|| format!("caching registry matches for {brand}"))?;
    display::print_batch_report(brand, &report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_arguments_parse() {
        let cli = Cli::try_parse_from([
            "labelcache",
            "--db",
            "cache.duckdb",
            "seed",
            "--category",
            "distilled_spirits",
            "--limit",
            "25",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.db, PathBuf::from("cache.duckdb"));
        assert_eq!(cli.registry_url, REGISTRY_BASE_URL);
        match cli.command {
            Commands::Seed {
                category,
                limit,
                months,
                dry_run,
            } => {
                assert_eq!(category, CategoryArg::DistilledSpirits);
                assert_eq!(category.categories(), vec![Category::DistilledSpirits]);
                assert_eq!(limit, 25);
                assert_eq!(months, 6);
                assert!(dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn seed_defaults_to_all_categories() {
        let cli = Cli::try_parse_from(["labelcache", "--db", "x", "seed"]).unwrap();
        let Commands::Seed { category, .. } = cli.command else {
            panic!("expected seed");
        };
        assert_eq!(category.categories(), Category::ALL.to_vec());
    }

    #[test]
    fn refresh_defaults() {
        let cli = Cli::try_parse_from(["labelcache", "--db", "x", "refresh"]).unwrap();
        let Commands::Refresh {
            stale_days,
            max_candidates,
            window,
            window_months,
            dry_run,
        } = cli.command
        else {
            panic!("expected refresh");
        };
        assert_eq!(stale_days, 30);
        assert_eq!(max_candidates, 100);
        assert_eq!(window, 10);
        assert_eq!(window_months, 12);
        assert!(!dry_run);
    }

    #[test]
    fn check_requires_label_facts() {
        assert!(Cli::try_parse_from(["labelcache", "--db", "x", "check", "--brand", "Fetzer"]).is_err());
        let cli = Cli::try_parse_from([
            "labelcache",
            "--db",
            "x",
            "check",
            "--brand",
            "Fetzer",
            "--class-type",
            "TABLE RED WINE",
            "--abv",
            "13.5",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Check { abv, .. } if abv == 13.5));
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(
            Cli::try_parse_from(["labelcache", "--db", "x", "seed", "--category", "cider"])
                .is_err()
        );
    }

    #[test]
    fn negative_stale_days_are_rejected() {
        assert!(
            Cli::try_parse_from(["labelcache", "--db", "x", "refresh", "--stale-days", "-5"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "labelcache",
            "--db",
            "x",
            "refresh",
            "--stale-days",
            "4294967295",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Refresh { stale_days, .. } if stale_days == u32::MAX));
        assert!(
            Cli::try_parse_from([
                "labelcache",
                "--db",
                "x",
                "check",
                "--brand",
                "Fetzer",
                "--class-type",
                "TABLE RED WINE",
                "--abv",
                "12",
                "--stale-days",
                "-1",
            ])
            .is_err()
        );
    }

    #[test]
    fn lookup_arguments_parse() {
        let cli = Cli::try_parse_from([
            "labelcache",
            "--db",
            "x",
            "lookup",
            "--brand",
            "Fetzer",
            "--category",
            "wine",
            "--cache",
        ])
        .unwrap();
        let Commands::Lookup {
            brand,
            category,
            limit,
            cache,
            dry_run,
        } = cli.command
        else {
            panic!("expected lookup");
        };
        assert_eq!(brand, "Fetzer");
        assert_eq!(category.filter(), Some(Category::Wine));
        assert_eq!(limit, 20);
        assert!(cache);
        assert!(!dry_run);

        let query = ApprovalQuery::for_brand(&brand, category.filter(), limit);
        assert_eq!(query.brand.as_deref(), Some("Fetzer"));
        assert_eq!(query.category, Some(Category::Wine));
    }

    #[test]
    fn lookup_requires_brand_and_defaults_to_all_categories() {
        assert!(Cli::try_parse_from(["labelcache", "--db", "x", "lookup"]).is_err());
        let cli =
            Cli::try_parse_from(["labelcache", "--db", "x", "lookup", "--brand", "Bulleit"]).unwrap();
        let Commands::Lookup { category, cache, .. } = cli.command else {
            panic!("expected lookup");
        };
        assert_eq!(category.filter(), None);
        assert!(!cache);
    }

    #[test]
    fn lookup_dry_run_needs_cache() {
        assert!(
            Cli::try_parse_from([
                "labelcache",
                "--db",
                "x",
                "lookup",
                "--brand",
                "Bulleit",
                "--dry-run",
            ])
            .is_err()
        );
    }
}
