use clap::{ArgAction, Parser, Subcommand};
use notion_hugo::cache::SyncCache;
use notion_hugo::config::{self, SiteConfig};
use notion_hugo::imaging::RustBackend;
use notion_hugo::media::{BoundedFetcher, MediaStore, UreqTransport};
use notion_hugo::output;
use notion_hugo::source::{ContentSource, NotionClient, NotionSettings};
use notion_hugo::sync::{self, SyncOptions, SyncTarget};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notion-hugo")]
#[command(about = "Sync a Notion database into a Hugo content section")]
#[command(long_about = "\
Sync a Notion database into a Hugo content section

Every row with the Published checkbox set becomes one Markdown document with
YAML front matter. Images, videos, audio, and files hosted by Notion are
mirrored into the static directory so links never expire.

Layout after a sync:

  notion-hugo.toml                 # Optional config (see gen-config)
  .notion_cache.json               # Edit times and asset paths from the last run
  content/
  └── posts/
      ├── hello-world.md           # Slug property → file name
      └── 1f2e3d4c5b6a4978….md     # No slug → page id
  static/
  ├── images/3f1c0e2a9b7d4410.png  # Name derived from the asset URL
  ├── videos/
  ├── audio/
  └── files/

Database properties used:
  Title (title), Published (checkbox), Date (date), Slug (text), Tags (multi-select)

Documents whose last edit is older than the cache entry are skipped.
Run 'notion-hugo check' to verify the token and database schema.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILE_NAME, global = true)]
    config: PathBuf,

    /// Content directory (overrides paths.content_dir)
    #[arg(long, global = true)]
    content_dir: Option<PathBuf>,

    /// Static directory (overrides paths.static_dir)
    #[arg(long, global = true)]
    static_dir: Option<PathBuf>,

    /// Notion integration token
    #[arg(long, env = "NOTION_TOKEN", hide_env_values = true, global = true)]
    notion_token: Option<String>,

    /// Database to sync (overrides notion.database_id)
    #[arg(long, env = "NOTION_DATABASE_ID", global = true)]
    database_id: Option<String>,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert published documents and mirror their media
    Sync {
        /// Delete existing documents in the section first (implies --force)
        #[arg(long)]
        clean: bool,
        /// Recompile every document, even unchanged ones
        #[arg(long)]
        force: bool,
        /// Ignore the sync cache for this run
        #[arg(long)]
        no_cache: bool,
    },
    /// Verify the token, the database, and its properties
    Check,
    /// Print a stock notion-hugo.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Sync {
            clean,
            force,
            no_cache,
        } => {
            let (site_config, client) = connect(&cli)?;
            init_thread_pool(&site_config.processing);

            let cache_path = PathBuf::from(&site_config.paths.cache_file);
            let cache = Arc::new(if *no_cache {
                SyncCache::empty(cache_path)
            } else {
                SyncCache::load(cache_path)
            });
            let transport = Arc::new(UreqTransport::new(site_config.download.timeout()));
            let fetcher = BoundedFetcher::new(transport, site_config.download.max_concurrent)?;
            let media = MediaStore::new(
                &site_config.paths.static_dir,
                cache.clone(),
                fetcher,
                Arc::new(RustBackend::new()),
                site_config.media.optimize_settings(),
            );
            let target = SyncTarget {
                section_dir: site_config.section_dir(),
                section: site_config.paths.section.clone(),
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_sync_event(&event);
                }
            });
            let report = sync::sync(
                &client,
                &media,
                &cache,
                &target,
                SyncOptions {
                    clean: *clean,
                    force: *force,
                },
                Some(tx),
            );
            printer
                .join()
                .map_err(|_| "progress printer panicked")?;
            let report = report?;

            println!();
            output::print_sync_summary(&report);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Check => {
            let (site_config, client) = connect(&cli)?;
            println!("==> Checking database {}", site_config.notion.database_id);
            let info = client.inspect_database()?;
            let published = client.list_published_documents()?.len();
            output::print_check_output(&info, published);
            if info.warnings.is_empty() {
                println!("==> Database is ready to sync");
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn connect(cli: &Cli) -> Result<(SiteConfig, NotionClient), Box<dyn std::error::Error>> {
    let site_config = effective_config(cli)?;
    let client = NotionClient::new(notion_settings(cli, &site_config)?);
    Ok((site_config, client))
}

/// Config file values with command-line overrides applied.
fn effective_config(cli: &Cli) -> Result<SiteConfig, config::ConfigError> {
    let mut site_config = config::load_config(&cli.config)?;
    if let Some(dir) = &cli.content_dir {
        site_config.paths.content_dir = path_string(dir);
    }
    if let Some(dir) = &cli.static_dir {
        site_config.paths.static_dir = path_string(dir);
    }
    if let Some(id) = &cli.database_id {
        site_config.notion.database_id = id.clone();
    }
    site_config.validate()?;
    Ok(site_config)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// The token only ever comes from the flag or the environment.
fn notion_settings(cli: &Cli, site_config: &SiteConfig) -> Result<NotionSettings, String> {
    let token = cli
        .notion_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or("no Notion token: set NOTION_TOKEN or pass --notion-token")?;
    let database_id = site_config.notion.database_id.trim();
    if database_id.is_empty() {
        return Err(
            "no database id: set NOTION_DATABASE_ID, pass --database-id, or set notion.database_id"
                .to_string(),
        );
    }
    Ok(NotionSettings {
        token,
        database_id: database_id.to_string(),
        api_base: site_config.notion.api_base.clone(),
        api_version: site_config.notion.api_version.clone(),
        timeout: site_config.download.timeout(),
        retry: site_config.retry.policy(),
    })
}

/// Logs go to stderr so they never mix with the inventory on stdout.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
