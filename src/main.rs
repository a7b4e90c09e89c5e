mod config;
mod export;
mod identifier;
mod models;
mod pipeline;
mod scraper;
mod site;
mod storage;
mod utils;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::models::Notice;
use crate::pipeline::batch::{backfill, record_run};
use crate::pipeline::{Mode, Pipeline};
use crate::scraper::EdisScraper;
use crate::site::Resolution;
use crate::storage::query::{ListQuery, SearchQuery};
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "funebres", about = "Funeral notice scraper and archive", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape one edition (daily mode, refuses dates already stored)
    Scrape {
        /// Edition date, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Re-scrape one edition and insert only notices not yet stored
    Recover {
        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Ingest every edition in an inclusive date range, one by one
    Backfill {
        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long, value_enum, default_value_t = Mode::Recover)]
        mode: Mode,
    },

    /// Paginated listing of stored notices
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = storage::query::DEFAULT_LIMIT)]
        limit: u32,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        #[arg(long, default_value = "published_on")]
        order_by: String,

        #[arg(long, default_value = "desc")]
        direction: String,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Full-text search over names and notice bodies
    Search {
        query: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        json: bool,
    },

    /// Print one notice by hash_id as JSON
    Get { hash_id: String },

    /// Resolve a permalink (`YYYY-MM-DD` + `slug-hashid`)
    Show { date: String, name_hash: String },

    /// Generate sitemap.xml
    Sitemap {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Dump every stored notice to CSV
    Export {
        #[arg(short, long, default_value = "data/funeral_notices.csv")]
        output: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "funebres=info,warn",
        1 => "funebres=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Scrape { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let _t = utils::Timer::start(format!("Scrape {}", date));
            let repo = open_repo(&config)?;
            let pipeline = build_pipeline(&config, &repo)?;
            record_run(&pipeline, &repo, date, Mode::Scrape).await?;
        }

        Command::Recover { date } => {
            let _t = utils::Timer::start(format!("Recover {}", date));
            let repo = open_repo(&config)?;
            let pipeline = build_pipeline(&config, &repo)?;
            record_run(&pipeline, &repo, date, Mode::Recover).await?;
        }

        Command::Backfill { from, to, mode } => {
            if from > to {
                bail!("--from {} is after --to {}", from, to);
            }
            let _t = utils::Timer::start(format!("Backfill {} → {} ({})", from, to, mode));
            let repo = open_repo(&config)?;
            let pipeline = build_pipeline(&config, &repo)?;

            let summary = backfill(&pipeline, &repo, from, to, mode).await;
            for (date, error) in &summary.failures {
                println!("  {}  {}", date, error);
            }
        }

        Command::List {
            page,
            limit,
            from,
            to,
            order_by,
            direction,
            json,
        } => {
            let query = ListQuery::from_params(
                page,
                limit,
                from.as_deref(),
                to.as_deref(),
                &order_by,
                &direction,
            )?;
            let repo = open_repo(&config)?;
            let result = repo.list(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_notices(&result.items);
                println!(
                    "page {}/{} ({} notices)",
                    result.page,
                    result.total_pages,
                    utils::fmt_number(result.total as i64)
                );
            }
        }

        Command::Search {
            query,
            from,
            to,
            limit,
            json,
        } => {
            let query = SearchQuery::from_params(&query, from.as_deref(), to.as_deref(), limit)?;
            let repo = open_repo(&config)?;
            let hits = repo.search(&query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No notices match {:?}.", query.text);
            } else {
                print_notices(&hits);
            }
        }

        Command::Get { hash_id } => {
            let repo = open_repo(&config)?;
            match repo.find_by_hash_id(hash_id.trim())? {
                Some(notice) => println!("{}", serde_json::to_string_pretty(&notice)?),
                None => bail!("No notice with hash_id {:?}", hash_id),
            }
        }

        Command::Show { date, name_hash } => {
            let repo = open_repo(&config)?;
            match site::resolve(&repo, &config.site.base_path, &date, &name_hash)? {
                Resolution::Found(notice) => {
                    println!("{}", notice.full_name);
                    println!("{}", notice.published_on);
                    println!();
                    println!("{}", notice.content);
                    println!();
                    println!("Source: {}", notice.source_link);
                }
                Resolution::Redirect { location, status } => {
                    println!("{} → {}{}", status, config.site.host.trim_end_matches('/'), location);
                }
                Resolution::NotFound => bail!("Not found: {}/{}", date, name_hash),
            }
        }

        Command::Sitemap { output } => {
            let repo = open_repo(&config)?;
            let notices = repo.all_notices()?;
            let xml = site::build_sitemap(&config.site, &notices)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, xml).with_context(|| format!("Could not write {:?}", path))?;
                    info!("Sitemap with {} notices written to {:?}", notices.len(), path);
                }
                None => print!("{}", xml),
            }
        }

        Command::Export { output } => {
            let _t = utils::Timer::start("CSV export");
            let repo = open_repo(&config)?;
            let notices = repo.all_notices()?;
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Could not create dir {:?}", parent))?;
            }
            export::export_to_path(&notices, &output)?;
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let notices = repo.notice_count()?;
            let runs = repo.run_count()?;
            let (min, max) = repo.date_range().unwrap_or((None, None));
            println!("─────────────────────────────────");
            println!("  Funeral notices: Database Stats");
            println!("─────────────────────────────────");
            println!("  Notices  : {}", utils::fmt_number(notices));
            println!("  Runs     : {}", utils::fmt_number(runs));
            for (status, count) in repo.run_status_counts()? {
                println!("    {:<10}: {}", status, utils::fmt_number(count));
            }
            println!("  From     : {}", min.map(|d| d.to_string()).unwrap_or("-".into()));
            println!("  To       : {}", max.map(|d| d.to_string()).unwrap_or("-".into()));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn build_pipeline<'a>(config: &AppConfig, repo: &'a Repository) -> Result<Pipeline<&'a Repository>> {
    let source = EdisScraper::new(&config.scraper)?;
    Ok(Pipeline::new(Box::new(source), repo, &config.pipeline))
}

fn print_notices(notices: &[Notice]) {
    for n in notices {
        println!("{}  {}  {}", n.published_on, n.hash_id, n.full_name);
    }
}
