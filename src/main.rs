use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use dockets::aggregate::CountScope;
use dockets::commands::{
    FilingsOptions, LsOptions, OrgsOptions, Session, StatsOptions, cmd_config_get, cmd_config_set,
    cmd_config_show, cmd_favorite_add, cmd_favorite_ls, cmd_favorite_remove, cmd_filings, cmd_ls,
    cmd_orgs, cmd_search, cmd_stats,
};
use dockets::error::Result;
use dockets::query::{DatePreset, SortField, SortSpec};

#[derive(Parser)]
#[command(name = "dockets")]
#[command(about = "Browse utility-commission dockets")]
#[command(version)]
struct Cli {
    /// Read tables from a JSON fixture instead of the hosted service
    #[arg(long, global = true, env = "DOCKETS_FIXTURE")]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List dockets
    Ls {
        /// Search title, docket id and petitioner
        #[arg(short, long)]
        search: Option<String>,

        /// Only these industries (repeatable)
        #[arg(long)]
        industry: Vec<String>,

        /// Only these statuses (repeatable)
        #[arg(long)]
        status: Vec<String>,

        /// Only these petitioners (repeatable)
        #[arg(long)]
        petitioner: Vec<String>,

        /// Sort as field[:asc|desc], e.g. opened_date:desc
        #[arg(long, value_parser = parse_sort)]
        sort: Option<SortSpec>,

        /// Opened date: any, last-N-days or year:YYYY
        #[arg(long, default_value = "any", value_parser = parse_date)]
        date: DatePreset,

        /// Pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the filings of a docket
    Filings {
        /// Government docket id, e.g. 24-E-0165
        docket: String,

        /// Search filing name and description
        #[arg(short, long)]
        search: Option<String>,

        /// Only these filing types (repeatable)
        #[arg(long = "type")]
        filing_type: Vec<String>,

        /// Only filings authored by these organizations (repeatable)
        #[arg(long)]
        author: Vec<String>,

        /// Sort as field[:asc|desc], e.g. filed_date:asc
        #[arg(long, value_parser = parse_sort)]
        sort: Option<SortSpec>,

        /// Filed date: any, last-N-days or year:YYYY
        #[arg(long, default_value = "any", value_parser = parse_date)]
        date: DatePreset,

        /// Pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Show attachment links
        #[arg(short, long)]
        attachments: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List organizations with docket counts
    Orgs {
        /// Search organization names
        #[arg(short, long)]
        search: Option<String>,

        /// Sort as field[:asc|desc]: name or docket_count
        #[arg(long, value_parser = parse_sort)]
        sort: Option<SortSpec>,

        /// What counts cover: page or corpus
        #[arg(long, value_parser = parse_scope)]
        scope: Option<CountScope>,

        /// Pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize every matching docket by industry and status
    Stats {
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long)]
        industry: Vec<String>,

        #[arg(long)]
        status: Vec<String>,

        #[arg(long, default_value = "any", value_parser = parse_date)]
        date: DatePreset,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Quick search across dockets and organizations
    #[command(visible_alias = "s")]
    Search {
        /// Text to search for
        text: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage favorite dockets
    #[command(visible_alias = "fav")]
    Favorite {
        #[command(subcommand)]
        action: FavoriteAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum FavoriteAction {
    /// Favorite a docket
    Add {
        /// Government docket id
        docket: String,

        #[arg(long, env = "DOCKETS_USER")]
        user: String,

        #[arg(long)]
        json: bool,
    },
    /// Remove a favorite
    Remove {
        /// Government docket id
        docket: String,

        #[arg(long, env = "DOCKETS_USER")]
        user: String,

        #[arg(long)]
        json: bool,
    },
    /// List favorites
    Ls {
        #[arg(long, env = "DOCKETS_USER")]
        user: String,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Set a configuration value
    Set {
        /// Configuration key, e.g. api.url or listing.page_size
        key: String,
        /// Value to set; empty clears optional keys
        value: String,
        #[arg(long)]
        json: bool,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
        #[arg(long)]
        json: bool,
    },
}

fn parse_sort(s: &str) -> std::result::Result<SortSpec, String> {
    s.parse().map_err(|_| {
        format!(
            "Invalid sort. Use field[:asc|desc] with field one of: {}",
            SortField::ALL_STRINGS.join(", ")
        )
    })
}

fn parse_date(s: &str) -> std::result::Result<DatePreset, String> {
    s.parse()
        .map_err(|_| "Invalid date preset. Use any, last-N-days or year:YYYY".to_string())
}

fn parse_scope(s: &str) -> std::result::Result<CountScope, String> {
    s.parse()
        .map_err(|_| "Invalid scope. Must be one of: page, corpus".to_string())
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize logging: {error}");
    }
}

async fn run(cli: Cli) -> Result<()> {
    let fixture = cli.fixture;
    let session = || Session::open(fixture.as_deref());

    match cli.command {
        Commands::Ls {
            search,
            industry,
            status,
            petitioner,
            sort,
            date,
            pages,
            json,
        } => {
            cmd_ls(
                &session()?,
                LsOptions {
                    search,
                    industry,
                    status,
                    petitioner,
                    sort,
                    date,
                    pages,
                    json,
                },
            )
            .await
        }

        Commands::Filings {
            docket,
            search,
            filing_type,
            author,
            sort,
            date,
            pages,
            attachments,
            json,
        } => {
            cmd_filings(
                &session()?,
                FilingsOptions {
                    docket,
                    search,
                    filing_type,
                    author,
                    sort,
                    date,
                    pages,
                    attachments,
                    json,
                },
            )
            .await
        }

        Commands::Orgs {
            search,
            sort,
            scope,
            pages,
            json,
        } => {
            cmd_orgs(
                &session()?,
                OrgsOptions {
                    search,
                    sort,
                    scope,
                    pages,
                    json,
                },
            )
            .await
        }

        Commands::Stats {
            search,
            industry,
            status,
            date,
            json,
        } => {
            cmd_stats(
                &session()?,
                StatsOptions {
                    search,
                    industry,
                    status,
                    date,
                    json,
                },
            )
            .await
        }

        Commands::Search { text, json } => cmd_search(&session()?, &text.join(" "), json).await,

        Commands::Favorite { action } => match action {
            FavoriteAction::Add { docket, user, json } => {
                cmd_favorite_add(&session()?, &user, &docket, json).await
            }
            FavoriteAction::Remove { docket, user, json } => {
                cmd_favorite_remove(&session()?, &user, &docket, json).await
            }
            FavoriteAction::Ls { user, json } => cmd_favorite_ls(&session()?, &user, json).await,
        },

        // Config commands never need a data service.
        Commands::Config { action } => match action {
            ConfigAction::Show { json } => cmd_config_show(json),
            ConfigAction::Set { key, value, json } => cmd_config_set(&key, &value, json),
            ConfigAction::Get { key, json } => cmd_config_get(&key, json),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
