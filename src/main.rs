use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use universal_search::schema::{relevance, SchemaCatalog};
use universal_search::{
    logging, OpenRouterClient, SearchConfig, SearchEngine, SearchError, SearchResponse,
    SqliteStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "universal-search",
    version,
    about = "Ask questions about a relational store in natural language"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(
        long,
        value_name = "DB",
        env = "UNIVERSAL_SEARCH_DB",
        help = "SQLite database to query (opened read-only)"
    )]
    db: PathBuf,

    #[arg(long, value_name = "FILE", help = "Configuration file (defaults to the user config dir)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Include technical entity types")]
    elevated: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a question into a query and print the result document
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print the schema document the model would see
    Schema {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(long, help = "Reduce the schema for this question first")]
        query: Option<String>,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    // Before anything else so startup failures are captured. No-op without a DSN.
    let dsn = std::env::var("SENTRY_DSN").ok();
    let _sentry_guard = sentry::init(logging::sentry_options(dsn.as_deref()));
    logging::init();

    let cli = Cli::parse();
    tracing::info!("Starting universal-search v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let ok = match cli.command {
        Command::Search { query, store } => {
            print_response(&SearchResponse::from(runtime.block_on(search(&query, &store))))
        }
        Command::Schema { store, query } => {
            print_response(&SearchResponse::from(schema(&store, query.as_deref())))
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn open(args: &StoreArgs) -> Result<(SearchConfig, SqliteStore), SearchError> {
    let config = SearchConfig::load(args.config.as_deref())?;
    let store = SqliteStore::open(&args.db)?;
    Ok((config, store))
}

async fn search(
    query: &str,
    args: &StoreArgs,
) -> Result<universal_search::ExecutionResult, SearchError> {
    let (config, store) = open(args)?;
    let completion = OpenRouterClient::new(&config)?;
    tracing::info!(model = completion.model(), db = %store.path().display(), "Search ready");

    let engine = SearchEngine::new(Arc::new(store), Arc::new(completion), config);
    engine.process_query(query, args.elevated).await
}

fn schema(args: &StoreArgs, query: Option<&str>) -> Result<serde_json::Value, SearchError> {
    let (config, store) = open(args)?;
    let document = SchemaCatalog::new(config.schema.clone()).discover(&store, args.elevated)?;
    let document = match query {
        Some(q) => relevance::reduce(&document, q, &config.schema.base_entities),
        None => document,
    };
    Ok(document.to_prompt_value())
}

/// Pretty JSON on stdout. Returns whether the response was a success.
fn print_response<T: Serialize>(response: &SearchResponse<T>) -> bool {
    match serde_json::to_string_pretty(response) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            return false;
        }
    }
    response.is_success()
}
