//! spindle-sync: drive the collection mirror from the command line.
//!
//! Usage:
//!   spindle-sync scan [set...]
//!   spindle-sync status
//!   spindle-sync toggle <uri>
//!   spindle-sync add <uri> [set]
//!   spindle-sync remove <uri> [set]
//!   spindle-sync wipe

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use spindle::api::http::Credentials;
use spindle::api::{RemoteApis, SpClient};
use spindle::config::Config;
use spindle::model::SET_COLLECTION;
use spindle::store::RedbStore;
use spindle::sync::{CollectionSync, EngineOptions, ToggleOutcome};

const USAGE: &str = "Usage: spindle-sync <scan [set...] | status | toggle <uri> | add <uri> [set] | remove <uri> [set] | wipe>";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spindle=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    if let Err(e) = run(&args).await {
        eprintln!("spindle-sync: {:#}", e);
        std::process::exit(1);
    }
}

async fn open_engine(config: &Config) -> Result<CollectionSync> {
    let credentials = Credentials::load(&Credentials::default_path()?)?;
    let username = if config.api.username.is_empty() {
        credentials.username.clone()
    } else {
        config.api.username.clone()
    };
    if username.is_empty() {
        bail!("No username in config or credentials");
    }

    let db_path = config.storage.resolve_db_path()?;
    let store = RedbStore::create(&db_path)
        .with_context(|| format!("Failed to open mirror at {}", db_path.display()))?;
    let client = SpClient::new(&config.api, &credentials)?;

    Ok(CollectionSync::new(
        username,
        RemoteApis::from_client(Arc::new(client)),
        Arc::new(store),
        EngineOptions::from(config),
    ))
}

async fn run(args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let engine = open_engine(&config).await?;

    match args[0].as_str() {
        "scan" => cmd_scan(&engine, &config, &args[1..]).await,
        "status" => cmd_status(&engine).await,
        "toggle" => {
            let uri = arg(args, 1, "toggle <uri>")?;
            match engine.toggle(uri).await? {
                ToggleOutcome::Added => println!("added {}", uri),
                ToggleOutcome::Removed => println!("removed {}", uri),
            }
            Ok(())
        }
        "add" => {
            let uri = arg(args, 1, "add <uri> [set]")?;
            let set = args.get(2).map(String::as_str).unwrap_or(SET_COLLECTION);
            engine.perform_add(uri, set).await?;
            println!("added {} to {}", uri, set);
            Ok(())
        }
        "remove" => {
            let uri = arg(args, 1, "remove <uri> [set]")?;
            let set = args.get(2).map(String::as_str).unwrap_or(SET_COLLECTION);
            engine.perform_remove(uri, set).await?;
            println!("removed {} from {}", uri, set);
            Ok(())
        }
        "wipe" => {
            engine.wipe().await?;
            println!("mirror wiped");
            Ok(())
        }
        other => bail!("unknown command {:?}\n{}", other, USAGE),
    }
}

fn arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Usage: spindle-sync {}", usage))
}

async fn cmd_scan(engine: &CollectionSync, config: &Config, sets: &[String]) -> Result<()> {
    let sets: Vec<&str> = if sets.is_empty() {
        config.sync.sets.iter().map(String::as_str).collect()
    } else {
        sets.iter().map(String::as_str).collect()
    };

    let mut failed = 0;
    for set in sets {
        match engine.perform_scan(set).await {
            Some(report) => println!(
                "{:<12} {:<9} pages={} upserted={} deleted={} token={}",
                report.set,
                if report.bootstrap { "bootstrap" } else { "delta" },
                report.pages,
                report.upserted,
                report.deleted,
                report.token
            ),
            None => {
                println!("{:<12} failed", set);
                failed += 1;
            }
        }
    }

    if config.sync.scan_content_filters {
        let count = engine.scan_content_filters().await?;
        println!("{:<12} {} filter(s)", "filters", count);
    }

    if failed > 0 {
        bail!("{} set(s) failed to sync", failed);
    }
    Ok(())
}

async fn cmd_status(engine: &CollectionSync) -> Result<()> {
    let store = engine.store();
    println!("user:    {}", engine.username());
    println!("backend: {}", store.backend_name());
    println!();

    let states = store.sync_states().await?;
    if states.is_empty() {
        println!("no set synced yet");
    }
    for state in states {
        println!(
            "{:<12} {}  {}",
            state.set,
            state.last_updated.format("%Y-%m-%d %H:%M:%S"),
            state.token
        );
    }
    println!();

    println!("tracks:   {}", store.tracks().await?.len());
    println!("albums:   {}", store.albums().await?.len());
    println!("artists:  {}", store.artists().await?.len());
    println!("shows:    {}", store.shows().await?.len());
    println!("episodes: {}", store.episodes().await?.len());
    println!("pins:     {}", store.pins().await?.len());
    println!("rootlist: {}", store.rootlist().await?.len());
    println!("filters:  {}", store.content_filters().await?.len());
    Ok(())
}
