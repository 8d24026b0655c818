//! `alertfeed` - CLI for the community alert feed
//!
//! This binary posts alerts and follows the live feed from the terminal.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;

use alertfeed::cli::{
    Cli, Command, ConfigCommand, FeedCommand, ImportCommand, MapCommand, PostCommand,
    StatusCommand,
};
use alertfeed::geolocation::{locate, provider_from_config, PositionOptions};
use alertfeed::identity::establish_session;
use alertfeed::{
    init_logging, render_feed, Alert, AlertCard, AlertStore, AnonymousIdentity, ArrivalTracker,
    Composer, Config, Coordinate, FeedHandle, FeedSynchronizer, FeedView, MapProjection,
    SqliteAlertStore, SubmitOutcome,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Post(cmd) => handle_post(&config, cmd).await,
        Command::Feed(cmd) => handle_feed(&config, &cmd).await,
        Command::Watch => handle_watch(&config).await,
        Command::Map(cmd) => handle_map(&config, &cmd).await,
        Command::Import(cmd) => handle_import(&config, &cmd).await,
        Command::Status(cmd) => handle_status(&config, &cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Open the configured store and attach an anonymous session to it.
///
/// A failed sign-in is not fatal; the store decides whether to refuse access.
async fn open_store(config: &Config) -> anyhow::Result<SqliteAlertStore> {
    let store = SqliteAlertStore::open(config.database_path())?
        .with_session_required(config.store.require_session)
        .with_poll_interval(config.poll_interval());

    if let Some(session) = establish_session(&AnonymousIdentity::new()).await {
        store.attach_session(&session).await?;
    }
    Ok(store)
}

/// Subscribe and forward every view into a channel the caller can await.
async fn subscribe_views(
    feed: &FeedSynchronizer,
) -> anyhow::Result<(FeedHandle, mpsc::UnboundedReceiver<FeedView>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = feed
        .subscribe(move |view| {
            let _ = tx.send(Arc::clone(view));
        })
        .await
        .context("could not subscribe to the alert feed")?;
    Ok((handle, rx))
}

/// Take the first view the store pushes, then let go of the subscription.
async fn first_view(store: SqliteAlertStore) -> anyhow::Result<FeedView> {
    let feed = FeedSynchronizer::new(Arc::new(store));
    let (handle, mut rx) = subscribe_views(&feed).await?;
    let view = rx
        .recv()
        .await
        .context("alert store closed before sending a snapshot")?;
    handle.unsubscribe();
    Ok(view)
}

async fn device_location(config: &Config) -> Option<Coordinate> {
    let provider = provider_from_config(config);
    locate(provider.as_ref(), &PositionOptions::from(config)).await
}

async fn handle_post(config: &Config, cmd: PostCommand) -> anyhow::Result<()> {
    let location = match (cmd.lat, cmd.lng) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
        _ => device_location(config).await,
    };

    let composer = Composer::new();
    composer.set_description(cmd.description)?;
    composer.set_category(cmd.category.into())?;
    composer.set_location(location)?;

    let store = open_store(config).await?;
    let feed = FeedSynchronizer::new(Arc::new(store));

    let outcome = match composer.post(&feed).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_permission_error() => {
            bail!("{e}; anonymous sign-in failed, so the store refused the post")
        }
        Err(e) => return Err(e.into()),
    };

    match outcome {
        SubmitOutcome::Submitted(id) => {
            println!("Posted alert {id}");
            Ok(())
        }
        SubmitOutcome::Skipped(reason) => bail!("alert not posted: {reason}"),
    }
}

async fn handle_feed(config: &Config, cmd: &FeedCommand) -> anyhow::Result<()> {
    let view = first_view(open_store(config).await?).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&*view)?);
    } else {
        print!("{}", render_feed(&view, Utc::now()));
    }
    Ok(())
}

async fn handle_watch(config: &Config) -> anyhow::Result<()> {
    let feed = FeedSynchronizer::new(Arc::new(open_store(config).await?));
    let (mut handle, mut rx) = subscribe_views(&feed).await?;
    eprintln!("Watching for alerts, press Ctrl-C to stop.");

    let mut tracker = ArrivalTracker::new();
    let mut first = true;
    loop {
        tokio::select! {
            Some(view) = rx.recv() => {
                let arrivals = tracker.arrivals(&view);
                // Full render once, then only alerts not shown before
                if first {
                    print!("{}", render_feed(&view, Utc::now()));
                    first = false;
                } else {
                    for alert in arrivals {
                        println!("{}\n", AlertCard::new(alert, Utc::now()));
                    }
                }
            }
            () = handle.closed() => {
                eprintln!("The alert store closed the feed.");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                debug!("Interrupted, leaving feed");
                break;
            }
        }
    }

    handle.unsubscribe();
    Ok(())
}

async fn handle_map(config: &Config, cmd: &MapCommand) -> anyhow::Result<()> {
    let projection = MapProjection::new(config.map.clone());
    if !projection.is_enabled() {
        bail!("map is disabled: set map.api_key or ALERTFEED_MAP__API_KEY");
    }

    let center = device_location(config).await;
    let view = first_view(open_store(config).await?).await?;

    let Some(map) = projection.project(center, &view) else {
        bail!("map is unavailable: no location fix to center on");
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        println!("Map centered on {} (zoom {})", map.center, map.zoom);
        println!("{} marker(s)", map.markers.len());
        for marker in &map.markers {
            println!("  {}  {}", marker.position, marker.id);
        }
    }
    Ok(())
}

async fn handle_import(config: &Config, cmd: &ImportCommand) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("could not read {}", cmd.file.display()))?;
    let alerts: Vec<Alert> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of alerts", cmd.file.display()))?;

    let store = open_store(config).await?;
    let mut imported = 0usize;
    for alert in &alerts {
        if store.import(alert)? {
            imported += 1;
        }
    }

    println!(
        "Imported {imported} of {} alert(s) from {}",
        alerts.len(),
        cmd.file.display()
    );
    Ok(())
}

async fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats()?;
    let map_enabled = MapProjection::new(config.map.clone()).is_enabled();
    let location = config.fixed_position();

    if cmd.json {
        let status = serde_json::json!({
            "database_path": store.path(),
            "session": store.has_session(),
            "total_alerts": stats.total_alerts,
            "pending_alerts": stats.pending_alerts,
            "located_alerts": stats.located_alerts,
            "db_size_bytes": stats.db_size_bytes,
            "map_enabled": map_enabled,
            "location": location,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("alertfeed status");
        println!("----------------");
        println!("Database:      {}", store.path().display());
        println!(
            "Session:       {}",
            if store.has_session() { "anonymous" } else { "none" }
        );
        println!("Alerts:        {}", stats.total_alerts);
        println!("  pending:     {}", stats.pending_alerts);
        println!("  located:     {}", stats.located_alerts);
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!(
            "Map:           {}",
            if map_enabled { "enabled" } else { "disabled" }
        );
        match location {
            Some(position) => println!("Location:      {position}"),
            None => println!("Location:      not configured"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                let mut shown = config.clone();
                if shown.map.is_enabled() {
                    shown.map.api_key = Some("<redacted>".to_string());
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Poll interval (ms): {}", config.store.poll_interval_ms);
                println!("  Require session:    {}", config.store.require_session);
                println!();
                println!("[Geolocation]");
                println!("  High accuracy:      {}", config.geolocation.high_accuracy);
                println!("  Timeout (ms):       {}", config.geolocation.timeout_ms);
                match config.fixed_position() {
                    Some(position) => println!("  Fixed position:     {position}"),
                    None => println!("  Fixed position:     none"),
                }
                println!();
                println!("[Map]");
                println!(
                    "  API key:            {}",
                    if config.map.is_enabled() { "set" } else { "not set" }
                );
                println!("  Zoom:               {}", config.map.zoom);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
