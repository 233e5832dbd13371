//! Interactive driver for a record sync session.
//!
//! Loads the local and remote datasets from JSON files, wires them into a
//! sync controller with an in-process notification channel, and executes
//! commands from stdin or a script file. Every emitted event is printed.

mod commands;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use recsync_core::adapter::{MemoryChannel, MemoryLocalAdapter, MemoryRemoteAdapter};
use recsync_core::{
    ChangeNotificationHandler, EntitySchema, Outcome, Row, SessionConfig, SyncController,
    SyncEvent,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use commands::{Command, HELP};

/// Command-line arguments for the sync session driver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local dataset, a JSON array of records
    #[arg(short, long)]
    local: PathBuf,

    /// Remote dataset, a JSON array of records
    #[arg(short, long)]
    remote: Option<PathBuf>,

    /// Read commands from this file instead of stdin
    #[arg(short, long)]
    script: Option<PathBuf>,
}

struct Session {
    controller: Arc<SyncController>,
    handler: Arc<ChangeNotificationHandler>,
    channel: Arc<MemoryChannel>,
    topic: String,
    events: broadcast::Receiver<SyncEvent>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.apply_env_overrides()?;
    tracing::info!(
        "Session for {} ({} fields) on {}",
        config.entity.name,
        config.entity.fields.len(),
        config.channel
    );

    let local = Arc::new(MemoryLocalAdapter::from_json(&read_json(&args.local)?)?);
    let remote = match &args.remote {
        Some(path) => Arc::new(MemoryRemoteAdapter::from_json(&read_json(path)?)?),
        None => Arc::new(MemoryRemoteAdapter::default()),
    };

    let controller = Arc::new(SyncController::from_config(&config, local, remote));
    let channel = Arc::new(MemoryChannel::new());
    let handler = ChangeNotificationHandler::new(controller.clone());
    handler.listen(channel.clone(), &config.channel).await?;

    let mut session = Session {
        events: controller.subscribe(),
        controller,
        handler,
        channel,
        topic: config.channel.clone(),
    };
    if let Err(e) = session.controller.load_internal().await {
        tracing::warn!("Initial load failed: {}", e);
    }
    session.flush_events().await;

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(io::BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open script {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let interactive = args.script.is_none();

    prompt(interactive)?;
    for line in input.lines() {
        let line = line?;
        match Command::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => {
                if !interactive {
                    println!("> {}", line.trim());
                }
                session.execute(command).await;
                session.flush_events().await;
            }
            Ok(None) => {}
            Err(e) => println!("error: {}", e),
        }
        prompt(interactive)?;
    }

    session.handler.teardown().await;
    session.controller.teardown();
    Ok(())
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn prompt(interactive: bool) -> Result<()> {
    if interactive {
        print!("recsync> ");
        io::stdout().flush()?;
    }
    Ok(())
}

impl Session {
    async fn execute(&self, command: Command) {
        let controller = &self.controller;
        match command {
            Command::List => print_rows(controller.schema(), &controller.records()),
            Command::View => print_rows(controller.schema(), &controller.filtered_view()),
            Command::Search(term) => controller.search(&term),
            Command::Sync(mode) => report(controller.set_sync_mode(mode).await),
            Command::Refresh => {
                if let Ok(count) = controller.load_internal().await {
                    println!("{} internal records", count);
                }
            }
            Command::Edit { id, field, value } => match controller.set_field(&id, &field, value) {
                Ok(dirty) => println!("{} {}", id, if dirty { "dirty" } else { "clean" }),
                Err(e) => println!("error: {}", e),
            },
            Command::Save(id) => {
                if !controller.can_save(&id) {
                    println!("nothing to save for {}", id);
                }
                report(controller.save_row(&id).await);
            }
            Command::Create(fields) => report(controller.create_row(&fields).await),
            Command::Delete(id) => {
                if controller.row(&id).is_none() {
                    println!("no row {}", id);
                }
                report(controller.delete_row(&id).await);
            }
            Command::Notify(payload) => {
                let delivered = self.channel.publish(&self.topic, payload);
                tracing::debug!("Notification delivered to {} subscribers", delivered);
            }
            Command::Pending => match self.handler.pending() {
                Some(change) => println!(
                    "{} ({} {})",
                    change.prompt(self.handler.subject()),
                    change.operation,
                    change.row_id
                ),
                None => println!("no pending change"),
            },
            Command::Accept => {
                if self.handler.accept().await.is_none() {
                    println!("no pending change");
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    /// Lets the listener task run, then prints every queued event.
    async fn flush_events(&mut self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        loop {
            match self.events.try_recv() {
                Ok(event) => print_event(&event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} events", n);
                }
                Err(_) => break,
            }
        }
    }
}

/// Outcomes are printed when they arrive as events.
fn report(outcome: Option<Outcome>) {
    if outcome.is_none() {
        tracing::debug!("Operation produced no outcome");
    }
}

fn print_event(event: &SyncEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("event {}", json),
        Err(e) => tracing::error!("Failed to encode event: {}", e),
    }
}

fn print_rows(schema: &EntitySchema, rows: &[Row]) {
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }
    for row in rows {
        let cells: Vec<String> = schema
            .fields
            .iter()
            .map(|field| format!("{}={}", field, row.get(field)))
            .collect();
        println!(
            "{:<12} {:<8} {}",
            row.id().as_str(),
            row.origin().as_str(),
            cells.join(" ")
        );
    }
}
