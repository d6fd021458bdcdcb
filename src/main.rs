mod actions;
mod api;
mod config;
mod constants;
mod error;
mod mailbox;
mod selection;
mod session;
mod sync;
mod view;

use anyhow::{Context, Result};
use std::env;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::actions::ActionDispatcher;
use crate::api::{HttpClient, MailApi, PromptKind, WhitelistRule};
use crate::config::Config;
use crate::selection::Selection;
use crate::session::Session;
use crate::sync::spawn_sync_actor;
use crate::view::{Filter, Tab, project};

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dashmail=debug"));

    // Try to create a log file in the config directory
    let log_file = Config::config_dir()
        .ok()
        .map(|dir| dir.join("dashmail.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"dashmail - Mailbox view engine for the email triage daemon

Usage: dashmail [command]

Commands:
    (none)                       Watch the mailbox and print changes
    signin <email>               Select the active user
    signout                      Clear the active user
    status                       Print the daemon's mailbox summary
    show <id>                    Print one record in full
    process [--restart]          Run the triage pipeline over the mailbox
    review                       Step through records awaiting human review
    send <id>                    Send the draft for <id> (draft text on stdin)
    delete-draft <id>            Discard the draft for <id>
    regenerate <id>              Re-run the pipeline on <id>, print diagnostics
    whitelist [add <type> <value>]   Show or extend the whitelist rules
    prompt <reading|drafting> [set]  Show or replace a pipeline prompt
    help                         Show this help message

Configuration file: ~/.config/dashmail/config.toml
"#
    );
}

fn client(config: &Config) -> Result<HttpClient> {
    HttpClient::new(&config.base_url(), config.request_timeout())
        .context("Failed to build HTTP client")
}

/// Most commands operate on the active user's mailbox; require one.
fn require_session() -> Result<Session> {
    Session::load()?
        .context("Nobody is signed in. Run 'dashmail signin <email>' first.")
}

fn read_stdin() -> Result<String> {
    use std::io::Read;
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read from stdin")?;
    Ok(text)
}

async fn run_status(config: &Config) -> Result<()> {
    let session = require_session()?;
    let status = client(config)?
        .fetch_status()
        .await
        .context("Failed to fetch mailbox status")?;
    println!("mailbox of {}", session.email);
    println!("  total:           {}", status.total_count);
    println!("  unprocessed:     {}", status.unprocessed_count);
    println!("  awaiting review: {}", status.awaiting_human_count);
    println!("  processed:       {}", status.processed_count);
    if !status.last_modified.is_empty() {
        println!("  last modified:   {}", status.last_modified);
    }
    Ok(())
}

async fn run_pipeline(config: &Config, restart: bool) -> Result<()> {
    require_session()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api.clone(), config.poll_interval());
    let dispatcher = ActionDispatcher::new(api);

    let mut selection = Selection::ViewingProcessingDialog;
    let result = dispatcher
        .run_pipeline(&sync, restart)
        .await
        .context("Pipeline run failed");
    selection.close();
    sync.shutdown().await;

    let report = result?;
    println!(
        "pipeline finished: {} batches, {} records updated",
        report.pages, report.records_applied
    );
    Ok(())
}

/// Print one record in full, with the detail view that fits its status.
async fn run_show(config: &Config, id: &str) -> Result<()> {
    require_session()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api, config.poll_interval());

    let mut snapshots = sync.snapshots();
    snapshots
        .changed()
        .await
        .context("Sync engine stopped before the first reconciliation")?;
    let snap = snapshots.borrow().clone();
    sync.shutdown().await;

    let record = snap
        .mailbox
        .get(id)
        .with_context(|| format!("No record with id {id}"))?;
    let selection = match record.status() {
        mailbox::RecordStatus::AwaitingHuman => {
            Selection::ViewingAwaitingHuman(id.to_string())
        }
        _ => Selection::ViewingProcessed(id.to_string()),
    };

    println!("{} | {} | {}", record.date, record.from, record.subject);
    println!("status: {}", view::status_label(record));
    if !record.state.is_empty() {
        let tags: Vec<String> = record.state.iter().map(ToString::to_string).collect();
        println!("state: {}", tags.join(", "));
    }
    println!("\n{}", record.body);
    // The pending draft is only part of the review view, not the
    // processed detail view.
    if let Selection::ViewingAwaitingHuman(_) = &selection
        && let Some(draft) = record.draft_text()
    {
        println!("--- draft ---\n{draft}");
    }
    if let Some(prompt) = record.llm_prompt.as_deref() {
        println!("--- prompt used ---\n{prompt}");
    }
    Ok(())
}

/// Step through every record awaiting human review, one at a time. The
/// selection tracks which record's detail view is open; exactly one at a
/// time, closed before the next opens.
async fn run_review(config: &Config) -> Result<()> {
    use std::io::{self, BufRead, Write};

    require_session()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api.clone(), config.poll_interval());
    let dispatcher = ActionDispatcher::new(api);

    // Wait for the initial reconciliation before projecting.
    let mut snapshots = sync.snapshots();
    snapshots
        .changed()
        .await
        .context("Sync engine stopped before the first reconciliation")?;
    let snap = snapshots.borrow().clone();

    let pending: Vec<String> = project(&snap.mailbox, Tab::All, &Filter::AwaitingReview)
        .records
        .iter()
        .map(|(r, _)| r.id.clone())
        .collect();
    if pending.is_empty() {
        println!("nothing awaiting review");
        sync.shutdown().await;
        return Ok(());
    }

    let stdin = io::stdin();
    let mut selection = Selection::None;
    debug_assert!(!selection.is_open());
    for id in pending {
        let Some(record) = snap.mailbox.get(&id) else {
            continue;
        };
        let Some(draft) = record.draft_text().map(str::to_string) else {
            continue;
        };
        selection = Selection::ViewingAwaitingHuman(id.clone());

        println!("\n{} | {} | {}", record.date, record.from, record.subject);
        println!("--- draft ---\n{draft}");
        print!("[s]end / [e]dit and send / [d]iscard / [k]eep / [q]uit: ");
        io::stdout().flush()?;

        let mut choice = String::new();
        stdin.lock().read_line(&mut choice)?;
        match choice.trim() {
            "s" => {
                dispatcher.send_draft(&sync, &id, &draft).await?;
                println!("sent");
            }
            "e" => {
                selection = Selection::ViewingDraft(id.clone());
                println!("enter the replacement draft, end with a single '.' line:");
                let mut edited = String::new();
                for line in stdin.lock().lines() {
                    let line = line?;
                    if line == "." {
                        break;
                    }
                    edited.push_str(&line);
                    edited.push('\n');
                }
                dispatcher.send_draft(&sync, &id, &edited).await?;
                println!("sent (edited)");
            }
            "d" => {
                dispatcher.delete_draft(&sync, &id).await?;
                println!("discarded");
            }
            "q" => {
                selection.close();
                break;
            }
            _ => {}
        }
        selection.close();
    }
    debug_assert!(!selection.is_open());

    sync.shutdown().await;
    Ok(())
}

async fn run_send(config: &Config, id: &str) -> Result<()> {
    require_session()?;
    let draft = read_stdin()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api.clone(), config.poll_interval());
    let dispatcher = ActionDispatcher::new(api);

    let result = dispatcher
        .send_draft(&sync, id, &draft)
        .await
        .with_context(|| format!("Failed to send draft for {id}"));
    sync.shutdown().await;
    result?;
    println!("draft for {id} sent");
    Ok(())
}

async fn run_delete_draft(config: &Config, id: &str) -> Result<()> {
    require_session()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api.clone(), config.poll_interval());
    let dispatcher = ActionDispatcher::new(api);

    let result = dispatcher
        .delete_draft(&sync, id)
        .await
        .with_context(|| format!("Failed to delete draft for {id}"));
    sync.shutdown().await;
    result?;
    println!("draft for {id} discarded, record marked reviewed");
    Ok(())
}

async fn run_regenerate(config: &Config, id: &str) -> Result<()> {
    require_session()?;
    let api = client(config)?;
    let sync = spawn_sync_actor(api.clone(), config.poll_interval());
    let dispatcher = ActionDispatcher::new(api);

    let result = dispatcher
        .reprocess(&sync, id)
        .await
        .with_context(|| format!("Failed to reprocess {id}"));
    sync.shutdown().await;
    let outcome = result?;

    match outcome.new_draft.as_deref() {
        Some(draft) => println!("--- regenerated draft ---\n{draft}"),
        None => println!("pipeline produced no draft for {id}"),
    }
    if let Some(prompt) = outcome.llm_prompt.as_deref() {
        println!("--- prompt used ---\n{prompt}");
    }
    Ok(())
}

async fn run_whitelist(config: &Config, args: &[String]) -> Result<()> {
    require_session()?;
    let client = client(config)?;
    match args {
        [] => {
            let rules = client.get_whitelist().await?;
            if rules.rules.is_empty() {
                println!("no whitelist rules");
            }
            for rule in &rules.rules {
                println!("{}: {}", rule.kind, rule.value);
            }
        }
        [add, kind, value] if add == "add" => {
            let mut rules = client.get_whitelist().await?;
            rules.rules.push(WhitelistRule {
                kind: kind.clone(),
                value: value.clone(),
            });
            client.set_whitelist(&rules).await?;
            println!("rule added ({} total)", rules.rules.len());
        }
        _ => anyhow::bail!("usage: dashmail whitelist [add <type> <value>]"),
    }
    Ok(())
}

async fn run_prompt(config: &Config, args: &[String]) -> Result<()> {
    require_session()?;
    let client = client(config)?;
    let kind = match args.first().map(String::as_str) {
        Some("reading") => PromptKind::Reading,
        Some("drafting") => PromptKind::Drafting,
        _ => anyhow::bail!("usage: dashmail prompt <reading|drafting> [set]"),
    };
    match args.get(1).map(String::as_str) {
        None => println!("{}", client.get_prompt(kind).await?),
        Some("set") => {
            let prompt = read_stdin()?;
            client.set_prompt(kind, &prompt).await?;
            println!("prompt updated");
        }
        Some(other) => anyhow::bail!("unknown prompt subcommand: {other}"),
    }
    Ok(())
}

/// The default mode: keep the local mailbox synchronized and print a
/// one-line summary whenever a new snapshot lands.
async fn run_watch(config: &Config) -> Result<()> {
    let session = require_session()?;
    tracing::info!("watching mailbox of {}", session.email);

    let api = client(config)?;
    let sync = spawn_sync_actor(api, config.poll_interval());
    let mut snapshots = sync.snapshots();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow().clone();
                let p = project(&snap.mailbox, Tab::Inbox, &Filter::All);
                println!(
                    "v{}: {} records (inbox {}, meh {}) unprocessed {} awaiting {}",
                    snap.version,
                    snap.mailbox.len(),
                    p.tab_counts.inbox,
                    p.tab_counts.meh,
                    snap.meta.last_counts.unprocessed,
                    snap.meta.last_counts.awaiting_human,
                );
            }
        }
    }

    sync.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    setup_logging();
    let config = Config::load()?;
    Config::ensure_dirs()?;

    match args.get(1).map(|s| s.as_str()) {
        Some("signin") => {
            let email = args
                .get(2)
                .context("usage: dashmail signin <email>")?;
            let session = Session::signin(email)?;
            println!("signed in as {}", session.email);
            Ok(())
        }
        Some("signout") => {
            Session::signout()?;
            println!("signed out");
            Ok(())
        }
        Some("status") => run_status(&config).await,
        Some("show") => {
            let id = args.get(2).context("usage: dashmail show <id>")?;
            run_show(&config, id).await
        }
        Some("process") => {
            let restart = args.get(2).map(|s| s.as_str()) == Some("--restart");
            run_pipeline(&config, restart).await
        }
        Some("review") => run_review(&config).await,
        Some("send") => {
            let id = args.get(2).context("usage: dashmail send <id>")?;
            run_send(&config, id).await
        }
        Some("delete-draft") => {
            let id = args.get(2).context("usage: dashmail delete-draft <id>")?;
            run_delete_draft(&config, id).await
        }
        Some("regenerate") => {
            let id = args.get(2).context("usage: dashmail regenerate <id>")?;
            run_regenerate(&config, id).await
        }
        Some("whitelist") => run_whitelist(&config, &args[2..]).await,
        Some("prompt") => run_prompt(&config, &args[2..]).await,
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
        None => run_watch(&config).await,
    }
}
