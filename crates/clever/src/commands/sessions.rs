//! Sessions command - inspect and manage stored sessions.

use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use clever_session::{OnlineFlag, Page, SessionRecord, SessionRepository};
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the sessions command.
#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// List sessions by online status, most recently updated first
    Online {
        /// List offline sessions instead
        #[arg(long)]
        offline: bool,

        /// Zero-based page number
        #[arg(short, long, default_value = "0")]
        page: usize,

        /// Records per page
        #[arg(short, long, default_value = "20")]
        size: usize,
    },

    /// Count online and offline sessions
    Count,

    /// Show a single session
    Show {
        /// Session ID
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },

    /// Remove sessions not updated within the given age
    Purge {
        /// Minimum idle time in seconds
        #[arg(long)]
        older_than_secs: u64,
    },
}

/// Record summary for display; the encoded blob is omitted.
#[derive(Debug, Serialize)]
struct SessionRow {
    session_id: String,
    login_name: Option<String>,
    online: OnlineFlag,
    host_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    blob_bytes: usize,
}

impl From<&SessionRecord> for SessionRow {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            login_name: record.login_name.clone(),
            online: record.online,
            host_ip: record.host_ip.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            blob_bytes: record.session_blob.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Counts {
    online: u64,
    offline: u64,
    total: u64,
}

/// Run the sessions command.
pub async fn run(args: SessionsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        SessionsCommand::Online {
            offline,
            page,
            size,
        } => {
            let flag = if offline {
                OnlineFlag::Offline
            } else {
                OnlineFlag::Online
            };
            cmd_list(flag, Page::new(page, size), ctx).await
        }
        SessionsCommand::Count => cmd_count(ctx).await,
        SessionsCommand::Show { id } => cmd_show(&id, ctx).await,
        SessionsCommand::Delete { id } => cmd_delete(&id, ctx).await,
        SessionsCommand::Purge { older_than_secs } => {
            cmd_purge(Duration::from_secs(older_than_secs), ctx).await
        }
    }
}

async fn cmd_list(flag: OnlineFlag, page: Page, ctx: &Context) -> Result<()> {
    let records = ctx.store.sessions_with_flag(flag, page).await?;
    let rows: Vec<SessionRow> = records.iter().map(SessionRow::from).collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "{}",
        style(format!("Sessions ({flag}, page {})", page.number)).bold()
    );
    println!("{}", dim.apply_to("─".repeat(50)));

    if rows.is_empty() {
        println!("{}", dim.apply_to("No sessions"));
        return Ok(());
    }

    for row in &rows {
        println!(
            "{}  {}  {}",
            style(&row.session_id).cyan(),
            row.login_name.as_deref().unwrap_or("-"),
            dim.apply_to(row.updated_at.format("%Y-%m-%d %H:%M:%S"))
        );
        if ctx.verbose {
            println!(
                "    {}",
                dim.apply_to(format!(
                    "host: {}  created: {}  blob: {} bytes",
                    row.host_ip.as_deref().unwrap_or("-"),
                    row.created_at.to_rfc3339(),
                    row.blob_bytes
                ))
            );
        }
    }
    Ok(())
}

async fn cmd_count(ctx: &Context) -> Result<()> {
    let online = ctx.store.online_count().await?;
    let offline = ctx.store.count_with_flag(OnlineFlag::Offline).await?;
    let counts = Counts {
        online,
        offline,
        total: online + offline,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("{}", style("Session Counts").bold());
    println!("  Online:   {}", style(counts.online).cyan());
    println!("  Offline:  {}", style(counts.offline).cyan());
    println!("  Total:    {}", style(counts.total).cyan());
    Ok(())
}

async fn cmd_show(id: &str, ctx: &Context) -> Result<()> {
    let Some(record) = ctx.repository.get_by_session_id(id).await? else {
        bail!("session '{id}' not found");
    };
    let session = ctx.store.read(id).await?;

    if ctx.json_output {
        let out = serde_json::json!({
            "record": SessionRow::from(&record),
            "session": session,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style(format!("Session {}", record.session_id)).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("  Status:   {}", style(record.online).cyan());
    println!(
        "  Login:    {}",
        record.login_name.as_deref().unwrap_or("-")
    );
    println!("  Host:     {}", record.host_ip.as_deref().unwrap_or("-"));
    println!("  Created:  {}", record.created_at.to_rfc3339());
    println!("  Updated:  {}", record.updated_at.to_rfc3339());

    if let Some(session) = session {
        if session.attributes.is_empty() {
            println!("  {}", dim.apply_to("No attributes"));
        } else {
            println!();
            println!("{}", style("Attributes").bold());
            for (key, value) in &session.attributes {
                println!("  {}: {}", style(key).cyan(), value);
            }
        }
    }
    Ok(())
}

async fn cmd_delete(id: &str, ctx: &Context) -> Result<()> {
    let removed = ctx.store.delete_by_id(id).await?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "id": id, "deleted": removed }))?
        );
    } else if removed {
        println!("{} {}", Style::new().green().apply_to("Deleted"), id);
    } else {
        println!("{}", Style::new().dim().apply_to(format!("No session '{id}'")));
    }
    Ok(())
}

async fn cmd_purge(older_than: Duration, ctx: &Context) -> Result<()> {
    let before = ctx.repository.count_all()?;
    let removed = ctx.store.purge_idle(older_than).await?;
    tracing::info!(removed, before, "Purged idle sessions");

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "removed": removed }))?
        );
    } else {
        println!(
            "Removed {} of {} sessions idle for more than {}s",
            style(removed).cyan(),
            before,
            older_than.as_secs()
        );
    }
    Ok(())
}
