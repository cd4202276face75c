//! Demo command - walks one session through its whole lifecycle.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use lapse_session::{Data, Error as SessionError, SessionStore};
use serde::Serialize;
use tracing::info;

use super::Context;

/// Arguments for the demo command.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Value stored under the "website" key
    #[arg(long, default_value = "longhoang.de")]
    pub website: String,

    /// Wait past the expiration window and show the session is gone
    #[arg(long)]
    pub wait: bool,
}

/// Demo result for JSON output.
#[derive(Debug, Serialize)]
struct DemoOutput {
    session_id: String,
    data: Data,
    expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expired_after_wait: Option<bool>,
}

/// Run the demo command.
pub async fn run(args: DemoArgs, ctx: &Context) -> Result<()> {
    let store_config = ctx.store_config();
    let deadline = store_config
        .deletion_deadline()
        .saturating_add(store_config.sweep_interval);
    let store: SessionStore = SessionStore::new(store_config)?;

    let id = store.create().await?;
    info!(session_id = %id, "Created new session");

    let mut data = Data::new();
    data.insert("website".to_string(), serde_json::json!(args.website));
    store.update(&id, data).await?;
    info!(session_id = %id, website = %args.website, "Updated session data");

    let fetched = store.get(&id).await?;
    let expires_at = store.expires_at(&id).await?;

    let dim = Style::new().dim();
    if !ctx.json_output {
        println!();
        println!("{}", style("Session Lifecycle").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Session:"), id);
        println!(
            "  {} {}",
            dim.apply_to("Data:"),
            serde_json::to_string(&fetched)?
        );
        println!("  {} {}", dim.apply_to("Expires:"), expires_at);
    }

    let expired_after_wait = if args.wait {
        if !ctx.json_output {
            println!();
            println!(
                "  {}",
                dim.apply_to(format!("waiting {:?} without touching it...", deadline))
            );
        }
        tokio::time::sleep(deadline).await;
        match store.get(&id).await {
            Err(SessionError::SessionNotFound(_)) => Some(true),
            Ok(_) => Some(false),
            Err(e) => return Err(e.into()),
        }
    } else {
        None
    };

    store.shutdown().await;

    if ctx.json_output {
        let output = DemoOutput {
            session_id: id.to_string(),
            data: fetched,
            expires_at,
            expired_after_wait,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match expired_after_wait {
            Some(true) => println!(
                "  {} {}",
                dim.apply_to("After wait:"),
                Style::new().green().apply_to("session not found (reclaimed)")
            ),
            Some(false) => println!(
                "  {} {}",
                dim.apply_to("After wait:"),
                Style::new().red().apply_to("session still present")
            ),
            None => {}
        }
        println!();
    }

    if expired_after_wait == Some(false) {
        anyhow::bail!("session {} outlived its expiration window", id);
    }

    Ok(())
}
