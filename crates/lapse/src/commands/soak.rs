//! Soak command - sustained workload against a live reclaimer.
//!
//! Creates a batch of sessions, keeps renewing half of them and lets the
//! other half go idle. Once the run ends, renewed sessions must still be
//! present, idle ones must be gone (if the run outlasted the expiration
//! window), and the store must pass its consistency audit.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use lapse_session::{Data, SessionId, SessionStore, StoreStats};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, warn};

use super::Context;

/// Arguments for the soak command.
#[derive(Args, Debug)]
pub struct SoakArgs {
    /// Number of sessions to create up front
    #[arg(long, default_value_t = 1000)]
    pub sessions: usize,

    /// Seconds between renewals of the kept half
    #[arg(long, default_value_t = 3)]
    pub renew_every_secs: u64,

    /// Seconds to run for (0 runs until Ctrl-C)
    #[arg(long, default_value_t = 15)]
    pub duration_secs: u64,
}

/// Soak summary for JSON output.
#[derive(Debug, Serialize)]
struct SoakSummary {
    created: usize,
    renewed_alive: usize,
    renewed_lost: usize,
    idle_alive: usize,
    idle_reclaimed: usize,
    ran_secs: f64,
    interrupted: bool,
    live_sessions: usize,
    bucket_entries: usize,
    consistent: bool,
}

/// Why the run loop ended.
enum Stop {
    Elapsed,
    Interrupted,
}

/// Run the soak command.
pub async fn run(args: SoakArgs, ctx: &Context) -> Result<()> {
    if args.renew_every_secs == 0 {
        anyhow::bail!("--renew-every-secs must be greater than zero");
    }

    let store_config = ctx.store_config();
    let deadline = store_config.deletion_deadline();
    let renewals_keep_alive = Duration::from_secs(args.renew_every_secs) < store_config.ttl;
    if !renewals_keep_alive {
        warn!(
            renew_every_secs = args.renew_every_secs,
            ttl = ?store_config.ttl,
            "Renewal interval is not shorter than the TTL, renewed sessions may lapse"
        );
    }
    let store: SessionStore = SessionStore::new(store_config)?;

    let mut renewed = Vec::with_capacity(args.sessions.div_ceil(2));
    let mut idle = Vec::with_capacity(args.sessions / 2);
    for n in 0..args.sessions {
        let id = store.create().await?;
        if n % 2 == 0 {
            renewed.push(id);
        } else {
            idle.push(id);
        }
    }
    info!(
        renewed = renewed.len(),
        idle = idle.len(),
        "Created soak sessions"
    );

    let started = Instant::now();
    let stop = drive(&store, &renewed, &args, ctx).await?;
    let ran = started.elapsed();

    store.shutdown().await;

    let renewed_alive = count_alive(&store, &renewed).await;
    let idle_alive = count_alive(&store, &idle).await;
    let stats = store.stats().await;
    let audit = store.audit().await;

    let summary = SoakSummary {
        created: args.sessions,
        renewed_alive,
        renewed_lost: renewed.len() - renewed_alive,
        idle_alive,
        idle_reclaimed: idle.len() - idle_alive,
        ran_secs: ran.as_secs_f64(),
        interrupted: matches!(stop, Stop::Interrupted),
        live_sessions: stats.sessions,
        bucket_entries: stats.bucket_entries,
        consistent: audit.is_consistent(),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if !audit.is_consistent() {
        anyhow::bail!("store failed its consistency audit: {:?}", audit);
    }
    if renewals_keep_alive && summary.renewed_lost > 0 {
        anyhow::bail!(
            "{} renewed sessions were reclaimed early",
            summary.renewed_lost
        );
    }
    if ran > deadline.saturating_add(Duration::from_secs(1)) && idle_alive > 0 {
        anyhow::bail!(
            "{} idle sessions outlived the {:?} expiration window",
            idle_alive,
            deadline
        );
    }

    Ok(())
}

/// Renew and report until the duration elapses or Ctrl-C arrives.
async fn drive(
    store: &SessionStore,
    renewed: &[SessionId],
    args: &SoakArgs,
    ctx: &Context,
) -> Result<Stop> {
    let mut renew = interval(Duration::from_secs(args.renew_every_secs));
    renew.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = interval(Duration::from_secs(1));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let until = (args.duration_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(args.duration_secs));
    let elapsed = async {
        match until {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(elapsed);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let mut round = 0u64;
    loop {
        tokio::select! {
            _ = &mut elapsed => return Ok(Stop::Elapsed),
            signal = &mut interrupt => {
                signal?;
                warn!("Interrupt received, stopping (press Ctrl-C again to exit immediately)");
                tokio::spawn(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("\nKilling process!");
                        std::process::exit(130);
                    }
                });
                return Ok(Stop::Interrupted);
            }
            _ = renew.tick() => {
                round += 1;
                let mut data = Data::new();
                data.insert("round".to_string(), serde_json::json!(round));
                for id in renewed {
                    if let Err(e) = store.update(id, data.clone()).await {
                        warn!(session_id = %id, error = %e, "Renewal failed");
                    }
                }
            }
            _ = report.tick() => {
                let stats = store.stats().await;
                if ctx.verbose && !ctx.json_output {
                    print_stats(&stats);
                }
                info!(
                    sessions = stats.sessions,
                    buckets = stats.buckets,
                    bucket_entries = stats.bucket_entries,
                    "Soak progress"
                );
            }
        }
    }
}

async fn count_alive(store: &SessionStore, ids: &[SessionId]) -> usize {
    let mut alive = 0;
    for id in ids {
        if store.contains(id).await {
            alive += 1;
        }
    }
    alive
}

fn print_stats(stats: &StoreStats) {
    let dim = Style::new().dim();
    println!(
        "  {} {:>6}  {} {:>4}  {} {:>6}",
        dim.apply_to("sessions"),
        stats.sessions,
        dim.apply_to("buckets"),
        stats.buckets,
        dim.apply_to("entries"),
        stats.bucket_entries
    );
}

fn print_summary(summary: &SoakSummary) {
    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    println!();
    println!("{}", style("Soak Summary").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {:.1}s", dim.apply_to("Ran for:"), summary.ran_secs);
    if summary.interrupted {
        println!("  {} interrupted", dim.apply_to("Stopped:"));
    }
    println!("  {} {}", dim.apply_to("Created:"), summary.created);
    println!(
        "  {} {} alive, {} lost",
        dim.apply_to("Renewed:"),
        summary.renewed_alive,
        summary.renewed_lost
    );
    println!(
        "  {} {} alive, {} reclaimed",
        dim.apply_to("Idle:"),
        summary.idle_alive,
        summary.idle_reclaimed
    );
    println!(
        "  {} {} sessions, {} bucket entries",
        dim.apply_to("Store:"),
        summary.live_sessions,
        summary.bucket_entries
    );
    let audit = if summary.consistent {
        green.apply_to("consistent")
    } else {
        red.apply_to("INCONSISTENT")
    };
    println!("  {} {}", dim.apply_to("Audit:"), audit);
    println!();
}
