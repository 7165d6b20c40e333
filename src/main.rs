//! Danmaku demo - drives a player against a synthetic comment source
//!
//! Usage: `danmaku-demo [seconds]`
//!
//! Plays `seconds` of video (default 30) at 10x speed, seeks back to the
//! start halfway through, and logs every lifecycle event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use danmaku::{DanmakuPlayer, LoadError, PlayerEvent, RawItem, Settings};

/// Playback speed relative to the frame clock
const SPEEDUP: u64 = 10;
const FRAME: Duration = Duration::from_millis(16);

static PERIOD_3_FAILED: AtomicBool = AtomicBool::new(false);

/// Fake network source: one comment every 250ms; the first load of period 3 fails
async fn synthetic_comments(start: i64, end: i64) -> Result<Vec<RawItem<String>>, LoadError> {
    sleep(Duration::from_millis(40)).await;
    if start == 30_000 && !PERIOD_3_FAILED.swap(true, Ordering::SeqCst) {
        return Err(LoadError::Network("connection reset by peer".to_string()));
    }
    Ok((start..end)
        .step_by(250)
        .map(|ts| RawItem::new(ts, ts, format!("comment @ {:.2}s", ts as f64 / 1000.0)))
        .collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let seconds: u64 = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid duration in seconds: {}", arg))?,
        None => 30,
    };

    let settings = Settings::load();
    info!("Using settings: {:?}", settings);

    let mut player = DanmakuPlayer::new(settings.danmaku, synthetic_comments)
        .context("rejected danmaku configuration")?;
    let snapshot = player.snapshot();
    let mut events = player.subscribe();

    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PlayerEvent::PeriodRevealed(index) => info!("+ period {}", index),
                PlayerEvent::PeriodRemoved(index) => info!("- period {}", index),
                PlayerEvent::Reset => info!("* reset"),
                PlayerEvent::FetchFailed { index, error } => {
                    info!("! period {} failed: {}", index, error)
                }
            }
        }
    });

    // Frame clock runs at the same speedup as playback so surfaces keep pace
    let step_ms = (FRAME.as_millis() as u64 * SPEEDUP) as i64;
    let mut now = 0.0;
    player.set_geometry(settings.viewport.width, settings.viewport.height, now);

    let total_ms = (seconds * 1000) as i64;
    let mut position_ms: i64 = 0;
    let mut seeked = false;
    let mut ticker = interval(FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while position_ms < total_ms {
        ticker.tick().await;
        now += step_ms as f64;
        position_ms += step_ms;
        if !seeked && position_ms >= total_ms / 2 {
            seeked = true;
            position_ms = 0;
        }

        player.tick(position_ms, now);
        let drawn: usize = player.frame(now).iter().map(|p| p.items.len()).sum();
        tracing::debug!("t={}ms drawing {} items", position_ms, drawn);
    }

    let stats = snapshot.cache_stats();
    info!(
        "Finished at {}ms: {} resets, {} cached periods ({} loaded, {} failed, {} pending)",
        position_ms,
        snapshot.resets(),
        stats.total(),
        stats.loaded,
        stats.failed,
        stats.pending
    );

    drop(player);
    logger.await.context("event logger task panicked")?;
    Ok(())
}
