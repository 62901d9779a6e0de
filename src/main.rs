// src/main.rs

mod config;
mod detection;
mod dispatch;
mod intent;
mod location;
mod pipeline;
mod replay;
mod session;
mod types;

use anyhow::Result;
use dispatch::DispatchClient;
use intent::IntentRouter;
use pipeline::{GesturePipeline, NotificationBus, PipelineMetrics};
use replay::ReplayDriver;
use session::{
    AlarmSession, AlarmState, FileSessionStore, MemorySessionStore, SessionRuntime, SessionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "EYE_ALERT_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("eye_alert={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🛟 EyeAlert starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Gesture thresholds: eyes={} frames, smile={} frames, countdown={}s",
        config.gesture.eye_threshold_frames,
        config.gesture.smile_threshold_frames,
        config.countdown.start_seconds
    );

    // ========================================================================
    // SESSION
    // ========================================================================

    let store: Box<dyn SessionStore> = if config.session.store_path.is_empty() {
        warn!("No session store path; an active alarm will not survive a restart");
        Box::new(MemorySessionStore::new())
    } else {
        let store = FileSessionStore::new(&config.session.store_path);
        info!("✓ Session store at {}", store.path().display());
        Box::new(store)
    };

    let session = match store.load() {
        Ok(Some(saved)) => AlarmSession::restore(saved),
        Ok(None) => AlarmSession::new(),
        Err(e) => {
            error!("Stored session unreadable, starting idle: {:#}", e);
            AlarmSession::new()
        }
    };
    let restored_active = session.alarm_state() == AlarmState::Active;

    let client = DispatchClient::new(&config.dispatch)?;
    let has_credentials = client.has_credentials();
    info!("✓ Dispatch client ready ({})", client.base_url());

    let metrics = PipelineMetrics::new();
    let mut bus = NotificationBus::default();
    let notifications = bus.subscribe();

    let (handle, session_task) = SessionRuntime::spawn(
        session,
        Arc::new(client),
        store,
        bus,
        metrics.clone(),
    );

    if restored_active && config.session.cancel_stale_on_launch {
        info!("Cancelling alarm left over from the previous run");
        handle.cancel(false)?;
    }

    // ========================================================================
    // REPLAY
    // ========================================================================

    let script = replay::load_script(&config.replay.script_path)?;
    let pipeline = GesturePipeline::new(&config.gesture, &config.countdown, metrics.clone());
    let intents = IntentRouter::new(handle.clone(), has_credentials);
    let mut driver = ReplayDriver::new(
        pipeline,
        handle.clone(),
        intents,
        notifications,
        config.replay.fps,
        config.countdown.tick_ms,
    );

    if let Err(e) = driver.run(script).await {
        error!("❌ Replay aborted: {:#}", e);
    }

    let final_state = driver
        .settle(Duration::from_secs(config.dispatch.timeout_secs))
        .await?;
    info!("Session ended replay in {}", final_state.as_str());

    handle
        .shutdown(true, Duration::from_secs(config.dispatch.timeout_secs))
        .await?;
    if let Err(e) = session_task.await {
        error!("Session task failed: {}", e);
    }

    // ========================================================================
    // SUMMARY
    // ========================================================================

    let summary = metrics.summary();
    info!("📊 Run summary:");
    info!(
        "  frames: {} ({} without a face), {:.1} fps",
        summary.total_frames, summary.faceless_frames, summary.fps
    );
    info!(
        "  gestures: {}, smiles: {}, countdowns fired/cancelled: {}/{}",
        summary.gestures_confirmed,
        summary.smiles_confirmed,
        summary.countdowns_fired,
        summary.countdowns_cancelled
    );
    info!(
        "  triggers: {}, alarms created: {}, create failures: {}, delivery failures: {}",
        summary.triggers, summary.alarms_created, summary.create_failures, summary.delivery_failures
    );

    Ok(())
}
