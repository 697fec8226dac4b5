use anyhow::{Context, Result};
use facebeam_core::recognition::LoopConfig;
use facebeam_core::Gallery;
use facebeam_io::{DirectoryFrameSource, ProcessEmbedder};
use facebeam_store::Database;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

async fn serve_dbus(kind: BusKind, service: AttendanceService) -> zbus::Result<zbus::Connection> {
    let builder = match kind {
        BusKind::System => zbus::connection::Builder::system()?,
        _ => zbus::connection::Builder::session()?,
    };
    builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facebeamd starting");

    let config = Config::from_env();
    let frames_dir = config
        .frames_dir
        .clone()
        .context("FACEBEAM_FRAMES_DIR is not set")?;
    let embedder_cmd = config
        .embedder_cmd
        .clone()
        .context("FACEBEAM_EMBEDDER_CMD is not set")?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let timetable = db.timetable().context("failed to load timetable")?;
    if timetable.is_empty() {
        tracing::warn!("timetable is empty; no class will ever be in session");
    }

    let mut embedder = ProcessEmbedder::spawn(&embedder_cmd).context("failed to start face embedder")?;

    let (gallery, skipped) = Gallery::build(&config.known_faces_dir, &mut embedder).with_context(|| {
        format!("failed to read known faces from {}", config.known_faces_dir.display())
    })?;
    if gallery.is_empty() {
        tracing::warn!(skipped = skipped.len(), "no known faces loaded; every face will be Unknown");
    }

    let source = DirectoryFrameSource::open(&frames_dir, Duration::from_millis(config.frame_interval_ms))
        .with_context(|| format!("failed to open frame directory {}", frames_dir.display()))?;

    let loop_config = LoopConfig {
        threshold: config.match_threshold,
        policy: config.ledger_reset,
        reconcile_interval: (config.reconcile_secs > 0)
            .then(|| chrono::Duration::seconds(config.reconcile_secs as i64)),
    };
    tracing::info!(
        threshold = loop_config.threshold,
        policy = ?loop_config.policy,
        reconcile_secs = config.reconcile_secs,
        "recognition configured"
    );

    let mut engine = engine::spawn_engine(db, gallery, timetable, source, embedder, loop_config);

    // Keep the connection alive for the daemon's lifetime.
    let _dbus = match config.dbus {
        BusKind::Off => None,
        kind => {
            let service = AttendanceService::new(engine.status(), engine.ledger());
            match serve_dbus(kind, service).await {
                Ok(conn) => {
                    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, bus = ?kind, "D-Bus interface registered");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "D-Bus unavailable; continuing without it");
                    None
                }
            }
        }
    };

    tracing::info!("facebeamd ready");

    let finished = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            None
        }
        summary = engine.wait() => Some(summary?),
    };
    let summary = match finished {
        Some(summary) => summary,
        None => {
            tracing::info!("facebeamd shutting down");
            engine.stop();
            engine.wait().await?
        }
    };

    tracing::info!(
        frames = summary.stats.frames,
        faces = summary.stats.faces,
        credits = summary.stats.credits_written,
        roster_gaps = summary.stats.roster_gaps,
        store_failures = summary.stats.store_failures,
        reconciled = summary.stats.reconciled,
        pending = summary.stats.pending,
        end = ?summary.end,
        "facebeamd stopped"
    );

    Ok(())
}
