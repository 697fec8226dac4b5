use facebeam_core::{RecurrencePolicy, DEFAULT_MATCH_THRESHOLD};
use std::path::PathBuf;
use std::str::FromStr;

/// Which message bus to publish the D-Bus interface on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
    Off,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory of reference photos, one student per file.
    pub known_faces_dir: PathBuf,
    /// Directory whose images are replayed as the video stream.
    pub frames_dir: Option<PathBuf>,
    /// Command line of the external face embedder.
    pub embedder_cmd: Option<String>,
    /// Euclidean distance threshold (exclusive) for a positive match.
    pub match_threshold: f32,
    pub ledger_reset: RecurrencePolicy,
    /// Retry interval for failed attendance writes; 0 disables retries.
    pub reconcile_secs: u64,
    /// Pacing delay between replayed frames.
    pub frame_interval_ms: u64,
    pub dbus: BusKind,
}

impl Config {
    /// Load configuration from `FACEBEAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facebeam");

        let db_path = std::env::var("FACEBEAM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facebeam.db"));

        let ledger_reset = match std::env::var("FACEBEAM_LEDGER_RESET") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!(value = %v, error = %e, "invalid FACEBEAM_LEDGER_RESET; using default");
                RecurrencePolicy::default()
            }),
            Err(_) => RecurrencePolicy::default(),
        };

        let dbus = match std::env::var("FACEBEAM_DBUS").as_deref() {
            Ok("system") => BusKind::System,
            Ok("off") | Ok("0") => BusKind::Off,
            Ok("session") | Err(_) => BusKind::Session,
            Ok(other) => {
                tracing::warn!(value = other, "invalid FACEBEAM_DBUS; using session bus");
                BusKind::Session
            }
        };

        Self {
            db_path,
            known_faces_dir: std::env::var("FACEBEAM_KNOWN_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("known_faces")),
            frames_dir: std::env::var("FACEBEAM_FRAMES_DIR").ok().map(PathBuf::from),
            embedder_cmd: std::env::var("FACEBEAM_EMBEDDER_CMD")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            match_threshold: env_setting("FACEBEAM_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            ledger_reset,
            reconcile_secs: env_setting("FACEBEAM_RECONCILE_SECS", 0),
            frame_interval_ms: env_setting("FACEBEAM_FRAME_INTERVAL_MS", 0),
            dbus,
        }
    }
}

/// Parse a numeric setting, warning and falling back to `default` when the
/// value does not parse.
fn parse_setting<T>(key: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|e| {
        tracing::warn!(key, value = %raw, error = %e, default = ?default, "invalid setting; using default");
        default
    })
}

fn env_setting<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    parse_setting(key, std::env::var(key).ok().as_deref(), default)
}
