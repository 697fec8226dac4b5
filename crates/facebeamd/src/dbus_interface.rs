use crate::engine::EngineStatus;
use facebeam_core::SharedLedger;
use tokio::sync::watch;
use zbus::interface;

pub const BUS_NAME: &str = "org.facebeam.Attendance1";
pub const OBJECT_PATH: &str = "/org/facebeam/Attendance1";

/// D-Bus interface for the FaceBeam attendance daemon.
///
/// Bus name: org.facebeam.Attendance1
/// Object path: /org/facebeam/Attendance1
pub struct AttendanceService {
    status: watch::Receiver<EngineStatus>,
    ledger: SharedLedger,
}

impl AttendanceService {
    pub fn new(status: watch::Receiver<EngineStatus>, ledger: SharedLedger) -> Self {
        Self { status, ledger }
    }

    fn status_json(&self) -> Result<String, serde_json::Error> {
        let snapshot = self.status.borrow().clone();
        let mut value = serde_json::to_value(&snapshot)?;
        value["version"] = env!("CARGO_PKG_VERSION").into();
        Ok(value.to_string())
    }

    fn credited_now(&self) -> Vec<String> {
        let subject_id = self.status.borrow().subject_id;
        subject_id
            .map(|id| self.ledger.credited(id))
            .unwrap_or_default()
    }
}

#[interface(name = "org.facebeam.Attendance1")]
impl AttendanceService {
    /// Return the engine status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        self.status_json()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Names credited in the class currently in session.
    async fn credited(&self) -> Vec<String> {
        let names = self.credited_now();
        tracing::debug!(count = names.len(), "credited requested");
        names
    }
}
