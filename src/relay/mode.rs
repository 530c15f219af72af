use serde::Serialize;

/// Whether a device's monitor should run in calibration. The device record's
/// mode wins; without one the connection's query flag decides.
pub fn resolve_calibration(mode: Option<&str>, query_flag: bool) -> bool {
    match mode {
        None => query_flag,
        Some("normal") => false,
        Some(_) => true,
    }
}

/// First message sent to a device after the ingest socket opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModeAnnouncement {
    #[serde(rename = "type")]
    kind: &'static str,
    pub calibracion: bool,
}

impl ModeAnnouncement {
    pub fn new(calibrating: bool) -> Self {
        Self {
            kind: "modo",
            calibracion: calibrating,
        }
    }
}
