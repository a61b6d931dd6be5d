use serde::Deserialize;

/// Response body of `GET /wayback/available`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchivedSnapshots {
    pub closest: Option<Snapshot>,
}

/// One capture as reported by the availability API.
#[derive(Debug, Clone, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub available: bool,
    pub url: String,
    /// `YYYYMMDDhhmmss`
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub status: String,
}

impl AvailabilityResponse {
    /// The closest capture, if the service says it can be served.
    pub fn into_snapshot(self) -> Option<Snapshot> {
        self.archived_snapshots.closest.filter(|s| s.available)
    }
}
