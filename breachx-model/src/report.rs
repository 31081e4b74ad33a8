use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An object listed from report storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportObject {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

/// Signed link to the most recent scan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportReference {
    pub report_url: String,
    pub last_modified: DateTime<Utc>,
}
