//! JSON report files.
//!
//! Reports are grouped by local date and named after the edition in which
//! they were generated:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//! A later run in the same edition overwrites the earlier file.

use crate::models::IntelReport;
use crate::utils::edition_for;
use chrono::Local;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path, relative to `json_output_dir`, that `report` is written to.
pub fn report_path(report: &IntelReport, json_output_dir: &str) -> String {
    let local = report.generated_at.with_timezone(&Local);
    format!(
        "{}/{}/{}.json",
        json_output_dir.trim_end_matches('/'),
        local.date_naive(),
        edition_for(local.time())
    )
}

/// Write `report` as pretty JSON under `json_output_dir`, creating the date
/// directory as needed. Returns the written path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    report: &IntelReport,
    json_output_dir: &str,
) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = report_path(report, json_output_dir);

    if let Some((dir, _)) = path.rsplit_once('/') {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(%dir, error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(%path, items = report.intelligence.len(), "Wrote intelligence report");
    Ok(path)
}
