use anyhow::{Context, Result};
use icmp_lab_abstract::LinkConfig;
use icmp_lab_core::session::SessionReport;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub link: LinkConfig,
    pub session: SessionReport,
    /// Everything the session printed, in order
    pub output: String,
    pub link_events: Vec<LinkEventSummary>,
}

/// Writes any serializable report as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    Ok(())
}
