use std::io::{self, Write};

use serde::Serialize;

use crate::enrich::{EnrichReport, ProgressSink, UnitSummary};
use crate::merge::MergeReport;
use crate::retriever::LookupStats;

#[derive(Debug, Clone, Serialize)]
pub struct EnrichSummary {
    pub output: String,
    pub resumed_after: Option<String>,
    #[serde(flatten)]
    pub report: EnrichReport,
    pub lookups: LookupStats,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_merge(result: &MergeReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_enrich(result: &EnrichSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn unit_done(&self, _summary: &UnitSummary) {}
}

/// One line per finished unit on stderr: entity, group, reference count, keyword counts.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn unit_done(&self, summary: &UnitSummary) {
        let keywords = serde_json::to_string(&summary.keywords).unwrap_or_default();
        eprintln!(
            "{} {} {} {}",
            summary.entity, summary.group, summary.reference_count, keywords
        );
    }
}
