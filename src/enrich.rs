use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use camino::Utf8Path;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{EnrichmentUnit, EntityId, GroupId, ReferenceId, ResumeKey};
use crate::error::RvarError;
use crate::retriever::KeywordSource;

/// Keyword -> number of references in a unit that produced it.
pub type KeywordCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    /// One row per newly seen reference: `pubmed_id, keywords`.
    #[default]
    References,
    /// One row per unit: `entity, group, reference_count, keywords`.
    Units,
}

impl EmitMode {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            EmitMode::References => &["pubmed_id", "keywords"],
            EmitMode::Units => &["entity", "group", "reference_count", "keywords"],
        }
    }
}

/// Groups the rows of a merged variation table into units, in first-seen order.
///
/// Columns 0..3 are entity, group and a `;`-separated token list; only tokens
/// starting with `prefix` count as references.
pub fn collect_units<R: io::Read>(
    reader: R,
    source_name: &str,
    prefix: &str,
) -> Result<Vec<EnrichmentUnit>, RvarError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut units: Vec<EnrichmentUnit> = Vec::new();
    let mut index: HashMap<(EntityId, GroupId), usize> = HashMap::new();

    for row in reader.records() {
        let row = row?;
        if row.len() < 3 {
            return Err(RvarError::MalformedRow {
                source_name: source_name.to_string(),
                line: row.position().map(|pos| pos.line()).unwrap_or_default(),
                message: format!("expected at least 3 columns, found {}", row.len()),
            });
        }
        let entity = EntityId::new(&row[0]);
        let group = GroupId::new(&row[1]);
        let slot = *index
            .entry((entity.clone(), group.clone()))
            .or_insert_with(|| {
                units.push(EnrichmentUnit::new(entity, group));
                units.len() - 1
            });
        units[slot].references.extend(
            row[2]
                .split(';')
                .filter_map(|token| ReferenceId::from_token(token, prefix)),
        );
    }
    Ok(units)
}

pub fn read_units(path: &Utf8Path, prefix: &str) -> Result<Vec<EnrichmentUnit>, RvarError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| RvarError::Filesystem(format!("open {path}: {err}")))?;
    collect_units(file, path.as_str(), prefix)
}

/// Row writer for enrichment output; flushed after every unit.
pub struct EnrichSink<W: Write> {
    writer: csv::Writer<W>,
    mode: EmitMode,
}

impl<W: Write> EnrichSink<W> {
    pub fn new(inner: W, mode: EmitMode, write_header: bool) -> Result<Self, RvarError> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(inner);
        if write_header {
            writer.write_record(mode.header())?;
        }
        Ok(Self { writer, mode })
    }

    pub fn mode(&self) -> EmitMode {
        self.mode
    }

    fn write_reference(&mut self, id: &ReferenceId, counts: &str) -> Result<(), RvarError> {
        self.writer.write_record([id.as_str(), counts])?;
        Ok(())
    }

    fn write_unit(&mut self, unit: &EnrichmentUnit, counts: &str) -> Result<(), RvarError> {
        let reference_count = unit.references.len().to_string();
        self.writer.write_record([
            unit.entity.as_str(),
            unit.group.as_str(),
            reference_count.as_str(),
            counts,
        ])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RvarError> {
        self.writer
            .flush()
            .map_err(|err| RvarError::Filesystem(err.to_string()))
    }

    pub fn into_inner(self) -> Result<W, RvarError> {
        self.writer
            .into_inner()
            .map_err(|err| RvarError::Filesystem(err.to_string()))
    }
}

/// Fresh runs truncate and write a header; resumed runs append to what is there.
pub fn open_output(
    path: &Utf8Path,
    mode: EmitMode,
    resuming: bool,
) -> Result<EnrichSink<File>, RvarError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if resuming {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    let file = options
        .open(path.as_std_path())
        .map_err(|err| RvarError::Filesystem(format!("open {path}: {err}")))?;
    let is_empty = file
        .metadata()
        .map(|meta| meta.len() == 0)
        .map_err(|err| RvarError::Filesystem(err.to_string()))?;
    EnrichSink::new(file, mode, !resuming || is_empty)
}

/// Fails with `ResumeKeyNotFound` when the checkpoint names no unit of `units`.
pub fn check_resume(
    units: &[EnrichmentUnit],
    resume_after: Option<&ResumeKey>,
) -> Result<(), RvarError> {
    match resume_after {
        Some(key) if !units.iter().any(|unit| key.matches(unit)) => {
            Err(RvarError::ResumeKeyNotFound(key.to_string()))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitSummary {
    pub entity: String,
    pub group: String,
    pub reference_count: usize,
    pub keywords: KeywordCounts,
}

pub trait ProgressSink {
    fn unit_done(&self, summary: &UnitSummary);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichReport {
    pub units_total: usize,
    pub units_skipped: usize,
    pub units_emitted: usize,
    pub rows_written: usize,
    pub references_seen: usize,
    pub finished_at: String,
}

/// Runs keyword lookups unit by unit and appends results to the sink.
///
/// The set of written references spans the whole run, including units skipped
/// while resuming, so a reference persisted by an earlier run is never written
/// again.
pub struct Enricher<S, W: Write> {
    source: S,
    sink: EnrichSink<W>,
    written: HashSet<ReferenceId>,
}

impl<S: KeywordSource, W: Write> Enricher<S, W> {
    pub fn new(source: S, sink: EnrichSink<W>) -> Self {
        Self {
            source,
            sink,
            written: HashSet::new(),
        }
    }

    pub fn into_parts(self) -> (S, EnrichSink<W>) {
        (self.source, self.sink)
    }

    pub fn run(
        &mut self,
        units: &[EnrichmentUnit],
        resume_after: Option<&ResumeKey>,
        progress: &dyn ProgressSink,
    ) -> Result<EnrichReport, RvarError> {
        check_resume(units, resume_after)?;

        let mut report = EnrichReport {
            units_total: units.len(),
            ..EnrichReport::default()
        };
        let mut ready = resume_after.is_none();

        for unit in units {
            if ready {
                report.rows_written += self.emit(unit, progress)?;
                report.units_emitted += 1;
            } else {
                report.units_skipped += 1;
                if resume_after.is_some_and(|key| key.matches(unit)) {
                    info!(entity = %unit.entity, group = %unit.group, "reached checkpoint");
                    ready = true;
                }
            }
            self.written.extend(unit.references.iter().cloned());
        }

        report.references_seen = self.written.len();
        report.finished_at = chrono::Utc::now().to_rfc3339();
        Ok(report)
    }

    fn emit(
        &mut self,
        unit: &EnrichmentUnit,
        progress: &dyn ProgressSink,
    ) -> Result<usize, RvarError> {
        let mut counts = KeywordCounts::new();
        for id in &unit.references {
            for keyword in self.source.keywords(id)? {
                *counts.entry(keyword).or_default() += 1;
            }
        }
        let encoded =
            serde_json::to_string(&counts).map_err(|err| RvarError::Csv(err.to_string()))?;

        let mut rows = 0usize;
        match self.sink.mode() {
            EmitMode::References => {
                for id in &unit.references {
                    if self.written.insert(id.clone()) {
                        self.sink.write_reference(id, &encoded)?;
                        rows += 1;
                    }
                }
            }
            EmitMode::Units => {
                self.sink.write_unit(unit, &encoded)?;
                rows += 1;
            }
        }
        self.sink.flush()?;

        info!(
            entity = %unit.entity,
            group = %unit.group,
            references = unit.references.len(),
            keywords = %encoded,
            "unit enriched"
        );
        progress.unit_done(&UnitSummary {
            entity: unit.entity.to_string(),
            group: unit.group.to_string(),
            reference_count: unit.references.len(),
            keywords: counts,
        });
        Ok(rows)
    }
}

/// Enriches `units` into the CSV file at `path`, appending when resuming.
///
/// The checkpoint is validated before the file is opened.
pub fn enrich_file<S: KeywordSource>(
    source: S,
    units: &[EnrichmentUnit],
    resume_after: Option<&ResumeKey>,
    path: &Utf8Path,
    mode: EmitMode,
    progress: &dyn ProgressSink,
) -> Result<EnrichReport, RvarError> {
    check_resume(units, resume_after)?;
    let sink = open_output(path, mode, resume_after.is_some())?;
    let mut enricher = Enricher::new(source, sink);
    enricher.run(units, resume_after, progress)
}
