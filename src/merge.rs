use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{GroupId, Record, UniquenessKey};
use crate::error::RvarError;
use crate::fs_util::write_atomic;

/// Derives the deduplication key of a record; `None` drops the record.
pub trait KeyExtractor {
    fn key(&self, record: &Record) -> Option<UniquenessKey>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Record) -> Option<UniquenessKey>,
{
    fn key(&self, record: &Record) -> Option<UniquenessKey> {
        self(record)
    }
}

/// Key on a single column, skipping records where it is empty.
#[derive(Debug, Clone, Copy)]
pub struct ColumnKey(pub usize);

impl KeyExtractor for ColumnKey {
    fn key(&self, record: &Record) -> Option<UniquenessKey> {
        record
            .get(self.0)
            .filter(|value| !value.is_empty())
            .map(|value| UniquenessKey::Single(value.to_string()))
    }
}

/// Key on several columns; every one of them must be non-empty.
#[derive(Debug, Clone)]
pub struct ColumnsKey(pub Vec<usize>);

impl KeyExtractor for ColumnsKey {
    fn key(&self, record: &Record) -> Option<UniquenessKey> {
        let mut values = Vec::with_capacity(self.0.len());
        for &index in &self.0 {
            let value = record.get(index).filter(|value| !value.is_empty())?;
            values.push(value.to_string());
        }
        if values.is_empty() {
            return None;
        }
        Some(UniquenessKey::Composite(values))
    }
}

/// The whole record is its own key.
#[derive(Debug, Clone, Copy)]
pub struct WholeRecordKey;

impl KeyExtractor for WholeRecordKey {
    fn key(&self, record: &Record) -> Option<UniquenessKey> {
        if record.fields().iter().all(|value| value.is_empty()) {
            return None;
        }
        Some(UniquenessKey::Composite(record.fields().to_vec()))
    }
}

/// Resolves a second record arriving under an already stored key.
pub trait MergePolicy {
    fn merge(
        &self,
        key: &UniquenessKey,
        existing: Record,
        incoming: Record,
    ) -> Result<Record, RvarError>;
}

impl<F> MergePolicy for F
where
    F: Fn(&UniquenessKey, Record, Record) -> Result<Record, RvarError>,
{
    fn merge(
        &self,
        key: &UniquenessKey,
        existing: Record,
        incoming: Record,
    ) -> Result<Record, RvarError> {
        self(key, existing, incoming)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepFirst;

impl MergePolicy for KeepFirst {
    fn merge(
        &self,
        _key: &UniquenessKey,
        existing: Record,
        _incoming: Record,
    ) -> Result<Record, RvarError> {
        Ok(existing)
    }
}

/// Records sharing a key must be identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssertEqual;

impl MergePolicy for AssertEqual {
    fn merge(
        &self,
        key: &UniquenessKey,
        existing: Record,
        incoming: Record,
    ) -> Result<Record, RvarError> {
        if existing != incoming {
            return Err(RvarError::MergeConflict {
                key: key.to_string(),
                existing: existing.into_fields(),
                incoming: incoming.into_fields(),
            });
        }
        Ok(existing)
    }
}

/// Unions the separated tokens of one column; other columns keep the stored value.
#[derive(Debug, Clone)]
pub struct JoinColumn {
    pub column: usize,
    pub separator: char,
}

impl MergePolicy for JoinColumn {
    fn merge(
        &self,
        _key: &UniquenessKey,
        existing: Record,
        incoming: Record,
    ) -> Result<Record, RvarError> {
        let Some(extra) = incoming.get(self.column) else {
            return Ok(existing);
        };
        let mut fields = existing.into_fields();
        if fields.len() <= self.column {
            fields.resize(self.column + 1, String::new());
        }
        let mut tokens: Vec<String> = fields[self.column]
            .split(self.separator)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        for token in extra.split(self.separator).filter(|token| !token.is_empty()) {
            if !tokens.iter().any(|seen| seen == token) {
                tokens.push(token.to_string());
            }
        }
        fields[self.column] = tokens.join(&self.separator.to_string());
        Ok(Record::new(fields))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Fail when a later file's header differs from the first one read.
    pub strict_headers: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            strict_headers: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub files_read: usize,
    pub records_read: usize,
    pub dropped_empty_key: usize,
    pub merged_duplicates: usize,
}

/// Deduplicated records keyed by uniqueness key, in first-seen order.
#[derive(Debug, Default)]
pub struct MergeTable {
    records: HashMap<UniquenessKey, Record>,
    order: Vec<UniquenessKey>,
    stats: MergeStats,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        record: Record,
        key: &dyn KeyExtractor,
        policy: &dyn MergePolicy,
    ) -> Result<(), RvarError> {
        self.stats.records_read += 1;
        let Some(unique) = key.key(&record) else {
            self.stats.dropped_empty_key += 1;
            return Ok(());
        };
        match self.records.get_mut(&unique) {
            Some(slot) => {
                *slot = policy.merge(&unique, slot.clone(), record)?;
                self.stats.merged_duplicates += 1;
            }
            None => {
                self.records.insert(unique.clone(), record);
                self.order.push(unique);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    pub fn into_records(mut self) -> (Vec<Record>, MergeStats) {
        let records = self
            .order
            .iter()
            .filter_map(|key| self.records.remove(key))
            .collect();
        (records, self.stats)
    }
}

#[derive(Debug, Clone)]
pub struct MergedTable {
    pub header: Record,
    pub records: Vec<Record>,
    pub stats: MergeStats,
}

/// Resolves the files of every group up front so a missing group aborts before any reading.
pub fn resolve_sources(
    groups: &[GroupId],
    source_dir: &Utf8Path,
    pattern: &str,
) -> Result<Vec<Utf8PathBuf>, RvarError> {
    if groups.is_empty() {
        return Err(RvarError::NoGroups);
    }
    let mut sources = Vec::new();
    for group in groups {
        let group_dir = source_dir.join(group.as_str());
        let full_pattern = format!("{}/{pattern}", glob::Pattern::escape(group_dir.as_str()));
        let matches = glob::glob(&full_pattern)
            .map_err(|err| RvarError::InvalidPattern(format!("{full_pattern}: {err}")))?;
        let mut found = 0usize;
        for entry in matches {
            let path = entry.map_err(|err| RvarError::Filesystem(err.to_string()))?;
            if !path.is_file() {
                continue;
            }
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|path| RvarError::Filesystem(format!("non UTF-8 path {}", path.display())))?;
            sources.push(path);
            found += 1;
        }
        if found == 0 {
            return Err(RvarError::NoSourceFiles {
                group: group.to_string(),
                pattern: group_dir.join(pattern).to_string(),
            });
        }
    }
    Ok(sources)
}

pub fn merge_groups(
    groups: &[GroupId],
    source_dir: &Utf8Path,
    pattern: &str,
    key: &dyn KeyExtractor,
    policy: &dyn MergePolicy,
    options: MergeOptions,
) -> Result<MergedTable, RvarError> {
    let sources = resolve_sources(groups, source_dir, pattern)?;
    let mut header: Option<Record> = None;
    let mut table = MergeTable::new();
    let mut files_read = 0usize;

    for path in &sources {
        debug!(path = %path, "reading source file");
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path.as_std_path())?;
        let file_header = Record::from(reader.headers()?);
        match &header {
            None => header = Some(file_header),
            Some(canonical) => {
                if options.strict_headers && *canonical != file_header {
                    return Err(RvarError::HeaderMismatch {
                        path: path.clone().into_std_path_buf(),
                    });
                }
            }
        }
        for row in reader.records() {
            let row = row?;
            table.insert(Record::from(&row), key, policy)?;
        }
        files_read += 1;
    }

    let (records, mut stats) = table.into_records();
    stats.files_read = files_read;
    Ok(MergedTable {
        header: header.unwrap_or_default(),
        records,
        stats,
    })
}

pub fn write_table(path: &Utf8Path, table: &MergedTable) -> Result<(), RvarError> {
    write_atomic(path, |out| {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
        writer.write_record(table.header.fields())?;
        for record in &table.records {
            writer.write_record(record.fields())?;
        }
        writer
            .flush()
            .map_err(|err| RvarError::Filesystem(err.to_string()))
    })
}

/// One output table of a phenotype merge run.
pub struct MergeJob {
    pub output: String,
    pub pattern: String,
    pub key: Box<dyn KeyExtractor>,
    pub policy: Box<dyn MergePolicy>,
}

/// Gene, transcript-variation and variation-phenotype tables, in run order.
pub fn phenotype_jobs() -> Vec<MergeJob> {
    vec![
        MergeJob {
            output: "genes.csv".to_string(),
            pattern: "genes.csv".to_string(),
            key: Box::new(ColumnKey(0)),
            policy: Box::new(KeepFirst),
        },
        MergeJob {
            output: "tx-variation.csv".to_string(),
            pattern: "tx-variation.csv".to_string(),
            key: Box::new(ColumnsKey(vec![0, 2])),
            policy: Box::new(KeepFirst),
        },
        MergeJob {
            output: "variation-phenotypes.csv".to_string(),
            pattern: "variation-*.csv".to_string(),
            key: Box::new(WholeRecordKey),
            policy: Box::new(AssertEqual),
        },
    ]
}

/// Every subdirectory of `data_dir`, sorted by name.
pub fn discover_groups(data_dir: &Utf8Path) -> Result<Vec<GroupId>, RvarError> {
    let entries = fs::read_dir(data_dir.as_std_path())
        .map_err(|err| RvarError::Filesystem(format!("read {data_dir}: {err}")))?;
    let mut groups = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| RvarError::Filesystem(err.to_string()))?;
        let is_dir = entry
            .file_type()
            .map(|kind| kind.is_dir())
            .map_err(|err| RvarError::Filesystem(err.to_string()))?;
        if !is_dir {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            groups.push(GroupId::new(name));
        }
    }
    groups.sort();
    Ok(groups)
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub groups: Vec<String>,
    pub jobs: Vec<MergeJobResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeJobResult {
    pub output: String,
    pub rows_written: usize,
    #[serde(flatten)]
    pub stats: MergeStats,
}

pub fn merge_phenotype_data(
    data_dir: &Utf8Path,
    groups: Option<Vec<GroupId>>,
    options: MergeOptions,
) -> Result<MergeReport, RvarError> {
    let groups = match groups {
        Some(groups) => groups,
        None => discover_groups(data_dir)?,
    };
    let mut jobs = Vec::new();
    for job in phenotype_jobs() {
        let table = merge_groups(
            &groups,
            data_dir,
            &job.pattern,
            job.key.as_ref(),
            job.policy.as_ref(),
            options,
        )?;
        let output = data_dir.join(&job.output);
        write_table(&output, &table)?;
        info!(
            output = %output,
            files = table.stats.files_read,
            rows = table.records.len(),
            "merged phenotype table"
        );
        jobs.push(MergeJobResult {
            output: output.to_string(),
            rows_written: table.records.len(),
            stats: table.stats,
        });
    }
    Ok(MergeReport {
        groups: groups.iter().map(ToString::to_string).collect(),
        jobs,
    })
}
