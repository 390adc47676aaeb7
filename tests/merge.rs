use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use rvar_data::domain::{GroupId, Record, UniquenessKey};
use rvar_data::error::RvarError;
use rvar_data::merge::{
    AssertEqual, ColumnKey, ColumnsKey, KeepFirst, MergeOptions, merge_groups,
    merge_phenotype_data, write_table,
};

fn data_dir() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn write(dir: &Utf8Path, group: &str, name: &str, content: &str) {
    let group_dir = dir.join(group);
    fs::create_dir_all(group_dir.as_std_path()).unwrap();
    fs::write(group_dir.join(name).as_std_path(), content).unwrap();
}

fn groups(names: &[&str]) -> Vec<GroupId> {
    names.iter().map(|name| GroupId::new(*name)).collect()
}

fn first_column(record: &Record) -> Option<UniquenessKey> {
    record
        .get(0)
        .map(|value| UniquenessKey::Single(value.to_string()))
}

fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn first_occurrence_wins_across_groups() {
    let (_temp, dir) = data_dir();
    write(&dir, "A", "genes.csv", "gene,name\ng1,alpha\ng2,beta\n");
    write(&dir, "B", "genes.csv", "gene,name\ng2,BETA\ng3,gamma\n");

    let table = merge_groups(
        &groups(&["A", "B"]),
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap();

    let out = dir.join("genes.csv");
    write_table(&out, &table).unwrap();
    assert_eq!(read(out), "gene,name\ng1,alpha\ng2,beta\ng3,gamma\n");
    assert_eq!(table.stats.files_read, 2);
    assert_eq!(table.stats.records_read, 4);
    assert_eq!(table.stats.merged_duplicates, 1);
}

#[test]
fn group_order_decides_which_duplicate_survives() {
    let (_temp, dir) = data_dir();
    write(&dir, "A", "genes.csv", "gene,name\ng2,beta\n");
    write(&dir, "B", "genes.csv", "gene,name\ng2,BETA\n");

    let table = merge_groups(
        &groups(&["B", "A"]),
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(table.records.len(), 1);
    assert_eq!(table.records[0].get(1), Some("BETA"));
}

#[test]
fn rows_with_empty_key_are_dropped() {
    let (_temp, dir) = data_dir();
    write(
        &dir,
        "A",
        "tx-variation.csv",
        "tx,gene,variation\nt1,g1,rs1\nt2,g1,\n,g1,rs3\nt1,g9,rs1\n",
    );

    let table = merge_groups(
        &groups(&["A"]),
        &dir,
        "tx-variation.csv",
        &ColumnsKey(vec![0, 2]),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap();

    assert_eq!(table.records.len(), 1);
    assert_eq!(table.stats.dropped_empty_key, 2);
    assert_eq!(table.stats.merged_duplicates, 1);
}

#[test]
fn missing_group_fails_before_reading() {
    let (_temp, dir) = data_dir();
    write(&dir, "A", "genes.csv", "gene\ng1\n");

    let err = merge_groups(
        &groups(&["A", "missing"]),
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap_err();

    assert_matches!(err, RvarError::NoSourceFiles { group, .. } if group == "missing");
}

#[test]
fn no_groups_is_an_error() {
    let (_temp, dir) = data_dir();
    let err = merge_groups(
        &[],
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap_err();
    assert_matches!(err, RvarError::NoGroups);
}

#[test]
fn header_mismatch_is_strict_by_default() {
    let (_temp, dir) = data_dir();
    write(&dir, "A", "genes.csv", "gene,name\ng1,alpha\n");
    write(&dir, "B", "genes.csv", "gene,symbol\ng2,beta\n");

    let err = merge_groups(
        &groups(&["A", "B"]),
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions::default(),
    )
    .unwrap_err();
    assert_matches!(err, RvarError::HeaderMismatch { .. });

    let table = merge_groups(
        &groups(&["A", "B"]),
        &dir,
        "genes.csv",
        &ColumnKey(0),
        &KeepFirst,
        MergeOptions {
            strict_headers: false,
        },
    )
    .unwrap();
    assert_eq!(table.header.fields(), ["gene", "name"]);
    assert_eq!(table.records.len(), 2);
}

#[test]
fn conflicting_whole_record_duplicates_are_reported() {
    let (_temp, dir) = data_dir();
    write(&dir, "A", "variation-1.csv", "v,p,refs\nrs1,asthma,pubmed/1\n");
    write(&dir, "A", "variation-2.csv", "v,p,refs\nrs1,asthma,pubmed/1\n");

    let table = merge_groups(
        &groups(&["A"]),
        &dir,
        "variation-*.csv",
        &first_column,
        &AssertEqual,
        MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(table.records.len(), 1);

    write(&dir, "A", "variation-3.csv", "v,p,refs\nrs1,diabetes,pubmed/2\n");
    let err = merge_groups(
        &groups(&["A"]),
        &dir,
        "variation-*.csv",
        &first_column,
        &AssertEqual,
        MergeOptions::default(),
    )
    .unwrap_err();
    assert_matches!(err, RvarError::MergeConflict { key, .. } if key == "rs1");
}

#[test]
fn phenotype_merge_writes_three_tables() {
    let (_temp, dir) = data_dir();
    for group in ["asthma", "diabetes"] {
        write(&dir, group, "genes.csv", "gene,name\ng1,alpha\n");
        write(&dir, group, "tx-variation.csv", "tx,gene,variation\nt1,g1,rs1\n");
    }
    write(
        &dir,
        "asthma",
        "variation-asthma.csv",
        "variation,phenotype,refs\nrs1,asthma,pubmed/1\n",
    );
    write(
        &dir,
        "diabetes",
        "variation-diabetes.csv",
        "variation,phenotype,refs\nrs1,diabetes,pubmed/2\nrs1,asthma,pubmed/1\n",
    );

    let report = merge_phenotype_data(&dir, None, MergeOptions::default()).unwrap();

    assert_eq!(report.groups, vec!["asthma", "diabetes"]);
    let written: Vec<(&str, usize)> = report
        .jobs
        .iter()
        .map(|job| {
            let name = Utf8Path::new(&job.output).file_name().unwrap();
            (name, job.rows_written)
        })
        .collect();
    assert_eq!(
        written,
        vec![
            ("genes.csv", 1),
            ("tx-variation.csv", 1),
            ("variation-phenotypes.csv", 2),
        ]
    );
    assert_eq!(
        read(dir.join("variation-phenotypes.csv")),
        "variation,phenotype,refs\nrs1,asthma,pubmed/1\nrs1,diabetes,pubmed/2\n"
    );

    // A second run over the same inputs is byte-identical.
    let before = read(dir.join("genes.csv"));
    merge_phenotype_data(&dir, None, MergeOptions::default()).unwrap();
    assert_eq!(read(dir.join("genes.csv")), before);
}

#[test]
fn explicit_groups_limit_the_merge() {
    let (_temp, dir) = data_dir();
    for group in ["asthma", "diabetes"] {
        write(&dir, group, "genes.csv", &format!("gene\n{group}-gene\n"));
        write(&dir, group, "tx-variation.csv", "tx,gene,variation\n");
        write(&dir, group, "variation-x.csv", "variation,phenotype,refs\n");
    }

    let report =
        merge_phenotype_data(&dir, Some(groups(&["diabetes"])), MergeOptions::default()).unwrap();

    assert_eq!(report.groups, vec!["diabetes"]);
    assert_eq!(read(dir.join("genes.csv")), "gene\ndiabetes-gene\n");
}
