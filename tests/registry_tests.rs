//! Reduction and pull-by-name behavior of the factor registry.

use polars::prelude::*;

use factorium::descriptor::{AliasSpec, Provenance};
use factorium::error::FactorError;
use factorium::registry::{FactorRegistry, FetchOptions};
use factorium::sql::TimeFormat;

fn frame(columns: &[&str]) -> DataFrame {
    let mut cols: Vec<Column> = vec![
        Series::new("cik_dt".into(), vec!["2020-01-01"]).into(),
        Series::new("cik_iid".into(), vec!["A"]).into(),
    ];
    for name in columns {
        cols.push(Series::new((*name).into(), vec![1.0f64]).into());
    }
    DataFrame::new(cols).unwrap()
}

fn add_table(reg: &mut FactorRegistry, table: &str, columns: &[&str]) {
    reg.add(
        table.into(),
        columns,
        "dt",
        "code",
        TimeFormat::Temporal,
        AliasSpec::None,
        "1",
    )
    .unwrap();
}

#[test]
fn same_source_descriptors_merge_with_first_seen_order() {
    let mut reg = FactorRegistry::new();
    add_table(&mut reg, "db.t1", &["a", "b"]);
    add_table(&mut reg, "db.t1", &["b", "c"]);
    let reduced = reg.reduce().unwrap();
    assert_eq!(reduced.len(), 1);
    let d = &reduced.descriptors()[0];
    assert_eq!(d.origin_columns(), &["a", "b", "c"]);
    assert_eq!(d.provenance(), Provenance::Derived);
    assert_eq!(
        d.select_sql(),
        "select a,b,c, dt as cik_dt, code as cik_iid from db.t1 where 1"
    );
}

#[test]
fn reduction_is_idempotent() {
    let mut reg = FactorRegistry::new();
    add_table(&mut reg, "db.t1", &["a", "b"]);
    add_table(&mut reg, "db.t1", &["b", "c"]);
    add_table(&mut reg, "db.t2", &["x"]);
    reg.add(frame(&["v1"]).into(), "v1", "cik_dt", "cik_iid", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();

    let once = reg.reduce().unwrap();
    let twice = once.reduce().unwrap();
    assert_eq!(once.len(), twice.len());
    for (a, b) in once.descriptors().iter().zip(twice.descriptors()) {
        assert_eq!(a, b);
    }
}

#[test]
fn differing_conditions_and_keys_stay_separate() {
    let mut reg = FactorRegistry::new();
    reg.add("db.t1".into(), "a", "dt", "code", TimeFormat::Temporal, AliasSpec::None, "1").unwrap();
    reg.add("db.t1".into(), "b", "dt", "code", TimeFormat::Temporal, AliasSpec::None, "@b>0").unwrap();
    reg.add("db.t1".into(), "c", "other_dt", "code", TimeFormat::Temporal, AliasSpec::None, "1").unwrap();
    let reduced = reg.reduce().unwrap();
    assert_eq!(reduced.len(), 3);
}

#[test]
fn frames_pass_through_untouched_and_first() {
    let mut reg = FactorRegistry::new();
    add_table(&mut reg, "db.t1", &["a"]);
    reg.add(frame(&["v1"]).into(), "v1", "cik_dt", "cik_iid", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    add_table(&mut reg, "db.t1", &["b"]);
    let reduced = reg.reduce().unwrap();
    assert_eq!(reduced.len(), 2);
    assert_eq!(reduced.descriptors()[0].provenance(), Provenance::Frame);
    assert_eq!(reduced.descriptors()[1].provenance(), Provenance::Derived);
    assert_eq!(reduced.descriptors()[1].origin_columns(), &["a", "b"]);
}

#[test]
fn duplicate_column_requests_dedupe_keeping_first() {
    let mut reg = FactorRegistry::new();
    add_table(&mut reg, "db.t1", &["a", "b"]);
    add_table(&mut reg, "db.t1", &["a"]);
    reg.add(
        "db.t1".into(),
        "a",
        "dt",
        "code",
        TimeFormat::Temporal,
        "a_renamed",
        "1",
    )
    .unwrap();
    let reduced = reg.reduce().unwrap();
    assert_eq!(reduced.len(), 1);
    let d = &reduced.descriptors()[0];
    // (a, None) dedupes; (a, a_renamed) is a distinct pair and survives
    assert_eq!(d.origin_columns(), &["a", "b", "a"]);
    assert_eq!(d.aliases(), &[None, None, Some("a_renamed".to_string())]);
}

#[test]
fn pull_by_name_is_coarse_grained() {
    let mut source_reg = FactorRegistry::new();
    add_table(&mut source_reg, "db.t1", &["v1", "v2"]);
    add_table(&mut source_reg, "db.t2", &["v3"]);

    let mut reg = FactorRegistry::new();
    reg.add(
        (&source_reg).into(),
        "v1",
        "dt",
        "code",
        TimeFormat::Temporal,
        AliasSpec::None,
        "1",
    )
    .unwrap();
    // the whole descriptor comes over, not just the wanted column
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.descriptors()[0].origin_columns(), &["v1", "v2"]);
}

#[test]
fn pull_by_name_matches_aliases_too() {
    let mut source_reg = FactorRegistry::new();
    source_reg
        .add(
            "db.t1".into(),
            ["v1", "v2"],
            "dt",
            "code",
            TimeFormat::Temporal,
            vec![None, Some("momentum")],
            "1",
        )
        .unwrap();

    let mut reg = FactorRegistry::new();
    reg.add((&source_reg).into(), "momentum", "dt", "code", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    assert_eq!(reg.len(), 1);

    let mut none = FactorRegistry::new();
    none.add((&source_reg).into(), "absent", "dt", "code", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn pull_scans_the_reduced_form() {
    let mut source_reg = FactorRegistry::new();
    add_table(&mut source_reg, "db.t1", &["v1"]);
    add_table(&mut source_reg, "db.t1", &["v2"]);

    let mut reg = FactorRegistry::new();
    reg.add((&source_reg).into(), ["v1", "v2"], "dt", "code", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    // both columns live on the one merged descriptor
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.descriptors()[0].origin_columns(), &["v1", "v2"]);
    assert_eq!(reg.descriptors()[0].provenance(), Provenance::Derived);
}

#[test]
fn federation_over_frames_only_is_empty() {
    let mut reg = FactorRegistry::new();
    reg.add(frame(&["v1"]).into(), "v1", "cik_dt", "cik_iid", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    let err = reg.federated_text("1", "1", FetchOptions::default()).unwrap_err();
    assert!(matches!(err, FactorError::EmptyRegistry { .. }));
}

#[test]
fn describe_lists_one_row_per_descriptor() {
    let mut reg = FactorRegistry::new();
    add_table(&mut reg, "db.t1", &["a"]);
    reg.add(frame(&["v1"]).into(), "v1", "cik_dt", "cik_iid", TimeFormat::Temporal, AliasSpec::None, "1")
        .unwrap();
    let catalogue = reg.describe(false).unwrap();
    assert_eq!(catalogue.height(), 2);
    let provenances: Vec<String> = catalogue
        .column("provenance")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap().to_string())
        .collect();
    assert_eq!(provenances, vec!["table", "frame"]);

    let rows = reg.describe_json(true).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
}
