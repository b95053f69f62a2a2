//! Fixed-width files on disk: conversion from tab-separated input, header
//! parsing, single-cell reads and lazy tables on top.
#![allow(missing_docs)]

use std::{fs, path::Path};

use lazytable_core::{
    domain::{Attribute, AttributeKind, Role},
    filter::Predicate,
    source::{DataSource, SourceError, TableLength},
    table::{LazyTable, LengthMode},
    value::Value,
};
use lazytable_sources::{FixedWidthSource, convert_tab_to_fixed, fixed_path_for};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const ZOO_TAB: &str = "\
name\tlegs\tweight\tkind\tnote\tid
s\tc\tc\td\ts\tc
m\t\t\tclass\t\ti
aardvark\t4\t56.5\tmammal\tburrows\t1
bass\t0\t2.25\tfish\t?\t2
crow\t2\t?\tbird\tclever\t3
dolphin\t0\t150\tmammal\t\t4
";

fn write_zoo(dir: &Path) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
    let tab = dir.join("zoo.tab");
    fs::write(&tab, ZOO_TAB)?;
    let fixed = fixed_path_for(&tab);
    convert_tab_to_fixed(&tab, &fixed)?;
    Ok(fixed)
}

#[test]
fn conversion_produces_equal_width_lines() -> TestResult {
    let tmp = TempDir::new()?;
    let tab = tmp.path().join("zoo.tab");
    fs::write(&tab, ZOO_TAB)?;
    let fixed = fixed_path_for(&tab);
    let summary = convert_tab_to_fixed(&tab, &fixed)?;

    assert_eq!(fixed.extension().and_then(|e| e.to_str()), Some("fixed"));
    assert_eq!(summary.lines, 7);
    assert_eq!(summary.columns, 6);

    let text = fs::read_to_string(&fixed)?;
    for line in text.lines() {
        assert_eq!(line.len() + 1, summary.line_len, "line {line:?}");
    }
    assert!(text.lines().nth(3).is_some_and(|l| l.starts_with("aardvark")));
    assert!(text.lines().nth(4).is_some_and(|l| l.starts_with("    bass")));
    Ok(())
}

#[test]
fn header_defines_domain_and_roles() -> TestResult {
    let tmp = TempDir::new()?;
    let source = FixedWidthSource::open(write_zoo(tmp.path())?)?;
    let domain = source.pull_domain()?;

    let names: Vec<_> = domain.attributes().iter().map(Attribute::name).collect();
    assert_eq!(names, vec!["legs", "weight", "kind", "name", "note"]);
    assert_eq!(domain.role(domain.position_of("kind").unwrap_or(usize::MAX)), Some(Role::Label));
    assert_eq!(domain.role(domain.position_of("name").unwrap_or(usize::MAX)), Some(Role::Meta));
    assert!(domain.position_of("id").is_none());
    assert_eq!(
        domain.attribute(domain.position_of("legs").unwrap_or(usize::MAX)).map(Attribute::kind),
        Some(&AttributeKind::Continuous)
    );
    assert_eq!(source.pull_length()?, TableLength::Finite(4));
    Ok(())
}

#[test]
fn cells_are_read_individually() -> TestResult {
    let tmp = TempDir::new()?;
    let source = FixedWidthSource::open(write_zoo(tmp.path())?)?;
    let weight = Attribute::continuous("weight");
    let name = Attribute::string("name");
    let note = Attribute::string("note");

    assert_eq!(source.pull_cell(3, &weight)?, Value::Continuous(150.0));
    assert_eq!(source.pull_cell(1, &name)?, Value::from("bass"));
    assert!(source.pull_cell(2, &weight)?.as_f64().is_some_and(f64::is_nan));
    assert_eq!(source.pull_cell(1, &note)?, Value::Missing);
    assert_eq!(source.pull_cell(3, &note)?, Value::Missing);

    let err = source.pull_cell(4, &weight).unwrap_err();
    assert!(matches!(err, SourceError::RowOutOfRange { row: 4, .. }));
    let err = source.pull_cell(0, &Attribute::continuous("id")).unwrap_err();
    assert!(matches!(err, SourceError::NoSuchAttribute { .. }));
    Ok(())
}

#[test]
fn open_categories_are_coded_in_order_of_appearance() -> TestResult {
    let tmp = TempDir::new()?;
    let source = FixedWidthSource::open(write_zoo(tmp.path())?)?;
    let kind = Attribute::discrete("kind", Vec::<String>::new());

    assert_eq!(source.pull_cell(2, &kind)?, Value::Discrete(0));
    assert_eq!(source.pull_cell(0, &kind)?, Value::Discrete(1));
    assert_eq!(source.pull_cell(3, &kind)?, Value::Discrete(1));
    assert_eq!(source.categories("kind"), vec!["bird", "mammal"]);
    assert_eq!(source.category_label("kind", 1).as_deref(), Some("mammal"));
    assert_eq!(source.category_label("kind", 5), None);
    Ok(())
}

#[test]
fn lazy_table_over_a_file_reads_only_what_it_needs() -> TestResult {
    let tmp = TempDir::new()?;
    let table = LazyTable::from_source(FixedWidthSource::open(write_zoo(tmp.path())?)?)?;
    assert_eq!(table.len(LengthMode::Full)?, TableLength::Finite(4));

    let heavy = table.derive(Predicate::greater("weight", 50.0))?;
    let names: Vec<String> = heavy
        .iter()
        .map(|row| row.and_then(|r| r.get("name")).map(|v| v.to_string()))
        .collect::<Result<_, _>>()?;
    assert_eq!(names, vec!["aardvark", "dolphin"]);
    assert_eq!(heavy.materialized_len(), 2);
    assert_eq!(table.materialized_len(), 0);
    Ok(())
}

#[test]
fn truncated_header_is_malformed() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("short.fixed");
    fs::write(&path, "a b\nc c\n")?;
    let err = FixedWidthSource::open(&path).unwrap_err();
    assert!(matches!(err, SourceError::Malformed { .. }));

    let err = FixedWidthSource::open(tmp.path().join("missing.fixed")).unwrap_err();
    assert!(matches!(err, SourceError::Io { .. }));
    Ok(())
}
