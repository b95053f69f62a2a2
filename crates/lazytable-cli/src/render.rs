//! Plain-text rendering of rows and summaries.

use std::sync::Arc;

use lazytable_core::{
    domain::{Attribute, AttributeKind, Domain},
    table::{AttributeStats, CycleReport, RowView, TableResult},
    value::Value,
};
use lazytable_sources::FixedWidthSource;
use tabled::{builder::Builder, settings::Style};

/// Resolves discrete codes to category labels.
///
/// Declared categories come from the domain; categories a fixed-width file
/// discovers while it is read are looked up on the file.
#[derive(Clone, Default)]
pub(crate) struct Labels {
    file: Option<Arc<FixedWidthSource>>,
}

impl Labels {
    pub(crate) fn from_file(file: Arc<FixedWidthSource>) -> Self {
        Self { file: Some(file) }
    }

    pub(crate) fn label(&self, attribute: &Attribute, code: u32) -> Option<String> {
        match attribute.kind() {
            AttributeKind::Discrete { values } if !values.is_empty() => {
                values.get(code as usize).cloned()
            }
            AttributeKind::Discrete { .. } => self
                .file
                .as_ref()
                .and_then(|file| file.category_label(attribute.name(), code)),
            _ => None,
        }
    }

    pub(crate) fn format(&self, attribute: &Attribute, value: &Value) -> String {
        match value {
            Value::Discrete(code) => self
                .label(attribute, *code)
                .unwrap_or_else(|| value.to_string()),
            Value::Continuous(v) if v.is_nan() => "?".to_string(),
            _ => value.to_string(),
        }
    }
}

pub(crate) fn render_header(domain: &Domain) -> String {
    let mut line = String::from("#");
    for attr in domain.attributes() {
        line.push('\t');
        line.push_str(attr.name());
    }
    line
}

pub(crate) fn render_row(row: &RowView<'_>, labels: &Labels) -> TableResult<String> {
    let domain = row.table().domain();
    let values = row.values()?;
    let mut line = row.index().to_string();
    for (attr, value) in domain.attributes().iter().zip(&values) {
        line.push('\t');
        line.push_str(&labels.format(attr, value));
    }
    Ok(line)
}

pub(crate) fn render_stats(stats: &[AttributeStats]) -> String {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));

    let mut builder = Builder::default();
    builder.push_record(["attribute", "known", "unknown", "missing", "min", "max", "mean"]);
    for s in stats {
        builder.push_record([
            s.name.clone(),
            s.known.to_string(),
            s.unknown.to_string(),
            s.missing.to_string(),
            fmt(s.min),
            fmt(s.max),
            fmt(s.mean),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

pub(crate) fn render_cycle(report: &CycleReport) -> String {
    format!(
        "probed {}, admitted {}, rejected {}, failed {}{}",
        report.probed,
        report.admitted,
        report.rejected,
        report.failed,
        if report.exhausted { " (region exhausted)" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazytable_core::{source::MemorySource, table::LazyTable};

    #[test]
    fn rows_render_with_category_labels() -> Result<(), Box<dyn std::error::Error>> {
        let domain = Domain::new(
            vec![Attribute::continuous("x")],
            vec![Attribute::discrete("class", ["no", "yes"])],
            vec![],
        )?;
        let source = MemorySource::new(
            domain,
            vec![vec![Value::Continuous(f64::NAN), Value::Discrete(1)]],
        )?;
        let table = LazyTable::from_source(source)?;

        assert_eq!(render_header(table.domain()), "#\tx\tclass");
        let row = table.get(0)?;
        assert_eq!(render_row(&row, &Labels::default())?, "0\t?\tyes");
        Ok(())
    }

    #[test]
    fn unknown_codes_fall_back_to_the_code() {
        let open = Attribute::discrete("k", Vec::<String>::new());
        assert_eq!(Labels::default().format(&open, &Value::Discrete(3)), "#3");
    }

    #[test]
    fn stats_render_as_a_table() {
        let rendered = render_stats(&[AttributeStats {
            name: "x".to_string(),
            known: 2,
            unknown: 1,
            missing: 0,
            min: Some(1.0),
            max: Some(3.0),
            mean: Some(2.0),
        }]);
        assert!(rendered.contains("attribute"));
        assert!(rendered.contains("2.0000"));
        assert_eq!(rendered.lines().count(), 5);
    }

    #[test]
    fn cycle_report_mentions_exhaustion() {
        let report = CycleReport {
            probed: 3,
            admitted: 2,
            rejected: 1,
            failed: 0,
            exhausted: true,
        };
        assert_eq!(
            render_cycle(&report),
            "probed 3, admitted 2, rejected 1, failed 0 (region exhausted)"
        );
    }
}
