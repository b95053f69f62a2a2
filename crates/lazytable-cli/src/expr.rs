//! Filter expressions accepted by `--where` and the shell's `filter`.
//!
//! ```text
//! NAME OP VALUE      OP is one of < <= > >= == !=
//! NAME in LO..HI     inclusive range
//! ```
//!
//! Continuous attributes take numeric values. Discrete attributes compare
//! by category label (or code) with `==` and `!=`; string attributes compare
//! text with `==` and `!=`.

use lazytable_core::{
    domain::{AttributeKind, Domain},
    filter::{Comparison, Predicate},
};

use crate::{
    error::{CliError, CliResult},
    render::Labels,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterExpr {
    Compare { name: String, op: Op, value: String },
    Range { name: String, lo: f64, hi: f64 },
}

fn invalid(expr: &str, message: impl Into<String>) -> CliError {
    CliError::InvalidFilter {
        expr: expr.to_string(),
        message: message.into(),
    }
}

fn parse_number(expr: &str, raw: &str) -> CliResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| invalid(expr, format!("'{raw}' is not a number")))
}

impl FilterExpr {
    pub(crate) fn parse(expr: &str) -> CliResult<Self> {
        let trimmed = expr.trim();

        if let Some((name, range)) = trimmed.split_once(" in ") {
            let (lo, hi) = range
                .trim()
                .split_once("..")
                .ok_or_else(|| invalid(expr, "range must look like LO..HI"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid(expr, "missing attribute name"));
            }
            return Ok(FilterExpr::Range {
                name: name.to_string(),
                lo: parse_number(expr, lo.trim())?,
                hi: parse_number(expr, hi.trim())?,
            });
        }

        let at = trimmed
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid(expr, "expected an operator (< <= > >= == !=) or 'in'"))?;
        let (name, rest) = trimmed.split_at(at);
        let (op, value) = if let Some(v) = rest.strip_prefix("<=") {
            (Op::Le, v)
        } else if let Some(v) = rest.strip_prefix(">=") {
            (Op::Ge, v)
        } else if let Some(v) = rest.strip_prefix("==") {
            (Op::Eq, v)
        } else if let Some(v) = rest.strip_prefix("!=") {
            (Op::Ne, v)
        } else if let Some(v) = rest.strip_prefix('<') {
            (Op::Lt, v)
        } else if let Some(v) = rest.strip_prefix('>') {
            (Op::Gt, v)
        } else {
            return Err(invalid(expr, "unknown operator"));
        };

        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return Err(invalid(expr, "missing attribute name"));
        }
        if value.is_empty() {
            return Err(invalid(expr, "missing value"));
        }
        Ok(FilterExpr::Compare {
            name: name.to_string(),
            op,
            value: value.to_string(),
        })
    }

    fn name(&self) -> &str {
        match self {
            FilterExpr::Compare { name, .. } | FilterExpr::Range { name, .. } => name,
        }
    }

    /// Turn the expression into a predicate over `domain`.
    pub(crate) fn to_predicate(
        &self,
        expr: &str,
        domain: &Domain,
        labels: &Labels,
    ) -> CliResult<Predicate> {
        let name = self.name().to_string();
        let attribute = domain
            .position_of(&name)
            .and_then(|pos| domain.attribute(pos))
            .ok_or_else(|| invalid(expr, format!("no attribute named '{name}'")))?
            .clone();

        let kind = attribute.kind().clone();
        match (self, &kind) {
            (FilterExpr::Range { lo, hi, .. }, AttributeKind::Continuous) => {
                Ok(Predicate::between(name, *lo, *hi))
            }
            (FilterExpr::Range { .. }, _) => {
                Err(invalid(expr, "ranges need a continuous attribute"))
            }
            (FilterExpr::Compare { op, value, .. }, AttributeKind::Continuous) => {
                let x = parse_number(expr, value)?;
                let test = match op {
                    Op::Lt => Comparison::Less(x),
                    Op::Le => Comparison::LessEqual(x),
                    Op::Gt => Comparison::Greater(x),
                    Op::Ge => Comparison::GreaterEqual(x),
                    Op::Eq => Comparison::Equal(x),
                    Op::Ne => Comparison::NotEqual(x),
                };
                Ok(Predicate::continuous(name, test))
            }
            (
                FilterExpr::Compare {
                    op: op @ (Op::Eq | Op::Ne),
                    value,
                    ..
                },
                AttributeKind::Discrete { values },
            ) if !values.is_empty() => {
                let code = values
                    .iter()
                    .position(|v| v == value)
                    .map(|c| c as u32)
                    .or_else(|| value.parse::<u32>().ok().filter(|c| (*c as usize) < values.len()))
                    .ok_or_else(|| invalid(expr, format!("'{value}' is not a category of '{name}'")))?;
                let codes: Vec<u32> = match op {
                    Op::Eq => vec![code],
                    _ => (0..values.len() as u32).filter(|c| *c != code).collect(),
                };
                Ok(Predicate::one_of(name, codes))
            }
            (FilterExpr::Compare { op: op @ (Op::Eq | Op::Ne), value, .. }, AttributeKind::Discrete { .. }) => {
                let (want_equal, value, labels) = (*op == Op::Eq, value.clone(), labels.clone());
                let label = format!("{name} {} {value}", if want_equal { "==" } else { "!=" });
                Ok(Predicate::custom(label, move |row| {
                    let code = row.value_by_name(attribute.name())?.as_code();
                    let matches = code.is_some_and(|code| {
                        labels.label(&attribute, code).as_deref() == Some(value.as_str())
                            || value.parse::<u32>() == Ok(code)
                    });
                    Ok(matches == want_equal)
                }))
            }
            (FilterExpr::Compare { op: op @ (Op::Eq | Op::Ne), value, .. }, AttributeKind::String) => {
                let (want_equal, value) = (*op == Op::Eq, value.clone());
                let label = format!("{name} {} {value}", if want_equal { "==" } else { "!=" });
                Ok(Predicate::custom(label, move |row| {
                    let text = row.value_by_name(attribute.name())?;
                    Ok((text.as_text() == Some(value.as_str())) == want_equal)
                }))
            }
            (FilterExpr::Compare { .. }, _) => Err(invalid(
                expr,
                "ordering comparisons need a continuous attribute",
            )),
        }
    }
}

/// Parse `expr` and compile it against `domain` in one go.
pub(crate) fn parse_filter(expr: &str, domain: &Domain, labels: &Labels) -> CliResult<Predicate> {
    FilterExpr::parse(expr)?.to_predicate(expr, domain, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazytable_core::{
        domain::Attribute,
        source::MemorySource,
        table::{LazyTable, TableError},
        value::Value,
    };

    fn table() -> LazyTable {
        let domain = Domain::new(
            vec![Attribute::continuous("x")],
            vec![Attribute::discrete("class", ["no", "yes"])],
            vec![Attribute::string("id")],
        )
        .unwrap();
        let rows = (0..6u32)
            .map(|i| {
                vec![
                    Value::Continuous(f64::from(i)),
                    Value::Discrete(i % 2),
                    Value::from(format!("r{i}")),
                ]
            })
            .collect();
        LazyTable::from_source(MemorySource::new(domain, rows).unwrap()).unwrap()
    }

    fn matching(expr: &str) -> Result<Vec<u64>, Box<dyn std::error::Error>> {
        let base = table();
        let view = base.derive(parse_filter(expr, base.domain(), &Labels::default())?)?;
        let rows = view
            .iter()
            .map(|row| {
                row.and_then(|r| r.get("x"))
                    .map(|v| v.as_f64().unwrap_or(f64::NAN) as u64)
            })
            .collect::<Result<Vec<_>, TableError>>()?;
        Ok(rows)
    }

    #[test]
    fn operators_parse_with_or_without_spaces() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(
            FilterExpr::parse("x>=2")?,
            FilterExpr::Compare {
                name: "x".into(),
                op: Op::Ge,
                value: "2".into()
            }
        );
        assert_eq!(
            FilterExpr::parse(" x in 1.5..3 ")?,
            FilterExpr::Range {
                name: "x".into(),
                lo: 1.5,
                hi: 3.0
            }
        );
        assert!(FilterExpr::parse("x").is_err());
        assert!(FilterExpr::parse("> 3").is_err());
        assert!(FilterExpr::parse("x <").is_err());
        assert!(FilterExpr::parse("x in 3").is_err());
        Ok(())
    }

    #[test]
    fn continuous_comparisons_select_rows() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(matching("x > 3")?, vec![4, 5]);
        assert_eq!(matching("x <= 1")?, vec![0, 1]);
        assert_eq!(matching("x in 2..3")?, vec![2, 3]);
        assert_eq!(matching("x != 0")?, vec![1, 2, 3, 4, 5]);
        Ok(())
    }

    #[test]
    fn discrete_and_text_comparisons_use_labels() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(matching("class == yes")?, vec![1, 3, 5]);
        assert_eq!(matching("class != yes")?, vec![0, 2, 4]);
        assert_eq!(matching("class == 0")?, vec![0, 2, 4]);
        assert_eq!(matching("id == r4")?, vec![4]);
        Ok(())
    }

    #[test]
    fn bad_filters_are_rejected_up_front() {
        let base = table();
        let labels = Labels::default();
        for expr in ["nope > 1", "class > 1", "id in 1..2", "x > abc", "class == maybe"] {
            let err = parse_filter(expr, base.domain(), &labels).unwrap_err();
            assert!(matches!(err, CliError::InvalidFilter { .. }), "{expr}");
        }
    }
}
