//! Fixed-width text files.
//!
//! Layout: three header lines followed by data lines, all of the same byte
//! width. Cells are right-aligned and left-padded with spaces.
//!
//! ```text
//!   a     b  class    id
//!   c     c      d     s
//!            class     m
//! 1.5  -0.2    yes  r-01
//! ```
//!
//! 1. names: one token per column;
//! 2. types: `c`/`continuous`, `d`/`discrete` (categories discovered while
//!    reading), `s`/`string`, or a comma-separated list of categories;
//! 3. flags: `class` marks the label, `m`/`meta` a metadata column and
//!    `i`/`ignore` (also `w`/`weight`, `b`/`basket`) drops the column.
//!
//! Column extents come from the type line: a column ends where its type
//! token ends and starts where the previous one ended. Because every line has
//! the same width the row count follows from the file size, and a cell is one
//! seek plus one read. `?`, `~` and blank cells are missing values.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use lazytable_core::{
    domain::{Attribute, AttributeKind, Domain},
    source::{
        DataSource, IoSnafu, MalformedSnafu, NoSuchAttributeSnafu, RowOutOfRangeSnafu,
        SourceError, SourceResult, TableLength,
    },
    value::Value,
};
use log::debug;
use parking_lot::Mutex;
use snafu::prelude::*;

const HEADER_LINES: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Feature,
    Label,
    Meta,
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    start: u64,
    width: usize,
    kind: AttributeKind,
    role: ColumnRole,
}

/// Random-access source over a fixed-width file.
///
/// The file handle is shared behind a mutex; cell reads are short so readers
/// simply take turns.
#[derive(Debug)]
pub struct FixedWidthSource {
    path: PathBuf,
    file: Mutex<File>,
    line_len: u64,
    rows: u64,
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    domain: Domain,
    /// Categories of open discrete columns, in order of first appearance.
    discovered: Mutex<HashMap<usize, Vec<String>>>,
}

impl FixedWidthSource {
    /// Open `path` and parse its header. Data lines are not read.
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let display = path.display().to_string();

        let file = File::open(&path).context(IoSnafu {
            action: format!("opening {display}"),
        })?;
        let file_len = file
            .metadata()
            .context(IoSnafu {
                action: format!("reading metadata of {display}"),
            })?
            .len();

        let [names, types, flags] = {
            let mut reader = BufReader::new(&file);
            let mut header = [String::new(), String::new(), String::new()];
            for line in header.iter_mut() {
                let read = reader.read_line(line).context(IoSnafu {
                    action: format!("reading header of {display}"),
                })?;
                ensure!(
                    read > 0,
                    MalformedSnafu {
                        message: format!("{display}: expected three header lines"),
                    }
                );
            }
            header
        };

        let layout = parse_header(&names, &types, &flags)
            .map_err(|message| SourceError::Malformed {
                message: format!("{display}: {message}"),
            })?;

        let rows = (file_len / layout.line_len).saturating_sub(HEADER_LINES);
        let domain = layout.domain().map_err(|message| SourceError::Malformed {
            message: format!("{display}: {message}"),
        })?;
        let by_name = layout
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        debug!(
            "opened fixed-width file {display}: {rows} rows, {} columns, {} bytes per line",
            layout.columns.len(),
            layout.line_len
        );

        Ok(Self {
            path,
            file: Mutex::new(file),
            line_len: layout.line_len,
            rows,
            columns: layout.columns,
            by_name,
            domain,
            discovered: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows.
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Label of category `code` of the discrete attribute `name`.
    ///
    /// Works for declared and discovered categories alike; discovered ones
    /// are only known once a cell holding them has been read.
    pub fn category_label(&self, name: &str, code: u32) -> Option<String> {
        let idx = *self.by_name.get(name)?;
        match &self.columns[idx].kind {
            AttributeKind::Discrete { values } if !values.is_empty() => {
                values.get(code as usize).cloned()
            }
            AttributeKind::Discrete { .. } => self
                .discovered
                .lock()
                .get(&idx)
                .and_then(|values| values.get(code as usize).cloned()),
            _ => None,
        }
    }

    /// Categories of the discrete attribute `name` seen or declared so far.
    pub fn categories(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.by_name.get(name) else {
            return Vec::new();
        };
        match &self.columns[idx].kind {
            AttributeKind::Discrete { values } if !values.is_empty() => values.clone(),
            AttributeKind::Discrete { .. } => {
                self.discovered.lock().get(&idx).cloned().unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    fn read_field(&self, row: u64, column: &Column) -> SourceResult<String> {
        let offset = (HEADER_LINES + row) * self.line_len + column.start;
        let mut buf = vec![0u8; column.width];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset)).context(IoSnafu {
                action: format!("seeking to row {row} of {}", self.path.display()),
            })?;
            file.read_exact(&mut buf).context(IoSnafu {
                action: format!("reading row {row} of {}", self.path.display()),
            })?;
        }
        String::from_utf8(buf).map_err(|e| SourceError::Malformed {
            message: format!("row {row}, column {:?}: {e}", column.name),
        })
    }

    fn parse_value(&self, idx: usize, raw: &str) -> SourceResult<Value> {
        let column = &self.columns[idx];
        let raw = raw.trim();
        let missing = raw.is_empty() || raw == "?" || raw == "~";

        match &column.kind {
            AttributeKind::Continuous if missing => Ok(Value::Continuous(f64::NAN)),
            AttributeKind::Continuous => {
                raw.parse::<f64>()
                    .map(Value::Continuous)
                    .map_err(|e| SourceError::Malformed {
                        message: format!("column {:?}: {raw:?} is not a number: {e}", column.name),
                    })
            }
            _ if missing => Ok(Value::Missing),
            AttributeKind::Discrete { values } if !values.is_empty() => values
                .iter()
                .position(|v| v == raw)
                .map(|code| Value::Discrete(code as u32))
                .context(MalformedSnafu {
                    message: format!("column {:?}: unknown category {raw:?}", column.name),
                }),
            AttributeKind::Discrete { .. } => {
                let mut discovered = self.discovered.lock();
                let values = discovered.entry(idx).or_default();
                let code = match values.iter().position(|v| v == raw) {
                    Some(code) => code,
                    None => {
                        values.push(raw.to_string());
                        values.len() - 1
                    }
                };
                Ok(Value::Discrete(code as u32))
            }
            AttributeKind::String => Ok(Value::from(raw)),
        }
    }
}

impl DataSource for FixedWidthSource {
    fn pull_domain(&self) -> SourceResult<Domain> {
        Ok(self.domain.clone())
    }

    fn pull_length(&self) -> SourceResult<TableLength> {
        Ok(TableLength::Finite(self.rows))
    }

    fn pull_cell(&self, row: u64, attribute: &Attribute) -> SourceResult<Value> {
        ensure!(
            row < self.rows,
            RowOutOfRangeSnafu {
                row,
                length: TableLength::Finite(self.rows),
            }
        );
        let idx = *self
            .by_name
            .get(attribute.name())
            .context(NoSuchAttributeSnafu {
                name: attribute.name(),
            })?;
        let raw = self.read_field(row, &self.columns[idx])?;
        self.parse_value(idx, &raw)
    }
}

/// Parsed header: kept columns plus the line width.
#[derive(Debug)]
struct Layout {
    columns: Vec<Column>,
    line_len: u64,
}

impl Layout {
    fn domain(&self) -> Result<Domain, String> {
        let pick = |role: ColumnRole| {
            self.columns
                .iter()
                .filter(|c| c.role == role)
                .map(|c| Attribute::new(c.name.clone(), c.kind.clone()))
                .collect::<Vec<_>>()
        };
        Domain::new(
            pick(ColumnRole::Feature),
            pick(ColumnRole::Label),
            pick(ColumnRole::Meta),
        )
        .map_err(|e| e.to_string())
    }
}

/// End offsets of the whitespace-separated tokens in `line`, with the tokens.
fn token_ends(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                out.push((i, &line[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((line.len(), &line[s..]));
    }
    out
}

fn field(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start.min(end)..end).unwrap_or("").trim()
}

fn strip_terminator(line: &str) -> (&str, usize) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, 2)
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, 1)
    } else {
        (line, 1)
    }
}

fn parse_kind(token: &str) -> AttributeKind {
    match token {
        "c" | "continuous" => AttributeKind::Continuous,
        "d" | "discrete" => AttributeKind::discrete(Vec::<String>::new()),
        "s" | "string" => AttributeKind::String,
        list => AttributeKind::discrete(list.split(',').filter(|v| !v.is_empty())),
    }
}

fn parse_header(names: &str, types: &str, flags: &str) -> Result<Layout, String> {
    let (names, terminator) = strip_terminator(names);
    let (types, _) = strip_terminator(types);
    let (flags, _) = strip_terminator(flags);

    let ends = token_ends(types);
    if ends.is_empty() {
        return Err("type line is empty".to_string());
    }
    if token_ends(names).len() != ends.len() {
        return Err(format!(
            "{} names but {} types",
            token_ends(names).len(),
            ends.len()
        ));
    }

    let mut columns = Vec::with_capacity(ends.len());
    let mut start = 0usize;
    for (end, type_token) in ends {
        let name = field(names, start, end).to_string();
        let flag_tokens: Vec<&str> = field(flags, start, end).split_whitespace().collect();
        let has = |short: &str, long: &str| flag_tokens.iter().any(|f| *f == short || *f == long);

        let width = end - start;
        let column_start = start;
        start = end;

        if has("i", "ignore") || has("w", "weight") || has("b", "basket") {
            continue;
        }
        let kind = parse_kind(type_token);
        let is_label = flag_tokens.contains(&"class");
        let is_meta = has("m", "meta") || kind == AttributeKind::String;
        let role = match (is_label, is_meta) {
            (true, true) => {
                return Err(format!("column {name:?} is marked both class and meta"));
            }
            (true, false) => ColumnRole::Label,
            (false, true) => ColumnRole::Meta,
            (false, false) => ColumnRole::Feature,
        };
        columns.push(Column {
            name,
            start: column_start as u64,
            width,
            kind,
            role,
        });
    }

    Ok(Layout {
        columns,
        line_len: (start + terminator) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_extents_follow_the_type_line() {
        let layout = parse_header(
            "  a     b  class\n",
            "  c     c      d\n",
            "           class\n",
        )
        .unwrap();
        let extents: Vec<_> = layout
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.start, c.width))
            .collect();
        assert_eq!(extents, vec![("a", 0, 3), ("b", 3, 6), ("class", 9, 7)]);
        assert_eq!(layout.line_len, 17);
        assert_eq!(layout.columns[2].role, ColumnRole::Label);
    }

    #[test]
    fn flags_align_with_the_end_of_their_type_token() {
        let layout = parse_header(
            "  a     b  class    id\n",
            "  c     c      d     s\n",
            "           class     m\n",
        )
        .unwrap();
        let roles: Vec<_> = layout.columns.iter().map(|c| (c.name.as_str(), c.role)).collect();
        assert_eq!(
            roles,
            vec![
                ("a", ColumnRole::Feature),
                ("b", ColumnRole::Feature),
                ("class", ColumnRole::Label),
                ("id", ColumnRole::Meta),
            ]
        );
        assert_eq!(layout.line_len, 23);
    }

    #[test]
    fn ignored_columns_still_consume_their_width() {
        let layout = parse_header("x  y  z\n", "c  c  s\n", "   i   \n").unwrap();
        let names: Vec<_> = layout.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["x", "z"]);
        assert_eq!(layout.columns[1].start, 4);
        assert_eq!(layout.columns[1].role, ColumnRole::Meta);
    }

    #[test]
    fn category_lists_become_closed_discrete_kinds() {
        assert_eq!(parse_kind("no,yes"), AttributeKind::discrete(["no", "yes"]));
        assert_eq!(parse_kind("d"), AttributeKind::discrete(Vec::<String>::new()));
    }

    #[test]
    fn header_errors_are_reported() {
        assert!(parse_header("a b\n", "c\n", "\n").is_err());
        assert!(parse_header("a\n", "s\n", "class\n").is_err());
        assert!(parse_header("\n", "\n", "\n").is_err());
    }

    #[test]
    fn crlf_lines_count_both_terminator_bytes() {
        let layout = parse_header("a\r\n", "c\r\n", " \r\n").unwrap();
        assert_eq!(layout.line_len, 3);
    }
}
