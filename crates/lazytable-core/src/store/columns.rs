//! Column-major cell storage.

use crate::value::{Cell, Value};

/// One `Vec<Cell>` per attribute, all of equal length.
#[derive(Debug, Clone)]
pub(crate) struct Columns {
    cells: Vec<Vec<Cell>>,
    rows: usize,
}

impl Columns {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            cells: vec![Vec::new(); width],
            rows: 0,
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.cells.len()
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    /// Append a row of unknown cells.
    pub(crate) fn push_unknown(&mut self) {
        for column in &mut self.cells {
            column.push(Cell::Unknown);
        }
        self.rows += 1;
    }

    /// Append a full row; `row.len()` must equal the width.
    pub(crate) fn push_row(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.width());
        for (column, cell) in self.cells.iter_mut().zip(row) {
            column.push(cell);
        }
        self.rows += 1;
    }

    pub(crate) fn get(&self, slot: usize, attribute: usize) -> Option<&Cell> {
        self.cells.get(attribute)?.get(slot)
    }

    pub(crate) fn column(&self, attribute: usize) -> Option<&[Cell]> {
        self.cells.get(attribute).map(Vec::as_slice)
    }

    /// Move `Unknown` to `Known(value)`. A cell that is already known keeps
    /// its value; the stored value is returned either way.
    pub(crate) fn fill(&mut self, slot: usize, attribute: usize, value: Value) -> Option<Value> {
        let cell = self.cells.get_mut(attribute)?.get_mut(slot)?;
        match cell {
            Cell::Known(existing) => Some(existing.clone()),
            Cell::Unknown => {
                *cell = Cell::Known(value.clone());
                Some(value)
            }
        }
    }

    pub(crate) fn row(&self, slot: usize) -> Option<Vec<Cell>> {
        if slot >= self.rows {
            return None;
        }
        Some(self.cells.iter().map(|column| column[slot].clone()).collect())
    }

    /// Count of unknown cells in the row at `slot`.
    pub(crate) fn unknown_in_row(&self, slot: usize) -> usize {
        self.cells
            .iter()
            .filter(|column| matches!(column.get(slot), Some(Cell::Unknown)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_is_write_once() {
        let mut cols = Columns::new(2);
        cols.push_unknown();

        let first = cols.fill(0, 1, Value::Continuous(1.5)).unwrap();
        assert!(first.same_bits(&Value::Continuous(1.5)));

        let second = cols.fill(0, 1, Value::Continuous(9.0)).unwrap();
        assert!(second.same_bits(&Value::Continuous(1.5)));
        assert_eq!(cols.unknown_in_row(0), 1);
    }

    #[test]
    fn out_of_bounds_access_is_none() {
        let mut cols = Columns::new(1);
        cols.push_row(vec![Cell::Known(Value::Discrete(0))]);
        assert!(cols.get(1, 0).is_none());
        assert!(cols.get(0, 1).is_none());
        assert!(cols.fill(3, 0, Value::Missing).is_none());
        assert!(cols.row(1).is_none());
    }
}
