// ============================================================================
// Table Projection
// ============================================================================
//
// Stateless (row, column) -> text mapping over a row source. Nothing here
// fails: stale rows, vanished records and unknown columns all come back as
// visible placeholder strings so the display layer can always render.
//
// ============================================================================

pub mod columns;

pub use columns::Column;

use crate::core::{CellRole, ItemFlags, RecordHandle};
use crate::registry::{RegistrySnapshot, TransactionRegistry};

/// Anything the projection can read rows from.
pub trait RowSource {
    fn count(&self) -> usize;
    fn record_at(&self, row: usize) -> Option<RecordHandle>;
}

impl RowSource for TransactionRegistry {
    fn count(&self) -> usize {
        TransactionRegistry::count(self)
    }

    fn record_at(&self, row: usize) -> Option<RecordHandle> {
        TransactionRegistry::record_at(self, row)
    }
}

impl RowSource for RegistrySnapshot {
    fn count(&self) -> usize {
        RegistrySnapshot::count(self)
    }

    fn record_at(&self, row: usize) -> Option<RecordHandle> {
        RegistrySnapshot::record_at(self, row)
    }
}

pub fn unknown_row(row: usize) -> String {
    format!("unknown row {}", row)
}

pub const UNKNOWN_RECORD: &str = "unknown record";

pub fn unknown_column(column: usize) -> String {
    format!("unknown column {}", column)
}

pub struct TableProjection<'a, S: RowSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: RowSource + ?Sized> TableProjection<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn row_count(&self) -> usize {
        self.source.count()
    }

    pub fn column_count(&self) -> usize {
        Column::COUNT
    }

    /// Text for one cell
    ///
    /// # Examples
    ///
    /// ```
    /// use pipetable::{CellRole, SessionId, TableProjection, TransactionRecord, TransactionRegistry};
    ///
    /// let registry = TransactionRegistry::new();
    /// registry
    ///     .add(TransactionRecord::builder(SessionId(1)).host("example.com").build())
    ///     .unwrap();
    ///
    /// let table = TableProjection::new(&registry);
    /// assert_eq!(table.cell_value(0, 3, CellRole::Display), "example.com");
    /// assert_eq!(table.cell_value(5, 3, CellRole::Display), "unknown row 5");
    /// ```
    pub fn cell_value(&self, row: usize, column: usize, role: CellRole) -> String {
        // Tooltips currently mirror the display text.
        match role {
            CellRole::Display | CellRole::Tooltip => self.display_text(row, column),
        }
    }

    fn display_text(&self, row: usize, column: usize) -> String {
        let Some(record) = self.source.record_at(row) else {
            // The source still counts the row but has nothing behind it.
            if row < self.source.count() {
                return UNKNOWN_RECORD.to_string();
            }
            return unknown_row(row);
        };

        match Column::from_index(column) {
            Some(column) => column.value_of(&record),
            None => unknown_column(column),
        }
    }

    /// Every cell of `row`, in column order.
    pub fn row_values(&self, row: usize, role: CellRole) -> Vec<String> {
        (0..self.column_count())
            .map(|column| self.cell_value(row, column, role))
            .collect()
    }

    pub fn column_label(&self, column: usize) -> Option<&'static str> {
        Column::from_index(column).map(|column| column.label())
    }

    pub fn flags(&self, row: usize) -> ItemFlags {
        if row < self.source.count() {
            ItemFlags::INTERACTIVE
        } else {
            ItemFlags::INERT
        }
    }

    /// Plain-text grid of the whole table.
    pub fn render(&self) -> String {
        let headers: Vec<&str> = Column::ALL.iter().map(|c| c.label()).collect();
        let rows: Vec<Vec<String>> = (0..self.row_count())
            .map(|row| self.row_values(row, CellRole::Display))
            .collect();

        // Calculate column widths
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (i, value) in row.iter().enumerate() {
                widths[i] = widths[i].max(value.chars().count());
            }
        }

        let mut out = String::new();

        let header: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, label)| format!("{:width$}", label, width = widths[i]))
            .collect();
        out.push_str(header.join(" | ").trim_end());
        out.push('\n');

        let separator: String = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");
        out.push_str(&separator);
        out.push('\n');

        for row in &rows {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, value)| format!("{:width$}", value, width = widths[i]))
                .collect();
            out.push_str(line.join(" | ").trim_end());
            out.push('\n');
        }

        out.push_str(&format!("{} row(s)", rows.len()));
        out
    }
}
