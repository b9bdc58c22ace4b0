//! Conversion between the spreadsheet editor's pivoted rows (one row per
//! station, one column per parameter and timestamp) and flat measurements.

pub mod column;
pub mod pivot;
pub mod sheet;

pub use column::{ColumnGroup, ColumnId, ColumnLayout, ColumnSpec};
pub use pivot::{
    flat_to_column_groups, flat_to_rows, pivot_to_flat, FlatRecord, PivotOutcome, PivotRow,
    RejectedCell,
};
pub use sheet::{AddTimestampOutcome, SheetColumn, TableSheet, TimestampTarget};
