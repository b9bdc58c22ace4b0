use super::column::{ColumnId, ColumnLayout};
use super::pivot::{pivot_to_flat, PivotOutcome, PivotRow};
use crate::model::measurement::scalar_to_f64;
use crate::prelude::{VizError, VizResult};
use serde_json::Value;

/// Which parameter groups receive a new timestamp column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampTarget {
    All,
    Parameter(String),
}

impl TimestampTarget {
    /// `"all"` (any case) selects every group.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Parameter(input.to_owned())
        }
    }
}

/// One column of the grid in paste order: the two pinned coordinate
/// columns, then every value column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetColumn {
    Latitude,
    Longitude,
    Value(ColumnId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTimestampOutcome {
    pub added: Vec<String>,
    /// Parameters that already had the timestamp.
    pub duplicates: Vec<String>,
}

/// Editable grid: column layout plus station rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSheet {
    layout: ColumnLayout,
    rows: Vec<PivotRow>,
}

impl Default for TableSheet {
    fn default() -> Self {
        Self {
            layout: ColumnLayout::placeholder(),
            rows: Vec::new(),
        }
    }
}

impl TableSheet {
    /// Builds the layout from every cell present in `rows`. An empty table
    /// gets the placeholder layout.
    pub fn from_rows(rows: Vec<PivotRow>) -> Self {
        let layout = ColumnLayout::from_ids(rows.iter().flat_map(|r| r.cells.keys()));
        let layout = if layout.is_empty() {
            ColumnLayout::placeholder()
        } else {
            layout
        };
        Self { layout, rows }
    }

    /// Parses the `GET /api/table` response body.
    pub fn from_json(raw: &Value) -> VizResult<Self> {
        let rows = raw
            .as_array()
            .ok_or_else(|| VizError::invalid("table response is not an array"))?
            .iter()
            .filter_map(Value::as_object)
            .map(PivotRow::from_json)
            .collect();
        Ok(Self::from_rows(rows))
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn rows(&self) -> &[PivotRow] {
        &self.rows
    }

    pub fn row_mut(&mut self, index: usize) -> &mut PivotRow {
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, PivotRow::default);
        }
        &mut self.rows[index]
    }

    pub fn columns(&self) -> Vec<SheetColumn> {
        [SheetColumn::Latitude, SheetColumn::Longitude]
            .into_iter()
            .chain(self.layout.columns().cloned().map(SheetColumn::Value))
            .collect()
    }

    /// Appends a parameter group with one timestamp column. Adding an
    /// existing parameter adds the timestamp to that group instead.
    pub fn add_parameter(&mut self, name: &str, timestamp: &str) -> bool {
        let (name, timestamp) = (name.trim(), timestamp.trim());
        if name.is_empty() || timestamp.is_empty() {
            return false;
        }
        let group = self.layout.group_or_insert(name);
        let inserted = group.insert(timestamp);
        group.sort_children();
        inserted
    }

    pub fn add_timestamp(&mut self, target: &TimestampTarget, timestamp: &str) -> AddTimestampOutcome {
        let mut outcome = AddTimestampOutcome::default();
        let timestamp = timestamp.trim();
        if timestamp.is_empty() {
            return outcome;
        }
        for group in &mut self.layout.groups {
            let selected = match target {
                TimestampTarget::All => true,
                TimestampTarget::Parameter(name) => group.name == *name,
            };
            if !selected {
                continue;
            }
            if group.insert(timestamp) {
                group.sort_children();
                outcome.added.push(group.name.clone());
            } else {
                outcome.duplicates.push(group.name.clone());
            }
        }
        outcome
    }

    /// Renames a parameter group; its cells move with it. Renaming onto an
    /// existing group merges the two.
    pub fn rename_parameter(&mut self, old: &str, new: &str) -> bool {
        let new = new.trim();
        if new.is_empty() || new == old {
            return false;
        }
        let Some(position) = self.layout.groups.iter().position(|g| g.name == old) else {
            return false;
        };
        match self.layout.groups.iter().position(|g| g.name == new) {
            Some(existing) => {
                let removed = self.layout.groups.remove(position);
                let existing = if existing > position { existing - 1 } else { existing };
                let target = &mut self.layout.groups[existing];
                for child in &removed.children {
                    target.insert(&child.id.timestamp);
                }
                target.sort_children();
            }
            None => {
                let group = &mut self.layout.groups[position];
                group.name = new.to_owned();
                for child in &mut group.children {
                    child.id.parameter = new.to_owned();
                }
            }
        }
        self.rekey(|id| {
            (id.parameter == old).then(|| ColumnId::new(new, id.timestamp.clone()))
        });
        true
    }

    /// Renames one timestamp column; its cells move with it.
    pub fn rename_timestamp(&mut self, column: &ColumnId, new: &str) -> bool {
        let new = new.trim();
        if new.is_empty() || new == column.timestamp {
            return false;
        }
        let Some(group) = self.layout.group_mut(&column.parameter) else {
            return false;
        };
        if group.has_timestamp(new) {
            return false;
        }
        let Some(child) = group.children.iter_mut().find(|c| c.id == *column) else {
            return false;
        };
        child.id.timestamp = new.to_owned();
        group.sort_children();
        self.rekey(|id| (id == column).then(|| ColumnId::new(id.parameter.clone(), new)));
        true
    }

    /// Drops one timestamp column; a group left without columns disappears.
    pub fn remove_column(&mut self, column: &ColumnId) -> bool {
        let Some(group) = self.layout.group_mut(&column.parameter) else {
            return false;
        };
        let before = group.children.len();
        group.children.retain(|c| c.id != *column);
        if group.children.len() == before {
            return false;
        }
        self.layout.groups.retain(|g| !g.children.is_empty());
        for row in &mut self.rows {
            row.cells.remove(column);
        }
        true
    }

    pub fn remove_parameter(&mut self, name: &str) -> bool {
        let before = self.layout.groups.len();
        self.layout.groups.retain(|g| g.name != name);
        if self.layout.groups.len() == before {
            return false;
        }
        for row in &mut self.rows {
            row.cells.retain(|id, _| id.parameter != name);
        }
        true
    }

    /// Writes tab-separated clipboard text starting at the focused cell,
    /// spilling right across the column order and down across rows. Cells
    /// past the last column are dropped. Returns the number of cells written.
    pub fn paste(&mut self, focus_row: usize, focus_column: &SheetColumn, text: &str) -> usize {
        let columns = self.columns();
        let Some(start) = columns.iter().position(|c| c == focus_column) else {
            return 0;
        };
        let mut written = 0;
        let lines = text.trim_end_matches(['\r', '\n']).lines();
        for (offset, line) in lines.enumerate() {
            let row = self.row_mut(focus_row + offset);
            for (column, cell) in columns[start..].iter().zip(line.split('\t')) {
                let cell = cell.trim_end_matches('\r');
                match column {
                    SheetColumn::Latitude => row.latitude = parse_coordinate(cell),
                    SheetColumn::Longitude => row.longitude = parse_coordinate(cell),
                    SheetColumn::Value(id) => row.set_cell(id.clone(), cell),
                }
                written += 1;
            }
        }
        written
    }

    pub fn non_empty_rows(&self) -> Vec<PivotRow> {
        self.rows.iter().filter(|r| !r.is_blank()).cloned().collect()
    }

    /// Flat records for `POST /api/table`.
    pub fn to_flat(&self) -> PivotOutcome {
        pivot_to_flat(&self.non_empty_rows(), &self.layout)
    }

    fn rekey<F>(&mut self, mut rename: F)
    where
        F: FnMut(&ColumnId) -> Option<ColumnId>,
    {
        for row in &mut self.rows {
            let moved: Vec<(ColumnId, ColumnId)> = row
                .cells
                .keys()
                .filter_map(|id| rename(id).map(|new| (id.clone(), new)))
                .collect();
            for (old, new) in moved {
                if let Some(text) = row.cells.remove(&old) {
                    row.cells.insert(new, text);
                }
            }
        }
    }
}

fn parse_coordinate(cell: &str) -> Option<f64> {
    scalar_to_f64(&Value::String(cell.to_owned())).filter(|v| v.is_finite())
}
