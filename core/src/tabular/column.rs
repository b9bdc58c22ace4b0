use crate::math::dates::compare_labels;
use serde::{Deserialize, Serialize};

/// Joins parameter and timestamp in the grid's string field names.
pub const FIELD_DELIMITER: char = '_';

pub const PLACEHOLDER_PARAMETER: &str = "New Parameter";
pub const PLACEHOLDER_TIMESTAMP: &str = "YYYY-MM-DD";

/// Identity of one value column: a (parameter, timestamp) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    pub parameter: String,
    pub timestamp: String,
}

impl ColumnId {
    pub fn new(parameter: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            timestamp: timestamp.into(),
        }
    }

    /// `<parameter>_<timestamp>` as used by the table endpoint.
    pub fn field(&self) -> String {
        format!("{}{}{}", self.parameter, FIELD_DELIMITER, self.timestamp)
    }

    /// Splits a field name on its last delimiter.
    ///
    /// A parameter containing the delimiter round-trips, but a timestamp
    /// containing it does not: `"a_b_c"` always parses as (`a_b`, `c`).
    pub fn parse_field(field: &str) -> Option<Self> {
        let (parameter, timestamp) = field.rsplit_once(FIELD_DELIMITER)?;
        if parameter.is_empty() || timestamp.is_empty() {
            return None;
        }
        Some(Self::new(parameter, timestamp))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub id: ColumnId,
}

impl ColumnSpec {
    pub fn header(&self) -> &str {
        &self.id.timestamp
    }
}

/// All timestamp columns of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnGroup {
    pub name: String,
    pub children: Vec<ColumnSpec>,
}

impl ColumnGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn has_timestamp(&self, timestamp: &str) -> bool {
        self.children.iter().any(|c| c.id.timestamp == timestamp)
    }

    /// Adds a child column unless one exists for `timestamp`.
    pub fn insert(&mut self, timestamp: &str) -> bool {
        if self.has_timestamp(timestamp) {
            return false;
        }
        self.children.push(ColumnSpec {
            id: ColumnId::new(self.name.clone(), timestamp),
        });
        true
    }

    /// Chronological order; unparseable labels keep their relative order at the end.
    pub fn sort_children(&mut self) {
        self.children
            .sort_by(|a, b| compare_labels(&a.id.timestamp, &b.id.timestamp));
    }
}

/// Ordered parameter groups of the editing grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub groups: Vec<ColumnGroup>,
}

impl ColumnLayout {
    /// Layout offered when the server has no rows yet.
    pub fn placeholder() -> Self {
        let mut group = ColumnGroup::new(PLACEHOLDER_PARAMETER);
        group.insert(PLACEHOLDER_TIMESTAMP);
        Self {
            groups: vec![group],
        }
    }

    /// Groups parameters in first-appearance order, children sorted by date.
    pub fn from_ids<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a ColumnId>,
    {
        let mut layout = Self::default();
        for id in ids {
            layout.group_or_insert(&id.parameter).insert(&id.timestamp);
        }
        for group in &mut layout.groups {
            group.sort_children();
        }
        layout
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&ColumnGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ColumnGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    pub(crate) fn group_or_insert(&mut self, name: &str) -> &mut ColumnGroup {
        let position = match self.groups.iter().position(|g| g.name == name) {
            Some(position) => position,
            None => {
                self.groups.push(ColumnGroup::new(name));
                self.groups.len() - 1
            }
        };
        &mut self.groups[position]
    }

    pub fn parameters(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Value columns in display order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnId> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.children.iter().map(|c| &c.id))
    }

    pub fn contains(&self, id: &ColumnId) -> bool {
        self.group(&id.parameter)
            .map(|g| g.has_timestamp(&id.timestamp))
            .unwrap_or(false)
    }
}
