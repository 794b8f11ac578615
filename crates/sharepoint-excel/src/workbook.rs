//! Ordered collection of named sheets and the merge used by the write path.

use crate::table::Table;

/// Sheets keyed by name, in tab order.
///
/// Names are unique and, as in Excel, compared case-insensitively. Inserting
/// an existing name replaces that sheet in place, keeping its tab position and
/// its original spelling; new names are appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<(String, Table)>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a sheet, returning the previous table under that
    /// name.
    pub fn insert(&mut self, name: impl Into<String>, table: Table) -> Option<Table> {
        let name = name.into();
        if let Some(slot) = self.sheets.iter_mut().find(|(n, _)| same_name(n, &name)) {
            return Some(std::mem::replace(&mut slot.1, table));
        }
        self.sheets.push((name, table));
        None
    }

    #[must_use]
    pub fn with_sheet(mut self, name: impl Into<String>, table: Table) -> Self {
        self.insert(name, table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.sheets
            .iter()
            .find(|(n, _)| same_name(n, name))
            .map(|(_, t)| t)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        let idx = self.sheets.iter().position(|(n, _)| same_name(n, name))?;
        Some(self.sheets.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.sheets.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Overwrites or adds every sheet in `updates`; sheets not named in
    /// `updates` are kept untouched.
    pub fn merge<I, S>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (S, Table)>,
        S: Into<String>,
    {
        for (name, table) in updates {
            self.insert(name, table);
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

impl<S: Into<String>> FromIterator<(S, Table)> for Workbook {
    fn from_iter<I: IntoIterator<Item = (S, Table)>>(iter: I) -> Self {
        let mut workbook = Workbook::new();
        workbook.merge(iter);
        workbook
    }
}

impl<S: Into<String>> Extend<(S, Table)> for Workbook {
    fn extend<I: IntoIterator<Item = (S, Table)>>(&mut self, iter: I) {
        self.merge(iter);
    }
}

impl IntoIterator for Workbook {
    type Item = (String, Table);
    type IntoIter = std::vec::IntoIter<(String, Table)>;

    fn into_iter(self) -> Self::IntoIter {
        self.sheets.into_iter()
    }
}
