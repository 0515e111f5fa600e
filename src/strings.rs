/// Read-only view over the workbook shared string table.
///
/// The table itself is owned by the package reader; every sheet borrows it.
#[derive(Debug, Clone, Copy)]
pub struct SharedStrings<'a> {
    strings: &'a [String],
}

impl<'a> SharedStrings<'a> {
    /// Wraps an ordered list of shared strings
    pub fn new(strings: &'a [String]) -> Self {
        SharedStrings { strings }
    }

    /// Gets the string at `index`, `None` if out of range
    pub fn resolve(&self, index: usize) -> Option<&'a str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Number of strings in the table
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
