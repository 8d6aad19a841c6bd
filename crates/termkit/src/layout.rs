//! Headers, sections, key-value pairs and simple tables

use colored::Colorize;
use console::measure_text_width;

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(measure_text_width(title)).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// A column-aligned table.
///
/// Cells may carry ANSI colors; widths are measured on the visible text.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a table with the given column headers
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; missing cells render empty
    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    /// Number of rows, excluding the header
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| measure_text_width(h)).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let width = measure_text_width(cell);
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(width),
                    None => widths.push(width),
                }
            }
        }
        widths
    }

    /// Render the table as lines, two spaces between columns
    pub fn render(&self) -> Vec<String> {
        let widths = self.widths();
        let line = |cells: &[String]| {
            let mut out = String::from("  ");
            for (i, width) in widths.iter().enumerate() {
                let cell = cells.get(i).map_or("", String::as_str);
                out.push_str(cell);
                if i + 1 < widths.len() {
                    let pad = width.saturating_sub(measure_text_width(cell)) + 2;
                    out.push_str(&" ".repeat(pad));
                }
            }
            out.trim_end().to_string()
        };

        let header_cells: Vec<String> = self.headers.iter().map(|h| h.bold().to_string()).collect();
        let mut lines = vec![line(&header_cells)];
        lines.extend(self.rows.iter().map(|row| line(row)));
        lines
    }

    /// Print the table to stdout
    pub fn print(&self) {
        for line in self.render() {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_aligns_columns() {
        colored::control::set_override(false);
        let mut table = Table::new(["KIND", "NAME", "RESULT"]);
        table.row(["StorageClass", "example-nfs", "accepted"]);
        table.row(["Pod", "a", "blocked"]);

        let lines = table.render();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "  KIND          NAME         RESULT");
        assert_eq!(lines[1], "  StorageClass  example-nfs  accepted");
        assert_eq!(lines[2], "  Pod           a            blocked");
    }

    #[test]
    fn test_table_short_rows() {
        colored::control::set_override(false);
        let mut table = Table::new(["A", "B"]);
        table.row(["x"]);
        assert_eq!(table.render()[1], "  x");
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
