//! Quote-aware CSV tokenizer
//!
//! Produces a grid of raw string cells. No types are inferred here and rows
//! may have different lengths; use [`cell`] to index tolerantly.

/// Split CSV text into rows of cells.
///
/// Rows made entirely of empty or whitespace-only cells are dropped.
pub fn tokenize(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                // Escaped quote inside a quoted cell
                chars.next();
                cell.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => row.push(std::mem::take(&mut cell)),
            '\r' | '\n' if !in_quotes => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(c),
        }
    }

    // Last row without a trailing newline
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }

    rows.retain(|r| r.iter().any(|c| !c.trim().is_empty()));
    rows
}

/// Cell at `index`, treating missing trailing cells as empty
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_rows() {
        let rows = tokenize("a,b,c\n1,2,3\n");
        assert_eq!(rows, vec![vec!["a", "b", "c"], vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_quoted_comma_and_escaped_quote() {
        let rows = tokenize("x,\"a, \"\"quoted\"\" value\",y");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "a, \"quoted\" value");
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn test_crlf_is_one_terminator() {
        let rows = tokenize("a,b\r\n1,2\r\n3,4");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["3", "4"]);
    }

    #[test]
    fn test_lone_cr_ends_row() {
        let rows = tokenize("a\rb");
        assert_eq!(rows, vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_newline_inside_quotes_is_kept() {
        let rows = tokenize("\"line one\nline two\",2");
        assert_eq!(rows, vec![vec!["line one\nline two", "2"]]);
    }

    #[test]
    fn test_blank_rows_are_dropped() {
        let rows = tokenize("a,b\n,\n  , \n\n1,2");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn test_trailing_empty_cell_is_kept() {
        let rows = tokenize("a,b,\n");
        assert_eq!(rows, vec![vec!["a", "b", ""]]);
    }

    #[test]
    fn test_short_rows_index_as_empty() {
        let rows = tokenize("a,b,c\n1");
        assert_eq!(cell(&rows[1], 0), "1");
        assert_eq!(cell(&rows[1], 2), "");
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("\n\r\n").is_empty());
    }
}
