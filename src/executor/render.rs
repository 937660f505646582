//! Result rendering
//!
//! Formats a header row plus data rows as a bordered text table for the
//! terminal, the way query results and `show` output are presented.

/// Render a table from a header and data rows.
pub fn render(header: &[String], rows: &[Vec<String>]) -> String {
    if header.is_empty() && rows.is_empty() {
        return String::new();
    }

    // Column widths from the widest cell in each column.
    let columns = rows
        .iter()
        .map(|r| r.len())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for (index, cell) in header.iter().enumerate() {
        widths[index] = widths[index].max(cell.len());
    }
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.len());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    output.push_str(&format_row(header, &widths));
    output.push_str(&separator);
    for row in rows {
        output.push_str(&format_row(row, &widths));
    }
    output.push_str(&separator);
    output.push_str(&format!("{} row(s)\n", rows.len()));

    output
}

/// Render comma-separated lines where the first line is the header.
pub fn render_csv_lines(lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }

    let split = |line: &String| -> Vec<String> {
        line.split(',').map(|cell| cell.to_string()).collect()
    };

    let header = split(&lines[0]);
    let rows: Vec<Vec<String>> = lines[1..].iter().map(split).collect();
    render(&header, &rows)
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(index, width)| {
            let cell = cells.get(index).map(String::as_str).unwrap_or("");
            format!(" {:<width$} ", cell, width = width)
        })
        .collect();
    format!("|{}|\n", padded.join("|"))
}
