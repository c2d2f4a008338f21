use itertools::Itertools;
use unicode_width::UnicodeWidthStr;

/// 把若干行渲染成左对齐的文本表格，列之间用两个空格分隔
pub fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let columns = header.len();
    let mut widths: Vec<usize> = header.iter().map(|h| h.width()).collect();
    for row in rows {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let render_row = |cells: Vec<&str>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                // 最后一列不补空格
                if i + 1 == cells.len() {
                    cell.to_string()
                } else {
                    format!("{}{}", cell, " ".repeat(widths[i] - cell.width()))
                }
            })
            .join("  ")
    };

    std::iter::once(render_row(header.to_vec()))
        .chain(
            rows.iter()
                .map(|row| render_row(row.iter().take(columns).map(String::as_str).collect())),
        )
        .join("\n")
}
