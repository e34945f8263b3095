//! Markdown Module
//!
//! [`Table`]をMarkdownのパイプテーブルに変換するモジュール。
//!
//! 出力例:
//!
//! ```markdown
//! |   A | B   |
//! |----:|:----|
//! |   1 | x   |
//! |   2 | y   |
//! ```
//!
//! - 列順・行順は元の表のまま、インデックス列は出力しない
//! - 数値列は右揃え（小数点位置を揃える）、それ以外は左揃え
//! - 列幅は「ヘッダー幅 + 2」と「最大の値の幅」の大きい方
//! - 表示幅は`unicode-width`で計算する（全角文字は2）

use unicode_width::UnicodeWidthStr;

use crate::table::Table;

/// ヘッダーに確保する最小の余白
const MIN_HEADER_PADDING: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// 表をMarkdownのパイプテーブルに変換
///
/// 末尾に改行は付きません。列のない表は空文字列になります。
pub fn render_table(table: &Table) -> String {
    let width = table.width();
    if width == 0 {
        return String::new();
    }

    // 1. セル文字列の生成
    let aligns: Vec<Align> = (0..width)
        .map(|col| {
            if table.is_numeric_column(col) {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect();

    let mut body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|v| escape_cell(&v.render())).collect())
        .collect();

    for (col, align) in aligns.iter().enumerate() {
        if *align == Align::Right {
            align_decimal_points(&mut body, col);
        }
    }

    let headers: Vec<String> = table.columns.iter().map(|h| escape_cell(h)).collect();

    // 2. 列幅の計算
    let widths: Vec<usize> = (0..width)
        .map(|col| {
            let header_width = headers[col].width() + MIN_HEADER_PADDING;
            body.iter()
                .map(|row| row[col].width())
                .fold(header_width, usize::max)
        })
        .collect();

    // 3. 出力
    let mut lines = Vec::with_capacity(body.len() + 2);
    lines.push(render_row(&headers, &widths, &aligns));
    lines.push(render_separator(&widths, &aligns));
    for row in &body {
        lines.push(render_row(row, &widths, &aligns));
    }

    lines.join("\n")
}

/// セル内のパイプと改行をエスケープ
fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

/// 数値列の小数点位置を揃える（小数部の桁数が少ない値の右側を空白で埋める）
fn align_decimal_points(body: &mut [Vec<String>], col: usize) {
    let fraction_len = |s: &str| s.find('.').map(|pos| s.len() - pos);
    let max_fraction = body
        .iter()
        .filter_map(|row| fraction_len(&row[col]))
        .max()
        .unwrap_or(0);

    if max_fraction == 0 {
        return;
    }

    for row in body.iter_mut() {
        let cell = &mut row[col];
        if cell.is_empty() {
            continue;
        }
        let current = fraction_len(cell).unwrap_or(0);
        cell.push_str(&" ".repeat(max_fraction - current));
    }
}

fn render_row(cells: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let mut line = String::from("|");
    for ((cell, &width), &align) in cells.iter().zip(widths).zip(aligns) {
        let fill = " ".repeat(width.saturating_sub(cell.width()));
        line.push(' ');
        match align {
            Align::Left => {
                line.push_str(cell);
                line.push_str(&fill);
            }
            Align::Right => {
                line.push_str(&fill);
                line.push_str(cell);
            }
        }
        line.push_str(" |");
    }
    line
}

fn render_separator(widths: &[usize], aligns: &[Align]) -> String {
    let mut line = String::from("|");
    for (&width, &align) in widths.iter().zip(aligns) {
        // セルの前後のスペース（各1文字）分を含めた長さ
        let dashes = "-".repeat(width + 1);
        match align {
            Align::Left => {
                line.push(':');
                line.push_str(&dashes);
            }
            Align::Right => {
                line.push_str(&dashes);
                line.push(':');
            }
        }
        line.push('|');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_render_simple_table() {
        let table = Table::from_grid(vec![
            vec![text("A"), text("B")],
            vec![CellValue::Number(1.0), text("x")],
            vec![CellValue::Number(2.0), text("y")],
        ]);

        let expected = "\
|   A | B   |
|----:|:----|
|   1 | x   |
|   2 | y   |";
        assert_eq!(render_table(&table), expected);
    }

    #[test]
    fn test_header_line_has_no_index_column() {
        let table = Table::from_grid(vec![
            vec![text("A"), text("B")],
            vec![CellValue::Number(1.0), text("x")],
        ]);
        let markdown = render_table(&table);
        let header = markdown.lines().next().unwrap();
        let labels: Vec<&str> = header
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_decimal_alignment() {
        let table = Table::from_grid(vec![
            vec![text("v")],
            vec![CellValue::Number(1.0)],
            vec![CellValue::Number(2.25)],
        ]);

        let expected = "\
|    v |
|-----:|
| 1    |
| 2.25 |";
        assert_eq!(render_table(&table), expected);
    }

    #[test]
    fn test_wide_characters() {
        let table = Table::from_grid(vec![vec![text("名前")], vec![text("山田")]]);

        let expected = "\
| 名前   |
|:-------|
| 山田   |";
        assert_eq!(render_table(&table), expected);
    }

    #[test]
    fn test_escapes_pipes_and_newlines() {
        let table = Table::from_grid(vec![vec![text("c")], vec![text("a|b\nc")]]);
        let markdown = render_table(&table);
        assert!(markdown.contains("a\\|b<br>c"));
    }

    #[test]
    fn test_header_only_table() {
        let table = Table::from_grid(vec![vec![text("Only")]]);
        assert_eq!(render_table(&table), "| Only   |\n|:-------|");
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(render_table(&Table::default()), "");
    }

    #[test]
    fn test_empty_cells_are_blank() {
        let table = Table::from_grid(vec![
            vec![text("A"), text("B")],
            vec![CellValue::Empty, text("x")],
        ]);
        let markdown = render_table(&table);
        assert_eq!(markdown.lines().nth(2).unwrap(), "|     | x   |");
    }
}
