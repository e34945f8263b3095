//! Table Module
//!
//! 1シート分の表形式データ（行 × 名前付き列）を表すモジュール。
//! 先頭行をヘッダー、残りの行をデータ行として扱います。

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// セルの値
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 空セル
    Empty,
    /// 数値
    Number(f64),
    /// 文字列
    Text(String),
    /// 論理値
    Bool(bool),
    /// 日時
    DateTime(NaiveDateTime),
    /// 経過時間（日単位）
    Duration(f64),
    /// エラー値（例: `#DIV/0!`）
    Error(String),
}

impl CellValue {
    /// 数値セルかどうか
    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    /// 空セルかどうか
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 表示用の文字列に変換
    ///
    /// - 整数値は小数点なし（`1.0` -> `1`）
    /// - 論理値は `True` / `False`
    /// - 日時は `%Y-%m-%d %H:%M:%S`
    /// - 経過時間は `H:MM:SS`
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Duration(days) => format_duration(*days),
            CellValue::Error(e) => e.clone(),
        }
    }
}

/// 小数の有効桁数
const SIGNIFICANT_DIGITS: usize = 6;

/// 数値を文字列に変換
///
/// 整数値は小数点なし、それ以外は有効数字6桁の一般形式（`%g`相当）。
/// 指数が-5以下または6以上の場合は指数表記になります（例: `1.23457e+06`）。
fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return format!("{}", n);
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }

    // 丸めた後の指数で表記を決める
    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, n);
    let Some((mantissa, exp)) = scientific.split_once('e') else {
        return scientific;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= SIGNIFICANT_DIGITS as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

/// 小数部の末尾の0と小数点を取り除く
fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// 日数を `H:MM:SS` に変換
fn format_duration(days: f64) -> String {
    let total_seconds = (days * 86_400.0).round() as i64;
    let sign = if total_seconds < 0 { "-" } else { "" };
    let total_seconds = total_seconds.abs();
    format!(
        "{}{}:{:02}:{:02}",
        sign,
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

/// Excelのシリアル値を日時に変換
///
/// # エポックシステム
///
/// - 1900年システム（デフォルト）: シリアル値1 = 1900-01-01。
///   Excelの1900年うるう年バグ（存在しない1900-02-29 = 60）を考慮し、
///   60未満のシリアル値は1日ずらして計算します。
/// - 1904年システム: シリアル値0 = 1904-01-01（Mac版Excel）
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    let epoch = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let millis = (serial * 86_400_000.0).round() as i64;
    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::milliseconds(millis))
}

/// 1シート分の表
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// 列名（元の列順）
    pub columns: Vec<String>,
    /// データ行（元の行順）
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// 行データの並びから表を構築
    ///
    /// 先頭行がヘッダーになります。ヘッダー名は次の規則で決まります。
    ///
    /// - 空のヘッダーは `Unnamed: {列番号}`
    /// - 重複したヘッダーは2つ目以降に `.1`, `.2`, ... を付加
    ///
    /// 行の長さが揃っていない場合は、最長の行に合わせて空セルで補います。
    pub fn from_grid(grid: Vec<Vec<CellValue>>) -> Self {
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows = grid.into_iter();

        let header = match rows.next() {
            Some(header) => header,
            None => return Self::default(),
        };

        let columns = header_names(&header, width);
        let rows = rows
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// 列数
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// 列が数値列かどうか（空でない値がすべて数値で、1つ以上ある）
    pub fn is_numeric_column(&self, col: usize) -> bool {
        let mut seen = false;
        for row in &self.rows {
            match row.get(col) {
                Some(value) if value.is_empty() => {}
                Some(value) if value.is_number() => seen = true,
                Some(_) => return false,
                None => {}
            }
        }
        seen
    }
}

/// ヘッダー行から列名を生成
fn header_names(header: &[CellValue], width: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(width);

    for col in 0..width {
        let raw = header
            .get(col)
            .map(CellValue::render)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("Unnamed: {}", col));

        let mut name = raw.clone();
        while let Some(count) = counts.get_mut(&name) {
            *count += 1;
            name = format!("{}.{}", raw, count);
        }
        counts.insert(name.clone(), 0);
        names.push(name);
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(CellValue::Number(1.0).render(), "1");
        assert_eq!(CellValue::Number(-42.0).render(), "-42");
        assert_eq!(CellValue::Number(2.5).render(), "2.5");
        assert_eq!(CellValue::Number(0.1).render(), "0.1");
    }

    #[test]
    fn test_render_floats_with_six_significant_digits() {
        assert_eq!(CellValue::Number(3.14159265).render(), "3.14159");
        assert_eq!(CellValue::Number(-0.5).render(), "-0.5");
        assert_eq!(CellValue::Number(2.0 / 3.0).render(), "0.666667");
        assert_eq!(CellValue::Number(123456.7).render(), "123457");
        assert_eq!(CellValue::Number(0.0001234).render(), "0.0001234");
        assert_eq!(CellValue::Number(0.00001234).render(), "1.234e-05");
        assert_eq!(CellValue::Number(1234567.5).render(), "1.23457e+06");
        assert_eq!(CellValue::Number(1e20).render(), "1e+20");
    }

    #[test]
    fn test_render_bool_and_error() {
        assert_eq!(CellValue::Bool(true).render(), "True");
        assert_eq!(CellValue::Bool(false).render(), "False");
        assert_eq!(CellValue::Error("#DIV/0!".to_string()).render(), "#DIV/0!");
    }

    #[test]
    fn test_render_duration() {
        assert_eq!(CellValue::Duration(1.0 / 24.0 * 1.5).render(), "1:30:00");
        assert_eq!(CellValue::Duration(1.25).render(), "30:00:00");
    }

    #[test]
    fn test_serial_to_datetime_1900() {
        let dt = serial_to_datetime(45292.5, false).unwrap();
        assert_eq!(dt.to_string(), "2024-01-01 12:00:00");

        let dt = serial_to_datetime(1.0, false).unwrap();
        assert_eq!(dt.date().to_string(), "1900-01-01");

        let dt = serial_to_datetime(61.0, false).unwrap();
        assert_eq!(dt.date().to_string(), "1900-03-01");
    }

    #[test]
    fn test_serial_to_datetime_1904() {
        let dt = serial_to_datetime(0.0, true).unwrap();
        assert_eq!(dt.date().to_string(), "1904-01-01");
    }

    #[test]
    fn test_from_grid_header_and_rows() {
        let table = Table::from_grid(vec![
            vec![text("A"), text("B")],
            vec![CellValue::Number(1.0), text("x")],
            vec![CellValue::Number(2.0), text("y")],
        ]);

        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][1], text("y"));
        assert!(table.is_numeric_column(0));
        assert!(!table.is_numeric_column(1));
    }

    #[test]
    fn test_from_grid_unnamed_and_duplicate_headers() {
        let table = Table::from_grid(vec![
            vec![text("A"), CellValue::Empty, text("A"), text("A")],
            vec![CellValue::Empty],
        ]);

        assert_eq!(table.columns, vec!["A", "Unnamed: 1", "A.1", "A.2"]);
        assert_eq!(table.rows[0].len(), 4);
    }

    #[test]
    fn test_from_grid_empty() {
        let table = Table::from_grid(Vec::new());
        assert_eq!(table.width(), 0);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_numeric_column_ignores_empty_cells() {
        let table = Table::from_grid(vec![
            vec![text("n")],
            vec![CellValue::Number(1.0)],
            vec![CellValue::Empty],
        ]);
        assert!(table.is_numeric_column(0));

        let all_empty = Table::from_grid(vec![vec![text("n")], vec![CellValue::Empty]]);
        assert!(!all_empty.is_numeric_column(0));
    }
}
