use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::PairsError;
use crate::panel::PricePanel;

// One line of the panel file: {"date":"2024-01-02","prices":{"AAA":101.5,"BBB":null}}
#[derive(Debug, Deserialize)]
struct PanelRow {
    date: NaiveDate,
    #[serde(deserialize_with = "ordered_prices")]
    prices: Prices,
}

type Prices = Vec<(String, Option<f64>)>;

struct OrderedPrices;

impl<'de> Visitor<'de> for OrderedPrices {
    type Value = Prices;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of symbol to price")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, Option<f64>>()? {
            out.push(entry);
        }
        Ok(out)
    }
}

// Keeps symbols in file order so columns come out first-seen.
fn ordered_prices<'de, D>(deserializer: D) -> std::result::Result<Prices, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(OrderedPrices)
}

/// Reads a JSON-lines price panel. Columns are every symbol seen, in order of
/// first appearance; a symbol absent (or `null`) on a date is missing there.
/// Rows are sorted by date and a date may appear only once.
pub fn load_price_panel<P: AsRef<Path>>(path: P) -> Result<PricePanel> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("failed to open price panel {}", path_ref.display()))?;
    let reader = BufReader::new(file);
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} of {}", line_no + 1, path_ref.display())
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let row: PanelRow = serde_json::from_str(&line).map_err(|e| {
            anyhow::Error::new(PairsError::InputShape(format!(
                "line {}: {}",
                line_no + 1,
                e
            )))
        })?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(anyhow!("price panel {} is empty", path_ref.display()));
    }

    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        for (symbol, _) in &row.prices {
            if !index.contains_key(symbol) {
                index.insert(symbol.clone(), columns.len());
                columns.push(symbol.clone());
            }
        }
    }

    rows.sort_by_key(|row| row.date);
    if let Some(pair) = rows.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(PairsError::InputShape(format!("duplicate date {}", pair[0].date)).into());
    }

    let mut values = vec![vec![f64::NAN; rows.len()]; columns.len()];
    for (row_idx, row) in rows.iter().enumerate() {
        for (symbol, price) in &row.prices {
            if let (Some(&col), Some(price)) = (index.get(symbol), price) {
                values[col][row_idx] = *price;
            }
        }
    }
    let dates = rows.iter().map(|row| row.date).collect();
    let panel = PricePanel::new(dates, columns, values)?;
    log::info!(
        "Loaded {} instruments over {} dates from {}",
        panel.columns().len(),
        panel.len(),
        path_ref.display()
    );
    Ok(panel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_panel(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn columns_follow_first_appearance_and_rows_sort_by_date() {
        let file = write_panel(&[
            r#"{"date":"2024-01-03","prices":{"ZZZ":3.0,"AAA":30.0}}"#,
            "",
            r#"{"date":"2024-01-02","prices":{"ZZZ":2.0,"MMM":7.0}}"#,
        ]);
        let panel = load_price_panel(file.path()).unwrap();
        assert_eq!(panel.columns(), &["ZZZ", "AAA", "MMM"]);
        assert_eq!(
            panel.dates(),
            &[
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
            ]
        );
        assert_eq!(panel.column("ZZZ").unwrap(), &[2.0, 3.0]);
        assert!(panel.column("AAA").unwrap()[0].is_nan());
        assert!(panel.column("MMM").unwrap()[1].is_nan());
    }

    #[test]
    fn null_price_is_missing() {
        let file = write_panel(&[
            r#"{"date":"2024-01-02","prices":{"AAA":1.0,"BBB":null}}"#,
            r#"{"date":"2024-01-03","prices":{"AAA":1.5,"BBB":2.0}}"#,
        ]);
        let panel = load_price_panel(file.path()).unwrap();
        assert!(panel.column("BBB").unwrap()[0].is_nan());
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let file = write_panel(&[
            r#"{"date":"2024-01-02","prices":{"AAA":1.0}}"#,
            r#"{"date":"2024-01-02","prices":{"AAA":1.1}}"#,
        ]);
        let err = load_price_panel(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PairsError>(),
            Some(PairsError::InputShape(_))
        ));
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let file = write_panel(&[
            r#"{"date":"2024-01-02","prices":{"AAA":1.0}}"#,
            r#"{"date":"not a date","prices":{}}"#,
        ]);
        let err = load_price_panel(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = write_panel(&[]);
        assert!(load_price_panel(file.path()).is_err());
    }
}
