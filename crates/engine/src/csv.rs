//! CSV import/export for universe snapshots and basket holdings.
//!
//! Header-driven and column-order independent: rows are addressed through
//! the header row, never by position. Quoted fields with embedded commas,
//! quotes and newlines are supported on both paths.

use crate::types::Holding;
use persistence::repository::{HoldingRecord, InstrumentRecord, NewInstrument};
use serde::{Deserialize, Serialize};

/// A parsed CSV file: one header row plus data rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parse CSV text. The first record is the header row.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut records = parse_records(text)?;
        if records.is_empty() {
            return Err("CSV input is empty".to_string());
        }
        let headers: Vec<String> = records.remove(0).iter().map(|h| h.trim().to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err("CSV header row is empty".to_string());
        }
        Ok(Self {
            headers,
            rows: records,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Field value by row index and column name; None when the column is
    /// absent or the row is short
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(|s| s.as_str())
    }

    /// Like `value` but treating an empty/whitespace field as absent
    pub fn value_non_empty(&self, row: usize, column: &str) -> Option<&str> {
        self.value(row, column)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Split CSV text into records, honoring quoted fields
fn parse_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    let mut saw_any = false;

    while let Some(c) = chars.next() {
        saw_any = true;
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {} // CRLF: the \n closes the record
            '\n' => {
                record.push(std::mem::take(&mut field));
                // Skip blank lines between records
                if record.len() > 1 || !record[0].trim().is_empty() {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    if !saw_any {
        return Err("CSV input is empty".to_string());
    }
    Ok(records)
}

/// Quote a field when it needs quoting
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Build typed instrument rows from a schema-validated universe table
pub fn parse_universe(table: &CsvTable) -> Result<Vec<NewInstrument>, String> {
    let mut out = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let required = |col: &str| -> Result<String, String> {
            table
                .value_non_empty(i, col)
                .map(str::to_string)
                .ok_or_else(|| format!("row {}: missing value for '{col}'", i + 1))
        };
        let optional_f64 = |col: &str| -> Result<Option<f64>, String> {
            match table.value_non_empty(i, col) {
                Some(v) => v
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| format!("row {}: '{col}' is not a number: {v}", i + 1)),
                None => Ok(None),
            }
        };

        out.push(NewInstrument {
            instrument_id: required("instrument_id")?,
            ticker: required("ticker")?,
            name: required("name")?,
            asset_class: required("asset_class")?,
            region: required("region")?,
            currency: required("currency")?,
            eligible: parse_bool(&required("eligible")?),
            isin: table.value_non_empty(i, "isin").map(str::to_string),
            min_weight: optional_f64("min_weight")?,
            max_weight: optional_f64("max_weight")?,
            notes: table.value_non_empty(i, "notes").map(str::to_string),
        });
    }
    Ok(out)
}

/// Build holdings from a basket CSV (ticker, weight, optional notes)
pub fn parse_holdings(table: &CsvTable) -> Result<Vec<Holding>, String> {
    for col in ["ticker", "weight"] {
        if !table.has_column(col) {
            return Err(format!("holdings CSV is missing the '{col}' column"));
        }
    }
    let mut out = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        let ticker = table
            .value_non_empty(i, "ticker")
            .ok_or_else(|| format!("row {}: missing ticker", i + 1))?
            .to_string();
        let raw = table
            .value_non_empty(i, "weight")
            .ok_or_else(|| format!("row {}: missing weight", i + 1))?;
        let weight = raw
            .parse::<f64>()
            .map_err(|_| format!("row {}: weight is not a number: {raw}", i + 1))?;
        out.push(Holding {
            ticker,
            weight,
            notes: table.value_non_empty(i, "notes").map(str::to_string),
        });
    }
    Ok(out)
}

/// Export instruments with exactly the upload schema columns
pub fn universe_to_csv(rows: &[InstrumentRecord]) -> String {
    let mut csv = String::from(
        "instrument_id,ticker,name,asset_class,region,currency,eligible,isin,min_weight,max_weight,notes\n",
    );
    for r in rows {
        let fields = [
            csv_field(&r.instrument_id),
            csv_field(&r.ticker),
            csv_field(&r.name),
            csv_field(&r.asset_class),
            csv_field(&r.region),
            csv_field(&r.currency),
            if r.eligible != 0 { "true" } else { "false" }.to_string(),
            csv_field(r.isin.as_deref().unwrap_or("")),
            r.min_weight.map(|w| w.to_string()).unwrap_or_default(),
            r.max_weight.map(|w| w.to_string()).unwrap_or_default(),
            csv_field(r.notes.as_deref().unwrap_or("")),
        ];
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }
    csv
}

/// Export version holdings (ticker, weight, notes)
pub fn holdings_to_csv(rows: &[HoldingRecord]) -> String {
    let mut csv = String::from("ticker,weight,notes\n");
    for r in rows {
        csv.push_str(&format!(
            "{},{},{}\n",
            csv_field(&r.ticker),
            r.weight,
            csv_field(r.notes.as_deref().unwrap_or(""))
        ));
    }
    csv
}
