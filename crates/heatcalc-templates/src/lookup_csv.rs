//! Lookup tables kept in CSV files.
//!
//! Two layouts are accepted, chosen by header: `key,value` for exact-match
//! tables and `min,max,value` for range tables. Empty `min`/`max` cells mean
//! an open bound.

use std::path::Path;

use heatcalc_model::{FieldValue, LookupEntry, LookupMatch, parse_number};

use crate::error::TemplateError;

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn get_string(row: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn cell_value(text: String) -> FieldValue {
    match parse_number(&text) {
        Some(number) => FieldValue::Number(number),
        None => FieldValue::Text(text),
    }
}

pub fn load_lookup_csv(path: &Path) -> Result<Vec<LookupEntry>, TemplateError> {
    let bytes = std::fs::read(path).map_err(|e| TemplateError::io(path, e))?;
    parse_lookup_csv(&bytes, path)
}

/// `path` is only used in error messages.
pub fn parse_lookup_csv(bytes: &[u8], path: &Path) -> Result<Vec<LookupEntry>, TemplateError> {
    let csv_error = |message: String| TemplateError::Csv {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| csv_error(e.to_string()))?
        .clone();

    let idx_value = header_index(&headers, "value")
        .ok_or_else(|| csv_error("missing 'value' column".to_string()))?;
    let idx_key = header_index(&headers, "key");
    let idx_min = header_index(&headers, "min");
    let idx_max = header_index(&headers, "max");
    if idx_key.is_none() && idx_min.is_none() && idx_max.is_none() {
        return Err(csv_error(
            "expected a 'key' column or 'min'/'max' columns".to_string(),
        ));
    }

    let mut entries = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| csv_error(e.to_string()))?;
        let Some(value) = get_string(&row, Some(idx_value)) else {
            return Err(csv_error(format!("row {} has no value", line + 2)));
        };

        let matcher = match idx_key {
            Some(_) => match get_string(&row, idx_key) {
                Some(key) => LookupMatch::Key { key },
                None => return Err(csv_error(format!("row {} has no key", line + 2))),
            },
            None => {
                let bound = |idx: Option<usize>| -> Result<Option<f64>, TemplateError> {
                    match get_string(&row, idx) {
                        None => Ok(None),
                        Some(text) => parse_number(&text).map(Some).ok_or_else(|| {
                            csv_error(format!("row {}: '{text}' is not a number", line + 2))
                        }),
                    }
                };
                LookupMatch::Range {
                    min: bound(idx_min)?,
                    max: bound(idx_max)?,
                }
            }
        };
        entries.push(LookupEntry {
            matcher,
            value: cell_value(value),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_tables_parse_numbers_and_text() {
        let entries = parse_lookup_csv(
            b"key,value\ngas,\"0,12\"\noil,0.11\nwood,ask\n",
            Path::new("prices.csv"),
        )
        .expect("parses");
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].matcher,
            LookupMatch::Key {
                key: "gas".to_string()
            }
        );
        assert_eq!(entries[0].value, FieldValue::Number(0.12));
        assert_eq!(entries[2].value, FieldValue::from("ask"));
    }

    #[test]
    fn range_tables_allow_open_bounds() {
        let entries = parse_lookup_csv(
            b"min,max,value\n,1980,180\n1980,2005,120\n2005,,60\n",
            Path::new("factors.csv"),
        )
        .expect("parses");
        assert_eq!(
            entries[0].matcher,
            LookupMatch::Range {
                min: None,
                max: Some(1980.0)
            }
        );
        assert_eq!(
            entries[2].matcher,
            LookupMatch::Range {
                min: Some(2005.0),
                max: None
            }
        );
    }

    #[test]
    fn missing_columns_are_reported() {
        let err = parse_lookup_csv(b"name,price\ngas,1\n", Path::new("bad.csv")).unwrap_err();
        assert!(err.to_string().contains("missing 'value' column"));
        let err = parse_lookup_csv(b"value\n1\n", Path::new("bad.csv")).unwrap_err();
        assert!(err.to_string().contains("'key' column"));
    }
}
