use serde_json::Value;

use super::error::FilterError;
use super::types::{is_identifier, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                // ["created_at desc", "name asc"]
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => {
                            return Err(FilterError::InvalidOperatorData(format!(
                                "order entries must be strings, got {}",
                                other
                            )))
                        }
                    }
                }
                out
            }
            Value::Object(obj) => {
                // { "created_at": "desc", "name": "asc" }
                let mut out = Vec::new();
                for (k, v) in obj {
                    let dir = v.as_str().unwrap_or("asc");
                    out.push(FilterOrderInfo {
                        column: k.clone(),
                        sort: Self::parse_direction(dir)?,
                    });
                }
                out
            }
            other => {
                return Err(FilterError::InvalidOperatorData(format!(
                    "unsupported order format: {}",
                    other
                )))
            }
        };

        for info in &infos {
            if !is_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(info.column.clone()));
            }
        }
        Ok(infos)
    }

    fn parse_direction(dir: &str) -> Result<SortDirection, FilterError> {
        if dir.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else if dir.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else {
            Err(FilterError::InvalidOperatorData(format!("unknown sort direction '{}'", dir)))
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                // "-name" is shorthand for "name desc"
                let (col, default_dir) = match col.strip_prefix('-') {
                    Some(stripped) => (stripped, "desc"),
                    None => (col, "asc"),
                };
                let sort = Self::parse_direction(it.next().unwrap_or(default_dir))?;
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_forms() {
        let infos = FilterOrder::validate_and_parse(&json!("name asc, created_at DESC, -period")).unwrap();
        assert_eq!(
            FilterOrder::generate(&infos),
            "ORDER BY \"name\" ASC, \"created_at\" DESC, \"period\" DESC"
        );
    }

    #[test]
    fn rejects_injection_in_column() {
        assert!(FilterOrder::validate_and_parse(&json!("name; DROP TABLE brands")).is_err());
        assert!(FilterOrder::validate_and_parse(&json!({"name\"": "asc"})).is_err());
    }

    #[test]
    fn rejects_unknown_direction() {
        assert!(FilterOrder::validate_and_parse(&json!("name sideways")).is_err());
    }
}
