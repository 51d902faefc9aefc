use serde_json::Value;
use std::collections::HashMap;

use super::error::FilterError;
use super::types::{is_identifier, FilterOp};

/// Compiles a JSON where-document into a SQL predicate with `$n` placeholders.
///
/// ```text
/// { "brand_id": "…", "name": { "$ilike": "%tea%" }, "$or": [ {...}, {...} ] }
/// ```
///
/// Placeholders are cast to the column's declared type when one is known so
/// text-bound parameters compare against uuid/date/numeric columns.
pub struct FilterWhere<'a> {
    params: Vec<Value>,
    casts: &'a HashMap<String, String>,
}

impl<'a> FilterWhere<'a> {
    pub fn generate(
        where_data: &Value,
        casts: &'a HashMap<String, String>,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self {
            params: vec![],
            casts,
        };
        let sql = filter_where.build_object(where_data)?;
        let clause = if sql.is_empty() { "1=1".to_string() } else { sql };
        Ok((clause, filter_where.params))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build_object(&mut self, where_data: &Value) -> Result<String, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok(String::new()),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        let mut parts = Vec::new();
        for (key, value) in obj {
            let sql = if key.starts_with('$') {
                self.logical(key, value)?
            } else {
                self.field(key, value)?
            };
            if !sql.is_empty() {
                parts.push(sql);
            }
        }
        Ok(parts.join(" AND "))
    }

    fn logical(&mut self, op: &str, value: &Value) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let mut parts = Vec::new();
                for v in arr {
                    let sql = self.build_object(v)?;
                    if !sql.is_empty() {
                        parts.push(format!("({})", sql));
                    }
                }
                if parts.is_empty() {
                    return Ok(String::new());
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", parts.join(joiner)))
            }
            "$not" => {
                let sql = self.build_object(value)?;
                if sql.is_empty() {
                    return Ok(String::new());
                }
                Ok(format!("NOT ({})", sql))
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn field(&mut self, column: &str, value: &Value) -> Result<String, FilterError> {
        if !is_identifier(column) {
            return Err(FilterError::InvalidColumn(column.to_string()));
        }

        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) => {
                let mut parts = Vec::new();
                for (op_key, op_val) in obj {
                    let op = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    parts.push(self.condition(column, op, op_val)?);
                }
                Ok(parts.join(" AND "))
            }
            // Implicit equality: { field: value }
            _ => self.condition(column, FilterOp::Eq, value),
        }
    }

    fn condition(&mut self, column: &str, op: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted = format!("\"{}\"", column);
        let sql = match op {
            FilterOp::Eq if data.is_null() => format!("{} IS NULL", quoted),
            FilterOp::Ne if data.is_null() => format!("{} IS NOT NULL", quoted),
            FilterOp::Eq => format!("{} = {}", quoted, self.param(column, data)),
            FilterOp::Ne => format!("{} IS DISTINCT FROM {}", quoted, self.param(column, data)),
            FilterOp::Gt => format!("{} > {}", quoted, self.param(column, data)),
            FilterOp::Gte => format!("{} >= {}", quoted, self.param(column, data)),
            FilterOp::Lt => format!("{} < {}", quoted, self.param(column, data)),
            FilterOp::Lte => format!("{} <= {}", quoted, self.param(column, data)),
            FilterOp::Like => format!("{}::text LIKE {}", quoted, self.text_param(data)?),
            FilterOp::ILike => format!("{}::text ILIKE {}", quoted, self.text_param(data)?),
            FilterOp::In | FilterOp::NIn => {
                let values = data
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$in/$nin require an array".to_string()))?;
                if values.is_empty() {
                    // Empty IN matches nothing; empty NOT IN matches everything
                    return Ok(if op == FilterOp::In { "1=0" } else { "1=1" }.to_string());
                }
                let placeholders: Vec<String> = values.iter().map(|v| self.param(column, v)).collect();
                let keyword = if op == FilterOp::In { "IN" } else { "NOT IN" };
                format!("{} {} ({})", quoted, keyword, placeholders.join(", "))
            }
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => format!(
                    "{} BETWEEN {} AND {}",
                    quoted,
                    self.param(column, &values[0]),
                    self.param(column, &values[1])
                ),
                _ => {
                    return Err(FilterError::InvalidOperatorData(
                        "$between requires exactly 2 values".to_string(),
                    ))
                }
            },
            FilterOp::Null => match data {
                Value::Bool(true) => format!("{} IS NULL", quoted),
                Value::Bool(false) => format!("{} IS NOT NULL", quoted),
                _ => return Err(FilterError::InvalidOperatorData("$null requires a boolean".to_string())),
            },
        };
        Ok(sql)
    }

    fn param(&mut self, column: &str, value: &Value) -> String {
        self.params.push(value.clone());
        match self.casts.get(column) {
            Some(pg_type) => format!("${}::{}", self.params.len(), pg_type),
            None => format!("${}", self.params.len()),
        }
    }

    fn text_param(&mut self, value: &Value) -> Result<String, FilterError> {
        match value {
            Value::String(_) => {
                self.params.push(value.clone());
                Ok(format!("${}", self.params.len()))
            }
            _ => Err(FilterError::InvalidOperatorData("$like/$ilike require a string".to_string())),
        }
    }
}

/// Escape LIKE metacharacters so user search text matches literally
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn casts() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("brand_id".to_string(), "uuid".to_string());
        m.insert("period".to_string(), "date".to_string());
        m
    }

    #[test]
    fn implicit_equality_uses_casts() {
        let c = casts();
        let (sql, params) = FilterWhere::generate(&json!({"brand_id": "abc"}), &c).unwrap();
        assert_eq!(sql, "\"brand_id\" = $1::uuid");
        assert_eq!(params, vec![json!("abc")]);
    }

    #[test]
    fn or_groups_number_placeholders_in_order() {
        let c = casts();
        let (sql, params) = FilterWhere::generate(
            &json!({
                "$or": [
                    {"name": {"$ilike": "%tea%"}},
                    {"description": {"$ilike": "%tea%"}}
                ],
                "period": {"$between": ["2024-01-01", "2024-12-31"]}
            }),
            &c,
        )
        .unwrap();
        assert_eq!(
            sql,
            "((\"name\"::text ILIKE $1) OR (\"description\"::text ILIKE $2)) AND \"period\" BETWEEN $3::date AND $4::date"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn null_and_in_edge_cases() {
        let c = HashMap::new();
        let (sql, params) =
            FilterWhere::generate(&json!({"image_url": null, "id": {"$in": []}}), &c).unwrap();
        assert_eq!(sql, "1=0 AND \"image_url\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_bad_columns_and_operators() {
        let c = HashMap::new();
        assert!(FilterWhere::generate(&json!({"name\" OR 1=1 --": "x"}), &c).is_err());
        assert!(FilterWhere::generate(&json!({"name": {"$regex": "x"}}), &c).is_err());
        assert!(FilterWhere::validate(&json!("raw sql")).is_err());
    }

    #[test]
    fn empty_where_matches_everything() {
        let c = HashMap::new();
        let (sql, _) = FilterWhere::generate(&json!({}), &c).unwrap();
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
