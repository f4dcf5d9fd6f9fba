use serde_json::Value;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `{ "name": 1, "createdAt": -1 }`, `"name -createdAt"`,
    /// `"name asc, createdAt desc"` or a list of such strings.
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::Null => vec![],
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)?),
                        other => return Err(FilterError::InvalidSort(format!("unexpected sort entry {}", other))),
                    }
                }
                out
            }
            Value::Object(obj) => {
                let mut out = Vec::new();
                for (k, v) in obj {
                    let sort = match v {
                        Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                        Value::Number(n) if n.as_i64() == Some(1) => SortDirection::Asc,
                        Value::String(s) if s.eq_ignore_ascii_case("desc") || s.eq_ignore_ascii_case("descending") => {
                            SortDirection::Desc
                        }
                        Value::String(s) if s.eq_ignore_ascii_case("asc") || s.eq_ignore_ascii_case("ascending") => {
                            SortDirection::Asc
                        }
                        other => return Err(FilterError::InvalidSort(format!("invalid direction {} for {}", other, k))),
                    };
                    out.push(FilterOrderInfo { column: Self::column_name(k), sort });
                }
                out
            }
            other => return Err(FilterError::InvalidSort(format!("unsupported sort {}", other))),
        };

        for info in &infos {
            FilterWhere::validate_path(&info.column)?;
        }
        Ok(infos)
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // "a asc, b desc" uses commas; "a -b" uses whitespace with a minus prefix
        let mut out = Vec::new();
        if s.contains(',') {
            for part in s.split(',') {
                let trimmed = part.trim();
                if trimmed.is_empty() { continue; }
                let mut it = trimmed.split_whitespace();
                if let Some(col) = it.next() {
                    let dir = it.next().unwrap_or("asc");
                    let sort = if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc };
                    out.push(FilterOrderInfo { column: Self::column_name(col), sort });
                }
            }
            return Ok(out);
        }

        let tokens: Vec<&str> = s.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let next = tokens.get(i + 1).map(|t| t.to_ascii_lowercase());
            match next.as_deref() {
                Some("asc") | Some("desc") => {
                    let sort = if next.as_deref() == Some("desc") { SortDirection::Desc } else { SortDirection::Asc };
                    out.push(FilterOrderInfo { column: Self::column_name(token), sort });
                    i += 2;
                }
                _ => {
                    let (column, sort) = match token.strip_prefix('-') {
                        Some(rest) => (rest, SortDirection::Desc),
                        None => (token.trim_start_matches('+'), SortDirection::Asc),
                    };
                    out.push(FilterOrderInfo { column: Self::column_name(column), sort });
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    fn column_name(name: &str) -> String {
        if name == "id" { "_id".to_string() } else { name.to_string() }
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("(doc #> '{{{}}}') {}", i.column.replace('.', ","), i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mongo_style_object() {
        let infos = FilterOrder::validate_and_parse(&json!({ "sequence": 1, "createdAt": -1 })).unwrap();
        assert!(infos.contains(&FilterOrderInfo { column: "sequence".into(), sort: SortDirection::Asc }));
        assert!(infos.contains(&FilterOrderInfo { column: "createdAt".into(), sort: SortDirection::Desc }));
    }

    #[test]
    fn parses_minus_prefixed_string() {
        let infos = FilterOrder::validate_and_parse(&json!("name -createdAt")).unwrap();
        assert_eq!(
            infos,
            vec![
                FilterOrderInfo { column: "name".into(), sort: SortDirection::Asc },
                FilterOrderInfo { column: "createdAt".into(), sort: SortDirection::Desc },
            ]
        );
    }

    #[test]
    fn parses_comma_separated_string() {
        let infos = FilterOrder::validate_and_parse(&json!("name desc, code")).unwrap();
        assert_eq!(infos[0].sort, SortDirection::Desc);
        assert_eq!(infos[1].column, "code");
    }

    #[test]
    fn rejects_bad_direction() {
        assert!(FilterOrder::validate_and_parse(&json!({ "name": 2 })).is_err());
    }

    #[test]
    fn renders_order_by() {
        let infos = FilterOrder::validate_and_parse(&json!("-sequence")).unwrap();
        assert_eq!(FilterOrder::generate(&infos), "ORDER BY (doc #> '{sequence}') DESC");
    }
}
