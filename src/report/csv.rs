//! CSV projection of report rows.
//!
//! Every cell is double-quoted. Lists of member objects collapse to their
//! display names joined with `"; "`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::to_fields;
use crate::errors::AppError;

/// Render rows as CSV. The header is the key order of the first row; empty
/// input renders as an empty string.
pub fn to_csv(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let headers: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| quote(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            headers
                .iter()
                .map(|h| quote(&cell_text(row.get(*h))))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Serialize values into CSV rows.
pub fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Map<String, Value>>, AppError> {
    items.iter().map(to_fields).collect()
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn display_name(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("fullName")
        .and_then(Value::as_str)
        .or_else(|| object.get("name").and_then(Value::as_str))
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(object) => display_name(object)
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string()),
                other => cell_text(Some(other)),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(Value::Object(object)) => display_name(object)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(object.clone()).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(to_csv(&[]), "");
    }

    #[test]
    fn test_header_follows_first_row_order() {
        let rows = vec![
            row(json!({"periodLabel": "3/2025", "rate": 20.5})),
            row(json!({"rate": 0, "periodLabel": "4/2025", "extra": "ignored"})),
        ];
        assert_eq!(
            to_csv(&rows),
            "\"periodLabel\",\"rate\"\n\"3/2025\",\"20.5\"\n\"4/2025\",\"0\""
        );
    }

    #[test]
    fn test_members_flatten_to_names() {
        let rows = vec![row(json!({
            "groupName": "G1",
            "members": [{"fullName": "A"}, {"fullName": "B"}, {"name": "C"}]
        }))];
        assert_eq!(to_csv(&rows), "\"groupName\",\"members\"\n\"G1\",\"A; B; C\"");
    }

    #[test]
    fn test_quotes_are_doubled_and_missing_cells_empty() {
        let rows = vec![
            row(json!({"note": "say \"hi\", ok", "flag": true})),
            row(json!({"flag": null})),
        ];
        assert_eq!(
            to_csv(&rows),
            "\"note\",\"flag\"\n\"say \"\"hi\"\", ok\",\"true\"\n\"\",\"\""
        );
    }
}
