//! Statement text for each store operation.
//!
//! The store never parses these; they exist so observers of the `sql`
//! event see what a relational backend would have been sent.

use sequel_types::{SqlStatement, Value};

use crate::schema::{Row, Schema};

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f %:z")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn where_clause(criteria: &Row) -> String {
    if criteria.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = criteria
        .iter()
        .map(|(k, v)| match v {
            Value::Null => format!("{} IS NULL", quote_ident(k)),
            _ => format!("{}={}", quote_ident(k), literal(v)),
        })
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// Drop and recreate the table.
pub(crate) fn recreate(schema: &Schema) -> [SqlStatement; 2] {
    let table = quote_ident(&schema.table_name());
    let columns: Vec<String> = schema
        .fields()
        .map(|f| {
            let mut col = format!("{} {}", quote_ident(&f.name), f.kind.sql_type());
            if f.name == sequel_types::constants::PRIMARY_KEY {
                col.push_str(" PRIMARY KEY");
            } else if !f.allow_null {
                col.push_str(" NOT NULL");
            }
            col
        })
        .collect();
    [
        SqlStatement::new(format!("DROP TABLE IF EXISTS {table};")),
        SqlStatement::new(format!("CREATE TABLE IF NOT EXISTS {table} ({});", columns.join(", "))),
    ]
}

pub(crate) fn select(table: &str, criteria: &Row, limit_one: bool) -> SqlStatement {
    let limit = if limit_one { " LIMIT 1" } else { "" };
    SqlStatement::new(format!(
        "SELECT * FROM {}{}{};",
        quote_ident(table),
        where_clause(criteria),
        limit
    ))
}

pub(crate) fn count(table: &str) -> SqlStatement {
    SqlStatement::new(format!("SELECT count(*) as \"count\" FROM {};", quote_ident(table)))
}

pub(crate) fn insert(table: &str, row: &Row) -> SqlStatement {
    let columns: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
    let values: Vec<String> = row.values().map(literal).collect();
    SqlStatement::new(format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        columns.join(","),
        values.join(",")
    ))
}

pub(crate) fn update(table: &str, attrs: &Row, id: i64) -> SqlStatement {
    let sets: Vec<String> = attrs
        .iter()
        .map(|(k, v)| format!("{}={}", quote_ident(k), literal(v)))
        .collect();
    SqlStatement::new(format!(
        "UPDATE {} SET {} WHERE \"id\"={id};",
        quote_ident(table),
        sets.join(",")
    ))
}

/// `by` per field; negative amounts render as a subtraction.
pub(crate) fn increment(table: &str, amounts: &[(String, i64)], id: i64) -> SqlStatement {
    let sets: Vec<String> = amounts
        .iter()
        .map(|(k, by)| {
            let col = quote_ident(k);
            if *by < 0 {
                format!("{col}={col} - {}", by.unsigned_abs())
            } else {
                format!("{col}={col} + {by}")
            }
        })
        .collect();
    SqlStatement::new(format!(
        "UPDATE {} SET {} WHERE \"id\"={id};",
        quote_ident(table),
        sets.join(",")
    ))
}
