// ABOUTME: Row serializer turning one fetched page into a multi-row INSERT
// ABOUTME: Every value is NULL or a quoted, escaped literal; no numeric fast path

use crate::dialect::{Dialect, RawValue, RowBatch};

/// Render one raw value as an SQL literal
///
/// `None` becomes `NULL`. Text becomes a quoted string literal regardless of
/// the source column type. Bytes that are not valid UTF-8 become a binary
/// literal so the output stays UTF-8.
pub fn render_value(dialect: Dialect, value: &RawValue) -> String {
    match value {
        None => "NULL".to_string(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => dialect.quote_string(text),
            Err(_) => dialect.binary_literal(bytes),
        },
    }
}

/// Render a page of rows as a single `INSERT INTO ... VALUES (...), (...);`
///
/// Returns `None` for an empty page instead of an empty statement.
///
/// # Examples
///
/// ```
/// # use sqldump::dialect::{Dialect, RowBatch};
/// # use sqldump::dump::serializer::render_insert;
/// let batch = RowBatch {
///     columns: vec!["id".to_string(), "name".to_string()],
///     rows: vec![
///         vec![Some(b"1".to_vec()), Some(b"O'Brien".to_vec())],
///         vec![Some(b"2".to_vec()), None],
///     ],
/// };
/// assert_eq!(
///     render_insert(Dialect::MySql, "users", &batch).unwrap(),
///     "INSERT INTO `users` (`id`, `name`) VALUES ('1', 'O''Brien'), ('2', NULL);\n"
/// );
/// assert!(render_insert(Dialect::MySql, "users", &RowBatch::default()).is_none());
/// ```
pub fn render_insert(dialect: Dialect, table: &str, batch: &RowBatch) -> Option<String> {
    if batch.is_empty() {
        return None;
    }

    let columns = batch
        .columns
        .iter()
        .map(|column| dialect.quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.quote_identifier(table),
        columns
    );

    for (idx, row) in batch.rows.iter().enumerate() {
        if idx > 0 {
            statement.push_str(", ");
        }
        statement.push('(');
        for (col, value) in row.iter().enumerate() {
            if col > 0 {
                statement.push_str(", ");
            }
            statement.push_str(&render_value(dialect, value));
        }
        statement.push(')');
    }
    statement.push_str(";\n");

    Some(statement)
}

/// Comment and DDL block that opens each table's section of the dump
///
/// Control characters are stripped from the name in the comment line so a
/// newline in a table name cannot end the comment. The name is never
/// shortened.
pub fn render_structure(table: &str, ddl: &str) -> String {
    let ddl = ddl.trim_end().trim_end_matches(';');
    let name: String = table.chars().filter(|c| !c.is_control()).collect();
    format!("-- Table structure for {}\n{};\n\n", name, ddl)
}
