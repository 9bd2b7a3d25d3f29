//! Read-only access to the local sales database, exposed to the agent as its
//! one callable function.

use std::future::Future;
use std::path::{Path, PathBuf};

use rusqlite::OpenFlags;
use rusqlite::types::ValueRef;
use serde_json::{Value, json};
use thiserror::Error;
use tokio_rusqlite::Connection;

pub const NO_RESULTS_MESSAGE: &str = "The query returned no results. Try a different question.";
const QUERY_FAILED_KEY: &str = "SQLite query failed with error";
const SALES_TABLE: &str = "sales_data";

/// Distinct-value summaries appended to the schema description: label, column, ordering.
const SALES_DIMENSIONS: [(&str, &str, &str); 4] = [
    ("Regions", "region", ""),
    ("Product Types", "product_type", ""),
    ("Product Categories", "main_category", ""),
    ("Reporting Years", "year", " ORDER BY year"),
];

#[derive(Debug, Error)]
pub enum SalesDataError {
    #[error("failed to open sales database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: tokio_rusqlite::Error,
    },

    #[error("failed to read sales database schema: {0}")]
    Schema(#[source] tokio_rusqlite::Error),
}

/// The local data source behind the agent's one callable function.
pub trait SalesDatabase {
    /// Schema description embedded into the agent instructions.
    fn database_info(&self) -> impl Future<Output = Result<String, SalesDataError>> + Send;

    /// Runs one SQL query and renders the outcome as text, errors included.
    fn fetch_sales_data(&self, query: &str) -> impl Future<Output = String> + Send;
}

pub struct SalesData {
    conn: Connection,
}

impl SalesData {
    /// Opens `path` read-only; a missing file is an error rather than a new empty database.
    pub async fn connect(path: &Path) -> Result<Self, SalesDataError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags)
            .await
            .map_err(|source| SalesDataError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        // SQLite opens lazily; touch the schema so a bad file fails here.
        conn.call(|conn| {
            conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(())
        })
        .await
        .map_err(|source| SalesDataError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { conn })
    }

    pub async fn close(self) {
        if let Err(err) = self.conn.close().await {
            tracing::warn!(error = %err, "failed to close sales database");
        }
    }
}

impl SalesDatabase for SalesData {
    /// Describes every table and the distinct values of the main sales dimensions.
    async fn database_info(&self) -> Result<String, SalesDataError> {
        self.conn
            .call(|conn| {
                let mut table_stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )?;
                let tables = table_stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut lines = Vec::with_capacity(tables.len());
                let mut sales_columns = Vec::new();
                for table in &tables {
                    let mut column_stmt =
                        conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
                    let columns = column_stmt
                        .query_map([], |row| {
                            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;

                    let rendered = columns
                        .iter()
                        .map(|(name, kind)| format!("{name}: {kind}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!("Table {table} Schema: Columns: {rendered}"));

                    if table == SALES_TABLE {
                        sales_columns = columns.into_iter().map(|(name, _)| name).collect();
                    }
                }

                let mut info = lines.join("\n");
                for (label, column, order) in SALES_DIMENSIONS {
                    if !sales_columns.iter().any(|name| name == column) {
                        continue;
                    }
                    let mut stmt = conn.prepare(&format!(
                        "SELECT DISTINCT {column} FROM {SALES_TABLE}{order}"
                    ))?;
                    let values = stmt
                        .query_map([], |row| Ok(display_value(row.get_ref(0)?)))?
                        .collect::<Result<Vec<_>, _>>()?;
                    info.push_str(&format!("\n{label}: {}", values.join(", ")));
                }
                info.push_str("\n\n");
                Ok(info)
            })
            .await
            .map_err(SalesDataError::Schema)
    }

    async fn fetch_sales_data(&self, query: &str) -> String {
        let sql = query.to_string();
        let result = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .into_iter()
                    .map(ToOwned::to_owned)
                    .collect();

                let mut rows = stmt.query([])?;
                let mut data = Vec::new();
                while let Some(row) = rows.next()? {
                    let values = (0..columns.len())
                        .map(|index| row.get_ref(index).map(json_value))
                        .collect::<Result<Vec<_>, _>>()?;
                    data.push(Value::Array(values));
                }
                Ok((columns, data))
            })
            .await;

        match result {
            Ok((_, data)) if data.is_empty() => json!(NO_RESULTS_MESSAGE).to_string(),
            Ok((columns, data)) => json!({ "columns": columns, "data": data }).to_string(),
            Err(err) => {
                tracing::debug!(error = %err, query, "sales query failed");
                json!({ QUERY_FAILED_KEY: err.to_string(), "query": query }).to_string()
            }
        }
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => json!(number),
        ValueRef::Real(number) => serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn display_value(value: ValueRef<'_>) -> String {
    match json_value(value) {
        Value::String(text) => text,
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::{NO_RESULTS_MESSAGE, SalesData, SalesDatabase};
    use serde_json::{Value, json};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn seed_database(dir: &Path) -> PathBuf {
        let path = dir.join("contoso-sales.db");
        let conn = rusqlite::Connection::open(&path).expect("create db");
        conn.execute_batch(
            "CREATE TABLE sales_data (
                id INTEGER PRIMARY KEY,
                region TEXT,
                product_type TEXT,
                main_category TEXT,
                year INTEGER,
                revenue REAL
            );
            INSERT INTO sales_data VALUES (1, 'EUROPE', 'TENTS', 'CAMPING', 2024, 1200.5);
            INSERT INTO sales_data VALUES (2, 'ASIA', 'JACKETS', 'APPAREL', 2023, 800.0);
            INSERT INTO sales_data VALUES (3, 'EUROPE', 'JACKETS', 'APPAREL', 2024, 300.25);",
        )
        .expect("seed db");
        path
    }

    async fn open_seeded() -> (TempDir, SalesData) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = seed_database(dir.path());
        let sales = SalesData::connect(&path).await.expect("connect");
        (dir, sales)
    }

    #[tokio::test]
    async fn fetch_returns_columns_and_rows_in_split_layout() {
        let (_dir, sales) = open_seeded().await;

        let output = sales
            .fetch_sales_data("SELECT region, SUM(revenue) AS revenue FROM sales_data GROUP BY region ORDER BY region")
            .await;

        let parsed: Value = serde_json::from_str(&output).expect("json output");
        assert_eq!(
            parsed,
            json!({
                "columns": ["region", "revenue"],
                "data": [["ASIA", 800.0], ["EUROPE", 1500.75]]
            })
        );
    }

    #[tokio::test]
    async fn fetch_with_no_rows_returns_empty_result_text() {
        let (_dir, sales) = open_seeded().await;

        let output = sales
            .fetch_sales_data("SELECT * FROM sales_data WHERE region = 'MARS'")
            .await;

        assert_eq!(
            serde_json::from_str::<Value>(&output).expect("json output"),
            json!(NO_RESULTS_MESSAGE)
        );
    }

    #[tokio::test]
    async fn fetch_with_invalid_sql_returns_error_text() {
        let (_dir, sales) = open_seeded().await;

        let output = sales.fetch_sales_data("SELEC region FROM").await;

        let parsed: Value = serde_json::from_str(&output).expect("json output");
        let message = parsed["SQLite query failed with error"]
            .as_str()
            .expect("error message");
        assert!(message.contains("syntax error"), "unexpected message: {message}");
        assert_eq!(parsed["query"], json!("SELEC region FROM"));
    }

    #[tokio::test]
    async fn fetch_cannot_modify_the_database() {
        let (_dir, sales) = open_seeded().await;

        let output = sales.fetch_sales_data("DELETE FROM sales_data").await;
        assert!(output.contains("SQLite query failed with error"));

        let count = sales.fetch_sales_data("SELECT COUNT(*) AS n FROM sales_data").await;
        assert_eq!(
            serde_json::from_str::<Value>(&count).expect("json output"),
            json!({"columns": ["n"], "data": [[3]]})
        );
    }

    #[tokio::test]
    async fn database_info_lists_tables_and_dimensions() {
        let (_dir, sales) = open_seeded().await;

        let info = sales.database_info().await.expect("schema");

        assert!(info.starts_with(
            "Table sales_data Schema: Columns: id: INTEGER, region: TEXT, product_type: TEXT, main_category: TEXT, year: INTEGER, revenue: REAL"
        ));
        assert!(info.contains("\nRegions: "));
        assert!(info.contains("EUROPE"));
        assert!(info.contains("ASIA"));
        assert!(info.contains("\nProduct Categories: "));
        assert!(info.contains("\nReporting Years: 2023, 2024"));
        assert!(info.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn database_info_skips_dimensions_without_sales_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("other.db");
        rusqlite::Connection::open(&path)
            .expect("create db")
            .execute_batch("CREATE TABLE tbl (id INTEGER);")
            .expect("seed");

        let sales = SalesData::connect(&path).await.expect("connect");
        let info = sales.database_info().await.expect("schema");
        assert_eq!(info, "Table tbl Schema: Columns: id: INTEGER\n\n");
    }

    #[tokio::test]
    async fn connect_fails_for_missing_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.db");

        let err = match SalesData::connect(&missing).await {
            Ok(_) => panic!("missing database should fail"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("failed to open sales database"));
        assert!(!missing.exists());
    }
}
