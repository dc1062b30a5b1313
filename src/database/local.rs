use crate::database::check_identifier;
use crate::database::Datastore;
use crate::database::DatastoreError;
use crate::database::Direction;
use crate::database::Record;
use async_trait::async_trait;
use chrono::Utc;
use duckdb::types::Value as SqlValue;
use duckdb::Connection;
use serde_json::Number;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::debug;

/// Free-text columns of the lead table, in storage order
const TEXT_COLUMNS: [&str; 10] = [
    "company_name",
    "website_url",
    "funding_date",
    "funding_amount",
    "funding_round",
    "linkedin_url",
    "score_detail",
    "decision_maker_data",
    "decision_maker_linkedin",
    "decision_maker_email",
];

/// Embedded DuckDB store. It owns the lead schema and assigns `id` and
/// `created_at` the way the hosted store does.
#[derive(Clone)]
pub struct LocalStore {
    connection: Arc<Mutex<Connection>>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatastoreError> {
        Ok(Self::with_connection(Connection::open(path)?))
    }

    pub fn in_memory() -> Result<Self, DatastoreError> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(connection: Connection) -> Self {
        LocalStore { connection: Arc::new(Mutex::new(connection)) }
    }

    /// Runs `task` against the connection on the blocking pool.
    async fn run<T, F>(&self, task: F) -> Result<T, DatastoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DatastoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut connection = connection
                .lock()
                .map_err(|error| DatastoreError::Worker(error.to_string()))?;
            task(&mut connection)
        })
        .await
        .map_err(|error| DatastoreError::Worker(error.to_string()))?
    }
}

#[async_trait]
impl Datastore for LocalStore {
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), DatastoreError> {
        let table = check_identifier(table)?.to_owned();
        let records = records.to_vec();
        self.run(move |connection| {
            create_table(connection, &table)?;
            let transaction = connection.transaction()?;
            for record in &records {
                let columns = record
                    .keys()
                    .map(|column| check_identifier(column))
                    .collect::<Result<Vec<_>, _>>()?;
                let created_at = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
                let mut values: Vec<SqlValue> = record.values().map(to_sql_value).collect();
                values.push(SqlValue::Text(created_at));

                let mut names = columns.join(", ");
                let mut placeholders = vec!["?"; columns.len()].join(", ");
                if !columns.is_empty() {
                    names.push_str(", ");
                    placeholders.push_str(", ");
                }
                let sql = format!("INSERT INTO {table} ({names}created_at) VALUES ({placeholders}CAST(? AS TIMESTAMP))");
                transaction.execute(&sql, duckdb::params_from_iter(values))?;
            }
            transaction.commit()?;
            debug!(table = %table, records = records.len(), "inserted records");
            Ok(())
        })
        .await
    }

    async fn select(&self, table: &str, order_by: &str, direction: Direction) -> Result<Vec<Record>, DatastoreError> {
        let table = check_identifier(table)?.to_owned();
        let order_by = check_identifier(order_by)?.to_owned();
        self.run(move |connection| {
            create_table(connection, &table)?;
            let sql = format!(
                "SELECT CAST(id AS VARCHAR), {}, score, strftime(created_at, '%Y-%m-%dT%H:%M:%S.%f') \
                 FROM {table} AS t ORDER BY t.{order_by} {}",
                TEXT_COLUMNS.join(", "),
                direction.as_str(),
            );
            let mut statement = connection.prepare(&sql)?;
            let mut rows = statement.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                record.insert("id".to_owned(), Value::String(row.get(0)?));
                for (index, column) in TEXT_COLUMNS.iter().enumerate() {
                    let text: Option<String> = row.get(index + 1)?;
                    record.insert((*column).to_owned(), text.map_or(Value::Null, Value::String));
                }
                let score: Option<f64> = row.get(TEXT_COLUMNS.len() + 1)?;
                record.insert("score".to_owned(), score.and_then(Number::from_f64).map_or(Value::Null, Value::Number));
                let created_at: Option<String> = row.get(TEXT_COLUMNS.len() + 2)?;
                record.insert("created_at".to_owned(), created_at.map_or(Value::Null, Value::String));
                records.push(record);
            }
            debug!(table = %table, records = records.len(), "selected records");
            Ok(records)
        })
        .await
    }
}

fn create_table(connection: &Connection, table: &str) -> Result<(), DatastoreError> {
    let text_columns: String = TEXT_COLUMNS.iter().map(|column| format!("{column} VARCHAR, ")).collect();
    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         id UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
         {text_columns}score DOUBLE, \
         created_at TIMESTAMP)"
    ))?;
    Ok(())
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Boolean(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::BigInt(integer),
            None => number.as_f64().map_or(SqlValue::Null, SqlValue::Double),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
