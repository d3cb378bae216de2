//! `ClickHouse` writer.
//!
//! Points are stored in a single `points` table per database with tags and
//! fields flattened into `Map(String, String)` columns.

use super::{PointWriter, WriterError};
use crate::config::SinkConfig;
use crate::models::DataPoint;
use async_trait::async_trait;
use clickhouse::Client;
use std::collections::HashMap;
use tracing::{debug, info};

/// Table the points are inserted into.
pub const POINTS_TABLE: &str = "points";

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Serialize)]
struct PointRow {
    name: String,
    timestamp: i64,
    tags: HashMap<String, String>,
    fields: HashMap<String, String>,
}

impl From<&DataPoint> for PointRow {
    fn from(point: &DataPoint) -> Self {
        Self {
            name: point.name().to_string(),
            timestamp: point.timestamp_nanos(),
            tags: point
                .tags()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            fields: point
                .fields()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn create_database_sql(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", quote_identifier(database))
}

fn create_table_sql(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\
         name String, \
         timestamp Int64, \
         tags Map(String, String), \
         fields Map(String, String)\
         ) ENGINE = MergeTree ORDER BY (name, timestamp)",
        quote_identifier(database),
        POINTS_TABLE
    )
}

/// Writes points to `ClickHouse` over its HTTP interface.
#[derive(Clone)]
pub struct ClickHouseWriter {
    client: Client,
}

impl std::fmt::Debug for ClickHouseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseWriter").finish_non_exhaustive()
    }
}

impl ClickHouseWriter {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the sink's connection settings.
    #[must_use]
    pub fn from_config(config: &SinkConfig) -> Self {
        let connection = &config.connection;
        let mut client = Client::default().with_url(connection.base_url());
        if connection.has_credentials() {
            client = client
                .with_user(&connection.username)
                .with_password(&connection.password);
        }
        Self::new(client)
    }
}

#[async_trait]
impl PointWriter for ClickHouseWriter {
    async fn ensure_database(&self, name: &str) -> Result<(), WriterError> {
        self.client.query(&create_database_sql(name)).execute().await?;
        self.client.query(&create_table_sql(name)).execute().await?;
        info!(database = %name, table = POINTS_TABLE, "Ensured database and table");
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint], database: &str) -> Result<(), WriterError> {
        if points.is_empty() {
            return Ok(());
        }

        let client = self.client.clone().with_database(database);
        let mut inserter = client.insert::<PointRow>(POINTS_TABLE).await?;
        for point in points {
            inserter.write(&PointRow::from(point)).await?;
        }
        inserter.end().await?;

        debug!(points = points.len(), database = %database, "Inserted batch");
        Ok(())
    }
}
