//! MySQL sink backed by a sqlx connection pool.
//!
//! Expected table shape:
//!
//! ```sql
//! CREATE TABLE user_operation_record (
//!   id                  BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
//!   user_id             VARCHAR(128) NOT NULL,
//!   source              INT UNSIGNED NOT NULL,
//!   video_id            VARCHAR(128) NOT NULL,
//!   show_count          BIGINT UNSIGNED NOT NULL,
//!   tap_count           BIGINT UNSIGNED NOT NULL,
//!   watch_count         BIGINT UNSIGNED NOT NULL,
//!   is_complete_show    TINYINT(1) NOT NULL,
//!   video_wait_time     INT UNSIGNED NOT NULL,
//!   send_whatsapp_count BIGINT UNSIGNED NOT NULL,
//!   share_count         BIGINT UNSIGNED NOT NULL,
//!   download_count      BIGINT UNSIGNED NOT NULL,
//!   return_count        BIGINT UNSIGNED NOT NULL,
//!   data_time           DATE NOT NULL,
//!   create_time         BIGINT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use feedtally_core::{day_key, DurableRecord};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, QueryBuilder};
use tracing::{debug, info};

use crate::error::SinkError;
use crate::DurableSink;

const COLUMNS: &str = "user_id, source, video_id, show_count, tap_count, watch_count, \
    is_complete_show, video_wait_time, send_whatsapp_count, share_count, download_count, \
    return_count, data_time, create_time";

// MySQL caps a prepared statement at 65535 placeholders; 14 per row.
const MAX_ROWS_PER_STATEMENT: usize = 4096;

#[derive(Clone)]
pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
}

impl MySqlSink {
    pub async fn connect(url: &str, table: &str, max_connections: u32) -> Result<Self, SinkError> {
        if !is_plain_identifier(table) {
            return Err(SinkError::invalid_config(format!(
                "table name '{table}' is not a plain SQL identifier"
            )));
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| SinkError::unreachable(e.to_string()))?;
        info!(table = %table, max_connections, "Connected to MySQL sink");

        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl DurableSink for MySqlSink {
    async fn insert_batch(&self, records: &[DurableRecord]) -> Result<u64, SinkError> {
        let mut written = 0;

        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<MySql> =
                QueryBuilder::new(format!("INSERT INTO {} ({COLUMNS}) ", self.table));

            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.user_id.clone())
                    .push_bind(record.source)
                    .push_bind(record.video_id.clone())
                    .push_bind(record.show_count)
                    .push_bind(record.tap_count)
                    .push_bind(record.watch_count)
                    .push_bind(record.is_complete_show)
                    .push_bind(record.video_wait_time)
                    .push_bind(record.send_whatsapp_count)
                    .push_bind(record.share_count)
                    .push_bind(record.download_count)
                    .push_bind(record.return_count)
                    .push_bind(day_key(record.day))
                    .push_bind(record.created_at);
            });

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| SinkError::write_failure(chunk.len(), e.to_string()))?;
            written += result.rows_affected();
        }

        debug!(rows = written, table = %self.table, "Inserted durable records");
        Ok(written)
    }

    async fn ping(&self) -> Result<(), SinkError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| SinkError::unreachable(e.to_string()))
    }
}

/// Letters, digits and underscores, not starting with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("user_operation_record"));
        assert!(is_plain_identifier("_t1"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("1table"));
        assert!(!is_plain_identifier("records; DROP TABLE x"));
        assert!(!is_plain_identifier("db.table"));
    }

    #[test]
    fn test_statement_fits_placeholder_limit() {
        assert!(MAX_ROWS_PER_STATEMENT * 14 <= u16::MAX as usize);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_table_name() {
        let err = MySqlSink::connect("mysql://localhost/feed", "bad name", 1)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "S002");
    }
}
