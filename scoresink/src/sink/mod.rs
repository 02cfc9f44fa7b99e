/*
 * Copyright 2024 Thaddeus Treloar
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
 */

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::{batch::Batch, config::SinkConfig};

use self::error::SinkError;

pub mod error;

/// The durable store a batch is committed to, as one all-or-nothing unit.
/// On error none of the batch's rows are visible and the caller must not
/// acknowledge any of its positions.
pub trait EventSink {
    async fn commit(&self, batch: &Batch) -> Result<(), SinkError>;
}

/// Postgres-backed [`EventSink`].
///
/// Rows land in a table of `(transaction_id, score, fraud_flag)` with a
/// server-assigned `created_at`; the table is created idempotently once at
/// process start, not per batch.
pub struct PostgresSink {
    pool: PgPool,
    table: String,
}

impl PostgresSink {
    pub async fn connect(config: &SinkConfig) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&config.connection_url())
            .await
            .map_err(SinkError::ConnectError)?;

        Ok(Self {
            pool,
            table: config.table().to_owned(),
        })
    }

    /// Idempotent schema bootstrap. Failure here is fatal to the process.
    pub async fn bootstrap(&self) -> Result<(), SinkError> {
        sqlx::query(&ddl(&self.table))
            .execute(&self.pool)
            .await
            .map_err(|err| SinkError::BootstrapError {
                table: self.table.clone(),
                err,
            })?;

        info!("ensured table exists: {}", self.table);

        Ok(())
    }
}

impl EventSink for PostgresSink {
    async fn commit(&self, batch: &Batch) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        let rows = batch.len();
        let commit_error = |err| SinkError::CommitError { rows, err };

        let mut transaction = self.pool.begin().await.map_err(commit_error)?;

        let mut insert: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (transaction_id, score, fraud_flag) ",
            self.table
        ));

        insert.push_values(batch.events(), |mut row, event| {
            row.push_bind(event.transaction_id.as_deref())
                .push_bind(event.score)
                .push_bind(event.fraud_flag);
        });

        insert
            .build()
            .execute(&mut *transaction)
            .await
            .map_err(commit_error)?;

        transaction.commit().await.map_err(commit_error)?;

        Ok(())
    }
}

// The table name is interpolated, not bound; the config layer has already
// validated it as a bare identifier.
fn ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            transaction_id TEXT,\n    \
            score DOUBLE PRECISION,\n    \
            fraud_flag INT,\n    \
            created_at TIMESTAMPTZ DEFAULT NOW()\n\
        )",
        table
    )
}
