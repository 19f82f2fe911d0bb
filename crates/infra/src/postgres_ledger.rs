//! Postgres-backed movement journal.
//!
//! Append-only at the database level: `movements` takes only INSERTs, the
//! cached aggregate lives in `stream_heads`, and both are written in one
//! transaction so a reader never sees a record without its stock update.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `LedgerStoreError` | Scenario |
//! |------------|---------------|--------------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Lost CAS race on `(product_id, sequence)` |
//! | Database (other) | any other | `Storage` | Constraint/driver failure |
//! | PoolClosed / RowNotFound / other | n/a | `Storage` | Pool or network failure |
//!
//! The one exception is `register`, where `23505` on the primary key means
//! the stream already exists and maps to `AlreadyRegistered`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use bodega_core::{ExpectedVersion, MovementId, ProductId, UserId};
use bodega_ledger::{
    LedgerStore, LedgerStoreError, MovementKind, MovementOrder, MovementRecord, NewMovement, Page,
    StreamHead,
};

/// Postgres-backed append-only ledger store.
///
/// The connection pool is thread-safe; every multi-statement write runs in
/// a transaction. Optimistic concurrency rests on two layers: the version
/// predicate on the `stream_heads` update, and the unique
/// `(product_id, sequence)` constraint that catches a concurrent insert the
/// predicate raced with.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn register_stream(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        sqlx::query("INSERT INTO stream_heads (product_id) VALUES ($1)")
            .bind(product_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerStoreError::AlreadyRegistered(product_id)
                } else {
                    map_sqlx_error("register_stream", e)
                }
            })?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn stream_head(&self, product_id: ProductId) -> Result<StreamHead, LedgerStoreError> {
        let row = sqlx::query("SELECT version, stock FROM stream_heads WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stream_head", e))?
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;

        let version: i64 = row
            .try_get("version")
            .map_err(|e| decode_error("stream_head", "version", e))?;
        let stock: i64 = row
            .try_get("stock")
            .map_err(|e| decode_error("stream_head", "stock", e))?;
        Ok(StreamHead {
            version: version as u64,
            stock: stock as u32,
        })
    }

    /// Append one movement and install the new cached stock in a single
    /// transaction:
    ///
    /// 1. Read the stream version.
    /// 2. Validate it against `expected`.
    /// 3. Insert the record at the journal's next sequence.
    /// 4. Update the head, predicated on the version read in step 1.
    ///
    /// The sequence comes from the journal itself, not the version counter:
    /// `correct_stream_stock` bumps the version without inserting a record,
    /// and sequences must stay gapless across such repairs.
    ///
    /// A writer that commits between steps 1 and 4 fails the predicate or
    /// the unique constraint; either way the transaction rolls back and the
    /// caller sees `Conflict`.
    #[instrument(
        skip(self, movement),
        fields(
            product_id = %movement.product_id,
            kind = %movement.kind,
            magnitude = movement.magnitude,
            expected = ?expected,
        ),
        err
    )]
    pub async fn append_movement(
        &self,
        movement: NewMovement,
        expected: ExpectedVersion,
        stock_after: u32,
    ) -> Result<MovementRecord, LedgerStoreError> {
        let product_id = movement.product_id;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query("SELECT version FROM stream_heads WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("read_head", e))?
            .ok_or(LedgerStoreError::UnknownProduct(product_id))?;
        let current: i64 = row
            .try_get("version")
            .map_err(|e| decode_error("append_movement", "version", e))?;
        let current = current as u64;

        if !expected.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Conflict(format!(
                "expected {expected:?}, stream is at {current}"
            )));
        }

        let tail: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS tail FROM movements WHERE product_id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("read_tail", e))?
        .try_get("tail")
        .map_err(|e| decode_error("append_movement", "tail", e))?;

        let id = MovementId::new();
        let next_version = current + 1;
        let sequence = tail as u64 + 1;
        let recorded_at: DateTime<Utc> = sqlx::query(
            r#"
            INSERT INTO movements (
                movement_id, product_id, sequence, kind, magnitude, reason, acting_user
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING recorded_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(sequence as i64)
        .bind(movement.kind.as_str())
        .bind(i64::from(movement.magnitude))
        .bind(&movement.reason)
        .bind(movement.acting_user.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerStoreError::Conflict(format!(
                    "concurrent append detected: sequence {sequence} already exists"
                ))
            } else {
                map_sqlx_error("insert_movement", e)
            }
        })?
        .try_get("recorded_at")
        .map_err(|e| decode_error("append_movement", "recorded_at", e))?;

        let updated = sqlx::query(
            "UPDATE stream_heads SET version = $1, stock = $2 WHERE product_id = $3 AND version = $4",
        )
        .bind(next_version as i64)
        .bind(i64::from(stock_after))
        .bind(product_id.as_uuid())
        .bind(current as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_head", e))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::Conflict(format!(
                "head moved past {current} during append"
            )));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(MovementRecord {
            id,
            product_id,
            sequence,
            kind: movement.kind,
            magnitude: movement.magnitude,
            reason: movement.reason,
            acting_user: movement.acting_user,
            recorded_at,
        })
    }

    #[instrument(skip(self), fields(product_id = %product_id, expected = ?expected, stock), err)]
    pub async fn correct_stream_stock(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        stock: u32,
    ) -> Result<(), LedgerStoreError> {
        let head = self.stream_head(product_id).await?;
        if !expected.matches(head.version) {
            return Err(LedgerStoreError::Conflict(format!(
                "expected {expected:?}, stream is at {}",
                head.version
            )));
        }

        let updated = sqlx::query(
            "UPDATE stream_heads SET version = version + 1, stock = $1 WHERE product_id = $2 AND version = $3",
        )
        .bind(i64::from(stock))
        .bind(product_id.as_uuid())
        .bind(head.version as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("correct_stock", e))?;

        if updated.rows_affected() == 0 {
            return Err(LedgerStoreError::Conflict(format!(
                "head moved past {} during correction",
                head.version
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id, order = ?order), err)]
    pub async fn movements_for(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        // Registration check first, so an empty stream and a missing one
        // stay distinguishable.
        self.stream_head(product_id).await?;

        let sql = match order {
            MovementOrder::Ascending => {
                "SELECT movement_id, product_id, sequence, kind, magnitude, reason, acting_user, recorded_at \
                 FROM movements WHERE product_id = $1 ORDER BY sequence ASC LIMIT $2 OFFSET $3"
            }
            MovementOrder::Descending => {
                "SELECT movement_id, product_id, sequence, kind, magnitude, reason, acting_user, recorded_at \
                 FROM movements WHERE product_id = $1 ORDER BY sequence DESC LIMIT $2 OFFSET $3"
            }
        };
        let rows = sqlx::query(sql)
            .bind(product_id.as_uuid())
            .bind(page.limit.map(|l| l as i64))
            .bind(page.offset as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("movements_for", e))?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self), fields(order = ?order), err)]
    pub async fn all_movements(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        let sql = match order {
            MovementOrder::Ascending => {
                "SELECT movement_id, product_id, sequence, kind, magnitude, reason, acting_user, recorded_at \
                 FROM movements ORDER BY recorded_at ASC, movement_id ASC LIMIT $1 OFFSET $2"
            }
            MovementOrder::Descending => {
                "SELECT movement_id, product_id, sequence, kind, magnitude, reason, acting_user, recorded_at \
                 FROM movements ORDER BY recorded_at DESC, movement_id DESC LIMIT $1 OFFSET $2"
            }
        };
        let rows = sqlx::query(sql)
            .bind(page.limit.map(|l| l as i64))
            .bind(page.offset as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("all_movements", e))?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn stream_has_movements(
        &self,
        product_id: ProductId,
    ) -> Result<bool, LedgerStoreError> {
        let row =
            sqlx::query("SELECT EXISTS (SELECT 1 FROM movements WHERE product_id = $1) AS found")
                .bind(product_id.as_uuid())
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("stream_has_movements", e))?;
        row.try_get("found")
            .map_err(|e| decode_error("stream_has_movements", "found", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                LedgerStoreError::Conflict(msg)
            } else {
                LedgerStoreError::Storage(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Storage(format!("connection pool closed in {operation}"))
        }
        other => LedgerStoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

fn decode_error(operation: &str, column: &str, err: sqlx::Error) -> LedgerStoreError {
    LedgerStoreError::Storage(format!("failed to decode {column} in {operation}: {err}"))
}

fn kind_from_str(kind: &str) -> Result<MovementKind, LedgerStoreError> {
    match kind {
        "in" => Ok(MovementKind::In),
        "out" => Ok(MovementKind::Out),
        "adjust" => Ok(MovementKind::Adjust),
        other => Err(LedgerStoreError::Storage(format!(
            "unknown movement kind in storage: {other}"
        ))),
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<MovementRecord, LedgerStoreError> {
    let movement_id: Uuid = row
        .try_get("movement_id")
        .map_err(|e| decode_error("record_from_row", "movement_id", e))?;
    let product_id: Uuid = row
        .try_get("product_id")
        .map_err(|e| decode_error("record_from_row", "product_id", e))?;
    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| decode_error("record_from_row", "sequence", e))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| decode_error("record_from_row", "kind", e))?;
    let magnitude: i64 = row
        .try_get("magnitude")
        .map_err(|e| decode_error("record_from_row", "magnitude", e))?;
    let reason: String = row
        .try_get("reason")
        .map_err(|e| decode_error("record_from_row", "reason", e))?;
    let acting_user: Uuid = row
        .try_get("acting_user")
        .map_err(|e| decode_error("record_from_row", "acting_user", e))?;
    let recorded_at: DateTime<Utc> = row
        .try_get("recorded_at")
        .map_err(|e| decode_error("record_from_row", "recorded_at", e))?;

    Ok(MovementRecord {
        id: MovementId::from_uuid(movement_id),
        product_id: ProductId::from_uuid(product_id),
        sequence: sequence as u64,
        kind: kind_from_str(&kind)?,
        magnitude: magnitude as u32,
        reason,
        acting_user: UserId::from_uuid(acting_user),
        recorded_at,
    })
}

/// The [`LedgerStore`] trait stays synchronous so the consistency guard and
/// its tests run without a runtime; this bridge runs the async operations
/// on the ambient tokio runtime, exactly as callers inside an async server
/// already have one.
impl LedgerStore for PostgresLedgerStore {
    fn register(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        block_on_runtime(self.register_stream(product_id))
    }

    fn head(&self, product_id: ProductId) -> Result<StreamHead, LedgerStoreError> {
        block_on_runtime(self.stream_head(product_id))
    }

    fn append(
        &self,
        movement: NewMovement,
        expected: ExpectedVersion,
        stock_after: u32,
    ) -> Result<MovementRecord, LedgerStoreError> {
        block_on_runtime(self.append_movement(movement, expected, stock_after))
    }

    fn correct_stock(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        stock: u32,
    ) -> Result<(), LedgerStoreError> {
        block_on_runtime(self.correct_stream_stock(product_id, expected, stock))
    }

    fn list_for(
        &self,
        product_id: ProductId,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        block_on_runtime(self.movements_for(product_id, order, page))
    }

    fn list_all(
        &self,
        order: MovementOrder,
        page: Page,
    ) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        block_on_runtime(self.all_movements(order, page))
    }

    fn has_movements(&self, product_id: ProductId) -> Result<bool, LedgerStoreError> {
        block_on_runtime(self.stream_has_movements(product_id))
    }
}

fn block_on_runtime<F, T>(fut: F) -> Result<T, LedgerStoreError>
where
    F: Future<Output = Result<T, LedgerStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        LedgerStoreError::Storage(
            "PostgresLedgerStore requires a tokio runtime on the calling thread".to_string(),
        )
    })?;
    handle.block_on(fut)
}
