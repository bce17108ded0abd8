use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::{Order, OrderSide, OrderStatus};
use crate::error::Result;
use crate::persistence::{DeadLetterStore, OrderStore, OutboxEntry, OutboxRecord, OutboxStore};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.get("id"),
        user_id: row.get("user_id"),
        ticker: row.get("ticker"),
        quantity: row.get("quantity"),
        price: row.get("price"),
        side: OrderSide::try_from(row.get::<String, _>("side").as_str())?,
        status: OrderStatus::try_from(row.get::<String, _>("status").as_str())?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn outbox_entry_from_row(row: &PgRow) -> OutboxEntry {
    OutboxEntry {
        id: row.get("id"),
        event_id: row.get("event_id"),
        topic: row.get("topic"),
        partition_key: row.get("partition_key"),
        event_type: row.get("event_type"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
    }
}

const UPSERT_ORDER_SQL: &str = r#"
    INSERT INTO orders (id, user_id, ticker, quantity, price, side, status, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (id) DO UPDATE SET
        user_id = EXCLUDED.user_id,
        ticker = EXCLUDED.ticker,
        quantity = EXCLUDED.quantity,
        price = EXCLUDED.price,
        side = EXCLUDED.side,
        status = EXCLUDED.status,
        created_at = EXCLUDED.created_at,
        updated_at = EXCLUDED.updated_at
"#;

const INSERT_OUTBOX_SQL: &str = r#"
    INSERT INTO order_outbox (event_id, topic, partition_key, event_type, payload)
    VALUES ($1, $2, $3, $4, $5)
"#;

#[async_trait]
impl OrderStore for PostgresStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, ticker, quantity, price, side, status, created_at, updated_at
            FROM orders WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| order_from_row(&r)).transpose()
    }

    #[instrument(skip(self, order), fields(order_id = order.id))]
    async fn upsert(&self, order: &Order) -> Result<()> {
        sqlx::query(UPSERT_ORDER_SQL)
            .bind(order.id)
            .bind(order.user_id)
            .bind(&order.ticker)
            .bind(order.quantity)
            .bind(order.price)
            .bind(order.side.as_str())
            .bind(order.status.as_str())
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&self.pool)
            .await?;

        debug!("Upserted order {} ({})", order.id, order.status);
        Ok(())
    }

    /// Order row and outbox row commit together or not at all
    #[instrument(skip(self, order, record), fields(order_id = order.id))]
    async fn upsert_with_outbox(&self, order: &Order, record: &OutboxRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_ORDER_SQL)
            .bind(order.id)
            .bind(order.user_id)
            .bind(&order.ticker)
            .bind(order.quantity)
            .bind(order.price)
            .bind(order.side.as_str())
            .bind(order.status.as_str())
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(INSERT_OUTBOX_SQL)
            .bind(record.event_id)
            .bind(&record.topic)
            .bind(&record.partition_key)
            .bind(&record.event_type)
            .bind(&record.payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Persisted order {} as {} with staged {} event",
            order.id, order.status, record.event_type
        );
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, topic, partition_key, event_type, payload, created_at, published_at
            FROM order_outbox
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(outbox_entry_from_row).collect())
    }

    async fn mark_published(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_outbox SET published_at = NOW()
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeadLetterStore for PostgresStore {
    async fn record_dead_letter(&self, topic: &str, payload: &Value, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (topic, payload, error_message)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(topic)
        .bind(payload)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
