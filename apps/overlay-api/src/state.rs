//! Application state for the overlay API

use crate::config::{DatabaseConfig, LimitsConfig};
use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub struct AppState {
    pub db: SqlitePool,
    pub limits: LimitsConfig,
}

impl AppState {
    pub async fn connect(database: &DatabaseConfig, limits: LimitsConfig) -> Result<Self> {
        tracing::info!("Connecting to database: {}", database.url);

        let pool = SqlitePoolOptions::new()
            .max_connections(database.max_connections)
            .connect(&database.url)
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { db: pool, limits })
    }

    /// Private in-memory database; a single connection keeps it alive
    pub async fn in_memory(limits: LimitsConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::run_migrations(&pool).await?;

        Ok(Self { db: pool, limits })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                sha256 TEXT NOT NULL,
                pdf_data BLOB NOT NULL,
                page_sizes_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                public_token TEXT UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_fields (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                recipient_id TEXT NOT NULL,
                attributes_json TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_fields_document ON document_fields(document_id)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signing_sessions (
                token TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                recipient_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS form_submissions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                submitter_name TEXT NOT NULL,
                submitter_email TEXT,
                fields_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
