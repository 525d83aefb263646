//! PostgreSQL存储

pub mod postgres;

pub use postgres::{PostgresTaskRepository, PostgresVectorStore};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use trainer_core::{DatabaseConfig, Result};

/// 创建数据库连接池
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "数据库连接池已建立");
    Ok(pool)
}

/// 初始化表结构（幂等）
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_tasks (
            id UUID PRIMARY KEY,
            team_id TEXT NOT NULL,
            tmb_id TEXT NOT NULL,
            dataset_id TEXT NOT NULL,
            collection_id TEXT NOT NULL,
            mode TEXT NOT NULL,
            prompt TEXT,
            model TEXT NOT NULL,
            q TEXT NOT NULL,
            a TEXT NOT NULL DEFAULT '',
            indexes JSONB NOT NULL DEFAULT '[]',
            lease_until TIMESTAMPTZ NOT NULL,
            bill_id TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 认领查询按 (mode, lease_until) 过滤和排序
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_tasks_claim ON training_tasks (mode, lease_until)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_tasks_team ON training_tasks (team_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_vectors (
            id UUID PRIMARY KEY,
            team_id TEXT NOT NULL,
            dataset_id TEXT NOT NULL,
            collection_id TEXT NOT NULL,
            q TEXT NOT NULL,
            a TEXT NOT NULL DEFAULT '',
            indexes JSONB NOT NULL DEFAULT '[]',
            model TEXT NOT NULL,
            vector REAL[] NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("数据库表结构初始化完成");
    Ok(())
}
