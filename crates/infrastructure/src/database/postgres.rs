//! PostgreSQL任务仓储与向量索引
//!
//! 认领依靠单条 `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED)`
//! 实现原子性，多进程并发认领不会拿到同一任务。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use trainer_core::{Result, TrainerError};
use trainer_domain::entities::{poison_sentinel, suspend_sentinel, unleased};
use trainer_domain::{
    IndexHint, TrainingMode, TrainingTask, TrainingTaskRepository, VectorRecord, VectorStore,
};

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &PgRow) -> Result<TrainingTask> {
    let mode_raw: String = row.try_get("mode")?;
    let mode = TrainingMode::parse(&mode_raw)
        .ok_or_else(|| TrainerError::DatabaseOperation(format!("未知的训练模式: {mode_raw}")))?;

    let indexes_raw: serde_json::Value = row.try_get("indexes")?;
    let indexes: Vec<IndexHint> = serde_json::from_value(indexes_raw)
        .map_err(|e| TrainerError::DatabaseOperation(format!("索引字段反序列化失败: {e}")))?;

    Ok(TrainingTask {
        id: row.try_get("id")?,
        team_id: row.try_get("team_id")?,
        tmb_id: row.try_get("tmb_id")?,
        dataset_id: row.try_get("dataset_id")?,
        collection_id: row.try_get("collection_id")?,
        mode,
        prompt: row.try_get("prompt")?,
        model: row.try_get("model")?,
        q: row.try_get("q")?,
        a: row.try_get("a")?,
        indexes,
        lease_until: row.try_get("lease_until")?,
        bill_id: row.try_get("bill_id")?,
        created_at: row.try_get("created_at")?,
    })
}

const TASK_COLUMNS: &str = "id, team_id, tmb_id, dataset_id, collection_id, mode, prompt, model, \
                            q, a, indexes, lease_until, bill_id, created_at";

#[async_trait]
impl TrainingTaskRepository for PostgresTaskRepository {
    async fn insert_many(&self, tasks: Vec<TrainingTask>) -> Result<usize> {
        let count = tasks.len();
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            let indexes = serde_json::to_value(&task.indexes)
                .map_err(|e| TrainerError::DatabaseOperation(format!("索引字段序列化失败: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO training_tasks
                    (id, team_id, tmb_id, dataset_id, collection_id, mode, prompt, model,
                     q, a, indexes, lease_until, bill_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(task.id)
            .bind(&task.team_id)
            .bind(&task.tmb_id)
            .bind(&task.dataset_id)
            .bind(&task.collection_id)
            .bind(task.mode.as_str())
            .bind(&task.prompt)
            .bind(&task.model)
            .bind(&task.q)
            .bind(&task.a)
            .bind(indexes)
            .bind(task.lease_until)
            .bind(&task.bill_id)
            .bind(task.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(count)
    }

    async fn claim_one(
        &self,
        now: DateTime<Utc>,
        lease_window: chrono::Duration,
    ) -> Result<Option<TrainingTask>> {
        // CTE先锁定候选行，RETURNING引用候选行以返回认领前的快照
        let sql = r#"
            WITH candidate AS (
                SELECT id, team_id, tmb_id, dataset_id, collection_id, mode, prompt, model,
                       q, a, indexes, lease_until, bill_id, created_at
                FROM training_tasks
                WHERE mode = 'chunk' AND lease_until <= $2
                ORDER BY lease_until ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE training_tasks
            SET lease_until = $1
            FROM candidate
            WHERE training_tasks.id = candidate.id
            RETURNING candidate.id, candidate.team_id, candidate.tmb_id, candidate.dataset_id,
                      candidate.collection_id, candidate.mode, candidate.prompt, candidate.model,
                      candidate.q, candidate.a, candidate.indexes, candidate.lease_until,
                      candidate.bill_id, candidate.created_at
            "#;
        let row = sqlx::query(sql)
            .bind(now)
            .bind(now - lease_window)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn suspend_team(&self, team_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE training_tasks SET lease_until = $1 WHERE team_id = $2 AND lease_until <> $3",
        )
        .bind(suspend_sentinel())
        .bind(team_id)
        .bind(poison_sentinel())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn resume_team(&self, team_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE training_tasks SET lease_until = $1 WHERE team_id = $2 AND lease_until = $3",
        )
        .bind(unleased())
        .bind(team_id)
        .bind(suspend_sentinel())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_poisoned(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE training_tasks SET lease_until = $1 WHERE id = $2")
            .bind(poison_sentinel())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TrainerError::TaskNotFound { id });
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM training_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TrainingTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM training_tasks WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn count_pending(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM training_tasks WHERE lease_until NOT IN ($1, $2)",
        )
        .bind(poison_sentinel())
        .bind(suspend_sentinel())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

/// 向量与原文写入PostgreSQL
pub struct PostgresVectorStore {
    pool: PgPool,
}

impl PostgresVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PostgresVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        let indexes = serde_json::to_value(&record.indexes)
            .map_err(|e| TrainerError::VectorStore(format!("索引字段序列化失败: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO dataset_vectors
                (id, team_id, dataset_id, collection_id, q, a, indexes, model, vector)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.team_id)
        .bind(&record.dataset_id)
        .bind(&record.collection_id)
        .bind(&record.q)
        .bind(&record.a)
        .bind(indexes)
        .bind(&record.model)
        .bind(&record.vector)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
