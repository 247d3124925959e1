use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{
    Condition, DocRef, Document, DocumentStore, MAX_IN_VALUES, OrderBy, StoreError, WriteBatch,
};

/// Document store backed by a single SQLite table of JSON payloads.
///
/// Collection, ordering, and the result cap are pushed into SQL; field
/// conditions are evaluated against the decoded payload, which gives the
/// array-aware path semantics described on [`Condition`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a document with a known id.
    pub async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(data)?;
        sqlx::query("INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(id)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a document under a freshly minted id and return it.
    pub async fn put_new(&self, collection: &str, data: &Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, data).await?;
        Ok(id)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn query(
        &self,
        collection: &str,
        conditions: &[Condition],
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        for condition in conditions {
            if let Condition::In(field, options) = condition {
                if options.len() > MAX_IN_VALUES {
                    return Err(StoreError::InvalidQuery(format!(
                        "IN on '{}' carries {} values, limit is {}",
                        field,
                        options.len(),
                        MAX_IN_VALUES
                    )));
                }
            }
        }

        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
        if let Some(order) = order {
            sql.push_str(" ORDER BY json_extract(data, ?)");
            sql.push_str(if order.descending { " DESC" } else { " ASC" });
        }

        let mut query = sqlx::query(&sql).bind(collection);
        if let Some(order) = order {
            query = query.bind(format!("$.{}", order.field));
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut documents = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let raw: String = row.get("data");
            let data: Value = serde_json::from_str(&raw)?;
            let document = Document { id, data };
            if document.matches_all(conditions) {
                documents.push(document);
                if limit.is_some_and(|cap| documents.len() >= cap) {
                    break;
                }
            }
        }
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.get("data");
                Ok(Some(Document {
                    id: id.to_string(),
                    data: serde_json::from_str(&raw)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, target: &DocRef) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(&target.collection)
            .bind(&target.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(SqliteBatch {
            pool: self.pool.clone(),
            deletes: Vec::new(),
        })
    }
}

struct SqliteBatch {
    pool: SqlitePool,
    deletes: Vec<DocRef>,
}

#[async_trait]
impl WriteBatch for SqliteBatch {
    fn stage_delete(&mut self, target: DocRef) {
        self.deletes.push(target);
    }

    fn staged(&self) -> usize {
        self.deletes.len()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for target in &self.deletes {
            sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                .bind(&target.collection)
                .bind(&target.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        let store = SqliteStore::new(pool);
        store.init_schema().await.expect("Failed to create schema");
        store
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = setup_store().await;
        store
            .put("courses", "c1", &json!({"title": "Algebra"}))
            .await
            .unwrap();

        let doc = store.get("courses", "c1").await.unwrap().unwrap();
        assert_eq!(doc.data["title"], "Algebra");
        assert!(store.get("courses", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_new_mints_distinct_retrievable_ids() {
        let store = setup_store().await;
        let a = store
            .put_new("courses", &json!({"title": "A"}))
            .await
            .unwrap();
        let b = store
            .put_new("courses", &json!({"title": "B"}))
            .await
            .unwrap();
        assert_ne!(a, b);

        let doc = store.get("courses", &a).await.unwrap().unwrap();
        assert_eq!(doc.data["title"], "A");
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = setup_store().await;
        for (id, program, created) in [
            ("c1", "p1", "2024-01-01T00:00:00Z"),
            ("c2", "p2", "2024-02-01T00:00:00Z"),
            ("c3", "p1", "2024-03-01T00:00:00Z"),
        ] {
            store
                .put(
                    "courses",
                    id,
                    &json!({"programId": program, "createdAt": created}),
                )
                .await
                .unwrap();
        }

        let order = OrderBy::desc("createdAt");
        let hits = store
            .query(
                "courses",
                &[Condition::Eq("programId".into(), json!("p1"))],
                Some(&order),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            hits.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["c3", "c1"]
        );

        let capped = store
            .query("courses", &[], Some(&order), Some(2))
            .await
            .unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, "c3");
    }

    #[tokio::test]
    async fn in_condition_is_capped() {
        let store = setup_store().await;
        let too_many: Vec<_> = (0..11).map(|i| json!(format!("p{i}"))).collect();
        let err = store
            .query(
                "programs",
                &[Condition::In("id".into(), too_many)],
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn batch_commit_removes_all_staged_documents() {
        let store = setup_store().await;
        store.put("courses", "c1", &json!({})).await.unwrap();
        store
            .put("topics", "t1", &json!({"courseId": "c1"}))
            .await
            .unwrap();
        store
            .put("topics", "t2", &json!({"courseId": "c1"}))
            .await
            .unwrap();

        let mut batch = store.batch();
        batch.stage_delete(DocRef::new("courses", "c1"));
        batch.stage_delete(DocRef::new("topics", "t1"));
        batch.stage_delete(DocRef::new("topics", "t2"));
        assert_eq!(batch.staged(), 3);
        batch.commit().await.unwrap();

        assert!(store.get("courses", "c1").await.unwrap().is_none());
        assert!(store.query("topics", &[], None, None).await.unwrap().is_empty());
    }
}
