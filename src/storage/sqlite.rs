//! SQLite storage backend
//!
//! One database file with tables for records, taxonomy nodes, and edges.
//! A transaction holds the connection for its whole lifetime and brackets
//! its statements with `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK`.

use super::traits::{
    GraphStore, GraphTransaction, OpenStore, RecordFilter, StorageError, StorageResult, TransactionScope,
};
use crate::graph::{
    Collection, Edge, EdgeCollection, IndexingStatus, NodeCollection, NodeId, Record, RecordId, TaxonomyNode,
    VertexId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// SQLite-backed graph store
///
/// Thread-safe via an async mutex on the connection; transactions are
/// serialized on it.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Records table: indexed columns plus the full document
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                connector_name TEXT NOT NULL,
                indexing_status TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_status
                ON records(indexing_status, connector_name);

            -- Taxonomy nodes: name is unique within a collection
            CREATE TABLE IF NOT EXISTS taxonomy_nodes (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (collection, name)
            );

            -- Edges: identity is the (from, to) pair within a collection
            CREATE TABLE IF NOT EXISTS edges (
                collection TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (collection, from_id, to_id)
            );

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)
            .map_err(|e| StorageError::DateParse(e.to_string()))?
            .with_timezone(&Utc))
    }

    fn parse_status(raw: &str) -> StorageResult<IndexingStatus> {
        IndexingStatus::parse(raw).ok_or_else(|| StorageError::InvalidData(format!("unknown status '{}'", raw)))
    }

    /// Deserialize a node from database columns
    fn row_to_node(id: String, collection: String, name: String, created_at: String) -> StorageResult<TaxonomyNode> {
        let collection = NodeCollection::parse(&collection)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown node collection '{}'", collection)))?;
        Ok(TaxonomyNode {
            id: NodeId::from_string(id),
            collection,
            name,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    /// Deserialize an edge from database columns
    fn row_to_edge(from_id: String, to_id: String, created_at: String) -> StorageResult<Edge> {
        Ok(Edge {
            from: VertexId::from_string(from_id),
            to: VertexId::from_string(to_id),
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    // === Statement helpers shared by the store and its transactions ===

    fn select_record(conn: &Connection, id: &RecordId) -> StorageResult<Option<Record>> {
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM records WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn write_record(conn: &Connection, record: &Record) -> StorageResult<()> {
        let record_json = serde_json::to_string(record)?;
        conn.execute(
            r#"
            INSERT INTO records (id, org_id, connector_name, indexing_status, record_json)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                org_id = excluded.org_id,
                connector_name = excluded.connector_name,
                indexing_status = excluded.indexing_status,
                record_json = excluded.record_json
            "#,
            params![
                record.id.as_str(),
                record.org_id,
                record.connector_name,
                record.indexing_status.as_str(),
                record_json,
            ],
        )?;
        Ok(())
    }

    fn select_node(conn: &Connection, collection: NodeCollection, name: &str) -> StorageResult<Option<TaxonomyNode>> {
        let row: Option<(String, String, String, String)> = conn
            .query_row(
                "SELECT id, collection, name, created_at FROM taxonomy_nodes WHERE collection = ?1 AND name = ?2",
                params![collection.as_str(), name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        match row {
            Some((id, collection, name, created_at)) => Ok(Some(Self::row_to_node(id, collection, name, created_at)?)),
            None => Ok(None),
        }
    }

    fn select_edges_from(conn: &Connection, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        let mut stmt = conn.prepare(
            "SELECT from_id, to_id, created_at FROM edges WHERE collection = ?1 AND from_id = ?2 ORDER BY to_id",
        )?;
        let edges_iter = stmt.query_map(params![collection.as_str(), from.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in edges_iter {
            let (from_id, to_id, created_at) = row?;
            edges.push(Self::row_to_edge(from_id, to_id, created_at)?);
        }
        Ok(edges)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

#[async_trait]
impl GraphStore for SqliteStore {
    async fn begin(&self, scope: &[Collection]) -> StorageResult<Box<dyn GraphTransaction>> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTransaction {
            conn,
            scope: TransactionScope::new(scope),
            finished: false,
        }))
    }

    async fn get_record(&self, id: &RecordId) -> StorageResult<Option<Record>> {
        let conn = self.conn.lock().await;
        Self::select_record(&conn, id)
    }

    async fn save_record(&self, record: &Record) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        Self::write_record(&conn, record)
    }

    async fn find_records(&self, filter: &RecordFilter) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().await;

        let mut sql = String::from("SELECT record_json FROM records WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND indexing_status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        if let Some(ref connector_name) = filter.connector_name {
            sql.push_str(" AND connector_name = ?");
            params_vec.push(Box::new(connector_name.clone()));
        }

        if let Some(ref org_id) = filter.org_id {
            sql.push_str(" AND org_id = ?");
            params_vec.push(Box::new(org_id.clone()));
        }

        sql.push_str(" ORDER BY id");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    async fn status_counts(&self) -> StorageResult<Vec<(IndexingStatus, usize)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT indexing_status, COUNT(*) FROM records GROUP BY indexing_status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row?;
            counts.push((Self::parse_status(&status)?, count as usize));
        }
        counts.sort_by_key(|(status, _)| IndexingStatus::ALL.iter().position(|s| s == status));
        Ok(counts)
    }

    async fn edges_from(&self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().await;
        Self::select_edges_from(&conn, collection, from)
    }

    async fn nodes_named(&self, collection: NodeCollection, name: &str) -> StorageResult<Vec<TaxonomyNode>> {
        let conn = self.conn.lock().await;
        Ok(Self::select_node(&conn, collection, name)?.into_iter().collect())
    }
}

/// An open SQLite transaction. Rolled back on drop unless committed.
pub struct SqliteTransaction {
    conn: OwnedMutexGuard<Connection>,
    scope: TransactionScope,
    finished: bool,
}

impl SqliteTransaction {
    fn finish(&mut self, statement: &str) -> StorageResult<()> {
        self.conn.execute_batch(statement)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

#[async_trait]
impl GraphTransaction for SqliteTransaction {
    async fn get_record(&mut self, id: &RecordId) -> StorageResult<Option<Record>> {
        self.scope.check(Collection::Records)?;
        SqliteStore::select_record(&self.conn, id)
    }

    async fn upsert_record(&mut self, record: &Record) -> StorageResult<()> {
        self.scope.check(Collection::Records)?;
        SqliteStore::write_record(&self.conn, record)
    }

    async fn delete_record(&mut self, id: &RecordId) -> StorageResult<bool> {
        self.scope.check(Collection::Records)?;
        let rows = self.conn.execute("DELETE FROM records WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    async fn find_node(&mut self, collection: NodeCollection, name: &str) -> StorageResult<Option<TaxonomyNode>> {
        self.scope.check(collection)?;
        SqliteStore::select_node(&self.conn, collection, name)
    }

    async fn find_or_create_node(
        &mut self,
        collection: NodeCollection,
        name: &str,
    ) -> StorageResult<(TaxonomyNode, bool)> {
        self.scope.check(collection)?;
        let candidate = TaxonomyNode::new(collection, name);
        let inserted = self.conn.execute(
            r#"
            INSERT INTO taxonomy_nodes (id, collection, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, name) DO NOTHING
            "#,
            params![
                candidate.id.as_str(),
                collection.as_str(),
                name,
                candidate.created_at.to_rfc3339(),
            ],
        )?;

        let node = SqliteStore::select_node(&self.conn, collection, name)?
            .ok_or_else(|| StorageError::InvalidData(format!("node '{}' vanished after insert", name)))?;
        Ok((node, inserted > 0))
    }

    async fn edges_from(&mut self, collection: EdgeCollection, from: &VertexId) -> StorageResult<Vec<Edge>> {
        self.scope.check(collection)?;
        SqliteStore::select_edges_from(&self.conn, collection, from)
    }

    async fn insert_edges(&mut self, collection: EdgeCollection, edges: &[Edge]) -> StorageResult<usize> {
        self.scope.check(collection)?;
        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO edges (collection, from_id, to_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, from_id, to_id) DO NOTHING
            "#,
        )?;

        let mut inserted = 0;
        for edge in edges {
            inserted += stmt.execute(params![
                collection.as_str(),
                edge.from.as_str(),
                edge.to.as_str(),
                edge.created_at.to_rfc3339(),
            ])?;
        }
        Ok(inserted)
    }

    async fn upsert_edge(&mut self, collection: EdgeCollection, edge: &Edge) -> StorageResult<bool> {
        Ok(self.insert_edges(collection, std::slice::from_ref(edge)).await? == 1)
    }

    async fn delete_edge(
        &mut self,
        collection: EdgeCollection,
        from: &VertexId,
        to: &VertexId,
    ) -> StorageResult<bool> {
        self.scope.check(collection)?;
        let rows = self.conn.execute(
            "DELETE FROM edges WHERE collection = ?1 AND from_id = ?2 AND to_id = ?3",
            params![collection.as_str(), from.as_str(), to.as_str()],
        )?;
        Ok(rows > 0)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let mut tx = self;
        tx.finish("COMMIT")
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let mut tx = self;
        tx.finish("ROLLBACK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn record_vertex(id: &str) -> VertexId {
        VertexId::record(&RecordId::from(id))
    }

    #[tokio::test]
    async fn test_save_and_get_record() {
        let store = create_test_store();
        let record = Record::new("r1", "report.pdf")
            .with_org("org-1")
            .with_connector("drive")
            .with_status(IndexingStatus::Queued);
        store.save_record(&record).await.unwrap();

        let loaded = store.get_record(&RecordId::from("r1")).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.get_record(&RecordId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_records_by_status_and_connector() {
        let store = create_test_store();
        store
            .save_record(&Record::new("a", "a").with_connector("drive").with_status(IndexingStatus::InProgress))
            .await
            .unwrap();
        store
            .save_record(&Record::new("b", "b").with_connector("mail").with_status(IndexingStatus::InProgress))
            .await
            .unwrap();
        store
            .save_record(&Record::new("c", "c").with_connector("drive").with_status(IndexingStatus::Completed))
            .await
            .unwrap();

        let in_progress = store
            .find_records(&RecordFilter::new().with_status(IndexingStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 2);

        let drive = store
            .find_records(
                &RecordFilter::new()
                    .with_status(IndexingStatus::InProgress)
                    .with_connector("drive"),
            )
            .await
            .unwrap();
        assert_eq!(drive.len(), 1);
        assert_eq!(drive[0].id.as_str(), "a");

        let limited = store.find_records(&RecordFilter::new().with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_node_is_unique_per_collection() {
        let store = create_test_store();
        let mut tx = store.begin(&Collection::all()).await.unwrap();
        let (a, created_a) = tx.find_or_create_node(NodeCollection::Categories, "Contracts").await.unwrap();
        let (b, created_b) = tx.find_or_create_node(NodeCollection::Categories, "Contracts").await.unwrap();
        let (c, created_c) = tx.find_or_create_node(NodeCollection::Topics, "Contracts").await.unwrap();
        tx.commit().await.unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert!(created_c);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(store.nodes_named(NodeCollection::Categories, "Contracts").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = create_test_store();
        let mut tx = store.begin(&Collection::all()).await.unwrap();
        tx.upsert_record(&Record::new("r1", "a")).await.unwrap();
        tx.find_or_create_node(NodeCollection::Topics, "Tax").await.unwrap();
        tx.abort().await.unwrap();

        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_none());
        assert!(store.nodes_named(NodeCollection::Topics, "Tax").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = create_test_store();
        {
            let mut tx = store.begin(&[Collection::Records]).await.unwrap();
            tx.upsert_record(&Record::new("r1", "a")).await.unwrap();
        }
        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_none());

        // Connection is usable again
        let mut tx = store.begin(&[Collection::Records]).await.unwrap();
        tx.upsert_record(&Record::new("r2", "b")).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.get_record(&RecordId::from("r2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_edge_batch_insert_and_exact_delete() {
        let store = create_test_store();
        let from = record_vertex("r1");
        let a = VertexId::from_string("languages/en");
        let b = VertexId::from_string("languages/de");

        let mut tx = store.begin(&Collection::all()).await.unwrap();
        let inserted = tx
            .insert_edges(
                EdgeCollection::BelongsToLanguage,
                &[Edge::new(from.clone(), a.clone()), Edge::new(from.clone(), b.clone())],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert!(!tx.upsert_edge(EdgeCollection::BelongsToLanguage, &Edge::new(from.clone(), a.clone())).await.unwrap());
        assert!(tx.delete_edge(EdgeCollection::BelongsToLanguage, &from, &a).await.unwrap());
        assert!(!tx.delete_edge(EdgeCollection::BelongsToLanguage, &from, &a).await.unwrap());
        tx.commit().await.unwrap();

        let edges = store.edges_from(EdgeCollection::BelongsToLanguage, &from).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, b);
        assert!(store.edges_from(EdgeCollection::BelongsToTopic, &from).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_scope_is_enforced() {
        let store = create_test_store();
        let mut tx = store.begin(&[Collection::Records]).await.unwrap();
        let err = tx
            .insert_edges(EdgeCollection::BelongsToTopic, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::CollectionNotInScope(_)));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let store = create_test_store();
        store.save_record(&Record::new("a", "a").with_status(IndexingStatus::Failed)).await.unwrap();
        store.save_record(&Record::new("b", "b").with_status(IndexingStatus::InProgress)).await.unwrap();
        store.save_record(&Record::new("c", "c").with_status(IndexingStatus::InProgress)).await.unwrap();
        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts, vec![(IndexingStatus::InProgress, 2), (IndexingStatus::Failed, 1)]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_record(&Record::new("r1", "a")).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.get_record(&RecordId::from("r1")).await.unwrap().is_some());
    }
}
