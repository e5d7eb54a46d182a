use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use ragdb_core::types::{ChunkRef, Metadata, VectorHit};
use ragdb_core::{Error, Result};

use crate::index_build::ensure_ann_index;
use crate::schema::{build_documents_schema, vector_dim};
use crate::table::{ensure_table, get_meta, open_db, set_meta, table_exists, META_TABLE};

/// Outcome of [`VectorStore::ensure_schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
	Created,
	Unchanged,
	Migrated { from: usize, to: usize },
}

/// LanceDB-backed chunk table.
///
/// The physical table behind `base_table` is resolved through the meta table
/// so a dimension migration can switch to a freshly created table.
pub struct VectorStore {
	pub(crate) conn: Connection,
	base_table: String,
	active: RwLock<String>,
	ann_min_rows: usize,
	pub(crate) write_lock: Mutex<()>,
}

fn active_key(base: &str) -> String {
	format!("active_table:{base}")
}

impl VectorStore {
	pub async fn open(uri: &str, base_table: &str, ann_min_rows: usize) -> Result<Self> {
		let conn = open_db(uri).await?;
		let active = get_meta(&conn, META_TABLE, &active_key(base_table))
			.await?
			.unwrap_or_else(|| base_table.to_string());
		Ok(Self {
			conn,
			base_table: base_table.to_string(),
			active: RwLock::new(active),
			ann_min_rows,
			write_lock: Mutex::new(()),
		})
	}

	pub fn connection(&self) -> &Connection {
		&self.conn
	}

	pub fn active_table(&self) -> String {
		match self.active.read() {
			Ok(name) => name.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		}
	}

	fn set_active_table(&self, name: String) {
		match self.active.write() {
			Ok(mut guard) => *guard = name,
			Err(poisoned) => *poisoned.into_inner() = name,
		}
	}

	pub(crate) async fn open_active(&self) -> Result<Option<Table>> {
		let name = self.active_table();
		if !table_exists(&self.conn, &name).await? {
			return Ok(None);
		}
		self.conn.open_table(&name).execute().await.map(Some).map_err(Error::store)
	}

	/// Declared vector dimension of the active table, if it exists.
	pub async fn stored_dim(&self) -> Result<Option<usize>> {
		let Some(table) = self.open_active().await? else {
			return Ok(None);
		};
		let schema = table.schema().await.map_err(Error::store)?;
		Ok(vector_dim(&schema))
	}

	pub async fn count_rows(&self) -> Result<usize> {
		match self.open_active().await? {
			Some(table) => table.count_rows(None).await.map_err(Error::store),
			None => Ok(0),
		}
	}

	/// Creates the chunk table at `dim`, or verifies the stored dimension.
	///
	/// On mismatch with `allow_migrate`, a new table at `dim` becomes active;
	/// rows embedded at the old dimension are not carried over.
	pub async fn ensure_schema(&self, dim: usize, allow_migrate: bool) -> Result<SchemaChange> {
		let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidInput(format!("dimension {dim} too large")))?;
		if dim == 0 {
			return Err(Error::InvalidInput("embedding dimension must be positive".into()));
		}
		let _guard = self.write_lock.lock().await;
		let name = self.active_table();
		if ensure_table(&self.conn, &name, build_documents_schema(dim_i32)).await? {
			info!(table = %name, dim, "created chunk table");
			return Ok(SchemaChange::Created);
		}
		let stored = self.stored_dim().await?.unwrap_or(0);
		if stored == dim {
			if let Some(table) = self.open_active().await? {
				ensure_ann_index(&table, dim, self.ann_min_rows).await?;
			}
			return Ok(SchemaChange::Unchanged);
		}
		if !allow_migrate {
			return Err(Error::Configuration(format!(
				"embedding dimension mismatch: table {name} stores {stored}, requested {dim}"
			)));
		}
		let next = format!("{}_d{dim}_{}", self.base_table, Utc::now().timestamp_millis());
		ensure_table(&self.conn, &next, build_documents_schema(dim_i32)).await?;
		set_meta(&self.conn, META_TABLE, &active_key(&self.base_table), &next).await?;
		warn!(from = stored, to = dim, old = %name, new = %next, "migrated chunk table to new dimension; previous rows need re-ingestion");
		self.set_active_table(next);
		Ok(SchemaChange::Migrated { from: stored, to: dim })
	}

	/// Cosine kNN over the active table. `distance` is the negated cosine
	/// similarity, so ascending distance means closer.
	pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
		if limit == 0 {
			return Ok(Vec::new());
		}
		let Some(table) = self.open_active().await? else {
			return Ok(Vec::new());
		};
		let mut stream = table
			.vector_search(query.to_vec())
			.map_err(Error::store)?
			.distance_type(DistanceType::Cosine)
			.select(Select::columns(&["repo", "path", "chunk_index", "content", "metadata"]))
			.limit(limit)
			.execute()
			.await
			.map_err(Error::store)?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
			hits.extend(hits_from_batch(&batch)?);
		}
		hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
		hits.truncate(limit);
		Ok(hits)
	}
}

pub(crate) fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::Store(format!("column {name} missing or not utf8")))
}

pub(crate) fn parse_metadata(raw: &str) -> Metadata {
	serde_json::from_str(raw).unwrap_or_default()
}

fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<VectorHit>> {
	let repo = string_col(batch, "repo")?;
	let path = string_col(batch, "path")?;
	let content = string_col(batch, "content")?;
	let metadata = string_col(batch, "metadata")?;
	let chunk_index = batch
		.column_by_name("chunk_index")
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| Error::Store("column chunk_index missing".into()))?;
	let distance = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or_else(|| Error::Store("vector search returned no _distance".into()))?;
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		// Lance cosine distance is `1 - cos`.
		let cosine_distance = if distance.is_valid(i) { distance.value(i) } else { 2.0 };
		out.push(VectorHit {
			chunk: ChunkRef::new(repo.value(i), path.value(i), chunk_index.value(i)),
			content: content.value(i).to_string(),
			metadata: parse_metadata(metadata.value(i)),
			distance: cosine_distance - 1.0,
		});
	}
	Ok(out)
}
