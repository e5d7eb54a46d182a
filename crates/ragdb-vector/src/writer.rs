use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::Table;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use ragdb_core::hash::content_hash;
use ragdb_core::types::DocumentChunk;
use ragdb_core::{Error, Result};

use crate::schema::build_documents_schema;
use crate::store::{string_col, VectorStore};
use crate::table::sql_quote;

const LOOKUP_BATCH: usize = 500;

struct StoredRow {
	content_hash: String,
	created_at: i64,
}

impl VectorStore {
	/// Inserts new chunks and rewrites chunks whose content hash changed.
	///
	/// Returns the rows that were written, with `content_hash` filled in;
	/// unchanged rows are skipped entirely so their timestamps do not move.
	pub async fn upsert(&self, rows: &[DocumentChunk]) -> Result<Vec<DocumentChunk>> {
		if rows.is_empty() {
			return Ok(Vec::new());
		}
		let dim = validate(rows)?;
		let _guard = self.write_lock.lock().await;
		let table = self
			.open_active()
			.await?
			.ok_or_else(|| Error::Configuration("chunk table missing; ensure_schema must run first".into()))?;
		if let Some(stored) = self.stored_dim().await? {
			if stored != dim {
				return Err(Error::InvalidInput(format!("embedding dimension {dim} does not match stored {stored}")));
			}
		}

		// Last occurrence of an identity within one batch wins.
		let mut by_key: BTreeMap<String, DocumentChunk> = BTreeMap::new();
		for row in rows {
			let mut row = row.clone();
			row.content_hash = content_hash(&row.content);
			by_key.insert(row.chunk_ref().key(), row);
		}
		let keys: Vec<String> = by_key.keys().cloned().collect();
		let existing = read_existing(&table, &keys).await?;
		let now = Utc::now().timestamp_millis();
		let mut changed = Vec::new();
		let mut created = Vec::new();
		for (key, row) in by_key {
			match existing.get(&key) {
				Some(prev) if prev.content_hash == row.content_hash => {}
				Some(prev) => {
					created.push(prev.created_at);
					changed.push((key, row));
				}
				None => {
					created.push(now);
					changed.push((key, row));
				}
			}
		}
		debug!(incoming = rows.len(), changed = changed.len(), "upsert diff computed");
		if changed.is_empty() {
			return Ok(Vec::new());
		}

		let batch = to_record_batch(&changed, &created, now, dim)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		let mut mi = table.merge_insert(&["id"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await.map_err(Error::store)?;
		Ok(changed.into_iter().map(|(_, row)| row).collect())
	}

	/// Stored content hash for one chunk identity.
	pub async fn stored_hash(&self, key: &str) -> Result<Option<String>> {
		let Some(table) = self.open_active().await? else {
			return Ok(None);
		};
		let existing = read_existing(&table, &[key.to_string()]).await?;
		Ok(existing.get(key).map(|r| r.content_hash.clone()))
	}
}

fn validate(rows: &[DocumentChunk]) -> Result<usize> {
	let dim = rows[0].embedding.len();
	if dim == 0 {
		return Err(Error::InvalidInput("document embedding is empty".into()));
	}
	for row in rows {
		if row.repo.trim().is_empty() || row.path.trim().is_empty() {
			return Err(Error::InvalidInput("document repo and path are required".into()));
		}
		if row.embedding.len() != dim {
			return Err(Error::InvalidInput(format!(
				"{}: embedding has {} dimensions, batch uses {dim}",
				row.chunk_ref(),
				row.embedding.len()
			)));
		}
	}
	Ok(dim)
}

async fn read_existing(table: &Table, keys: &[String]) -> Result<HashMap<String, StoredRow>> {
	let mut out = HashMap::new();
	for chunk in keys.chunks(LOOKUP_BATCH) {
		let list = chunk.iter().map(|k| sql_quote(k)).collect::<Vec<_>>().join(",");
		let mut stream = table
			.query()
			.only_if(format!("id IN ({list})"))
			.select(Select::columns(&["id", "content_hash", "created_at"]))
			.execute()
			.await
			.map_err(Error::store)?;
		while let Some(batch) = stream.try_next().await.map_err(Error::store)? {
			let ids = string_col(&batch, "id")?;
			let hashes = string_col(&batch, "content_hash")?;
			let created = batch
				.column_by_name("created_at")
				.and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
				.ok_or_else(|| Error::Store("column created_at missing".into()))?;
			for i in 0..batch.num_rows() {
				let created_at = if created.is_valid(i) { created.value(i) } else { 0 };
				out.insert(ids.value(i).to_string(), StoredRow { content_hash: hashes.value(i).to_string(), created_at });
			}
		}
	}
	Ok(out)
}

fn to_record_batch(rows: &[(String, DocumentChunk)], created: &[i64], now: i64, dim: usize) -> Result<RecordBatch> {
	let dim_i32 = i32::try_from(dim).map_err(|_| Error::InvalidInput(format!("dimension {dim} too large")))?;
	let mut metadata = Vec::with_capacity(rows.len());
	for (_, row) in rows {
		metadata.push(serde_json::to_string(&row.metadata).map_err(Error::store)?);
	}
	let vectors = rows
		.iter()
		.map(|(_, row)| Some(row.embedding.iter().copied().map(Some).collect::<Vec<_>>()));
	RecordBatch::try_new(
		build_documents_schema(dim_i32),
		vec![
			Arc::new(StringArray::from_iter_values(rows.iter().map(|(k, _)| k.as_str()))),
			Arc::new(StringArray::from_iter_values(rows.iter().map(|(_, r)| r.repo.as_str()))),
			Arc::new(StringArray::from_iter_values(rows.iter().map(|(_, r)| r.path.as_str()))),
			Arc::new(Int32Array::from_iter_values(rows.iter().map(|(_, r)| r.chunk_index))),
			Arc::new(StringArray::from_iter_values(rows.iter().map(|(_, r)| r.content.as_str()))),
			Arc::new(StringArray::from(metadata)),
			Arc::new(StringArray::from_iter_values(rows.iter().map(|(_, r)| r.content_hash.as_str()))),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim_i32)),
			Arc::new(TimestampMillisecondArray::from(created.to_vec())),
			Arc::new(TimestampMillisecondArray::from(vec![now; rows.len()])),
		],
	)
	.map_err(Error::store)
}
