//! LanceDB connection and housekeeping helpers.
//!
//! Provides database open functions, an ensure helper for tables, and a simple
//! key/value metadata table used to store pointers such as the active chunk
//! table and small JSON documents.
use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use std::sync::Arc;

use ragdb_core::{Error, Result};

pub const META_TABLE: &str = "meta";

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(Error::store)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(Error::store)?;
	Ok(names.iter().any(|n| n == name))
}

/// Creates an empty table with `schema` unless one named `name` exists.
/// Returns whether it was created.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<bool> {
	if table_exists(conn, name).await? {
		return Ok(false);
	}
	let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
	conn.create_table(name, Box::new(iter)).execute().await.map_err(Error::store)?;
	Ok(true)
}

fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
	ensure_table(conn, name, build_meta_schema()).await.map(|_| ())
}

pub(crate) fn sql_quote(s: &str) -> String {
	format!("'{}'", s.replace('\'', "''"))
}

/// Writes `key = value`, replacing any previous value.
pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
	ensure_meta_table(conn, table).await?;
	let t = conn.open_table(table).execute().await.map_err(Error::store)?;
	let rb = RecordBatch::try_new(
		build_meta_schema(),
		vec![
			Arc::new(StringArray::from(vec![key.to_string()])),
			Arc::new(StringArray::from(vec![value.to_string()])),
			Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
		],
	)
	.map_err(Error::store)?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), build_meta_schema()));
	let mut mi = t.merge_insert(&["key"]);
	mi.when_matched_update_all(None).when_not_matched_insert_all();
	mi.execute(reader).await.map_err(Error::store)?;
	Ok(())
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
	if !table_exists(conn, table).await? {
		return Ok(None);
	}
	let t = conn.open_table(table).execute().await.map_err(Error::store)?;
	let mut stream = t
		.query()
		.only_if(format!("key = {}", sql_quote(key)))
		.execute()
		.await
		.map_err(Error::store)?;
	while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await.map_err(Error::store)? {
		if batch.num_rows() == 0 {
			continue;
		}
		let val = batch
			.column_by_name("value")
			.and_then(|c| c.as_any().downcast_ref::<StringArray>())
			.ok_or_else(|| Error::Store("meta.value column missing".into()))?;
		return Ok(Some(val.value(0).to_string()));
	}
	Ok(None)
}
