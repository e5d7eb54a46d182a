use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, warn};

use ragdb_core::types::{ChunkRef, DocumentChunk, LexicalHit, Metadata};
use ragdb_core::{Error, Result};

use crate::tantivy_utils::{build_schema, register_tokenizer, ChunkFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Full-text half of the store: one Tantivy document per chunk id, derived
/// from the chunk content and rewritten together with the vector row.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	writer: Mutex<IndexWriter>,
	fields: ChunkFields,
}

impl LexicalIndex {
	/// Opens the index under `dir`, creating it (and the directory) if absent.
	pub fn open_or_create(dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(dir).map_err(Error::store)?;
		let directory = MmapDirectory::open(dir).map_err(Error::store)?;
		let index = Index::open_or_create(directory, build_schema()).map_err(Error::store)?;
		Self::from_index(index)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = ChunkFields::from_schema(&index.schema())?;
		let reader = index
			.reader_builder()
			.reload_policy(ReloadPolicy::Manual)
			.try_into()
			.map_err(Error::store)?;
		let writer = index.writer(WRITER_HEAP_BYTES).map_err(Error::store)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	/// Replaces the documents for the given chunks and makes them searchable.
	pub fn upsert(&self, rows: &[DocumentChunk]) -> Result<()> {
		if rows.is_empty() {
			return Ok(());
		}
		let mut writer = self.writer.lock().map_err(|_| Error::Store("lexical writer poisoned".into()))?;
		for row in rows {
			let key = row.chunk_ref().key();
			writer.delete_term(Term::from_field_text(self.fields.id, &key));
			let metadata = serde_json::to_string(&row.metadata).map_err(Error::store)?;
			writer
				.add_document(doc!(
					self.fields.id => key,
					self.fields.repo => row.repo.clone(),
					self.fields.path => row.path.clone(),
					self.fields.chunk_index => i64::from(row.chunk_index),
					self.fields.content => row.content.clone(),
					self.fields.metadata => metadata,
				))
				.map_err(Error::store)?;
		}
		writer.commit().map_err(Error::store)?;
		drop(writer);
		self.reader.reload().map_err(Error::store)?;
		debug!(rows = rows.len(), "lexical index updated");
		Ok(())
	}

	/// Rows whose indexed content is missing or differs from the row, one per
	/// identity with the last occurrence winning.
	pub fn stale(&self, rows: &[DocumentChunk]) -> Result<Vec<DocumentChunk>> {
		let mut latest: BTreeMap<String, &DocumentChunk> = BTreeMap::new();
		for row in rows {
			latest.insert(row.chunk_ref().key(), row);
		}
		let searcher = self.reader.searcher();
		let mut out = Vec::new();
		for (key, row) in latest {
			let query = TermQuery::new(Term::from_field_text(self.fields.id, &key), IndexRecordOption::Basic);
			let top = searcher.search(&query, &TopDocs::with_limit(1)).map_err(Error::store)?;
			let indexed = match top.first() {
				Some((_, addr)) => {
					let doc: TantivyDocument = searcher.doc(*addr).map_err(Error::store)?;
					doc.get_first(self.fields.content).and_then(|v| v.as_str()).map(str::to_string)
				}
				None => None,
			};
			if indexed.as_deref() != Some(row.content.as_str()) {
				out.push(row.clone());
			}
		}
		Ok(out)
	}

	/// Drops every document, used when the vector table is recreated.
	pub fn clear(&self) -> Result<()> {
		let mut writer = self.writer.lock().map_err(|_| Error::Store("lexical writer poisoned".into()))?;
		writer.delete_all_documents().map_err(Error::store)?;
		writer.commit().map_err(Error::store)?;
		drop(writer);
		self.reader.reload().map_err(Error::store)
	}

	pub fn num_docs(&self) -> u64 {
		self.reader.searcher().num_docs()
	}

	/// BM25 search over `content`. Query syntax errors are tolerated; the
	/// returned `rank` is squashed into `[0, 1)` as `bm25 / (1 + bm25)`.
	pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
		if query.trim().is_empty() || limit == 0 {
			return Ok(Vec::new());
		}
		let searcher = self.reader.searcher();
		let parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
		let (q, errors) = parser.parse_query_lenient(query);
		if !errors.is_empty() {
			debug!(errors = errors.len(), "lenient query parse dropped clauses");
		}
		let top_docs = searcher.search(&q, &TopDocs::with_limit(limit)).map_err(Error::store)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(Error::store)?;
			let text = |field: tantivy::schema::Field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string();
			let chunk_index = doc.get_first(self.fields.chunk_index).and_then(|v| v.as_i64()).unwrap_or_default();
			let metadata = match serde_json::from_str::<Metadata>(&text(self.fields.metadata)) {
				Ok(m) => m,
				Err(e) => {
					warn!(error = %e, "unreadable stored metadata");
					Metadata::new()
				}
			};
			hits.push(LexicalHit {
				chunk: ChunkRef::new(text(self.fields.repo), text(self.fields.path), i32::try_from(chunk_index).unwrap_or_default()),
				content: text(self.fields.content),
				metadata,
				rank: normalize_bm25(score),
			});
		}
		Ok(hits)
	}
}

pub fn normalize_bm25(score: f32) -> f32 {
	if score.is_finite() && score > 0.0 {
		score / (1.0 + score)
	} else {
		0.0
	}
}
