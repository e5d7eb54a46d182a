use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use ragdb_core::{Error, Result};

pub const CONTENT_TOKENIZER: &str = "content_with_stopwords";

/// Resolved field handles for the chunk schema.
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub id: Field,
	pub repo: Field,
	pub path: Field,
	pub chunk_index: Field,
	pub content: Field,
	pub metadata: Field,
}

impl ChunkFields {
	pub fn from_schema(schema: &Schema) -> Result<Self> {
		let get = |name: &str| schema.get_field(name).map_err(|e| Error::Configuration(format!("lexical schema: {e}")));
		Ok(Self {
			id: get("id")?,
			repo: get("repo")?,
			path: get("path")?,
			chunk_index: get("chunk_index")?,
			content: get("content")?,
			metadata: get("metadata")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("repo", STRING | STORED);
	schema_builder.add_text_field("path", STRING | STORED);
	schema_builder.add_i64_field("chunk_index", STORED);
	let content_indexing = TextFieldIndexing::default().set_tokenizer(CONTENT_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let content_options = TextOptions::default().set_indexing_options(content_indexing).set_stored();
	schema_builder.add_text_field("content", content_options);
	schema_builder.add_text_field("metadata", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(CONTENT_TOKENIZER, tokenizer);
}
