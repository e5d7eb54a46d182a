use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const VECTOR_COLUMN: &str = "vector";

fn vector_type(dim: i32) -> DataType {
	DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim)
}

/// Columns of the chunk table. `id` is `repo|path|chunk_index` and unique.
pub fn build_documents_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("repo", DataType::Utf8, false),
		Field::new("path", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("metadata", DataType::Utf8, false),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new(VECTOR_COLUMN, vector_type(dim), true),
		Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
		Field::new("updated_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
	]))
}

/// Declared vector dimension of a stored schema, if it has a vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dimension_roundtrips_through_schema() {
		assert_eq!(vector_dim(&build_documents_schema(384)), Some(384));
		let bare = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
		assert_eq!(vector_dim(&bare), None);
	}
}
