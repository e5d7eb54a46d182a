//! ragdb-vector
//!
//! LanceDB chunk table: schema and dimension migration, hash-gated upsert,
//! cosine kNN, IVF_PQ index build, and a small key/value meta table.
pub mod index_build;
pub mod schema;
pub mod store;
pub mod table;
pub mod writer;

pub use store::{SchemaChange, VectorStore};
pub use table::{get_meta, open_db, set_meta, META_TABLE};
