use anyhow::Result;
use tempfile::tempdir;

use ragdb_core::config::StoreSettings;
use ragdb_core::traits::DocumentStore;
use ragdb_core::types::DocumentChunk;
use ragdb_embed::HashEmbedder;
use ragdb_hybrid::{FusionEngine, FusionParams, HybridStore};
use std::sync::Arc;

fn chunk(embedder: &HashEmbedder, path: &str, index: i32, content: &str) -> DocumentChunk {
    DocumentChunk {
        repo: "r1".into(),
        path: path.into(),
        chunk_index: index,
        content: content.into(),
        embedding: embedder.embed_one(content),
        ..DocumentChunk::default()
    }
}

async fn open(dir: &std::path::Path) -> Result<HybridStore> {
    let cfg = StoreSettings { uri: dir.join("db").to_string_lossy().into_owned(), ..StoreSettings::default() };
    Ok(HybridStore::open(&cfg).await?)
}

#[tokio::test]
async fn reingesting_unchanged_content_is_a_no_op() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path()).await?;
    let emb = HashEmbedder::new(16);
    let row = chunk(&emb, "p1.md", 0, "alpha");

    store.ensure_schema(16, true).await?;
    assert_eq!(store.upsert_documents(&[row.clone()]).await?, 1);
    assert_eq!(store.upsert_documents(&[row.clone()]).await?, 0);

    let changed = chunk(&emb, "p1.md", 0, "alpha beta");
    assert_eq!(store.upsert_documents(&[changed]).await?, 1);
    assert_eq!(store.lexical().num_docs(), 1);
    let hits = store.lexical_search("beta", 5).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.path, "p1.md");
    Ok(())
}

#[tokio::test]
async fn both_halves_feed_fusion() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(open(dir.path()).await?);
    let emb = HashEmbedder::new(64);
    store.ensure_schema(64, true).await?;
    let rows = vec![
        chunk(&emb, "deploy.md", 0, "deploy the service with docker compose"),
        chunk(&emb, "backup.md", 0, "nightly backup of the database volume"),
        chunk(&emb, "intro.md", 0, "welcome to the handbook"),
    ];
    assert_eq!(store.upsert_documents(&rows).await?, 3);

    let engine = FusionEngine::new(Arc::new(emb), store.clone());
    let out = engine.retrieve("deploy docker", FusionParams::new(None, 10)).await?;
    assert_eq!(out[0].chunk.path, "deploy.md");
    assert!(out[0].lexical_score > 0.0);
    assert!(out[0].vector_score > 0.0);
    Ok(())
}

#[tokio::test]
async fn dimension_migration_resets_lexical_index() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path()).await?;
    let small = HashEmbedder::new(8);
    store.ensure_schema(8, true).await?;
    store.upsert_documents(&[chunk(&small, "a.md", 0, "gamma")]).await?;
    assert_eq!(store.lexical().num_docs(), 1);

    assert!(store.ensure_schema(12, false).await.is_err());
    store.ensure_schema(12, true).await?;
    assert_eq!(store.lexical().num_docs(), 0);
    assert_eq!(store.vector().stored_dim().await?, Some(12));
    Ok(())
}

#[tokio::test]
async fn retry_repairs_lexical_half_left_behind() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path()).await?;
    let emb = HashEmbedder::new(16);
    store.ensure_schema(16, true).await?;
    let row = chunk(&emb, "p1.md", 0, "solar charge controller");

    // The chunk table committed but the lexical write never happened.
    assert_eq!(store.vector().upsert(&[row.clone()]).await?.len(), 1);
    assert!(store.lexical_search("controller", 5).await?.is_empty());

    assert_eq!(store.upsert_documents(&[row.clone()]).await?, 0);
    let hits = store.lexical_search("controller", 5).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.path, "p1.md");

    assert_eq!(store.upsert_documents(&[row]).await?, 0);
    assert_eq!(store.lexical().num_docs(), 1);
    Ok(())
}

#[tokio::test]
async fn separator_characters_keep_identities_apart() -> Result<()> {
    let dir = tempdir()?;
    let store = open(dir.path()).await?;
    let emb = HashEmbedder::new(16);
    store.ensure_schema(16, true).await?;
    let mut left = chunk(&emb, "c", 0, "left side");
    left.repo = "a|b".into();
    let mut right = chunk(&emb, "b|c", 0, "right side");
    right.repo = "a".into();

    assert_eq!(store.upsert_documents(&[left, right]).await?, 2);
    assert_eq!(store.vector().count_rows().await?, 2);
    assert_eq!(store.lexical().num_docs(), 2);
    Ok(())
}
