use std::time::Duration;

use ragdb_core::config::{EmbeddingSettings, GeneratorSettings};
use ragdb_core::traits::{Embedder, Generator, Reranker};
use ragdb_core::Error;
use ragdb_embed::{build_embedder, BgeEmbedder, ChatGenerator, ChutesEmbedder, HttpReranker, OpenAiEmbedder, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn openai_batch_embeds_in_input_order() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "m", "input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ],
            "usage": {"total_tokens": 7}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = EmbeddingSettings {
        endpoint: server.uri(),
        model: "m".into(),
        api_key: Some("sk-test".into()),
        ..EmbeddingSettings::default()
    };
    let embedder = build_embedder(&cfg)?;
    assert_eq!(embedder.name(), "openai");
    assert_eq!(embedder.dim(), None);
    let out = embedder.embed(&texts(&["a", "b"])).await?;
    assert_eq!(out.vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    assert_eq!(out.tokens_used, 7);
    assert_eq!(embedder.dim(), Some(2), "dimension inferred from first response");
    Ok(())
}

#[tokio::test]
async fn openai_count_mismatch_is_protocol_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"embedding": [1.0]}]})))
        .mount(&server)
        .await;
    let embedder = OpenAiEmbedder::new(format!("{}/v1/embeddings", server.uri()), None, "m".into(), None, TIMEOUT)?;
    let err = embedder.embed(&texts(&["a", "b"])).await.expect_err("two inputs, one vector");
    assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn non_success_status_is_upstream_error_without_retry() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;
    let embedder = ChutesEmbedder::new(format!("{}/embed", server.uri()), None, None, None, TIMEOUT)?
        .with_retry(RetryPolicy::exponential().with_initial_backoff(Duration::from_millis(5)));
    let err = embedder.embed(&texts(&["a"])).await.expect_err("401");
    assert_eq!(err, Error::upstream(Some(401), "bad key"));
    Ok(())
}

#[tokio::test]
async fn chutes_retries_throttling_then_succeeds() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .and(body_partial_json(json!({"inputs": ["a"], "model": "bge-m3"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [[0.5, 0.5, 0.0]]})))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = ChutesEmbedder::new(format!("{}/embed", server.uri()), Some("tok".into()), Some("bge-m3".into()), None, TIMEOUT)?
        .with_retry(RetryPolicy::exponential().with_initial_backoff(Duration::from_millis(5)));
    let out = embedder.embed(&texts(&["a"])).await?;
    assert_eq!(out.vectors, vec![vec![0.5, 0.5, 0.0]]);
    Ok(())
}

#[tokio::test]
async fn chutes_gives_up_after_three_attempts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let embedder = ChutesEmbedder::new(format!("{}/embed", server.uri()), None, None, None, TIMEOUT)?
        .with_retry(RetryPolicy::exponential().with_initial_backoff(Duration::from_millis(5)));
    let err = embedder.embed(&texts(&["a"])).await.expect_err("always 503");
    assert!(matches!(err, Error::Upstream { status: Some(503), .. }));
    Ok(())
}

#[tokio::test]
async fn bge_calls_once_per_item() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.1, 0.2]])))
        .expect(3)
        .mount(&server)
        .await;
    let embedder = BgeEmbedder::new(format!("{}/embed", server.uri()), None, Some(2), TIMEOUT)?;
    let out = embedder.embed(&texts(&["a", "b", "c"])).await?;
    assert_eq!(out.vectors.len(), 3);
    assert_eq!(embedder.dim(), Some(2));
    Ok(())
}

#[tokio::test]
async fn reranker_accepts_plain_scores() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"query": "q", "documents": ["x", "y"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"scores": [0.2, 0.8]})))
        .mount(&server)
        .await;
    let reranker = HttpReranker::new(format!("{}/rerank", server.uri()), None, String::new(), TIMEOUT)?;
    assert_eq!(reranker.model(), "default");
    let scores = reranker.rerank("q", &texts(&["x", "y"])).await?;
    assert_eq!(scores, vec![0.2, 0.8]);
    Ok(())
}

#[tokio::test]
async fn generator_posts_chat_completion() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "deepseek-ai/DeepSeek-R1",
            "stream": false,
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": " hello \n"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let cfg = GeneratorSettings { endpoint: format!("{}/v1", server.uri()), ..GeneratorSettings::default() };
    let generator = ChatGenerator::from_settings(&cfg)?;
    assert_eq!(generator.complete("hi").await?, "hello");
    Ok(())
}
