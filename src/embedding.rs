//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`FakeProvider`]** — deterministic pseudo-embeddings derived from a
//!   content hash; useful for tests and development without network or
//!   model dependencies.
//! - **[`OpenAIProvider`]** — one batched call per `embed` invocation
//!   against an OpenAI-compatible embeddings endpoint.
//! - **`LocalProvider`** — in-process inference via fastembed, behind the
//!   `local-embeddings` feature.
//!
//! Providers are selected by configuration name through a
//! [`ProviderRegistry`], which caches one instance per
//! `(provider, dim, model)` key for the life of the process. An unsupported
//! provider name fails at selection time, before any I/O.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::KbError;

/// Capability shared by all embedding backends: map a batch of texts to
/// fixed-dimension vectors, order-preserving, one vector per input text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Configured model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dim(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError>;
}

/// Embed a single query text — a batch of one.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, KbError> {
    let vectors = provider.embed(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| KbError::Provider("empty embedding response".to_string()))
}

// ============ Provider registry ============

type ProviderKey = (String, usize, String);

/// Process-wide cache of provider instances, keyed by
/// `(provider, dim, model)`.
///
/// Instances are created lazily on first lookup and never evicted — this
/// matters for providers that load heavyweight local models. The registry
/// is an explicitly passed value rather than a module-level singleton, so
/// tests can construct isolated instances.
pub struct ProviderRegistry {
    providers: Mutex<HashMap<ProviderKey, Arc<dyn EmbeddingProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached provider for this configuration, creating it on
    /// first use.
    ///
    /// # Errors
    ///
    /// `KbError::Configuration` for an unsupported provider name or a
    /// provider whose prerequisites (credential, model) are missing.
    pub fn get(&self, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, KbError> {
        let key = (
            config.provider.clone(),
            config.dim,
            config.model.clone(),
        );

        let mut providers = self.providers.lock().unwrap();
        if let Some(provider) = providers.get(&key) {
            return Ok(Arc::clone(provider));
        }

        let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
            "fake" => Arc::new(FakeProvider::new(config)),
            "openai" => Arc::new(OpenAIProvider::new(config)?),
            #[cfg(feature = "local-embeddings")]
            "local" => Arc::new(local::LocalProvider::new(config)?),
            #[cfg(not(feature = "local-embeddings"))]
            "local" => {
                return Err(KbError::Configuration(
                    "local embedding provider requires building with --features local-embeddings"
                        .to_string(),
                ))
            }
            other => {
                return Err(KbError::Configuration(format!(
                    "unsupported embedding provider '{}'",
                    other
                )))
            }
        };

        providers.insert(key, Arc::clone(&provider));
        Ok(provider)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Fake provider ============

/// Deterministic pseudo-embeddings for tests and dev.
///
/// The vector for a text is derived from a SHA-256 hash of its content,
/// expanded with a counter, and normalized to unit length — the same text
/// produces the same vector across runs and processes.
#[derive(Debug)]
pub struct FakeProvider {
    model: String,
    dim: usize,
}

impl FakeProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dim: config.dim,
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        if self.dim == 0 {
            return Vec::new();
        }

        let seed = Sha256::digest(text.as_bytes());
        let mut values = Vec::with_capacity(self.dim);
        let mut counter: u64 = 0;

        'fill: loop {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            let block = hasher.finalize();

            for bytes in block.chunks_exact(4) {
                let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                values.push((word as f64 / u32::MAX as f64) as f32);
                if values.len() == self.dim {
                    break 'fill;
                }
            }
            counter += 1;
        }

        normalize_in_place(&mut values);
        values
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}

// ============ OpenAI provider ============

/// Environment variable holding the remote embedding API credential.
pub const API_KEY_ENV: &str = "SAFETY_KB_EMBEDDING_API_KEY";

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/embeddings";

/// Remote provider calling an OpenAI-compatible embeddings endpoint.
///
/// Issues a single batched request per `embed` call. There is no retry at
/// this layer — a stalled or failed call is a failure, and retries belong
/// to the ingestion orchestrator's caller.
#[derive(Debug)]
pub struct OpenAIProvider {
    model: String,
    dim: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// `KbError::Configuration` if the `SAFETY_KB_EMBEDDING_API_KEY`
    /// environment variable is not set.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, KbError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            KbError::Configuration(format!(
                "remote embeddings require the {} environment variable",
                API_KEY_ENV
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KbError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dim: config.dim,
            url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KbError::Provider(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(KbError::Provider(format!(
                "embedding API returned {}: {}",
                status, body_text
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| KbError::Provider(format!("invalid embedding response: {}", e)))?;

        parse_embeddings_payload(&payload)
    }
}

/// Extract the `data[].embedding` arrays, in input order.
fn parse_embeddings_payload(payload: &serde_json::Value) -> Result<Vec<Vec<f32>>, KbError> {
    let data = payload
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            KbError::Provider("invalid embedding response: missing data array".to_string())
        })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                KbError::Provider("invalid embedding response: missing embedding".to_string())
            })?;

        let vector: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vector);
    }

    Ok(embeddings)
}

// ============ Local provider (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;

    /// In-process inference via fastembed. The model is loaded once at
    /// construction and shared through the registry cache; output vectors
    /// are normalized to unit length.
    pub struct LocalProvider {
        model: String,
        dim: usize,
        batch_size: usize,
        engine: Arc<Mutex<fastembed::TextEmbedding>>,
    }

    impl std::fmt::Debug for LocalProvider {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LocalProvider")
                .field("model", &self.model)
                .field("dim", &self.dim)
                .field("batch_size", &self.batch_size)
                .finish_non_exhaustive()
        }
    }

    impl LocalProvider {
        pub fn new(config: &EmbeddingConfig) -> Result<Self, KbError> {
            let fastembed_model = model_by_name(&config.model)?;
            let engine = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| {
                KbError::Provider(format!("failed to initialize local embedding model: {}", e))
            })?;

            Ok(Self {
                model: config.model.clone(),
                dim: config.dim,
                batch_size: config.batch_size,
                engine: Arc::new(Mutex::new(engine)),
            })
        }
    }

    fn model_by_name(name: &str) -> Result<fastembed::EmbeddingModel, KbError> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            other => Err(KbError::Configuration(format!(
                "unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
                 bge-large-en-v1.5, nomic-embed-text-v1.5",
                other
            ))),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn model_name(&self) -> &str {
            &self.model
        }

        fn dim(&self) -> usize {
            self.dim
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KbError> {
            let engine = Arc::clone(&self.engine);
            let texts = texts.to_vec();
            let batch_size = self.batch_size;

            let mut vectors = tokio::task::spawn_blocking(move || {
                let mut engine = engine.lock().unwrap();
                engine
                    .embed(texts, Some(batch_size))
                    .map_err(|e| KbError::Provider(format!("local embedding failed: {}", e)))
            })
            .await
            .map_err(|e| KbError::Provider(format!("local embedding task failed: {}", e)))??;

            for vector in &mut vectors {
                normalize_in_place(vector);
            }
            Ok(vectors)
        }
    }
}

// ============ Vector utilities ============

/// Scale a vector to unit length. A zero-norm vector is left untouched
/// (its norm is treated as 1).
fn normalize_in_place(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Range `[-1.0, 1.0]`. A zero-norm vector is treated as having norm 1,
/// yielding a degenerate score of 0 for all-zero vectors. Vectors of
/// different lengths score over the shared prefix — callers are expected
/// to store vectors of one configured dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let mut norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let mut norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 {
        norm_a = 1.0;
    }
    if norm_b == 0.0 {
        norm_b = 1.0;
    }

    dot / (norm_a * norm_b)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_config(dim: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "fake".to_string(),
            dim,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.3, -0.7, 0.2];
        let b = vec![0.9, 0.1, -0.4];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_scale_invariant() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.5, -1.0, 2.0];
        let scaled: Vec<f32> = a.iter().map(|v| v * 7.5).collect();
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&scaled, &b)).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_zero_vector_degenerates_to_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths_do_not_panic() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0];
        // dot over the shared prefix, norms over the full vectors
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn fake_provider_is_deterministic() {
        let provider = FakeProvider::new(&fake_config(32));
        let texts = vec!["detecting deception".to_string()];
        let first = provider.embed(&texts).await.unwrap();
        let second = provider.embed(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 32);
    }

    #[tokio::test]
    async fn fake_provider_vectors_are_unit_length() {
        let provider = FakeProvider::new(&fake_config(64));
        let vectors = provider
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        for vector in &vectors {
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm was {}", norm);
        }
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn fake_provider_preserves_input_order() {
        let provider = FakeProvider::new(&fake_config(16));
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let vectors = provider.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        let again = provider.embed(&["two".to_string()]).await.unwrap();
        assert_eq!(vectors[1], again[0]);
    }

    #[test]
    fn registry_caches_one_instance_per_key() {
        let registry = ProviderRegistry::new();
        let config = fake_config(32);
        let first = registry.get(&config).unwrap();
        let second = registry.get(&config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry.get(&fake_config(64)).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn registry_rejects_unknown_provider() {
        let registry = ProviderRegistry::new();
        let config = EmbeddingConfig {
            provider: "custom".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = registry.get(&config).unwrap_err();
        assert!(matches!(err, KbError::Configuration(_)));
    }

    #[test]
    fn openai_without_credential_is_a_configuration_error() {
        std::env::remove_var(API_KEY_ENV);
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = ProviderRegistry::new().get(&config).unwrap_err();
        assert!(matches!(err, KbError::Configuration(_)));
    }

    #[test]
    fn parse_payload_rejects_missing_data() {
        let err = parse_embeddings_payload(&serde_json::json!({"object": "list"})).unwrap_err();
        assert!(matches!(err, KbError::Provider(_)));
    }

    #[test]
    fn parse_payload_extracts_vectors_in_order() {
        let payload = serde_json::json!({
            "data": [
                {"embedding": [1.0, 0.0]},
                {"embedding": [0.0, 1.0]},
            ]
        });
        let vectors = parse_embeddings_payload(&payload).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
