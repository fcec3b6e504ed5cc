//! The embedding model is an external collaborator (spec: "treated as a
//! pure function `text -> unit vector`"); this wraps a local fastembed model
//! behind a timeout + retry boundary so ingestion sees a uniform `EmbedError`
//! instead of a library-specific failure mode.

use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use crate::config::EmbeddingsConfig;
use crate::error::{EcmError, Result};

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

pub struct EmbeddingProvider {
    model: Arc<Mutex<TextEmbedding>>,
    batch_size: usize,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let embedding_model = match config.model.as_str() {
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                EmbeddingModel::AllMiniLML6V2
            }
            "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                EmbeddingModel::AllMiniLML12V2
            }
            "nomic-embed-text-v1" | "nomic-ai/nomic-embed-text-v1" => EmbeddingModel::NomicEmbedTextV1,
            "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
                EmbeddingModel::NomicEmbedTextV15
            }
            _ => EmbeddingModel::BGESmallENV15,
        };

        let model = TextEmbedding::try_new(
            InitOptions::new(embedding_model).with_show_download_progress(true),
        )
        .map_err(|e| EcmError::Embed(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            batch_size: config.batch_size,
            dimensions: config.dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embeds a batch of chunk texts, normalising each result to unit length
    /// (the vector store rejects non-unit vectors). Retried up to
    /// [`MAX_RETRIES`] times with exponential backoff, each attempt bounded
    /// by [`EMBED_TIMEOUT`] — both failure modes surface as `EmbedError`.
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let backoff_policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build();

        let mut attempts = 0u32;
        let result = retry(backoff_policy, || {
            let texts = texts.clone();
            attempts += 1;
            async move {
                tokio::time::timeout(EMBED_TIMEOUT, self.embed_once(texts))
                    .await
                    .map_err(|_| backoff::Error::transient(EcmError::Embed("embedding call timed out".into())))?
                    .map_err(|e| {
                        if attempts >= MAX_RETRIES {
                            backoff::Error::permanent(e)
                        } else {
                            backoff::Error::transient(e)
                        }
                    })
            }
        })
        .await?;

        Ok(result)
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EcmError::Embed("no embedding generated".to_string()))
    }

    async fn embed_once(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.batch_size;
        let model = Arc::clone(&self.model);
        let raw = {
            let mut model = model.lock().await;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| EcmError::Embed(e.to_string()))?
        };
        Ok(raw.into_iter().map(normalise).collect())
    }
}

fn normalise(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

impl Clone for EmbeddingProvider {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            batch_size: self.batch_size,
            dimensions: self.dimensions,
        }
    }
}
