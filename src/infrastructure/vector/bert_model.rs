//! BERT sentence-transformer encoder using candle-transformers
//!
//! Follows the sentence-transformers recipe:
//! 1. Tokenize with batch-longest padding and truncation
//! 2. BERT forward pass to get token embeddings
//! 3. Mean pooling weighted by the attention mask
//! 4. Optional L2 normalization
//!
//! Weights are read into memory and handed to candle as a buffered
//! safetensors blob. Dropping the model frees them.

use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tokenizers::{
    PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection,
    TruncationParams, TruncationStrategy,
};

use super::bert_error::BertError;
use crate::domain::errors::EncoderError;
use crate::domain::models::EmbeddingModelKind;
use crate::domain::ports::{EmbeddingModel, ModelLoader};

type BertResult<T> = Result<T, BertError>;

/// Resident BERT model with its tokenizer
pub struct BertEmbeddingModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimensions: usize,
    max_seq_length: usize,
}

impl BertEmbeddingModel {
    /// Download (or reuse the HuggingFace cache) and load a model.
    ///
    /// Models are cached in ~/.cache/huggingface/hub/
    pub fn load(kind: EmbeddingModelKind) -> BertResult<Self> {
        let repo_id = kind.model_name();
        let dimensions = kind.dimensions();
        let device = select_device();

        tracing::info!(model = repo_id, device = ?device, "Loading BERT model");

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(repo_id.to_string());

        let tokenizer_path = repo.get("tokenizer.json")?;
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            BertError::ModelLoadError {
                model_name: repo_id.to_string(),
                reason: format!("tokenizer: {e}"),
            }
        })?;

        let config_path = repo.get("config.json")?;
        let config: Config = serde_json::from_reader(std::fs::File::open(&config_path)?)?;
        if config.hidden_size != dimensions {
            return Err(BertError::InvalidDimensions {
                expected: dimensions,
                actual: config.hidden_size,
            });
        }
        let max_seq_length = config.max_position_embeddings;

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: "[PAD]".to_string(),
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_seq_length,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| BertError::TokenizationError(e.to_string()))?;

        let weights_path = repo.get("model.safetensors")?;
        let weights = std::fs::read(&weights_path)?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &device)
            .map_err(|e| BertError::from(e).during("loading weights"))?;
        let model = BertModel::load(vb, &config)
            .map_err(|e| BertError::from(e).during("building model"))?;

        tracing::info!(
            model = repo_id,
            dimensions,
            layers = config.num_hidden_layers,
            "BERT model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dimensions,
            max_seq_length,
        })
    }

    pub const fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    fn embed_batch(&self, texts: &[String], normalize: bool) -> BertResult<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = self.tokenize(texts)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, None)
            .map_err(|e| BertError::from(e).during("forward pass"))?;

        let mut pooled = mean_pool(&hidden, &attention_mask)?;
        if normalize {
            pooled = normalize_l2(&pooled)?;
        }
        Ok(pooled.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }

    fn tokenize(&self, texts: &[String]) -> BertResult<(Tensor, Tensor)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| BertError::TokenizationError(e.to_string()))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_ids().iter().copied())
            .collect();
        let mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().iter().copied())
            .collect();

        if ids.len() != batch_size * seq_len {
            return Err(BertError::TokenizationError(
                "padding produced ragged sequences".to_string(),
            ));
        }

        let input_ids = Tensor::from_vec(ids, (batch_size, seq_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(mask, (batch_size, seq_len), &self.device)?.to_dtype(DType::F32)?;
        Ok((input_ids, attention_mask))
    }
}

/// Mean of token embeddings, padding excluded via the attention mask.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> BertResult<Tensor> {
    let mask = attention_mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let summed = hidden.mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f32::MAX)?;
    Ok(summed.div(&counts)?)
}

fn normalize_l2(embeddings: &Tensor) -> BertResult<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f32::MAX)?;
    Ok(embeddings.broadcast_div(&norm)?)
}

/// CUDA, then Metal, then CPU.
fn select_device() -> Device {
    if candle_core::utils::cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => tracing::warn!(error = %e, "CUDA available but initialization failed, falling back"),
        }
    }
    if candle_core::utils::metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => tracing::warn!(error = %e, "Metal available but initialization failed, falling back"),
        }
    }
    Device::Cpu
}

impl EmbeddingModel for BertEmbeddingModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[String], normalize: bool) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.embed_batch(texts, normalize).map_err(EncoderError::from)
    }
}

/// Loads a fresh [`BertEmbeddingModel`] each time the encoder needs one
#[derive(Debug, Clone, Copy)]
pub struct BertModelLoader {
    kind: EmbeddingModelKind,
}

impl BertModelLoader {
    pub const fn new(kind: EmbeddingModelKind) -> Self {
        Self { kind }
    }
}

impl ModelLoader for BertModelLoader {
    fn model_name(&self) -> &str {
        self.kind.model_name()
    }

    fn dimensions(&self) -> usize {
        self.kind.dimensions()
    }

    fn load(&self) -> Result<Arc<dyn EmbeddingModel>, EncoderError> {
        let model = BertEmbeddingModel::load(self.kind).map_err(EncoderError::from)?;
        Ok(Arc::new(model))
    }
}
