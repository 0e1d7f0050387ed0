use serde::{Deserialize, Serialize};

use crate::error::{NatError, NatResult};

/// Transformer Core sizing. Both shared-embedding flags must be
/// true: the core always ties source, target and output weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVariantConfig {
    pub d_model:                   usize,
    pub n_heads:                   usize,
    pub num_encoder_layers:        usize,
    pub num_decoder_layers:        usize,
    pub dim_ff:                    usize,
    pub dropout:                   f64,
    pub layer_norm_eps:            f64,
    pub shared_embeddings_src_trg: bool,
    pub shared_embeddings_trg_out: bool,
    pub max_training_steps:        usize,

    /// Pre-norm (LayerNorm before each sublayer) instead of post-norm
    #[serde(default)]
    pub norm_first: bool,

    /// Add the NAT positional-attention sublayer to decoder blocks
    #[serde(default)]
    pub positional_attention: bool,

    /// Gated highway connections around decoder sublayers
    #[serde(default)]
    pub highway: bool,
}

impl Default for ModelVariantConfig {
    fn default() -> Self {
        Self {
            d_model:                   512,
            n_heads:                   8,
            num_encoder_layers:        6,
            num_decoder_layers:        6,
            dim_ff:                    2048,
            dropout:                   0.1,
            layer_norm_eps:            1e-6,
            shared_embeddings_src_trg: true,
            shared_embeddings_trg_out: true,
            max_training_steps:        100_000,
            norm_first:                false,
            positional_attention:      false,
            highway:                   false,
        }
    }
}

impl ModelVariantConfig {
    pub fn validate(&self) -> NatResult<()> {
        if self.d_model == 0 || self.n_heads == 0 {
            return Err(NatError::Config("d_model and n_heads must be > 0".into()));
        }
        if self.d_model % self.n_heads != 0 {
            return Err(NatError::Config(format!(
                "d_model ({}) must be divisible by n_heads ({})",
                self.d_model, self.n_heads
            )));
        }
        if self.num_encoder_layers == 0 || self.num_decoder_layers == 0 {
            return Err(NatError::Config("layer counts must be > 0".into()));
        }
        if self.dim_ff == 0 {
            return Err(NatError::Config("dim_ff must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NatError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.layer_norm_eps > 0.0 && self.layer_norm_eps.is_finite()) {
            return Err(NatError::Config("layer_norm_eps must be a positive finite number".into()));
        }
        if !self.shared_embeddings_src_trg || !self.shared_embeddings_trg_out {
            return Err(NatError::Config(
                "untied embeddings are not supported: shared_embeddings_src_trg and \
                 shared_embeddings_trg_out must both be true"
                    .into(),
            ));
        }
        if self.max_training_steps == 0 {
            return Err(NatError::Config("max_training_steps must be > 0".into()));
        }
        Ok(())
    }
}
