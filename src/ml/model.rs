// ============================================================
// Layer 5 — Transformer Core
// ============================================================
// Shared-vocabulary encoder-decoder for non-autoregressive MT.
//
//   ids ──► Embedding·√d + PE ──► EncoderBlock × N ──► memory
//                                                        │
//   hyp ──► Embedding·√d + PE ──► DecoderBlock × M ◄─────┘
//                                      │
//                                      ▼
//                              h · Eᵀ  (logits)
//
// One embedding table E is owned by the model. Encoder input,
// decoder input and the output projection all read the same
// Param, so a gradient through any of them updates all three.
//
// Dropout is applied explicitly at residual branches and only in
// ForwardMode::Train. Attention-internal dropout is disabled, so
// an Inference call is deterministic on every backend, autodiff
// included.
//
// Decoding passes let every target position see every other one.
// The teacher-forced pass (`decode_teacher_forced`) adds a causal
// mask to both target-side attentions, so position p only reads
// inputs 0..=p and never the label it is trained to predict.

use burn::{
    module::Param,
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

use crate::config::NatConfig;
use crate::ml::positional::sinusoidal_encoding;

// ─── ForwardMode ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Teacher-forced training: dropout active
    Train,
    /// Decoding: no stochastic regularisation
    Inference,
}

impl ForwardMode {
    fn dropout<B: Backend, const D: usize>(self, dropout: &Dropout, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            ForwardMode::Train     => dropout.forward(x),
            ForwardMode::Inference => x,
        }
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct NatTransformerConfig {
    pub vocab_size:         usize,
    /// Largest target length the length head can suggest
    pub max_length:         usize,
    pub d_model:            usize,
    pub n_heads:            usize,
    pub num_encoder_layers: usize,
    pub num_decoder_layers: usize,
    pub dim_ff:             usize,
    #[config(default = 0.1)]
    pub dropout:            f64,
    #[config(default = 1e-6)]
    pub layer_norm_eps:     f64,
    #[config(default = false)]
    pub norm_first:         bool,
    #[config(default = false)]
    pub positional_attention: bool,
    /// Gated highway connections instead of plain residuals in the decoder
    #[config(default = false)]
    pub highway:            bool,
}

impl NatTransformerConfig {
    /// Architecture from a validated run configuration.
    pub fn from_run_config(config: &NatConfig, vocab_size: usize) -> Self {
        let m = &config.model;
        Self::new(
            vocab_size,
            config.max_length,
            m.d_model,
            m.n_heads,
            m.num_encoder_layers,
            m.num_decoder_layers,
            m.dim_ff,
        )
        .with_dropout(m.dropout)
        .with_layer_norm_eps(m.layer_norm_eps)
        .with_norm_first(m.norm_first)
        .with_positional_attention(m.positional_attention)
        .with_highway(m.highway)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> NatTransformer<B> {
        let embedding = EmbeddingConfig::new(self.vocab_size, self.d_model)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std:  (self.d_model as f64).powf(-0.5),
            })
            .init(device);
        let encoder = (0..self.num_encoder_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let decoder = (0..self.num_decoder_layers)
            .map(|_| self.build_decoder_block(device))
            .collect();
        NatTransformer {
            embedding,
            encoder,
            decoder,
            encoder_norm: self.layer_norm(device),
            decoder_norm: self.layer_norm(device),
            length_head:  LinearConfig::new(self.d_model, self.max_length + 1).init(device),
            dropout:      DropoutConfig::new(self.dropout).init(),
            d_model:      self.d_model,
            norm_first:   self.norm_first,
        }
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.n_heads)
            .with_dropout(0.0)
            .init(device)
    }

    fn layer_norm<B: Backend>(&self, device: &B::Device) -> LayerNorm<B> {
        LayerNormConfig::new(self.d_model)
            .with_epsilon(self.layer_norm_eps)
            .init(device)
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn:   self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.dim_ff).init(device),
            ffn_linear2: LinearConfig::new(self.dim_ff, self.d_model).init(device),
            norm1:       self.layer_norm(device),
            norm2:       self.layer_norm(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
            norm_first:  self.norm_first,
        }
    }

    fn gate<B: Backend>(&self, enabled: bool, device: &B::Device) -> Option<Linear<B>> {
        (self.highway && enabled).then(|| LinearConfig::new(self.d_model, self.d_model).init(device))
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            gate_self:   self.gate(true, device),
            gate_pos:    self.gate(self.positional_attention, device),
            gate_cross:  self.gate(true, device),
            gate_ff:     self.gate(true, device),
            self_attn:   self.attention(device),
            pos_attn:    self.positional_attention.then(|| self.attention(device)),
            cross_attn:  self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.dim_ff).init(device),
            ffn_linear2: LinearConfig::new(self.dim_ff, self.d_model).init(device),
            norm_self:   self.layer_norm(device),
            norm_pos:    self.positional_attention.then(|| self.layer_norm(device)),
            norm_cross:  self.layer_norm(device),
            norm_ff:     self.layer_norm(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
            norm_first:  self.norm_first,
        }
    }
}

/// Join a sublayer output back onto its input: `x + out`, or with a
/// highway gate `g = σ(W·x + b)`, `g ⊙ out + (1 − g) ⊙ x`.
fn connect<B: Backend>(x: Tensor<B, 3>, out: Tensor<B, 3>, gate: Option<&Linear<B>>) -> Tensor<B, 3> {
    match gate {
        Some(gate) => {
            let g = sigmoid(gate.forward(x.clone()));
            g.clone() * out + g.neg().add_scalar(1.0) * x
        }
        None => x + out,
    }
}

/// `x ⊕ sublayer(norm(x))` (pre-norm) or `norm(x ⊕ sublayer(x))` (post-norm),
/// where ⊕ is `connect`.
fn residual<B, F>(
    x:          Tensor<B, 3>,
    norm:       &LayerNorm<B>,
    dropout:    &Dropout,
    gate:       Option<&Linear<B>>,
    norm_first: bool,
    mode:       ForwardMode,
    sublayer:   F,
) -> Tensor<B, 3>
where
    B: Backend,
    F: FnOnce(Tensor<B, 3>) -> Tensor<B, 3>,
{
    if norm_first {
        let out = sublayer(norm.forward(x.clone()));
        connect(x, mode.dropout(dropout, out), gate)
    } else {
        let out = sublayer(x.clone());
        norm.forward(connect(x, mode.dropout(dropout, out), gate))
    }
}

/// Target-side attention input, with the causal mask when one is given.
fn target_attention<B: Backend>(input: MhaInput<B>, causal: Option<&Tensor<B, 3, Bool>>) -> MhaInput<B> {
    match causal {
        Some(mask) => input.mask_attn(mask.clone()),
        None => input,
    }
}

fn feed_forward<B: Backend>(
    x:       Tensor<B, 3>,
    linear1: &Linear<B>,
    linear2: &Linear<B>,
    dropout: &Dropout,
    mode:    ForwardMode,
) -> Tensor<B, 3> {
    linear2.forward(mode.dropout(dropout, relu(linear1.forward(x))))
}

// ─── EncoderBlock ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
    pub norm_first:  bool,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask`: [batch, src_len], true marks padding.
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>, mode: ForwardMode) -> Tensor<B, 3> {
        let x = residual(x, &self.norm1, &self.dropout, None, self.norm_first, mode, |h| {
            self.self_attn.forward(MhaInput::self_attn(h).mask_pad(pad_mask)).context
        });
        residual(x, &self.norm2, &self.dropout, None, self.norm_first, mode, |h| {
            feed_forward(h, &self.ffn_linear1, &self.ffn_linear2, &self.dropout, mode)
        })
    }
}

// ─── DecoderBlock ────────────────────────────────────────────────────────────
/// Non-autoregressive decoder block. Without a causal mask every
/// position attends to every real target position.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    /// Positional attention: queries and keys carry the position
    /// encoding, values are the self-attention output
    pub pos_attn:    Option<MultiHeadAttention<B>>,
    pub cross_attn:  MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm_self:   LayerNorm<B>,
    pub norm_pos:    Option<LayerNorm<B>>,
    pub norm_cross:  LayerNorm<B>,
    pub norm_ff:     LayerNorm<B>,
    /// Highway gates, one per sublayer; all None for plain residuals
    pub gate_self:   Option<Linear<B>>,
    pub gate_pos:    Option<Linear<B>>,
    pub gate_cross:  Option<Linear<B>>,
    pub gate_ff:     Option<Linear<B>>,
    pub dropout:     Dropout,
    pub norm_first:  bool,
}

impl<B: Backend> DecoderBlock<B> {
    /// `causal`: [batch, tgt_len, tgt_len], true where query p may not
    /// read key q. Applied to self- and positional attention.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        tgt_pad:   Tensor<B, 2, Bool>,
        causal:    Option<&Tensor<B, 3, Bool>>,
        memory:    Tensor<B, 3>,
        src_pad:   Tensor<B, 2, Bool>,
        positions: Tensor<B, 3>,
        mode:      ForwardMode,
    ) -> Tensor<B, 3> {
        let x = residual(x, &self.norm_self, &self.dropout, self.gate_self.as_ref(), self.norm_first, mode, |h| {
            let input = MhaInput::self_attn(h).mask_pad(tgt_pad.clone());
            self.self_attn.forward(target_attention(input, causal)).context
        });

        let x = match (&self.pos_attn, &self.norm_pos) {
            (Some(attn), Some(norm)) => self.positional(x, attn, norm, tgt_pad, causal, positions, mode),
            _ => x,
        };

        let x = residual(x, &self.norm_cross, &self.dropout, self.gate_cross.as_ref(), self.norm_first, mode, |h| {
            self.cross_attn
                .forward(MhaInput::new(h, memory.clone(), memory).mask_pad(src_pad))
                .context
        });

        residual(x, &self.norm_ff, &self.dropout, self.gate_ff.as_ref(), self.norm_first, mode, |h| {
            feed_forward(h, &self.ffn_linear1, &self.ffn_linear2, &self.dropout, mode)
        })
    }

    /// Queries and keys carry the position encoding, values are `x`.
    #[allow(clippy::too_many_arguments)]
    fn positional(
        &self,
        x:         Tensor<B, 3>,
        attn:      &MultiHeadAttention<B>,
        norm:      &LayerNorm<B>,
        tgt_pad:   Tensor<B, 2, Bool>,
        causal:    Option<&Tensor<B, 3, Bool>>,
        positions: Tensor<B, 3>,
        mode:      ForwardMode,
    ) -> Tensor<B, 3> {
        let query = x.clone() + positions;
        let query = if self.norm_first { norm.forward(query) } else { query };
        let input = MhaInput::new(query.clone(), query, x.clone()).mask_pad(tgt_pad);
        let out   = attn.forward(target_attention(input, causal)).context;
        let out   = connect(x, mode.dropout(&self.dropout, out), self.gate_pos.as_ref());
        if self.norm_first {
            out
        } else {
            norm.forward(out)
        }
    }
}

// ─── NatTransformer ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct NatTransformer<B: Backend> {
    /// The single token table, shape [vocab_size, d_model]
    embedding:    Embedding<B>,
    encoder:      Vec<EncoderBlock<B>>,
    decoder:      Vec<DecoderBlock<B>>,
    /// Final norms, used only in pre-norm stacks
    encoder_norm: LayerNorm<B>,
    decoder_norm: LayerNorm<B>,
    length_head:  Linear<B>,
    dropout:      Dropout,
    d_model:      usize,
    norm_first:   bool,
}

impl<B: Backend> NatTransformer<B> {
    pub fn vocab_size(&self) -> usize {
        self.embedding.weight.val().dims()[0]
    }

    pub fn max_length(&self) -> usize {
        self.length_head.weight.val().dims()[1] - 1
    }

    /// Table read by encoder and decoder input lookups.
    pub fn input_embedding_weight(&self) -> &Param<Tensor<B, 2>> {
        &self.embedding.weight
    }

    /// Table read by the output projection. Same object as the input table.
    pub fn output_projection_weight(&self) -> &Param<Tensor<B, 2>> {
        &self.embedding.weight
    }

    fn positions(&self, batch: usize, len: usize, device: &B::Device) -> Tensor<B, 3> {
        sinusoidal_encoding::<B>(len, self.d_model, device)
            .unsqueeze::<3>()
            .expand([batch, len, self.d_model])
    }

    fn embed(&self, ids: Tensor<B, 2, Int>, mode: ForwardMode) -> Tensor<B, 3> {
        let [batch, len] = ids.dims();
        let device = ids.device();
        let x = self.embedding.forward(ids) * (self.d_model as f64).sqrt();
        mode.dropout(&self.dropout, x + self.positions(batch, len, &device))
    }

    /// ids, pad_mask: [batch, src_len] → memory: [batch, src_len, d_model]
    pub fn encode(
        &self,
        src_ids: Tensor<B, 2, Int>,
        src_pad: Tensor<B, 2, Bool>,
        mode:    ForwardMode,
    ) -> Tensor<B, 3> {
        let mut x = self.embed(src_ids, mode);
        for block in &self.encoder {
            x = block.forward(x, src_pad.clone(), mode);
        }
        if self.norm_first {
            self.encoder_norm.forward(x)
        } else {
            x
        }
    }

    /// One parallel decoder pass → logits: [batch, tgt_len, vocab_size]
    pub fn decode(
        &self,
        tgt_ids: Tensor<B, 2, Int>,
        tgt_pad: Tensor<B, 2, Bool>,
        memory:  Tensor<B, 3>,
        src_pad: Tensor<B, 2, Bool>,
        mode:    ForwardMode,
    ) -> Tensor<B, 3> {
        self.decode_masked(tgt_ids, tgt_pad, None, memory, src_pad, mode)
    }

    /// Decoder pass over shifted targets with a causal mask: the logits
    /// at position p depend only on `tgt_ids[.., ..=p]`.
    pub fn decode_teacher_forced(
        &self,
        tgt_ids: Tensor<B, 2, Int>,
        tgt_pad: Tensor<B, 2, Bool>,
        memory:  Tensor<B, 3>,
        src_pad: Tensor<B, 2, Bool>,
        mode:    ForwardMode,
    ) -> Tensor<B, 3> {
        let [batch, len] = tgt_ids.dims();
        let causal = generate_autoregressive_mask::<B>(batch, len, &tgt_ids.device());
        self.decode_masked(tgt_ids, tgt_pad, Some(&causal), memory, src_pad, mode)
    }

    fn decode_masked(
        &self,
        tgt_ids: Tensor<B, 2, Int>,
        tgt_pad: Tensor<B, 2, Bool>,
        causal:  Option<&Tensor<B, 3, Bool>>,
        memory:  Tensor<B, 3>,
        src_pad: Tensor<B, 2, Bool>,
        mode:    ForwardMode,
    ) -> Tensor<B, 3> {
        let [batch, len] = tgt_ids.dims();
        let positions = self.positions(batch, len, &tgt_ids.device());

        let mut x = self.embed(tgt_ids, mode);
        for block in &self.decoder {
            x = block.forward(x, tgt_pad.clone(), causal, memory.clone(), src_pad.clone(), positions.clone(), mode);
        }
        let h = if self.norm_first { self.decoder_norm.forward(x) } else { x };
        self.project(h)
    }

    /// h · Eᵀ on the shared table.
    fn project(&self, h: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, len, d_model] = h.dims();
        let weight = self.embedding.weight.val();
        let vocab  = weight.dims()[0];
        h.reshape([batch * len, d_model])
            .matmul(weight.transpose())
            .reshape([batch, len, vocab])
    }

    /// Mean of the real source positions → scores over target lengths
    /// `0..=max_length`, shape [batch, max_length + 1].
    pub fn length_logits(&self, memory: Tensor<B, 3>, src_pad: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
        let [batch, len, d_model] = memory.dims();
        let real   = src_pad.bool_not().float().reshape([batch, len, 1]);
        let counts = real.clone().sum_dim(1).reshape([batch, 1]).clamp_min(1.0);
        let summed = (memory * real.expand([batch, len, d_model]))
            .sum_dim(1)
            .reshape([batch, d_model]);
        self.length_head.forward(summed / counts.expand([batch, d_model]))
    }
}
