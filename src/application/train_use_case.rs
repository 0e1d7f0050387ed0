// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load sentence pairs            (Layer 4 - data)
//   Step 2: Corpus statistics              (Layer 4 - data)
//   Step 3: Train / validation split       (Layer 4 - data)
//   Step 4: Build or load the tokenizer    (Layer 6 - infra)
//   Step 5: Tag and tokenise every pair    (Layer 4 - data)
//   Step 6: Build datasets                 (Layer 4 - data)
//   Step 7: Save run + model config        (Layer 6 - infra)
//   Step 8: Run training loop              (Layer 5 - ml)
//
// Artifact directory layout:
//
//   <artifacts>/tokenizer.json
//   <artifacts>/steps.csv, metrics.csv
//   <artifacts>/checkpoints/...

use anyhow::Result;
use std::path::PathBuf;

use crate::config::NatConfig;
use crate::data::{
    corpus::{CorpusStats, JsonlCorpus},
    dataset::{TranslationDataset, TranslationSample},
    splitter::split_train_val,
    tag_adapter::TagAdapter,
};
use crate::domain::sentence_pair::SentencePair;
use crate::domain::traits::CorpusSource;
use crate::error::NatError;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    tokenizer_store::TokenizerStore,
};
use crate::ml::model::NatTransformerConfig;
use crate::ml::trainer::{run_training, RunArtifacts, TrainingSummary};

/// Everything a training run needs besides the run config.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub corpus:        PathBuf,
    pub source_lang:   String,
    pub target_lang:   String,
    pub artifacts_dir: PathBuf,
    /// Also train the reverse direction from the same pairs
    pub bidirectional: bool,
}

pub struct TrainUseCase {
    config:  NatConfig,
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(config: NatConfig, request: TrainRequest) -> Self {
        Self { config, request }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;
        let req = &self.request;

        for language in [&req.source_lang, &req.target_lang] {
            if !cfg.languages.contains_key(language) {
                return Err(NatError::UnknownLanguage { language: language.clone() }.into());
            }
        }

        // ── Step 1: Load sentence pairs ──────────────────────────────────────
        let corpus = JsonlCorpus::new(&req.corpus, &req.source_lang, &req.target_lang);
        let mut pairs = corpus.load_pairs()?;
        if pairs.is_empty() {
            anyhow::bail!("No usable sentence pairs in '{}'", req.corpus.display());
        }
        if req.bidirectional {
            let reversed: Vec<SentencePair> = pairs.iter().map(reverse).collect();
            pairs.extend(reversed);
        }

        // ── Step 2: Corpus statistics ────────────────────────────────────────
        let stats = CorpusStats::compute(&pairs);
        tracing::info!(
            "Corpus: {} pairs, src max/avg {}/{:.1} words, tgt max/avg {}/{:.1} words",
            stats.pairs,
            stats.max_length_src,
            stats.avg_length_src,
            stats.max_length_tgt,
            stats.avg_length_tgt,
        );

        // ── Step 3: Train / validation split ─────────────────────────────────
        let (train_pairs, val_pairs) =
            split_train_val(pairs, cfg.training.train_fraction, cfg.training.seed);
        tracing::info!("Split: {} train, {} validation", train_pairs.len(), val_pairs.len());

        // ── Step 4: Build / load tokenizer ───────────────────────────────────
        // Only training text feeds the vocabulary.
        let texts: Vec<String> = train_pairs
            .iter()
            .flat_map(|p| [p.source.clone(), p.target.clone()])
            .collect();
        let tokenizer = TokenizerStore::new(&req.artifacts_dir).load_or_build(
            &texts,
            cfg.training.vocab_size,
            &cfg.special_tokens,
            &cfg.languages,
        )?;
        let vocab_size = tokenizer.get_vocab_size(true);

        // ── Step 5: Tag and tokenise ─────────────────────────────────────────
        let adapter  = TagAdapter::new(tokenizer, cfg)?.with_length_marker(cfg.source_length_token);
        let specials = adapter.vocabulary().specials();
        let train_samples = build_samples(&adapter, &train_pairs)?;
        let val_samples   = build_samples(&adapter, &val_pairs)?;

        // ── Step 6: Build Burn datasets ──────────────────────────────────────
        let train_dataset = TranslationDataset::new(train_samples);
        let val_dataset   = TranslationDataset::new(val_samples);

        // ── Step 7: Save config for translation ──────────────────────────────
        let model_cfg   = NatTransformerConfig::from_run_config(cfg, vocab_size);
        let checkpoints = CheckpointManager::new(req.artifacts_dir.join("checkpoints"))?;
        checkpoints.save_run(cfg, &model_cfg)?;
        let metrics = MetricsLogger::new(&req.artifacts_dir)?;

        // ── Step 8: Run training loop (Layer 5) ──────────────────────────────
        run_training(
            cfg,
            &model_cfg,
            specials,
            train_dataset,
            val_dataset,
            RunArtifacts { checkpoints: &checkpoints, metrics: &metrics },
        )
    }
}

/// Tag and tokenise pairs; the source side carries the length marker if enabled.
pub fn build_samples(adapter: &TagAdapter, pairs: &[SentencePair]) -> Result<Vec<TranslationSample>> {
    pairs
        .iter()
        .map(|pair| {
            Ok(TranslationSample::new(
                adapter.encode_source(&pair.source, &pair.source_lang)?,
                adapter.encode(&pair.target, &pair.target_lang)?,
            ))
        })
        .collect()
}

fn reverse(pair: &SentencePair) -> SentencePair {
    SentencePair::new(
        pair.target_lang.clone(),
        pair.source_lang.clone(),
        pair.target.clone(),
        pair.source.clone(),
    )
}
