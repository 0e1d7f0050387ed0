// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `translate` and
// `check-config` and all their flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, PathBuf, enums)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::TrainRequest;
use crate::application::translate_use_case::DecoderKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a non-autoregressive model on a JSON-lines parallel corpus
    Train(TrainArgs),

    /// Translate one sentence with a trained run
    Translate(TranslateArgs),

    /// Parse and validate a run configuration, then print it
    CheckConfig(CheckConfigArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Run configuration (TOML); built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON-lines corpus: {"translation": {"en": "...", "de": "..."}}
    #[arg(long)]
    pub corpus: PathBuf,

    /// Source language code, as configured under [languages]
    #[arg(long)]
    pub source_lang: String,

    /// Target language code, as configured under [languages]
    #[arg(long)]
    pub target_lang: String,

    /// Directory for the tokenizer, checkpoints and metrics
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Also train target → source from the same pairs
    #[arg(long)]
    pub bidirectional: bool,
}

/// Convert CLI TrainArgs into the application-layer request.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        TrainRequest {
            corpus:        a.corpus,
            source_lang:   a.source_lang,
            target_lang:   a.target_lang,
            artifacts_dir: a.artifacts_dir,
            bidirectional: a.bidirectional,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderArg {
    /// Refine-NAT: re-predict every position until nothing changes
    Refine,
    /// CMLM mask-predict: re-mask the least confident positions
    MaskPredict,
}

impl From<DecoderArg> for DecoderKind {
    fn from(a: DecoderArg) -> Self {
        match a {
            DecoderArg::Refine      => DecoderKind::Refine,
            DecoderArg::MaskPredict => DecoderKind::MaskPredict,
        }
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Sentence to translate
    #[arg(long)]
    pub text: String,

    #[arg(long)]
    pub source_lang: String,

    #[arg(long)]
    pub target_lang: String,

    #[arg(long, value_enum, default_value_t = DecoderArg::MaskPredict)]
    pub decoder: DecoderArg,

    /// Decoder length in tokens (tag and EOS included);
    /// the model's length head suggests one when omitted
    #[arg(long)]
    pub target_length: Option<usize>,

    /// Directory written by `train`
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Print token ids, outcome and iteration count too
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Run configuration (TOML)
    #[arg(long)]
    pub config: PathBuf,
}
