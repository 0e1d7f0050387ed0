// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
//   train         — tokenizer + model training from a corpus
//   translate     — iterative non-autoregressive decoding
//   check-config  — validate a TOML run configuration

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CheckConfigArgs, Commands, TrainArgs, TranslateArgs};

use crate::config::NatConfig;

#[derive(Parser, Debug)]
#[command(
    name = "nat-translate",
    version,
    about = "Multilingual non-autoregressive translation: Refine-NAT and CMLM mask-predict."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. Routes only, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)       => run_train(args),
            Commands::Translate(args)   => run_translate(args),
            Commands::CheckConfig(args) => run_check_config(args),
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<NatConfig> {
    Ok(match path {
        Some(path) => NatConfig::from_file(path)?,
        None => {
            tracing::info!("No --config given, using built-in defaults");
            let config = NatConfig::default();
            config.validate()?;
            config
        }
    })
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = load_config(args.config.as_deref())?;
    tracing::info!("Training {} → {} on '{}'", args.source_lang, args.target_lang, args.corpus.display());

    let summary = TrainUseCase::new(config, args.into()).execute()?;

    println!(
        "Training complete after {} epochs / {} steps: val_loss={:.4}, token_acc={:.1}%",
        summary.epochs,
        summary.steps,
        summary.val_loss,
        summary.val_token_accuracy * 100.0,
    );
    Ok(())
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    use crate::application::translate_use_case::{TranslateRequest, TranslateUseCase};

    let use_case = TranslateUseCase::load(&args.artifacts_dir)?;
    let result = use_case.translate(&TranslateRequest {
        text:          args.text,
        source_lang:   args.source_lang,
        target_lang:   args.target_lang,
        decoder:       args.decoder.into(),
        target_length: args.target_length,
    })?;

    println!("{}", result.text);
    if args.verbose {
        println!("ids:        {:?}", result.ids);
        println!(
            "length:     {}{}",
            result.target_length,
            if result.length_predicted { " (predicted)" } else { "" }
        );
        println!("outcome:    {:?} after {} iterations", result.outcome, result.iterations);
        if !result.masked_trace.is_empty() {
            println!("masked:     {:?}", result.masked_trace);
        }
    }
    Ok(())
}

fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = NatConfig::from_file(&args.config)?;
    println!("{}", config.to_toml_string()?);
    Ok(())
}
