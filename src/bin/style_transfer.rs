use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rust_style_transfer::{
    optimization::minimizer::{LineSearcher, MinimizeOptions, Tolerances},
    transfer::{
        codec,
        driver::{FileSink, TransferDriver},
        extractor::{ConvExtractorConfig, ConvFeatureExtractor},
        options::{
            DEFAULT_CONTENT_LAYER, DEFAULT_ROUNDS, DEFAULT_STYLE_LAYERS, DEFAULT_TV_EXPONENT,
            GeneratedInit, LossOptions, LossWeights, StyleReduction, TransferOptions,
        },
    },
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "style-transfer", about = "Neural style transfer with L-BFGS")]
struct Args {
    /// Image whose structure is kept
    #[arg(long)]
    content: PathBuf,
    /// Image whose texture and colours are adopted
    #[arg(long)]
    style: PathBuf,
    /// Output image, overwritten after every round
    #[arg(long, default_value = "output.png")]
    output: PathBuf,
    #[arg(long, default_value_t = 500)]
    content_height: u32,
    #[arg(long, default_value_t = 500)]
    content_width: u32,
    #[arg(long, default_value_t = 500)]
    style_height: u32,
    #[arg(long, default_value_t = 500)]
    style_width: u32,
    #[arg(long, default_value_t = 100.0)]
    content_weight: f64,
    #[arg(long, default_value_t = 1.0)]
    style_weight: f64,
    #[arg(long, default_value_t = 1.0)]
    tv_weight: f64,
    #[arg(long, default_value_t = DEFAULT_TV_EXPONENT)]
    tv_exponent: f64,
    #[arg(long, default_value = DEFAULT_CONTENT_LAYER)]
    content_layer: String,
    /// Comma-separated style layer names
    #[arg(long, value_delimiter = ',')]
    style_layers: Option<Vec<String>>,
    /// "average" or "sum"
    #[arg(long, default_value = "average")]
    style_reduction: StyleReduction,
    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    rounds: usize,
    /// L-BFGS iteration cap per round
    #[arg(long, default_value_t = 20)]
    iterations: usize,
    /// "MoreThuente" or "HagerZhang"
    #[arg(long, default_value = "MoreThuente")]
    line_search: String,
    #[arg(long)]
    lbfgs_mem: Option<usize>,
    /// "content", "style" or "noise"
    #[arg(long, default_value = "content")]
    init: String,
    #[arg(long, default_value_t = 0)]
    noise_seed: u64,
    #[arg(long, default_value_t = 10.0)]
    noise_amplitude: f64,
    #[arg(long, default_value_t = 1618)]
    extractor_seed: u64,
    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn build_options(args: &Args) -> Result<TransferOptions> {
    let weights = LossWeights::new(args.content_weight, args.style_weight, args.tv_weight)?;
    let style_layers = args
        .style_layers
        .clone()
        .unwrap_or_else(|| DEFAULT_STYLE_LAYERS.iter().map(|s| s.to_string()).collect());
    let loss = LossOptions::new(
        args.content_layer.clone(),
        style_layers,
        weights,
        args.style_reduction,
        args.tv_exponent,
    )?;
    let tols = Tolerances::new(None, None, Some(args.iterations))?;
    let line_searcher: LineSearcher = args.line_search.parse()?;
    let minimize = MinimizeOptions::new(tols, line_searcher, args.verbose, args.lbfgs_mem)?;
    let init = match args.init.to_lowercase().as_str() {
        "content" => GeneratedInit::Content,
        "style" => GeneratedInit::Style,
        "noise" => GeneratedInit::Noise { seed: args.noise_seed, amplitude: args.noise_amplitude },
        other => anyhow::bail!("unknown init mode '{other}'"),
    };
    Ok(TransferOptions::new(loss, args.rounds, minimize, init)?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = build_options(&args)?;
    let extractor = ConvFeatureExtractor::new(&ConvExtractorConfig {
        seed: args.extractor_seed,
        ..ConvExtractorConfig::default()
    })?;

    let content = codec::load_normalized(&args.content, args.content_height, args.content_width)
        .with_context(|| format!("loading content image {}", args.content.display()))?;
    let style = codec::load_normalized(&args.style, args.style_height, args.style_width)
        .with_context(|| format!("loading style image {}", args.style.display()))?;

    let driver = TransferDriver::new(&extractor, options, content, style)?;
    let mut sink = FileSink::new(&args.output);
    let outcome = driver.run(&mut sink)?;

    info!(
        initial = outcome.initial.total(),
        final_loss = outcome.final_loss(),
        output = %args.output.display(),
        "style transfer finished"
    );
    Ok(())
}
