use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tomo_align::analysis::{error_curve, JitterComparison};
use tomo_align::augmentation::{AugmentationRecord, JitterAugmentation, NoiseAugmentation, StackAugmentation};
use tomo_align::config::{load_config_or_default, Config, ConfigFormat};
use tomo_align::data::{linspace, load_stack, shepp_logan_3d, write_stack, ImageSequenceSink};
use tomo_align::logging::{init_logging, MetricsCollector, TracingObserver};
use tomo_align::pipeline::{AlignOptions, Aligner, AlignmentOutcome, PadMode, Projector};
use tomo_align::{FbpFilter, RadonProjector, ReconstructionStrategy};

#[derive(Parser)]
#[command(name = "tomo-align")]
#[command(about = "Jitter correction for tomographic projection stacks by iterative re-projection")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a jittered phantom, align it and report the errors
    Demo {
        /// Edge length of the cubic phantom
        #[arg(long)]
        size: Option<usize>,

        /// Number of projection angles over [0, pi]
        #[arg(long)]
        angles: Option<usize>,

        /// Jitter amplitude in pixels
        #[arg(long)]
        jitter: Option<f64>,

        /// Noise standard deviation as a fraction of the stack maximum
        #[arg(long)]
        noise: Option<f64>,

        /// Seed for the jitter and noise generators
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        align: AlignArgs,
    },

    /// Align an image sequence from disk
    Align {
        /// Directory holding the projection images
        #[arg(short, long)]
        input: PathBuf,

        /// First projection angle in radians
        #[arg(long, default_value_t = 0.0)]
        angle_start: f64,

        /// Last projection angle in radians
        #[arg(long, default_value_t = std::f64::consts::PI)]
        angle_end: f64,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        align: AlignArgs,
    },

    /// Write the Shepp-Logan phantom slices
    Phantom {
        #[arg(long, default_value_t = 64)]
        size: usize,

        #[arg(short, long, default_value = "phantom")]
        output: PathBuf,
    },

    /// Write the default configuration
    Config {
        #[arg(short, long, default_value = "tomo-align.toml")]
        output: PathBuf,

        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },
}

#[derive(Args)]
struct AlignArgs {
    /// Refinement iterations
    #[arg(long)]
    iterations: Option<usize>,

    /// Explicit zero padding in columns on each side
    #[arg(long, conflicts_with = "diagonal")]
    pad_x: Option<usize>,

    /// Explicit zero padding in rows on each side
    #[arg(long, conflicts_with = "diagonal")]
    pad_y: Option<usize>,

    /// Reconstruct on a grid as wide as the slice diagonal
    #[arg(long)]
    diagonal: bool,

    /// Reconstruction algorithm
    #[arg(short, long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// MLEM iterations per reconstruction
    #[arg(long)]
    mlem_iterations: Option<usize>,

    /// Registration precision as 1/N pixel
    #[arg(long)]
    upsample: Option<usize>,

    /// Save the stack and a reconstruction slice every iteration
    #[arg(long)]
    save: bool,

    /// Report every iteration
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Mlem,
    Fbp,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Toml,
    Json,
}

impl AlignArgs {
    fn apply(&self, options: &mut AlignOptions) {
        if let Some(iterations) = self.iterations {
            options.iterations = iterations;
        }
        if self.diagonal {
            options.padding = PadMode::Diagonal;
        } else if self.pad_x.is_some() || self.pad_y.is_some() {
            options.padding = PadMode::Explicit {
                x: self.pad_x.unwrap_or(0),
                y: self.pad_y.unwrap_or(0),
            };
        }
        match self.algorithm {
            Some(AlgorithmArg::Mlem) => {
                options.reconstruction = ReconstructionStrategy::Mlem {
                    iterations: self.mlem_iterations.unwrap_or(10),
                }
            }
            Some(AlgorithmArg::Fbp) => {
                options.reconstruction = ReconstructionStrategy::Fbp {
                    filter: FbpFilter::Ramp,
                }
            }
            None => {
                if let (Some(n), ReconstructionStrategy::Mlem { .. }) = (self.mlem_iterations, options.reconstruction) {
                    options.reconstruction = ReconstructionStrategy::Mlem { iterations: n };
                }
            }
        }
        if let Some(upsample) = self.upsample {
            options.upsample_factor = upsample;
        }
        options.save |= self.save;
        options.debug |= self.debug;
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config_or_default(cli.config.as_deref().and_then(Path::to_str));
    let _log_guard = init_logging(&config.logging.clone().with_verbosity(cli.verbose))
        .context("failed to initialize logging")?;

    match cli.command {
        Commands::Demo {
            size,
            angles,
            jitter,
            noise,
            seed,
            output,
            align,
        } => {
            let mut config = config;
            let sim = &mut config.simulation;
            sim.size = size.unwrap_or(sim.size);
            sim.angle_count = angles.unwrap_or(sim.angle_count);
            sim.jitter = jitter.unwrap_or(sim.jitter);
            sim.noise_ratio = noise.unwrap_or(sim.noise_ratio);
            sim.seed = seed.or(sim.seed);
            if let Some(output) = output {
                config.output.directory = output;
            }
            align.apply(&mut config.alignment);
            handle_demo(&config)?;
        }
        Commands::Align {
            input,
            angle_start,
            angle_end,
            output,
            align,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config.output.directory = output;
            }
            align.apply(&mut config.alignment);
            handle_align(&config, &input, angle_start, angle_end)?;
        }
        Commands::Phantom { size, output } => {
            let phantom = shepp_logan_3d(size);
            write_stack(&phantom, &output, "phantom")
                .with_context(|| format!("failed to write phantom to {}", output.display()))?;
            println!("Wrote {} phantom slices to {}", size, output.display());
        }
        Commands::Config { output, format } => {
            let format = match format {
                Some(FormatArg::Json) => ConfigFormat::Json,
                Some(FormatArg::Toml) => ConfigFormat::Toml,
                None => ConfigFormat::from_path(&output),
            };
            Config::default()
                .save_to_file(&output, format)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Default configuration written to {}", output.display());
        }
    }

    Ok(())
}

fn build_aligner(config: &Config, metrics: Arc<MetricsCollector>) -> anyhow::Result<Aligner> {
    let mut builder = Aligner::builder()
        .options(config.alignment.clone())
        .observer(Arc::new(TracingObserver))
        .metrics(metrics);
    if config.alignment.save {
        builder = builder.sink(Arc::new(ImageSequenceSink::new(config.output.directory.join("artifacts"))));
    }
    builder.build().context("invalid alignment options")
}

fn handle_demo(config: &Config) -> anyhow::Result<()> {
    let sim = &config.simulation;
    println!("Simulating {0}x{0}x{0} phantom at {1} angles...", sim.size, sim.angle_count);

    let phantom = shepp_logan_3d(sim.size);
    let angles = linspace(sim.angle_start, sim.angle_end, sim.angle_count);
    let stack = RadonProjector.project(&phantom, &angles, false)?;

    let mut jitter = JitterAugmentation::symmetric(sim.jitter);
    let mut noise = NoiseAugmentation::new(sim.noise_ratio);
    if let Some(seed) = sim.seed {
        jitter = jitter.with_seed(seed);
        noise = noise.with_seed(seed.wrapping_add(1));
    }
    let jittered = jitter.apply(stack).context("jitter injection failed")?;
    let true_jitter = jittered.jitter.clone();
    let noisy = noise.apply(jittered.stack).context("noise injection failed")?;
    let applied = [jittered.augmentations_applied, noisy.augmentations_applied].concat();
    let simulation = serde_json::json!({
        "applied": applied,
        "augmentations": [AugmentationRecord::of(&jitter), AugmentationRecord::of(&noise)],
    });

    let metrics = MetricsCollector::shared(config.logging.collect_metrics);
    let aligner = build_aligner(config, metrics.clone())?;

    println!("Aligning {} projections...", angles.len());
    let outcome = aligner.align_owned(noisy.stack, &angles).context("alignment failed")?;
    print_outcome(&outcome);

    let comparison = match &true_jitter {
        Some(jitter) => Some(JitterComparison::from_outcome(&outcome, jitter)?),
        None => None,
    };
    if let Some(comparison) = &comparison {
        println!(
            "Jitter residual: rms {:.3}px, relative rms {:.3}px, max {:.3}px",
            comparison.rms, comparison.relative_rms, comparison.max
        );
    }

    write_results(config, &outcome, comparison.as_ref(), Some(&simulation), &metrics)
}

fn handle_align(config: &Config, input: &Path, angle_start: f64, angle_end: f64) -> anyhow::Result<()> {
    println!("Loading image sequence from {}...", input.display());
    let stack = load_stack(input).with_context(|| format!("failed to load {}", input.display()))?;
    let (projections, height, width) = stack.dim();
    println!("Stack: {} projections of {}x{}", projections, width, height);

    let angles = linspace(angle_start, angle_end, projections);
    let metrics = MetricsCollector::shared(config.logging.collect_metrics);
    let aligner = build_aligner(config, metrics.clone())?;

    let outcome = aligner.align_owned(stack, &angles).context("alignment failed")?;
    print_outcome(&outcome);
    write_results(config, &outcome, None, None, &metrics)
}

fn print_outcome(outcome: &AlignmentOutcome) {
    println!("{:?}", outcome.stack.shape());
    println!("Final error: {:.4}", outcome.final_error());
    println!("History error: {:.4}", outcome.history_error());
    for (n, norm) in error_curve(outcome).iter().enumerate() {
        println!("  iteration {:>3}: {:.4}", n, norm);
    }
    if !outcome.failures.is_empty() {
        println!("{} projection failures isolated", outcome.failures.len());
    }
}

fn write_results(
    config: &Config,
    outcome: &AlignmentOutcome,
    comparison: Option<&JitterComparison>,
    simulation: Option<&serde_json::Value>,
    metrics: &MetricsCollector,
) -> anyhow::Result<()> {
    let dir = &config.output.directory;
    write_stack(&outcome.stack, dir, &config.output.prefix)
        .with_context(|| format!("failed to write aligned stack to {}", dir.display()))?;

    if config.output.write_report {
        let report = serde_json::json!({
            "correlation_id": outcome.correlation_id,
            "shape": outcome.stack.shape(),
            "scale": outcome.scale.value(),
            "final_error": outcome.final_error(),
            "history_error": outcome.history_error(),
            "error_curve": error_curve(outcome),
            "errors": outcome.errors,
            "failures": outcome.failures,
            "jitter": comparison,
            "simulation": simulation,
            "stages": metrics.summary(),
            "elapsed_ms": outcome.elapsed.as_secs_f64() * 1000.0,
            "options": config.alignment,
        });
        let path = dir.join("report.json");
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("Report saved to {}", path.display());
    }

    println!("Aligned stack written to {}", dir.display());
    Ok(())
}
