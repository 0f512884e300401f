//! Deep leakage from gradients on CIFAR.
//!
//! Builds the victim batch, leaks its gradient through a freshly seeded
//! LeNet, reconstructs images and labels from that gradient alone, and
//! writes the reconstructions, a history grid and the objective log.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use gradient_leakage::config::{load_config, AttackConfig};
use gradient_leakage::data::{read_netpbm, write_ppm, CifarDataset, CifarVariant, Dataset, VictimBatch};
use gradient_leakage::{run_attack, LeakageError, Result};

/// Snapshots per row of the history grid.
const GRID_COLUMNS: usize = 10;

#[derive(Parser)]
#[command(name = "dlg_attack")]
#[command(about = "Reconstruct a training batch from its leaked gradient")]
#[command(version)]
struct Cli {
    /// Dataset index of the victim sample
    #[arg(long)]
    index: Option<usize>,

    /// Netpbm image replacing the victim sample's pixels
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Number of samples in the leaked batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// CIFAR binary file
    #[arg(long, value_name = "FILE", default_value = "./data/cifar-100-binary/train.bin")]
    data: PathBuf,

    /// Read the data file as CIFAR-10 instead of CIFAR-100
    #[arg(long)]
    cifar10: bool,

    /// JSON attack configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Outer optimizer iterations
    #[arg(long)]
    iterations: Option<usize>,

    /// Seed for the classifier weights and the initial guess
    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving the reconstructions and the history grid
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

impl Cli {
    fn attack_config(&self) -> Result<AttackConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AttackConfig::default(),
        };
        if let Some(index) = self.index {
            config.index = index;
        }
        if let Some(image) = &self.image {
            config.image = Some(image.clone());
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.attack_config()?;
    let variant = if cli.cifar10 {
        CifarVariant::Cifar10
    } else {
        CifarVariant::Cifar100
    };
    let dataset = CifarDataset::open(&cli.data, variant)?;

    let replacement = match &config.image {
        Some(path) => Some(read_netpbm(path, dataset.image_shape().channels)?),
        None => None,
    };
    let victim = VictimBatch::assemble(&dataset, config.index, config.batch_size, replacement)?;

    let (state, history) = run_attack(&config, &victim)?;

    let log_path = history.write_objective_log(&cli.output)?;
    info!("Wrote objective log to {}", log_path.display());

    fs::create_dir_all(&cli.output).map_err(|e| LeakageError::io(&cli.output, e))?;
    if let Some(grid) = history.render_grid(GRID_COLUMNS) {
        write_ppm(cli.output.join("history_grid.ppm"), &grid)?;
    }
    for n in 0..state.batch_size() {
        write_ppm(cli.output.join(format!("reconstruction_{}.ppm", n)), &state.image(n))?;
    }
    info!("Wrote outputs to {}", cli.output.display());

    let recovered = state.predicted_labels();
    for (n, (truth, guess)) in victim.labels().iter().zip(&recovered).enumerate() {
        println!("sample {}: true label {} | recovered label {}", n, truth, guess);
    }
    if let Some(last) = history.last() {
        println!("Final matching objective: {:.6}", last.objective);
    }
    Ok(())
}
