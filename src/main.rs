use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;

use rusty_rates::config::NetworkConfig;
use rusty_rates::core::network::RateNetwork;
use rusty_rates::error::RateNetError;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Npy,
    Json,
}

#[derive(Parser, Debug)]
struct Args {
    /// The network configuration file (YAML or JSON)
    config: PathBuf,
    /// The name of the output file, without extension
    #[arg(long, default_value = "rates")]
    name: String,
    /// The output directory
    #[arg(long, default_value = "data/simul")]
    output_dir: PathBuf,
    /// The seed of the feedforward noise, overriding the configuration
    #[arg(long)]
    noise_seed: Option<u64>,
    /// The output format
    #[arg(long, value_enum, default_value = "npy")]
    format: Format,
}

fn main() -> Result<(), RateNetError> {
    env_logger::init();
    let args = Args::parse();
    log::info!("{:?}", args);

    let mut config = NetworkConfig::load_from(&args.config)?;
    if args.noise_seed.is_some() {
        config.noise_seed = args.noise_seed;
    }

    let mut network = RateNetwork::from_config(&config)?;
    log::info!("Network construction: done!");

    let trajectory = network.run();

    fs::create_dir_all(&args.output_dir).map_err(|e| RateNetError::IOError(e.to_string()))?;
    let path = match args.format {
        Format::Npy => {
            let path = args.output_dir.join(format!("{}.npy", args.name));
            trajectory.save_npy(&path, config.precision)?;
            path
        }
        Format::Json => {
            let path = args.output_dir.join(format!("{}.json", args.name));
            trajectory.save_to(&path)?;
            path
        }
    };
    log::info!("Rates saving: done! Saved to {}", path.display());
    Ok(())
}
