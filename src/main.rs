use std::{error::Error, path::PathBuf};

use config::Config;
use dataset::DatasetAssembler;
use log::info;
use model::{clamp_targets, LinearRegressor};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use rand::{rngs::StdRng, SeedableRng};
use sequence::generators::{chromatic_sweep, random_single_notes};

pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod ground_truth;
pub mod model;
pub mod render;
pub mod analysis {
    pub mod ported {
        pub mod librosa;
        pub mod numpy;
    }
    pub mod cqt;
    pub mod representation;
}
pub mod preprocessing {
    pub mod load_audio;
}
pub mod sequence {
    pub mod generators;
    pub mod midi;
    pub mod note;
    pub mod note_sequence;
}
#[cfg(test)]
mod test_util;

const USAGE: &str = "usage:
  datagen generate [--config <toml>] [--random|--sweep] [--seed <n>] [--beats <n>] <base path>
  datagen train --model <path> [--config <toml>] <x.npy> <y.npy> [<prediction.npy>]
  datagen predict --model <path> <x.npy> <prediction.npy>";

#[derive(Debug, Default)]
struct Args {
    command: String,
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    sweep: bool,
    seed: Option<u64>,
    beats: Option<f64>,
    positional: Vec<PathBuf>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, Box<dyn Error>> {
    let mut args = Args {
        command: raw.next().ok_or(USAGE)?,
        ..Args::default()
    };

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => args.config = Some(raw.next().ok_or(USAGE)?.into()),
            "--model" => args.model = Some(raw.next().ok_or(USAGE)?.into()),
            "--random" => args.sweep = false,
            "--sweep" => args.sweep = true,
            "--seed" => args.seed = Some(raw.next().ok_or(USAGE)?.parse()?),
            "--beats" => args.beats = Some(raw.next().ok_or(USAGE)?.parse()?),
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}\n{USAGE}").into()),
            _ => args.positional.push(PathBuf::from(&arg)),
        }
    }

    Ok(args)
}

fn generate(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    let base = args.positional.first().ok_or(USAGE)?;

    let sequence = if args.sweep {
        chromatic_sweep()?
    } else {
        let mut rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        random_single_notes(&mut rng, args.beats.unwrap_or(60.0))?
    };

    let unit = DatasetAssembler::from_config(config).assemble(&sequence, base)?;
    info!("Generated dataset unit of shape {:?}", unit.ground_truth.shape());
    Ok(())
}

fn train(args: &Args, config: &Config) -> Result<(), Box<dyn Error>> {
    let model_path = args.model.as_ref().ok_or(USAGE)?;
    let (x_path, y_path) = match args.positional.as_slice() {
        [x, y, ..] => (x, y),
        _ => return Err(USAGE.into()),
    };

    let x: Array2<f32> = read_npy(x_path)?;
    let y = clamp_targets(&read_npy::<_, Array2<f32>>(y_path)?);

    let mut model = LinearRegressor::load_or_init(model_path, x.nrows(), &mut StdRng::from_entropy())?;
    let report = model.train(&x, &y, &config.train)?;
    info!("Finished after {} iterations with loss {}", report.iterations, report.loss);
    model.save(model_path)?;

    if let Some(prediction_path) = args.positional.get(2) {
        write_npy(prediction_path, &model.predict(&x)?)?;
    }
    Ok(())
}

fn predict(args: &Args) -> Result<(), Box<dyn Error>> {
    let model_path = args.model.as_ref().ok_or(USAGE)?;
    let (x_path, prediction_path) = match args.positional.as_slice() {
        [x, prediction, ..] => (x, prediction),
        _ => return Err(USAGE.into()),
    };

    let x: Array2<f32> = read_npy(x_path)?;
    let model = LinearRegressor::load(model_path)?;
    write_npy(prediction_path, &model.predict(&x)?)?;
    info!("Prediction written to {}", prediction_path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => Config::read(path)?,
        None => Config::default(),
    };

    match args.command.as_str() {
        "generate" => generate(&args, &config),
        "train" => train(&args, &config),
        "predict" => predict(&args),
        _ => Err(USAGE.into()),
    }
}
