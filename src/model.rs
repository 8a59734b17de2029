use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use ndarray_npy::{read_npy, write_npy};
use rand::Rng;

use crate::config::TrainConfig;
use crate::error::{Error, Result};

/// A single linear layer mapping one spectral frame to one ground truth frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressor {
    /// `[out][in]`
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

/// What a training run ended with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub iterations: usize,
    pub loss: f32,
}

/// Mean smooth L1 (Huber, beta 1) loss.
pub fn smooth_l1_loss(prediction: &ArrayView2<'_, f32>, target: &ArrayView2<'_, f32>) -> f32 {
    let count = prediction.len().max(1) as f32;
    let total: f32 = prediction
        .iter()
        .zip(target.iter())
        .map(|(p, t)| {
            let d = (p - t).abs();
            if d < 1.0 {
                0.5 * d * d
            } else {
                d - 0.5
            }
        })
        .sum();
    total / count
}

/// Targets clamped to [0, 1], leaving the input as it is.
pub fn clamp_targets(targets: &Array2<f32>) -> Array2<f32> {
    targets.mapv(|v| v.clamp(0.0, 1.0))
}

fn weight_path(path: &Path) -> PathBuf {
    path.with_extension("weight.npy")
}

fn bias_path(path: &Path) -> PathBuf {
    path.with_extension("bias.npy")
}

fn check_shape(expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(Error::ShapeMismatch { expected, actual });
    }
    Ok(())
}

impl LinearRegressor {
    pub fn zeros(n_features: usize) -> Self {
        Self {
            weight: Array2::zeros((n_features, n_features)),
            bias: Array1::zeros(n_features),
        }
    }

    /// Uniform initialisation in `[-1/sqrt(n), 1/sqrt(n))`.
    pub fn random<R: Rng>(n_features: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (n_features.max(1) as f32).sqrt();
        Self {
            weight: Array2::from_shape_fn((n_features, n_features), |_| rng.gen_range(-bound..bound)),
            bias: Array1::from_shape_fn(n_features, |_| rng.gen_range(-bound..bound)),
        }
    }

    pub fn n_features(&self) -> usize {
        self.bias.len()
    }

    /// `[batch][in]` to `[batch][out]`.
    pub fn forward(&self, batch: &ArrayView2<'_, f32>) -> Array2<f32> {
        batch.dot(&self.weight.t()) + &self.bias
    }

    /// One gradient step on a `[batch][n]` pair, returning the loss before the step.
    fn step(&mut self, batch_x: &ArrayView2<'_, f32>, batch_y: &ArrayView2<'_, f32>, learning_rate: f32) -> f32 {
        let prediction = self.forward(batch_x);
        let loss = smooth_l1_loss(&prediction.view(), batch_y);

        let count = prediction.len().max(1) as f32;
        let gradient = (&prediction - batch_y).mapv(|d| d.clamp(-1.0, 1.0) / count);

        let weight_gradient = gradient.t().dot(batch_x);
        let bias_gradient = gradient.sum_axis(Axis(0));
        self.weight.scaled_add(-learning_rate, &weight_gradient);
        self.bias.scaled_add(-learning_rate, &bias_gradient);

        loss
    }

    /// Fits `targets` from `inputs`, both `[n][frames]`, with minibatches of frames.
    pub fn train(&mut self, inputs: &Array2<f32>, targets: &Array2<f32>, config: &TrainConfig) -> Result<TrainReport> {
        let n = self.n_features();
        check_shape((n, inputs.ncols()), inputs.dim())?;
        check_shape(inputs.dim(), targets.dim())?;
        if config.batch_size == 0 {
            return Err(Error::InvalidParameters("batch size must be non-zero".to_string()));
        }

        let n_frames = inputs.ncols();
        let mut iterations = 0;
        let mut offset = 0;

        while n_frames > 0 && iterations < config.max_iterations {
            let end = (offset + config.batch_size).min(n_frames);
            let batch_x = inputs.slice(s![.., offset..end]).reversed_axes();
            let batch_y = targets.slice(s![.., offset..end]).reversed_axes();

            let loss = self.step(&batch_x, &batch_y, config.learning_rate);
            iterations += 1;

            offset = end;
            if offset >= n_frames {
                offset = 0;
            }

            if iterations % 1000 == 0 {
                debug!("loss = {} after {} iterations", loss, iterations);
            }
            if loss < config.stop_loss {
                break;
            }
        }

        let loss = smooth_l1_loss(&self.forward(&inputs.t()).view(), &targets.t());
        info!("loss = {} after {} iterations", loss, iterations);

        Ok(TrainReport { iterations, loss })
    }

    /// `[n][frames]` inputs to `[n][frames]` predictions.
    pub fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        check_shape((self.n_features(), inputs.ncols()), inputs.dim())?;
        Ok(self.forward(&inputs.t()).reversed_axes())
    }

    /// Stores the parameters as `<path>.weight.npy` and `<path>.bias.npy`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_npy(weight_path(path), &self.weight)?;
        write_npy(bias_path(path), &self.bias)?;
        info!("Model stored at {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let weight: Array2<f32> = read_npy(weight_path(path))?;
        let bias: Array1<f32> = read_npy(bias_path(path))?;
        check_shape((bias.len(), bias.len()), weight.dim())?;
        Ok(Self { weight, bias })
    }

    /// Loads stored parameters, or starts from a random model when there are none.
    pub fn load_or_init<R: Rng>(path: &Path, n_features: usize, rng: &mut R) -> Result<Self> {
        if !weight_path(path).exists() {
            info!("No model at {}, starting from scratch", path.display());
            return Ok(Self::random(n_features, rng));
        }

        let model = Self::load(path)?;
        check_shape((n_features, n_features), model.weight.dim())?;
        Ok(model)
    }
}
