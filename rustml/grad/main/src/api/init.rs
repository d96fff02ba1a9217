use crate::api::error::{GradError, GradResult};
use crate::api::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weight initialisation scheme for conv and linear weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitType {
    /// N(0, gain).
    Normal,
    /// Glorot normal, scaled by gain.
    Xavier,
    /// Glorot uniform, scaled by gain.
    XavierUniform,
    /// He normal, fan-in mode, for ReLU networks. Ignores gain.
    Kaiming,
    /// (Semi-)orthogonal matrix over the flattened trailing dims, scaled by gain.
    Orthogonal,
}

impl FromStr for InitType {
    type Err = GradError;

    fn from_str(s: &str) -> GradResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(InitType::Normal),
            "xavier" => Ok(InitType::Xavier),
            "xavier_uniform" => Ok(InitType::XavierUniform),
            "kaiming" => Ok(InitType::Kaiming),
            "orthogonal" => Ok(InitType::Orthogonal),
            other => Err(GradError::InvalidConfig(format!(
                "initialization method [{other}] is not implemented"
            ))),
        }
    }
}

impl fmt::Display for InitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitType::Normal => "normal",
            InitType::Xavier => "xavier",
            InitType::XavierUniform => "xavier_uniform",
            InitType::Kaiming => "kaiming",
            InitType::Orthogonal => "orthogonal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightInit {
    pub kind: InitType,
    pub gain: f32,
}

impl WeightInit {
    pub fn new(kind: InitType, gain: f32) -> Self {
        Self { kind, gain }
    }

    /// Draw a fresh weight tensor of `shape`.
    pub fn sample(&self, shape: &[usize]) -> GradResult<Tensor> {
        match self.kind {
            InitType::Normal => Ok(Tensor::randn_with(shape, 0.0, self.gain)),
            InitType::Xavier => {
                let (fan_in, fan_out) = fans(shape)?;
                let std = self.gain * (2.0 / (fan_in + fan_out) as f32).sqrt();
                Ok(Tensor::randn_with(shape, 0.0, std))
            }
            InitType::XavierUniform => {
                let (fan_in, fan_out) = fans(shape)?;
                let bound = self.gain * (6.0 / (fan_in + fan_out) as f32).sqrt();
                Ok(Tensor::rand_uniform(shape, -bound, bound))
            }
            InitType::Kaiming => {
                let (fan_in, _) = fans(shape)?;
                let std = (2.0 / fan_in as f32).sqrt();
                Ok(Tensor::randn_with(shape, 0.0, std))
            }
            InitType::Orthogonal => orthogonal(shape, self.gain),
        }
    }
}

impl Default for WeightInit {
    fn default() -> Self {
        Self::new(InitType::Normal, 0.02)
    }
}

/// Fan-in / fan-out the way torch counts them: dim 1 and dim 0 times the
/// receptive field.
pub fn fans(shape: &[usize]) -> GradResult<(usize, usize)> {
    if shape.len() < 2 {
        return Err(GradError::InvalidOperation(format!(
            "fan in/out needs at least 2 dims, got {shape:?}"
        )));
    }
    let receptive: usize = shape[2..].iter().product();
    Ok((shape[1] * receptive, shape[0] * receptive))
}

fn orthogonal(shape: &[usize], gain: f32) -> GradResult<Tensor> {
    if shape.len() < 2 {
        return Err(GradError::InvalidOperation(format!(
            "orthogonal init needs at least 2 dims, got {shape:?}"
        )));
    }
    let rows = shape[0];
    let cols: usize = shape[1..].iter().product();
    let (tall, short) = (rows.max(cols), rows.min(cols));

    // Orthonormalise the columns of a [tall, short] Gaussian matrix.
    let mut m = Tensor::randn([tall, short]).to_vec();
    for j in 0..short {
        for k in 0..j {
            let dot: f32 = (0..tall).map(|i| m[i * short + j] * m[i * short + k]).sum();
            for i in 0..tall {
                m[i * short + j] -= dot * m[i * short + k];
            }
        }
        let norm = (0..tall)
            .map(|i| m[i * short + j].powi(2))
            .sum::<f32>()
            .sqrt()
            .max(1e-12);
        for i in 0..tall {
            m[i * short + j] /= norm;
        }
    }

    let mut out = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            out[r * cols + c] = gain
                * if rows >= cols {
                    m[r * short + c]
                } else {
                    m[c * short + r]
                };
        }
    }
    Tensor::from_vec(out, shape)
}
