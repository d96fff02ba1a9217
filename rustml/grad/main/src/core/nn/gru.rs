use crate::api::error::{GradError, GradResult};
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::{add, matmul, mul, shape, sigmoid, tanh};

/// Weights of one direction of one GRU layer.
struct GruCell {
    w_ih: Tensor, // [3*hidden_size, layer_input_size]
    w_hh: Tensor, // [3*hidden_size, hidden_size]
    b_ih: Tensor, // [3*hidden_size]
    b_hh: Tensor, // [3*hidden_size]
}

impl GruCell {
    fn new(input_size: usize, hidden_size: usize) -> Self {
        let bound = 1.0 / (hidden_size as f32).sqrt();
        let param = |shape: &[usize]| {
            let mut t = Tensor::rand_uniform(shape, -bound, bound);
            t.set_requires_grad(true);
            t
        };
        Self {
            w_ih: param(&[3 * hidden_size, input_size]),
            w_hh: param(&[3 * hidden_size, hidden_size]),
            b_ih: param(&[3 * hidden_size]),
            b_hh: param(&[3 * hidden_size]),
        }
    }

    /// One step, gate order r, z, n:
    ///   r = sigmoid(W_ir x + b_ir + W_hr h + b_hr)
    ///   z = sigmoid(W_iz x + b_iz + W_hz h + b_hz)
    ///   n = tanh(W_in x + b_in + r * (W_hn h + b_hn))
    ///   h' = n + z * (h - n)
    fn step(&self, x: &Tensor, h: &Tensor, hidden: usize) -> GradResult<Tensor> {
        let gi = matmul::linear(x, &self.w_ih, Some(&self.b_ih))?;
        let gh = matmul::linear(h, &self.w_hh, Some(&self.b_hh))?;
        let gate = |g: &Tensor, i: usize| shape::slice(g, 1, i * hidden, (i + 1) * hidden);

        let r = sigmoid::sigmoid(&add::add(&gate(&gi, 0)?, &gate(&gh, 0)?)?);
        let z = sigmoid::sigmoid(&add::add(&gate(&gi, 1)?, &gate(&gh, 1)?)?);
        let n = tanh::tanh(&add::add(&gate(&gi, 2)?, &mul::mul(&r, &gate(&gh, 2)?)?)?);
        add::add(&n, &mul::mul(&z, &add::sub(h, &n)?)?)
    }
}

/// Multi-layer GRU over batch-first input `[batch, seq_len, input_size]`.
///
/// Output is `[batch, seq_len, directions * hidden_size]`; the initial hidden
/// state is zero. Built from recorded ops, so gradients come from the tape.
pub struct Gru {
    cells: Vec<GruCell>, // layer-major, then direction
    input_size: usize,
    hidden_size: usize,
    num_layers: usize,
    bidirectional: bool,
}

impl Gru {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        bidirectional: bool,
    ) -> GradResult<Self> {
        if num_layers == 0 || hidden_size == 0 || input_size == 0 {
            return Err(GradError::InvalidConfig(format!(
                "GRU needs positive sizes, got input {input_size}, hidden {hidden_size}, layers {num_layers}"
            )));
        }
        let directions = if bidirectional { 2 } else { 1 };
        let mut cells = Vec::with_capacity(num_layers * directions);
        for layer in 0..num_layers {
            let layer_input = if layer == 0 {
                input_size
            } else {
                hidden_size * directions
            };
            for _ in 0..directions {
                cells.push(GruCell::new(layer_input, hidden_size));
            }
        }
        Ok(Self {
            cells,
            input_size,
            hidden_size,
            num_layers,
            bidirectional,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn output_size(&self) -> usize {
        self.hidden_size * self.directions()
    }

    fn directions(&self) -> usize {
        if self.bidirectional {
            2
        } else {
            1
        }
    }

    fn run_direction(
        cell: &GruCell,
        steps: &[Tensor],
        hidden: usize,
        reverse: bool,
    ) -> GradResult<Vec<Tensor>> {
        let batch = steps[0].shape()[0];
        let mut h = Tensor::zeros([batch, hidden]);
        let mut outputs: Vec<Option<Tensor>> = vec![None; steps.len()];
        let order: Vec<usize> = if reverse {
            (0..steps.len()).rev().collect()
        } else {
            (0..steps.len()).collect()
        };
        for t in order {
            h = cell.step(&steps[t], &h, hidden)?;
            outputs[t] = Some(h.clone());
        }
        Ok(outputs.into_iter().flatten().collect())
    }
}

impl Module for Gru {
    fn parameters(&self) -> Vec<&Tensor> {
        self.cells
            .iter()
            .flat_map(|c| [&c.w_ih, &c.w_hh, &c.b_ih, &c.b_hh])
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.cells
            .iter_mut()
            .flat_map(|c| [&mut c.w_ih, &mut c.w_hh, &mut c.b_ih, &mut c.b_hh])
            .collect()
    }
}

impl Layer for Gru {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        if input.ndim() != 3 || input.shape()[2] != self.input_size || input.shape()[1] == 0 {
            return Err(GradError::ShapeMismatch {
                expected: vec![input.shape().first().copied().unwrap_or(0), 0, self.input_size],
                got: input.shape().to_vec(),
            });
        }
        let (batch, seq_len) = (input.shape()[0], input.shape()[1]);
        let directions = self.directions();

        // [batch, in] per timestep
        let mut steps = shape::split(input, 1, 1)?
            .iter()
            .map(|s| shape::reshape(s, &[batch, s.shape()[2]]))
            .collect::<GradResult<Vec<_>>>()?;

        for layer in 0..self.num_layers {
            let per_direction = (0..directions)
                .map(|d| {
                    let cell = &self.cells[layer * directions + d];
                    Self::run_direction(cell, &steps, self.hidden_size, d == 1)
                })
                .collect::<GradResult<Vec<_>>>()?;
            steps = (0..seq_len)
                .map(|t| {
                    let parts: Vec<&Tensor> = per_direction.iter().map(|dir| &dir[t]).collect();
                    if parts.len() == 1 {
                        Ok(parts[0].clone())
                    } else {
                        shape::cat(&parts, 1)
                    }
                })
                .collect::<GradResult<Vec<_>>>()?;
        }

        let refs: Vec<&Tensor> = steps.iter().collect();
        shape::stack(&refs, 1)
    }
}
