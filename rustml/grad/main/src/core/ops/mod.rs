pub mod add;
pub mod conv;
pub mod matmul;
pub mod mul;
pub mod norm;
pub mod reduce;
pub mod relu;
pub mod shape;
pub mod sigmoid;
pub mod tanh;

use crate::api::tape::{self, BackwardOp, TapeEntry};
use crate::api::tensor::Tensor;

/// Push one entry onto the thread-local tape if recording is on.
pub(crate) fn record<B>(op: B, output: &Tensor, inputs: &[&Tensor], saved: Vec<Tensor>)
where
    B: BackwardOp + 'static,
{
    if tape::is_recording() {
        tape::record_op(TapeEntry {
            backward_op: Box::new(op),
            output_id: output.id(),
            input_ids: inputs.iter().map(|t| t.id()).collect(),
            saved_tensors: saved,
        });
    }
}
