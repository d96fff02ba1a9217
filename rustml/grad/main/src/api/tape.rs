//! Thread-local gradient tape.
//!
//! Every differentiable op pushes a [`TapeEntry`] while recording is on.
//! [`backward`] replays the entries newest-first and accumulates one gradient
//! per [`TensorId`]. Gradients and entries are cleared separately: a GAN step
//! differentiates two losses over the same recorded forward pass, calling
//! [`zero_grad`] in between and [`clear_tape`] once both are done.

use crate::api::tensor::{Tensor, TensorId};
use std::cell::{Cell, RefCell};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub trait BackwardOp: Send + Sync {
    /// Gradients for the entry's inputs, in `input_ids` order.
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor>;
    fn name(&self) -> &str;
}

pub struct TapeEntry {
    pub backward_op: Box<dyn BackwardOp>,
    pub output_id: TensorId,
    pub input_ids: Vec<TensorId>,
    pub saved_tensors: Vec<Tensor>,
}

#[derive(Default)]
struct Tape {
    entries: Vec<TapeEntry>,
    grads: HashMap<TensorId, Tensor>,
}

fn accumulate(grads: &mut HashMap<TensorId, Tensor>, id: TensorId, grad: Tensor) {
    match grads.entry(id) {
        Entry::Occupied(mut slot) => {
            let sum = slot
                .get()
                .add_raw(&grad)
                .expect("gradient shapes agree with the forward pass");
            slot.insert(sum);
        }
        Entry::Vacant(slot) => {
            slot.insert(grad);
        }
    }
}

impl Tape {
    fn backward(&mut self, loss: &Tensor) {
        let Tape { entries, grads } = self;
        accumulate(grads, loss.id(), Tensor::ones(loss.shape()));

        let mut replayed = 0usize;
        for entry in entries.iter().rev() {
            let Some(grad_output) = grads.get(&entry.output_id).cloned() else {
                continue;
            };
            let input_grads = entry.backward_op.backward(&grad_output, &entry.saved_tensors);
            for (&id, grad) in entry.input_ids.iter().zip(input_grads) {
                accumulate(grads, id, grad);
            }
            replayed += 1;
        }
        log::trace!("backward replayed {replayed}/{} tape entries", entries.len());
    }
}

thread_local! {
    static TAPE: RefCell<Tape> = RefCell::new(Tape::default());
    static RECORDING: Cell<bool> = const { Cell::new(true) };
}

/// Restores the previous recording flag on drop, including on unwind.
struct RecordingGuard {
    previous: bool,
}

impl RecordingGuard {
    fn pause() -> Self {
        let previous = RECORDING.with(|r| r.replace(false));
        Self { previous }
    }
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        RECORDING.with(|r| r.set(self.previous));
    }
}

pub fn record_op(entry: TapeEntry) {
    if is_recording() {
        TAPE.with(|tape| tape.borrow_mut().entries.push(entry));
    }
}

/// Seed `d loss / d loss = 1` and propagate through every recorded entry.
pub fn backward(loss: &Tensor) {
    TAPE.with(|tape| tape.borrow_mut().backward(loss));
}

pub fn grad(tensor: &Tensor) -> Option<Tensor> {
    TAPE.with(|tape| tape.borrow().grads.get(&tensor.id()).cloned())
}

pub fn set_grad(tensor: &Tensor, grad: Tensor) {
    TAPE.with(|tape| {
        tape.borrow_mut().grads.insert(tensor.id(), grad);
    });
}

/// Drop accumulated gradients; recorded entries stay.
pub fn zero_grad() {
    TAPE.with(|tape| tape.borrow_mut().grads.clear());
}

/// Drop both entries and gradients.
pub fn clear_tape() {
    TAPE.with(|tape| {
        let mut tape = tape.borrow_mut();
        tape.entries.clear();
        tape.grads.clear();
    });
}

pub fn tape_len() -> usize {
    TAPE.with(|tape| tape.borrow().entries.len())
}

/// Run `f` with recording paused.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = RecordingGuard::pause();
    f()
}

pub fn is_recording() -> bool {
    RECORDING.with(Cell::get)
}
