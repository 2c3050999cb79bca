//! The deferred-execution subsystem.
//!
//! The static data are the per-funcode `defers` and `catches` descriptor
//! tables; the runtime state is a per-call stack of pending control
//! transfers. A control transfer from `from` to `to` must first run every
//! defer block that covers `from` but not `to`; blocks chain innermost-first
//! by always picking the eligible descriptor with the greatest `start_pc`.

use crate::errors::EvalException;
use crate::program::DeferBlock;
use crate::value::Value;

/// A pending control transfer, parked while deferred blocks run.
#[derive(Debug)]
pub(crate) enum DeferredAction {
    /// Resume at this address once deferred execution unwinds.
    Jump(u32),
    /// Return this value from the function.
    Return(Value),
    /// This error is in flight; `pc` is the address of the faulting
    /// instruction, kept so the catch table is consulted against the
    /// original site after the defers have run.
    Throw { exc: Box<EvalException>, pc: u32 },
}

impl DeferredAction {
    /// The notional destination of the transfer; returns and throws go
    /// "nowhere", which no descriptor covers.
    pub fn target(&self) -> i64 {
        match self {
            Self::Jump(addr) => i64::from(*addr),
            Self::Return(_) | Self::Throw { .. } => -1,
        }
    }
}

/// Picks the deferred block to run for a transfer from `from` to `to`:
/// the eligible descriptor with the greatest `start_pc`. Descriptors
/// sharing the greatest `start_pc` resolve to the first declared.
pub(crate) fn next_deferred(blocks: &[DeferBlock], from: i64, to: i64) -> Option<u32> {
    let mut best: Option<u32> = None;
    for d in blocks {
        if d.covers(from) && !d.covers(to) && best.map_or(true, |b| d.start_pc > b) {
            best = Some(d.start_pc);
        }
    }
    best
}

/// Finds the handler for an error raised at `pc`: the last declared catch
/// descriptor covering it wins, innermost handlers being declared last.
pub(crate) fn innermost_catch(catches: &[DeferBlock], pc: i64) -> Option<&DeferBlock> {
    catches.iter().rev().find(|c| c.covers(pc))
}
