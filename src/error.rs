//! Error kinds surfaced at allocation points (§7).
//!
//! Everything else the simulation does is infallible by design: out-of-range
//! reads return air/`None`, out-of-range writes are dropped, and capacity
//! exhaustion is reported through `Option` return values rather than `Result`
//! so gameplay code can treat it as "defer" without matching on an error
//! type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("out of memory allocating {what} ({requested} elements)")]
    OutOfMemory { what: &'static str, requested: usize },
}

pub type SimResult<T> = Result<T, SimError>;
