//! Low-level signal processing shared by the analyses

pub mod fft;
pub mod lpc;

pub use fft::Fft;
pub use lpc::{lpc_burg, lpc_to_formants, FormantCandidate, LpcResult};
