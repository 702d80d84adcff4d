//! Backend implementations of the inference seams
//!
//! - ONNX Runtime backend (CPU, CUDA, CoreML)

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxSession, OnnxSessionLoader, RuntimeSettings};
