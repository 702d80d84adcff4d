//! Image preparation, result refinement and result validation

pub mod postprocessing;
pub mod preprocessing;
pub mod validation;

pub use postprocessing::ImagePostprocessor;
pub use preprocessing::ImagePreprocessor;
pub use validation::{ResultValidator, ValidationVerdict};
