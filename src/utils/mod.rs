//! Image preprocessing and mask refinement utilities

pub mod matting;
pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, LetterboxGeometry, PreprocessingOptions};
