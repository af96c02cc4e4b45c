//! Catalog of supported segmentation models
//!
//! The set of model variants is static. Each variant knows where its ONNX
//! weights are published, how inputs must be prepared, and how raw model
//! output is turned into a 0..1 foreground probability.

use crate::error::{BgRemovalError, Result};
use serde::Serialize;
use std::str::FromStr;

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing configuration for a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// How raw model output maps to foreground probability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskActivation {
    /// Output is already a probability map; stretch it to the full 0..1 range
    MinMax,
    /// Output is logits; apply a sigmoid, then stretch
    Sigmoid,
}

/// Supported model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelVariant {
    #[default]
    U2net,
    U2netp,
    U2netHumanSeg,
    IsnetGeneralUse,
    BirefnetGeneral,
    BirefnetGeneralLite,
}

/// Name and description of a variant, as listed by `/models`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

impl ModelVariant {
    pub const ALL: [Self; 6] = [
        Self::U2net,
        Self::U2netp,
        Self::U2netHumanSeg,
        Self::IsnetGeneralUse,
        Self::BirefnetGeneral,
        Self::BirefnetGeneralLite,
    ];

    /// Configuration name of the variant
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::BirefnetGeneral => "birefnet-general",
            Self::BirefnetGeneralLite => "birefnet-general-lite",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2net => "Fast, good quality",
            Self::U2netp => "Lightweight, fastest",
            Self::U2netHumanSeg => "Optimized for humans",
            Self::IsnetGeneralUse => "Good for general images",
            Self::BirefnetGeneral => "Best quality, slower",
            Self::BirefnetGeneralLite => "High quality, lighter than birefnet-general",
        }
    }

    /// File name of the published ONNX weights
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::U2net => "u2net.onnx",
            Self::U2netp => "u2netp.onnx",
            Self::U2netHumanSeg => "u2net_human_seg.onnx",
            Self::IsnetGeneralUse => "isnet-general-use.onnx",
            Self::BirefnetGeneral => "BiRefNet-general-epoch_244.onnx",
            Self::BirefnetGeneralLite => "BiRefNet-general-bb_swin_v1_tiny-epoch_232.onnx",
        }
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{RELEASE_BASE_URL}/{}", self.file_name())
    }

    /// Square input resolution expected by the network
    #[must_use]
    pub fn input_size(self) -> u32 {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg => 320,
            Self::IsnetGeneralUse | Self::BirefnetGeneral | Self::BirefnetGeneralLite => 1024,
        }
    }

    #[must_use]
    pub fn preprocessing_config(self) -> PreprocessingConfig {
        let size = self.input_size();
        let (normalization_mean, normalization_std) = match self {
            Self::IsnetGeneralUse => ([0.5, 0.5, 0.5], [1.0, 1.0, 1.0]),
            _ => (IMAGENET_MEAN, IMAGENET_STD),
        };
        PreprocessingConfig {
            target_size: [size, size],
            normalization_mean,
            normalization_std,
        }
    }

    #[must_use]
    pub fn mask_activation(self) -> MaskActivation {
        match self {
            Self::BirefnetGeneral | Self::BirefnetGeneralLite => MaskActivation::Sigmoid,
            _ => MaskActivation::MinMax,
        }
    }

    /// Model information for a loaded weight file of `size_bytes`
    #[must_use]
    pub fn model_info(self, size_bytes: usize) -> ModelInfo {
        let size = self.input_size() as usize;
        ModelInfo {
            name: self.name().to_string(),
            precision: "fp32".to_string(),
            size_bytes,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        }
    }

    #[must_use]
    pub fn descriptor(self) -> ModelDescriptor {
        ModelDescriptor {
            name: self.name(),
            description: self.description(),
        }
    }

    /// Descriptors for every supported variant
    #[must_use]
    pub fn catalog() -> Vec<ModelDescriptor> {
        Self::ALL.iter().map(|variant| variant.descriptor()).collect()
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelVariant {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|variant| variant.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|v| v.name()).collect();
                BgRemovalError::invalid_config(format!(
                    "Unknown model '{s}'. Available models: {}",
                    known.join(", ")
                ))
            })
    }
}
