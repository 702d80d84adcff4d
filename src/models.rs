//! Catalogue of the segmentation models the service can load

use crate::error::{BgRemovalError, Result};
use serde::Serialize;

/// Release that hosts the model files
const MODEL_RELEASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessing parameters for a model's input tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreprocessingConfig {
    /// Square input size `[width, height]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Segmentation models known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelKind {
    /// General purpose U²-Net
    U2net,
    /// Lightweight U²-Net
    U2netp,
    /// U²-Net trained on human segmentation
    U2netHumanSeg,
    /// Pruned U²-Net
    Silueta,
    /// IS-Net general use (the request default)
    IsnetGeneralUse,
    /// IS-Net for anime characters
    IsnetAnime,
}

impl ModelKind {
    pub const ALL: [ModelKind; 6] = [
        ModelKind::U2net,
        ModelKind::U2netp,
        ModelKind::U2netHumanSeg,
        ModelKind::Silueta,
        ModelKind::IsnetGeneralUse,
        ModelKind::IsnetAnime,
    ];

    /// Identifier used in requests and file names
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netp => "u2netp",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::IsnetAnime => "isnet-anime",
        }
    }

    /// Resolve a request model id
    ///
    /// # Errors
    /// - The id is not part of the catalogue
    pub fn from_id(id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == id)
            .ok_or_else(|| {
                BgRemovalError::model_load(format!(
                    "Unknown model '{id}'. Available models: {}",
                    Self::available_ids().join(", ")
                ))
            })
    }

    #[must_use]
    pub fn available_ids() -> Vec<&'static str> {
        Self::ALL.into_iter().map(Self::id).collect()
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.id())
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{MODEL_RELEASE_URL}/{}", self.file_name())
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            Self::IsnetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
            Self::IsnetAnime => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: IMAGENET_MEAN,
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_resolve_to_themselves() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_id(kind.id()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_model_lists_available() {
        let err = ModelKind::from_id("u2net-xl").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("u2net-xl"));
        assert!(message.contains("isnet-general-use"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_download_url_and_sizes() {
        assert_eq!(
            ModelKind::IsnetGeneralUse.download_url(),
            "https://github.com/danielgatis/rembg/releases/download/v0.0.0/isnet-general-use.onnx"
        );
        assert_eq!(ModelKind::U2net.preprocessing().target_size, [320, 320]);
        assert_eq!(ModelKind::IsnetAnime.preprocessing().target_size, [1024, 1024]);
    }
}
