//! Supported patch encoders.

use serde::Serialize;

/// A pathology foundation model the explorer can embed slides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderModel {
    #[serde(rename = "modelId")]
    pub id: u32,

    #[serde(rename = "modelName")]
    pub name: &'static str,

    /// Where the ONNX export (or model card) is published
    #[serde(rename = "modelURL")]
    pub artifact_url: &'static str,

    /// Whether the model also embeds text
    pub multimodal: bool,

    /// Patches sampled per slide unless the caller asks otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_num_patches: Option<usize>,

    pub enabled: bool,
}

impl EncoderModel {
    /// Name the model is served under on a model server.
    pub fn server_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// KServe v2 endpoint of this model on the server at `base_url`.
    pub fn endpoint(&self, base_url: &str) -> String {
        format!(
            "{}/v2/models/{}",
            base_url.trim_end_matches('/'),
            self.server_name()
        )
    }
}

pub const SUPPORTED_MODELS: &[EncoderModel] = &[
    EncoderModel {
        id: 0,
        name: "CTransPath",
        artifact_url: "https://huggingface.co/kaczmarj/CTransPath/resolve/main/model.onnx",
        multimodal: false,
        default_num_patches: Some(50),
        enabled: true,
    },
    EncoderModel {
        id: 1,
        name: "Phikon",
        artifact_url: "https://huggingface.co/prafulb/phikon-onnx/resolve/main/model.onnx",
        multimodal: false,
        default_num_patches: Some(50),
        enabled: true,
    },
    EncoderModel {
        id: 2,
        name: "PLIP",
        artifact_url: "https://huggingface.co/prafulb/plip-onnx/resolve/main/model.onnx",
        multimodal: true,
        default_num_patches: Some(1),
        enabled: true,
    },
    EncoderModel {
        id: 3,
        name: "CONCH",
        artifact_url: "https://huggingface.co/MahmoodLab/CONCH",
        multimodal: true,
        default_num_patches: None,
        enabled: false,
    },
];

/// The model used when none is selected.
pub fn default_model() -> &'static EncoderModel {
    &SUPPORTED_MODELS[0]
}

/// Look up a model by name (case-insensitive) or numeric id.
pub fn find_model(name_or_id: &str) -> Option<&'static EncoderModel> {
    let wanted = name_or_id.trim();
    SUPPORTED_MODELS.iter().find(|model| {
        model.name.eq_ignore_ascii_case(wanted) || wanted.parse::<u32>().ok() == Some(model.id)
    })
}
