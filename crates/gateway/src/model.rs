use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "moonshotai/Kimi-K2-Instruct";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCatalogSource {
    ServerApi,
    ConfiguredFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<Model>,
    pub source: ModelCatalogSource,
    pub warning: Option<String>,
}

impl ModelCatalog {
    pub fn from_server(models: Vec<Model>) -> Self {
        Self {
            models,
            source: ModelCatalogSource::ServerApi,
            warning: None,
        }
    }

    pub fn from_fallback(models: Vec<Model>, warning: String) -> Self {
        Self {
            models,
            source: ModelCatalogSource::ConfiguredFallback,
            warning: Some(warning),
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|model| model.id == model_id)
    }
}

/// Models the chat server ships with, used when `/api/models` is unreachable.
pub fn default_models() -> Vec<Model> {
    vec![
        Model::new(DEFAULT_MODEL, "Kimi K2"),
        Model::new("deepseek-ai/DeepSeek-R1", "DeepSeek R1"),
        Model::new("zai-org/GLM-4.5", "GLM 4.5"),
        Model::new("Qwen/Qwen3-235B-A22B-Instruct-2507", "Qwen 3.5"),
    ]
}
