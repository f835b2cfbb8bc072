use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use mirra_gateway::{DEFAULT_MODEL, Model, default_models};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const SETTINGS_DIRECTORY_NAME: &str = "mirra";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MIRRA_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Catalog shown when the server's model list cannot be fetched.
    #[serde(default = "default_models")]
    pub models: Vec<Model>,
    /// Echo the user's text before the server answers.
    #[serde(default)]
    pub optimistic_user_echo: bool,
    /// Refresh the conversation list after a failed send as well.
    #[serde(default = "default_true")]
    pub refresh_after_failed_send: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            default_model: default_model(),
            models: default_models(),
            optimistic_user_echo: false,
            refresh_after_failed_send: true,
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        self.server_url = match self.server_url.trim().trim_end_matches('/') {
            "" => default_server_url(),
            trimmed => trimmed.to_string(),
        };
        self.default_model = match self.default_model.trim() {
            "" => default_model(),
            trimmed => trimmed.to_string(),
        };

        self.models = self
            .models
            .into_iter()
            .filter_map(|model| {
                let id = model.id.trim().to_string();
                if id.is_empty() {
                    return None;
                }
                let name = match model.name.trim() {
                    "" => id.clone(),
                    name => name.to_string(),
                };
                Some(Model::new(id, name))
            })
            .collect();
        if self.models.is_empty() {
            self.models = default_models();
        }

        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".mirra"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> SettingsResult<()> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        let mut figment = Figment::from(Serialized::defaults(ClientSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    /// Writes `settings` beside the config file, then swaps it into place.
    fn persist(&self, settings: &ClientSettings) -> SettingsResult<()> {
        let directory = self.config_path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(directory).context(ConfigDirectorySnafu {
            stage: "ensure-mirra-config-dir",
            path: directory.to_path_buf(),
        })?;

        let encoded = serde_json::to_vec_pretty(settings).context(EncodeSettingsSnafu {
            stage: "encode-client-settings",
        })?;

        let staged = self.config_path.with_extension("json.tmp");
        std::fs::write(&staged, encoded).context(StageSettingsSnafu {
            stage: "stage-client-settings",
            path: staged.clone(),
        })?;
        std::fs::rename(&staged, &self.config_path).context(CommitSettingsSnafu {
            stage: "commit-client-settings",
            path: self.config_path.clone(),
        })?;

        tracing::debug!(
            default_model = %settings.default_model,
            "client settings written to {:?}",
            self.config_path
        );
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot prepare config directory {path:?} on `{stage}`: {source}"))]
    ConfigDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode client settings on `{stage}`: {source}"))]
    EncodeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot stage client settings at {path:?} on `{stage}`: {source}"))]
    StageSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot move client settings into {path:?} on `{stage}`: {source}"))]
    CommitSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_true() -> bool {
    true
}
