use std::path::PathBuf;

/// Erreurs de configuration : toutes fatales au démarrage
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("options file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML options: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no sources configured (options.sources is empty)")]
    NoSources,
    #[error("invalid source spec '{0}', expected '<chat> <namespace> <parser>'")]
    MalformedSource(String),
    #[error("unknown parser '{parser}' in source '{spec}'")]
    UnknownParser { parser: String, spec: String },
    #[error("failed to resolve chat '{0}'")]
    UnresolvedSource(String),
    #[error("chat '{0}' is bound more than once")]
    DuplicateSource(String),
    #[error("MQTT credentials are missing (mqtt_username/mqtt_password or MQTT_USERNAME/MQTT_PASSWORD)")]
    MissingCredentials,
    #[error("invalid MQTT QoS {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}

/// Erreurs côté bus : journalisées, jamais fatales pour la boucle
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
