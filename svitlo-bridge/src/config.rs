use crate::error::ConfigError;
use crate::models::SourceBinding;
use crate::mqtt::qos_from_level;
use crate::parsers::address::DEFAULT_STRIP_FIELDS;
use crate::sources::build_bindings;
use rumqttc::QoS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

/// Options brutes telles qu'écrites par l'utilisateur (JSON ou YAML)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    pub sources: Vec<String>,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_qos: u8,
    pub mqtt_client_id: String,
    pub inbox_topic: String,
    pub address_strip_fields: Vec<String>,
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            mqtt_host: "core-mosquitto".into(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_qos: 1,
            mqtt_client_id: "svitlo2mqtt".into(),
            inbox_topic: "svitlo/inbox".into(),
            address_strip_fields: DEFAULT_STRIP_FIELDS.map(String::from).to_vec(),
            debug: false,
        }
    }
}

/// Paramètres MQTT après fusion options + environnement
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub qos: QoS,
    pub inbox_topic: String,
}

/// Configuration validée, prête pour le démarrage
#[derive(Debug, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub bindings: Vec<SourceBinding>,
    pub debug: bool,
}

pub fn options_path() -> PathBuf {
    std::env::var("SVITLO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_OPTIONS_PATH))
}

pub async fn load_options(path: &Path) -> Result<Options, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_options(path, &txt)
}

fn parse_options(path: &Path, txt: &str) -> Result<Options, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(Options::default());
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(txt)?),
        _ => Ok(serde_json::from_str(txt)?),
    }
}

impl Options {
    /// Valide les options. `env` donne accès aux variables d'environnement
    /// (MQTT_HOST, MQTT_PORT, MQTT_USERNAME, MQTT_PASSWORD).
    pub fn resolve<F>(&self, env: F) -> Result<Settings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let specs: Vec<String> = self
            .sources
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let bindings = build_bindings(&specs, &self.address_strip_fields)?;

        Ok(Settings {
            mqtt: self.resolve_mqtt(&env)?,
            bindings,
            debug: self.debug,
        })
    }

    fn resolve_mqtt<F>(&self, env: &F) -> Result<MqttSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        let host = non_empty(env("MQTT_HOST")).unwrap_or_else(|| self.mqtt_host.clone());
        let port = env("MQTT_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(self.mqtt_port);
        let username = non_empty(self.mqtt_username.clone()).or_else(|| non_empty(env("MQTT_USERNAME")));
        let password = non_empty(self.mqtt_password.clone()).or_else(|| non_empty(env("MQTT_PASSWORD")));
        let (Some(username), Some(password)) = (username, password) else {
            return Err(ConfigError::MissingCredentials);
        };

        Ok(MqttSettings {
            host,
            port,
            username,
            password,
            client_id: self.mqtt_client_id.clone(),
            qos: qos_from_level(self.mqtt_qos)?,
            inbox_topic: self.inbox_topic.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{Parser, ParserKind};
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn options() -> Options {
        Options {
            sources: vec![
                "-1002233810852 kyiv parse_kyiv_digital".into(),
                "@svitlo_summary summary parse_groups_summary".into(),
            ],
            mqtt_username: Some("addons".into()),
            mqtt_password: Some("secret".into()),
            ..Options::default()
        }
    }

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.mqtt_host, "core-mosquitto");
        assert_eq!(opts.mqtt_port, 1883);
        assert_eq!(opts.mqtt_qos, 1);
        assert_eq!(opts.address_strip_fields, vec!["text", "address"]);
        assert!(!opts.debug);
    }

    #[test]
    fn test_parse_json_and_yaml() {
        let json = r#"{"sources": ["-100 kyiv parse_kyiv_digital"], "mqtt_qos": 2, "debug": true}"#;
        let opts = parse_options(Path::new("options.json"), json).unwrap();
        assert_eq!(opts.sources.len(), 1);
        assert_eq!(opts.mqtt_qos, 2);
        assert!(opts.debug);
        assert_eq!(opts.mqtt_host, "core-mosquitto");

        let yaml = "sources:\n  - \"@svitlo summary parse_groups_summary\"\nmqtt_host: broker.lan\n";
        let opts = parse_options(Path::new("options.yaml"), yaml).unwrap();
        assert_eq!(opts.mqtt_host, "broker.lan");
        assert_eq!(opts.sources, vec!["@svitlo summary parse_groups_summary"]);

        assert!(parse_options(Path::new("options.json"), "{oops").is_err());
        assert!(parse_options(Path::new("options.json"), "  ").unwrap().sources.is_empty());
    }

    #[test]
    fn test_resolve_ok() {
        let settings = options().resolve(no_env).unwrap();
        assert_eq!(settings.bindings.len(), 2);
        assert_eq!(settings.mqtt.qos, QoS::AtLeastOnce);
        assert_eq!(settings.mqtt.username, "addons");
        match &settings.bindings[0].parser {
            Parser::AddressOutage(p) => {
                assert_eq!(p.excluded_fields().collect::<Vec<_>>(), vec!["address", "group", "text"])
            }
            other => panic!("unexpected parser {:?}", other.kind()),
        }
        assert_eq!(settings.bindings[1].parser.kind(), ParserKind::GroupsSummary);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MQTT_HOST", "10.0.0.5"),
            ("MQTT_PORT", "not-a-port"),
            ("MQTT_USERNAME", "env-user"),
            ("MQTT_PASSWORD", "env-pass"),
        ]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let opts = Options {
            mqtt_username: Some(String::new()),
            mqtt_password: None,
            ..options()
        };
        let mqtt = opts.resolve(lookup).unwrap().mqtt;
        assert_eq!(mqtt.host, "10.0.0.5");
        assert_eq!(mqtt.port, 1883);
        assert_eq!(mqtt.username, "env-user");
        assert_eq!(mqtt.password, "env-pass");

        // les identifiants des options priment sur l'environnement
        let mqtt = options().resolve(lookup).unwrap().mqtt;
        assert_eq!(mqtt.username, "addons");
    }

    #[test]
    fn test_resolve_errors() {
        let opts = Options { mqtt_password: None, ..options() };
        assert!(matches!(opts.resolve(no_env), Err(ConfigError::MissingCredentials)));

        let opts = Options { mqtt_qos: 7, ..options() };
        assert!(matches!(opts.resolve(no_env), Err(ConfigError::InvalidQos(7))));

        let opts = Options { sources: vec!["".into(), "  ".into()], ..options() };
        assert!(matches!(opts.resolve(no_env), Err(ConfigError::NoSources)));

        let opts = Options { sources: vec!["@chan kyiv parse_unknown".into()], ..options() };
        assert!(matches!(opts.resolve(no_env), Err(ConfigError::UnknownParser { .. })));
    }

    #[tokio::test]
    async fn test_load_options_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        assert!(matches!(load_options(&path).await, Err(ConfigError::NotFound(_))));

        std::fs::write(&path, r#"{"sources": ["-100 kyiv parse_kyiv_digital"], "mqtt_port": 1884}"#).unwrap();
        let opts = load_options(&path).await.unwrap();
        assert_eq!(opts.mqtt_port, 1884);
    }
}
