/**
 * SOURCES - Lecture des specs "<chat> <namespace> <parser>" et résolution des identités
 *
 * RÔLE :
 * Transforme la liste de specs de la config en bindings figés. Toute erreur ici
 * est fatale : le process ne démarre pas avec une source mal décrite.
 *
 * IDENTITÉS :
 * - "-1002233810852" (id numérique) → lui-même
 * - "@Kyiv_Digital" → "@kyiv_digital"
 * - "https://t.me/kyiv_digital" → "@kyiv_digital"
 */

use crate::error::ConfigError;
use crate::models::{SourceBinding, SourceId};
use crate::parsers::{Parser, ParserKind};
use std::collections::HashSet;

/// Spec de source lue depuis la config, pas encore résolue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub chat: String,
    pub namespace: String,
    pub parser: ParserKind,
}

impl SourceSpec {
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = spec.split_whitespace().collect();
        let [chat, namespace, parser] = parts.as_slice() else {
            return Err(ConfigError::MalformedSource(spec.to_string()));
        };
        let parser = parser.parse::<ParserKind>().map_err(|e| ConfigError::UnknownParser {
            parser: e.0,
            spec: spec.to_string(),
        })?;
        Ok(Self {
            chat: chat.to_string(),
            namespace: namespace.to_string(),
            parser,
        })
    }
}

/// Normalise une référence de chat en identité stable ; None si non résolvable
pub fn resolve(chat: &str) -> Option<SourceId> {
    let chat = chat.trim();
    let digits = chat.strip_prefix('-').unwrap_or(chat);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return Some(SourceId::new(chat));
    }

    let name = chat
        .strip_prefix('@')
        .or_else(|| chat.strip_prefix("https://t.me/"))
        .or_else(|| chat.strip_prefix("t.me/"))?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| SourceId::new(format!("@{}", name.to_ascii_lowercase())))
}

/// Construit les bindings à partir des specs brutes
pub fn build_bindings(specs: &[String], strip_fields: &[String]) -> Result<Vec<SourceBinding>, ConfigError> {
    if specs.is_empty() {
        return Err(ConfigError::NoSources);
    }

    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(specs.len());
    for raw in specs {
        let spec = SourceSpec::parse(raw)?;
        let identity = resolve(&spec.chat).ok_or_else(|| ConfigError::UnresolvedSource(spec.chat.clone()))?;
        if !seen.insert(identity.clone()) {
            return Err(ConfigError::DuplicateSource(spec.chat));
        }
        bindings.push(SourceBinding {
            identity,
            namespace: spec.namespace,
            parser: Parser::build(spec.parser, strip_fields),
        });
    }
    Ok(bindings)
}
