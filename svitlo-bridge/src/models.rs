use crate::parsers::Parser;
use rumqttc::QoS;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Identité stable d'une source (id numérique ou @username normalisé)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Association figée source → (namespace, parser), créée une fois au démarrage
#[derive(Debug, Clone)]
pub struct SourceBinding {
    pub identity: SourceId,
    pub namespace: String,
    pub parser: Parser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Energized,
    DeEnergized,
}

impl PowerState {
    /// Coercition "truthy" du champ `power` : seuls false, null, 0, "" et
    /// les tableaux/objets vides donnent DeEnergized
    pub fn from_power(value: &Value) -> Self {
        let truthy = match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        };
        if truthy {
            PowerState::Energized
        } else {
            PowerState::DeEnergized
        }
    }

    /// Segment de topic : ON / OFF
    pub fn label(self) -> &'static str {
        match self {
            PowerState::Energized => "ON",
            PowerState::DeEnergized => "OFF",
        }
    }
}

/// Résultat du parser adresse (message JSON Kyiv Digital)
#[derive(Debug, Clone, PartialEq)]
pub struct AddressOutage {
    pub state: PowerState,
    pub group: String,
    pub attributes: Map<String, Value>,
}

/// Résultat du parser résumé des groupes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupsSummary {
    pub total: u16,
    /// Clés triées comme chaînes ("10" avant "2")
    pub groups: BTreeMap<String, u16>,
}

impl GroupsSummary {
    /// Construit le résumé ; None si aucun groupe. Sans en-tête, le total est
    /// la moyenne arrondie (half-to-even) des groupes.
    pub fn new(header: Option<u16>, groups: BTreeMap<String, u16>) -> Option<Self> {
        if groups.is_empty() {
            return None;
        }
        let total = header.unwrap_or_else(|| {
            let sum: u32 = groups.values().map(|v| u32::from(*v)).sum();
            let count = groups.len().max(1) as f64;
            (f64::from(sum) / count).round_ties_even() as u16
        });
        Some(Self { total, groups })
    }

    /// Valeurs des groupes dans l'ordre des clés
    pub fn ordered_values(&self) -> Vec<u16> {
        self.groups.values().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    Address(AddressOutage),
    Summary(GroupsSummary),
}

/// Une écriture sur le bus : topic + payload + qos + retain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusWrite {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl BusWrite {
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Message entrant, déjà associé à une identité de source
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub source: SourceId,
    pub text: String,
    pub observed_at: OffsetDateTime,
}

/// Enveloppe JSON publiée par le relais de chat sur le topic inbox
#[derive(Debug, Deserialize)]
pub struct InboxEnvelope {
    pub source: RawSource,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub date: Option<EnvelopeDate>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawSource {
    Id(i64),
    Name(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeDate {
    Unix(i64),
    Rfc3339(String),
}

impl EnvelopeDate {
    fn to_datetime(&self) -> Option<OffsetDateTime> {
        match self {
            EnvelopeDate::Unix(secs) => OffsetDateTime::from_unix_timestamp(*secs).ok(),
            EnvelopeDate::Rfc3339(txt) => OffsetDateTime::parse(txt, &Rfc3339).ok(),
        }
    }
}

impl InboxEnvelope {
    /// Normalise la source et retombe sur l'heure courante si la date manque
    pub fn into_event(self) -> InboundEvent {
        let raw = match self.source {
            RawSource::Id(id) => id.to_string(),
            RawSource::Name(name) => name,
        };
        let source = crate::sources::resolve(&raw).unwrap_or_else(|| SourceId::new(raw.trim()));
        let observed_at = self
            .date
            .as_ref()
            .and_then(EnvelopeDate::to_datetime)
            .unwrap_or_else(OffsetDateTime::now_utc);
        InboundEvent { source, text: self.text, observed_at }
    }
}
