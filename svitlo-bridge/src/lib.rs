/**
 * SVITLO BRIDGE - Notifications de coupures de courant → faits MQTT retenus
 *
 * RÔLE : Parse les messages texte de quelques sources de chat (JSON Kyiv Digital,
 * résumé des groupes) et republie l'état sous forme de topics MQTT retenus.
 *
 * ARCHITECTURE : parsers (purs) → routeur (pur) → publisher MQTT, pilotés par une
 * boucle unique alimentée par le topic inbox.
 */

pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod mqtt;
pub mod parsers;
pub mod router;
pub mod sources;

pub use bridge::{process_event, run, BridgeStats};
pub use error::{BusError, ConfigError};
pub use models::{BusWrite, Fact, InboundEvent, SourceBinding, SourceId};
pub use mqtt::{MqttBus, Publisher};
pub use parsers::{Parser, ParserKind};
pub use router::SourceRouter;
