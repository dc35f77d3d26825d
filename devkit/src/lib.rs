/*!
# Svitlo DevKit - Stubs et utilitaires pour le développement du pont

Bibliothèque facilitant les tests du pont svitlo avec:
- Stub MQTT en mémoire (publications enregistrées, cache des messages retenus)
- Générateurs de messages Kyiv Digital et de résumés de groupes
- Harness de test : sources configurées, envoi de messages, assertions sur les topics
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MessageBuilder, MockMqttClient};
pub use test_utils::TestHarness;
