/*!
Test Harness pour le pont svitlo

Facilite l'écriture de tests de bout en bout avec:
- Sources configurées comme dans options.json
- Envoi de messages sans broker ni relais
- Assertions sur les topics et payloads publiés
*/

use crate::mqtt_stub::MockMqttClient;
use anyhow::Result;
use rumqttc::QoS;
use serde_json::Value;
use std::collections::HashMap;
use svitlo_bridge::parsers::address::DEFAULT_STRIP_FIELDS;
use svitlo_bridge::sources::build_bindings;
use svitlo_bridge::{process_event, BridgeStats, InboundEvent, SourceId, SourceRouter};
use time::OffsetDateTime;

/// Harness de test complet pour le pont
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub router: SourceRouter,
    stats: BridgeStats,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
}

impl TestHarness {
    /// Crée un harness à partir de specs "<chat> <namespace> <parser>"
    pub fn new(specs: &[&str]) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let specs: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        let strip_fields = DEFAULT_STRIP_FIELDS.map(String::from);
        let bindings = build_bindings(&specs, &strip_fields)?;
        Ok(Self::with_router(SourceRouter::new(bindings, QoS::AtLeastOnce)))
    }

    /// Harness autour d'un routeur déjà construit (ex: depuis une config chargée)
    pub fn with_router(router: SourceRouter) -> Self {
        Self {
            mqtt_client: MockMqttClient::new(),
            router,
            stats: BridgeStats::default(),
            expectations: Vec::new(),
        }
    }

    /// Ajoute une expectation: on s'attend à N messages sur un topic
    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: topic.to_string(),
            expected_count: count,
        });
        self
    }

    /// Envoie un message daté au pont et attend la fin des publications
    pub async fn send_at(&mut self, source: &str, text: &str, observed_at: OffsetDateTime) -> Result<()> {
        let event = InboundEvent {
            source: SourceId::new(source),
            text: text.to_string(),
            observed_at,
        };
        process_event(&self.router, &self.mqtt_client, &event, &mut self.stats).await;
        log::info!("📨 Sent message from {}", source);
        Ok(())
    }

    /// Envoie un message horodaté maintenant
    pub async fn send(&mut self, source: &str, text: &str) -> Result<()> {
        self.send_at(source, text, OffsetDateTime::now_utc()).await
    }

    /// Vérifie toutes les expectations configurées
    pub fn verify_expectations(&self) -> Result<()> {
        log::info!("🔍 Verifying {} expectations...", self.expectations.len());

        for expectation in &self.expectations {
            let actual_count = self.mqtt_client.find_messages_by_topic(&expectation.topic).len();
            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic,
                    expectation.expected_count,
                    actual_count
                );
            }
        }

        log::info!("🎉 All expectations verified successfully");
        Ok(())
    }

    /// Assert qu'un payload texte exact a été publié sur un topic
    pub fn assert_text_sent(&self, topic: &str, expected: &str) -> Result<()> {
        if self
            .mqtt_client
            .find_messages_by_topic(topic)
            .iter()
            .any(|msg| msg.text() == expected)
        {
            return Ok(());
        }
        anyhow::bail!("Expected payload '{}' not found on topic: {}", expected, topic);
    }

    /// Assert qu'un message JSON spécifique a été publié
    pub fn assert_message_sent(&self, topic: &str, expected_payload: &Value) -> Result<()> {
        for msg in self.mqtt_client.find_messages_by_topic(topic) {
            let payload: Value = serde_json::from_slice(&msg.payload)?;
            if payload == *expected_payload {
                return Ok(());
            }
        }
        anyhow::bail!("Expected message not found on topic: {}", topic);
    }

    /// Assert qu'un champ a une valeur spécifique dans le dernier message
    pub fn assert_field_equals(&self, topic: &str, field: &str, expected: &Value) -> Result<()> {
        let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? else {
            anyhow::bail!("No message on {}", topic);
        };
        match msg.get(field) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!("Field '{}' mismatch: expected {:?}, got {:?}", field, expected, actual),
            None => anyhow::bail!("Field '{}' not found in latest message on {}", field, topic),
        }
    }

    /// Assert qu'un champ est absent du dernier message
    pub fn assert_field_absent(&self, topic: &str, field: &str) -> Result<()> {
        match self.mqtt_client.get_last_json_message::<Value>(topic)? {
            Some(msg) if msg.get(field).is_some() => anyhow::bail!("Field '{}' present on {}", field, topic),
            Some(_) => Ok(()),
            None => anyhow::bail!("No message on {}", topic),
        }
    }

    /// Stats sur les messages collectés
    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();
        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }
        TestStats {
            total_messages: messages.len(),
            topic_counts,
            bridge: self.stats,
        }
    }

    /// Reset le harness pour un nouveau test
    pub fn reset(&mut self) {
        self.mqtt_client.clear();
        self.expectations.clear();
        self.stats = BridgeStats::default();
        log::info!("🧹 Test harness reset");
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub bridge: BridgeStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_stub::MessageBuilder;
    use serde_json::json;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let mut harness = TestHarness::new(&["-100111 kyiv parse_kyiv_digital"]).unwrap();
        harness.expect_messages("power/kyiv/json/ON/6.1", 1);

        let text = MessageBuilder::kyiv_digital(json!(true), "6.1", json!({}));
        harness.send("-100111", &text).await.unwrap();

        harness.verify_expectations().unwrap();
        harness.assert_field_equals("power/kyiv/json/ON/6.1", "power", &json!(true)).unwrap();
        harness.assert_field_absent("power/kyiv/json/ON/6.1", "text").unwrap();

        let stats = harness.get_stats();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.bridge.routed, 1);
    }

    #[tokio::test]
    async fn test_failed_expectation_reports() {
        let mut harness = TestHarness::new(&["-100111 kyiv parse_kyiv_digital"]).unwrap();
        harness.expect_messages("power/kyiv/json/ON/1", 1);
        harness.send("-100111", "pas de JSON").await.unwrap();
        assert!(harness.verify_expectations().is_err());

        harness.reset();
        assert!(harness.verify_expectations().is_ok());
        assert_eq!(harness.get_stats().bridge.received, 0);
    }

    #[test]
    fn test_invalid_specs_are_rejected() {
        assert!(TestHarness::new(&["@chan kyiv parse_nothing"]).is_err());
        assert!(TestHarness::new(&[]).is_err());
    }
}
