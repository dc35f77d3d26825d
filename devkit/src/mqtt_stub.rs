/*!
Mock MQTT Client pour développement sans broker

Implémente `Publisher` du pont : enregistre toutes les écritures, tient un cache
des messages retenus (dernière valeur par topic) et simule l'inbox du relais.
*/

use anyhow::Result;
use async_trait::async_trait;
use rumqttc::QoS;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use svitlo_bridge::mqtt::{decode_envelope, Publisher};
use svitlo_bridge::{BusError, BusWrite, InboundEvent};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl From<&BusWrite> for MockMessage {
    fn from(write: &BusWrite) -> Self {
        Self {
            topic: write.topic.clone(),
            payload: write.payload.clone(),
            qos: write.qos,
            retain: write.retain,
        }
    }
}

impl MockMessage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Mock MQTT Client qui remplace `MqttBus` dans les tests
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    retained: Arc<Mutex<BTreeMap<String, MockMessage>>>,
    inbox_sender: Arc<Mutex<Option<mpsc::UnboundedSender<InboundEvent>>>>,
    offline: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canal de l'inbox simulée, à passer à `svitlo_bridge::run`
    pub fn setup_inbox(&self) -> mpsc::UnboundedReceiver<InboundEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.inbox_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Ferme l'inbox : la boucle du pont s'arrête après les messages en attente
    pub fn close_inbox(&self) {
        self.inbox_sender.lock().unwrap().take();
    }

    /// Simule une enveloppe JSON publiée par le relais sur le topic inbox
    pub fn simulate_incoming(&self, envelope: &Value) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let event = decode_envelope(&payload).ok_or_else(|| anyhow::anyhow!("invalid envelope: {envelope}"))?;

        let guard = self.inbox_sender.lock().unwrap();
        let sender = guard.as_ref().ok_or_else(|| anyhow::anyhow!("inbox not set up"))?;
        sender.send(event).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;

        log::info!("📨 [MOCK] Simulated incoming from {}", envelope["source"]);
        Ok(())
    }

    /// Simule un broker injoignable : les publications échouent
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Valeur retenue courante d'un topic, comme la verrait un abonné tardif
    pub fn retained_text(&self, topic: &str) -> Option<String> {
        self.retained.lock().unwrap().get(topic).map(MockMessage::text)
    }

    /// Topics ayant une valeur retenue, triés
    pub fn retained_topics(&self) -> Vec<String> {
        self.retained.lock().unwrap().keys().cloned().collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.retained.lock().unwrap().clear();
    }
}

#[async_trait]
impl Publisher for MockMqttClient {
    async fn publish(&self, write: &BusWrite) -> Result<(), BusError> {
        if self.offline.load(Ordering::SeqCst) {
            log::warn!("📵 [MOCK] Offline, dropping {}", write.topic);
            return Err(BusError::Client(rumqttc::ClientError::Request(
                rumqttc::Request::Disconnect(rumqttc::Disconnect),
            )));
        }

        let message = MockMessage::from(write);
        if message.retain {
            self.retained.lock().unwrap().insert(message.topic.clone(), message.clone());
        }
        log::info!("📤 [MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Générateur de messages tels que les publient les chaînes surveillées
pub struct MessageBuilder;

impl MessageBuilder {
    /// Message Kyiv Digital : bloc JSON entouré de texte
    pub fn kyiv_digital(power: Value, group: &str, extra: Value) -> String {
        let mut body = serde_json::Map::new();
        body.insert("power".into(), power);
        if let Value::Object(fields) = extra {
            body.extend(fields);
        }
        body.insert("group".into(), Value::String(group.to_string()));
        body.insert("text".into(), Value::String("Оновлення графіка".into()));
        body.insert("address".into(), Value::String("м. Київ, вул. Хрещатик, 1".into()));
        format!("⚡️ Kyiv Digital\n{}\nДеталі в застосунку", Value::Object(body))
    }

    /// Résumé des groupes avec en-tête optionnel, flèches et heures comprises
    pub fn groups_summary(header: Option<u16>, groups: &[(&str, u16)]) -> String {
        let mut text = String::new();
        if let Some(total) = header {
            text.push_str(&format!("🟠 {total}% 🔴 🟠 🟠 🟠 🟠 🟠\n\n"));
        }
        for (i, (group, percent)) in groups.iter().enumerate() {
            let trend = if i % 2 == 0 { " 📈" } else { "" };
            text.push_str(&format!("Група {group}: {percent}% 11:{:02}{trend}\n", 30 + i));
        }
        text
    }

    /// Enveloppe inbox du relais de chat
    pub fn inbox_envelope(source: &str, text: &str, date: i64) -> Value {
        serde_json::json!({
            "source": source,
            "text": text,
            "date": date
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svitlo_bridge::parsers::{AddressOutageParser, GroupsSummaryParser};

    fn write(topic: &str, payload: &str) -> BusWrite {
        BusWrite {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }

    #[tokio::test]
    async fn test_mock_client_publish() {
        let client = MockMqttClient::new();
        client.publish(&write("power/kyiv/total", "40")).await.unwrap();
        client.publish(&write("power/kyiv/total", "59")).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "40");
        assert_eq!(client.retained_text("power/kyiv/total").as_deref(), Some("59"));
        assert_eq!(client.retained_topics(), vec!["power/kyiv/total"]);
    }

    #[tokio::test]
    async fn test_offline_publish_fails() {
        let client = MockMqttClient::new();
        client.set_offline(true);
        assert!(client.publish(&write("power/kyiv/total", "1")).await.is_err());
        assert!(client.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_inbox() {
        let client = MockMqttClient::new();
        assert!(client.simulate_incoming(&MessageBuilder::inbox_envelope("-1", "x", 0)).is_err());

        let mut inbox = client.setup_inbox();
        client
            .simulate_incoming(&MessageBuilder::inbox_envelope("@Svitlo", "Група 1: 5%", 1_730_000_000))
            .unwrap();
        let event = inbox.recv().await.unwrap();
        assert_eq!(event.source.as_str(), "@svitlo");
        assert_eq!(event.observed_at.unix_timestamp(), 1_730_000_000);
    }

    #[test]
    fn test_message_builders_parse() {
        let text = MessageBuilder::kyiv_digital(Value::Bool(false), "1.1", serde_json::json!({"time_to": 25}));
        let fact = AddressOutageParser::default().parse(&text).unwrap();
        assert_eq!(fact.group, "1.1");
        assert_eq!(fact.attributes["time_to"], 25);

        let text = MessageBuilder::groups_summary(Some(59), &[("1", 31), ("2", 51)]);
        let summary = GroupsSummaryParser.parse(&text).unwrap();
        assert_eq!(summary.total, 59);
        assert_eq!(summary.ordered_values(), vec![31, 51]);
    }
}
