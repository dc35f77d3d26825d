use crate::config::MqttSettings;
use crate::error::{BusError, ConfigError};
use crate::models::{BusWrite, InboundEvent, InboxEnvelope};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 64;

/// Contrat de publication : une écriture = une opération bus indépendante
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, write: &BusWrite) -> Result<(), BusError>;
}

pub fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidQos(other)),
    }
}

pub fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut opts = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    opts.set_keep_alive(Duration::from_secs(60));
    opts.set_clean_session(true);
    opts.set_credentials(&settings.username, &settings.password);
    opts
}

/// Bus MQTT partagé : un seul écrivain (la boucle de traitement)
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub fn connect(settings: &MqttSettings) -> (Self, EventLoop) {
        info!("MQTT: connecting to {}:{} ...", settings.host, settings.port);
        let (client, eventloop) = AsyncClient::new(mqtt_options(settings), REQUEST_CAPACITY);
        (Self { client }, eventloop)
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    /// Demande la déconnexion sans attendre de place dans la file de requêtes
    pub fn disconnect(&self) -> Result<(), BusError> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttBus {
    async fn publish(&self, write: &BusWrite) -> Result<(), BusError> {
        info!(
            topic = %write.topic,
            retain = write.retain,
            "MQTT PUBLISH {}",
            write.payload_str()
        );
        self.client
            .publish(write.topic.clone(), write.qos, write.retain, write.payload.clone())
            .await?;
        Ok(())
    }
}

/// Décode une enveloppe inbox ; None si le JSON est invalide
pub fn decode_envelope(payload: &[u8]) -> Option<InboundEvent> {
    match serde_json::from_slice::<InboxEnvelope>(payload) {
        Ok(envelope) => Some(envelope.into_event()),
        Err(e) => {
            warn!("invalid inbox envelope: {e}");
            None
        }
    }
}

/// Vrai si le topic reçu correspond au filtre inbox (wildcards `+`/`#` compris)
pub fn is_inbox_topic(topic: &str, inbox_filter: &str) -> bool {
    rumqttc::matches(topic, inbox_filter)
}

/// Demande l'abonnement à l'inbox sans attendre ; false si la file de requêtes
/// du client est pleine, l'appelant réessaie alors plus tard
pub fn request_subscribe(client: &AsyncClient, inbox_filter: &str) -> bool {
    match client.try_subscribe(inbox_filter, QoS::AtLeastOnce) {
        Ok(()) => true,
        Err(e) => {
            warn!("MQTT: subscribe to {inbox_filter} failed, will retry: {e}");
            false
        }
    }
}

/// Fait tourner l'event loop MQTT et transmet les messages de l'inbox.
/// Le canal est non borné : l'event loop ne doit jamais attendre la boucle de
/// traitement, qui elle attend l'event loop pour publier.
pub fn spawn_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    inbox_topic: String,
    inbox: mpsc::UnboundedSender<InboundEvent>,
) -> JoinHandle<()> {
    task::spawn(async move {
        let mut backoff = MIN_BACKOFF;
        // clean session : l'abonnement est perdu à chaque reconnexion
        let mut needs_subscribe = false;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    backoff = MIN_BACKOFF;
                    info!("MQTT: connected, subscribing to {inbox_topic}");
                    needs_subscribe = true;
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if is_inbox_topic(&p.topic, &inbox_topic) => {
                    if let Some(event) = decode_envelope(&p.payload) {
                        if inbox.send(event).is_err() {
                            debug!("inbox receiver dropped, stopping event loop");
                            break;
                        }
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT: disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if inbox.is_closed() {
                        break;
                    }
                    needs_subscribe = false;
                    warn!("MQTT error: {e}, retrying in {}s", backoff.as_secs());
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            }
            if needs_subscribe && request_subscribe(&client, &inbox_topic) {
                needs_subscribe = false;
            }
        }
    })
}
