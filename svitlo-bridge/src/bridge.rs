/**
 * BRIDGE - Boucle de traitement sérialisée inbox → routeur → bus
 *
 * FONCTIONNEMENT :
 * Un seul chemin de traitement : chaque message est entièrement traité (parse,
 * routage, toutes les publications) avant le suivant. L'ordre par source est
 * donc celui de réception.
 *
 * ARRÊT :
 * Le signal d'arrêt est observé aussi pendant les publications : un message en
 * cours dont le bus ne répond plus (broker injoignable, file de requêtes
 * pleine) est abandonné, puis la boucle rend la main pour la déconnexion.
 */

use crate::models::InboundEvent;
use crate::mqtt::Publisher;
use crate::router::SourceRouter;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Compteurs de la boucle, journalisés à l'arrêt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: u64,
    pub routed: u64,
    pub published: u64,
    pub failed: u64,
}

/// Traite un message : route puis publie chaque écriture indépendamment.
/// Une publication en échec est journalisée et n'empêche pas les suivantes.
pub async fn process_event<P>(router: &SourceRouter, publisher: &P, event: &InboundEvent, stats: &mut BridgeStats)
where
    P: Publisher + ?Sized,
{
    stats.received += 1;
    let writes = router.route(&event.source, &event.text, event.observed_at);
    if writes.is_empty() {
        return;
    }
    stats.routed += 1;

    for write in &writes {
        match publisher.publish(write).await {
            Ok(()) => stats.published += 1,
            Err(e) => {
                stats.failed += 1;
                warn!(topic = %write.topic, "publish failed: {e}");
            }
        }
    }
}

/// Consomme l'inbox jusqu'au signal d'arrêt ou à la fermeture du canal
pub async fn run<P, S>(
    router: &SourceRouter,
    publisher: &P,
    mut inbox: mpsc::UnboundedReceiver<InboundEvent>,
    shutdown: S,
) -> BridgeStats
where
    P: Publisher + ?Sized,
    S: Future<Output = ()>,
{
    let mut stats = BridgeStats::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("shutdown requested, stopping intake");
                break;
            }
            event = inbox.recv() => match event {
                Some(event) => {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            info!(source = %event.source, "shutdown requested, abandoning in-flight writes");
                            break;
                        }
                        _ = process_event(router, publisher, &event, &mut stats) => {}
                    }
                }
                None => {
                    info!("inbox closed");
                    break;
                }
            },
        }
    }

    info!(
        received = stats.received,
        routed = stats.routed,
        published = stats.published,
        failed = stats.failed,
        "bridge stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;
    use crate::models::{BusWrite, SourceId};
    use crate::sources::build_bindings;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rumqttc::QoS;
    use time::OffsetDateTime;

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<BusWrite>>,
        fail_topic: Option<String>,
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, write: &BusWrite) -> Result<(), BusError> {
            if self.fail_topic.as_deref() == Some(write.topic.as_str()) {
                return Err(BusError::Client(rumqttc::ClientError::TryRequest(
                    rumqttc::Request::Disconnect(rumqttc::Disconnect),
                )));
            }
            self.writes.lock().push(write.clone());
            Ok(())
        }
    }

    fn router() -> SourceRouter {
        let specs = vec![
            "-100111 kyiv parse_kyiv_digital".to_string(),
            "-100222 summary parse_groups_summary".to_string(),
        ];
        SourceRouter::new(build_bindings(&specs, &[]).unwrap(), QoS::AtLeastOnce)
    }

    fn event(source: &str, text: &str) -> InboundEvent {
        InboundEvent {
            source: SourceId::new(source),
            text: text.to_string(),
            observed_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn test_run_preserves_order_and_stops_when_inbox_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("-100111", r#"{"power": false, "group": "1"}"#)).unwrap();
        tx.send(event("-999", "ignored")).unwrap();
        tx.send(event("-100111", r#"{"power": true, "group": "1"}"#)).unwrap();
        drop(tx);

        let recorder = Recorder::default();
        let stats = run(&router(), &recorder, rx, std::future::pending()).await;

        let topics: Vec<String> = recorder.writes.lock().iter().map(|w| w.topic.clone()).collect();
        assert_eq!(topics, vec!["power/kyiv/json/OFF/1", "power/kyiv/json/ON/1"]);
        assert_eq!(stats, BridgeStats { received: 3, routed: 2, published: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_shutdown_stops_intake() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("-100111", r#"{"power": true, "group": "1"}"#)).unwrap();

        let recorder = Recorder::default();
        let stats = run(&router(), &recorder, rx, async {}).await;

        assert_eq!(stats.received, 0);
        assert!(recorder.writes.lock().is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_writes_stuck_on_unreachable_broker() {
        use crate::config::MqttSettings;
        use crate::mqtt::MqttBus;
        use std::time::Duration;

        let settings = MqttSettings {
            host: "127.0.0.1".into(),
            port: 1,
            username: "addons".into(),
            password: "secret".into(),
            client_id: "svitlo2mqtt-test".into(),
            qos: QoS::AtLeastOnce,
            inbox_topic: "svitlo/inbox".into(),
        };
        // event loop jamais interrogé : la file de requêtes du client ne se vide pas
        let (bus, _eventloop) = MqttBus::connect(&settings);

        // 70 groupes → 72 écritures, plus que la capacité de la file
        let text: String = (1..=70).map(|g| format!("Група {g}: 50%\n")).collect();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("-100222", &text)).unwrap();

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let stats = tokio::time::timeout(Duration::from_secs(5), run(&router(), &bus, rx, shutdown))
            .await
            .expect("bridge loop must stop on shutdown");

        assert_eq!(stats.received, 1);
        assert!(stats.published < 72);
        // file toujours pleine : la déconnexion échoue sans bloquer
        assert!(bus.disconnect().is_err());
        drop(tx);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_others() {
        let recorder = Recorder {
            fail_topic: Some("power/summary/total".into()),
            ..Recorder::default()
        };
        let mut stats = BridgeStats::default();
        process_event(&router(), &recorder, &event("-100222", "Група 1: 10%\nГрупа 2: 20%"), &mut stats).await;

        assert_eq!(stats.published, 3);
        assert_eq!(stats.failed, 1);
        let topics: Vec<String> = recorder.writes.lock().iter().map(|w| w.topic.clone()).collect();
        assert_eq!(
            topics,
            vec!["power/summary/status", "power/summary/groups/1", "power/summary/groups/2"]
        );
    }
}
