/**
 * SOURCE ROUTER - Message entrant → écritures MQTT retenues
 *
 * RÔLE :
 * Résout la source d'un message, applique le parser lié et calcule les écritures :
 * - Kyiv Digital : power/<ns>/json/<ON|OFF>/<group> (payload JSON + timestamp)
 * - Résumé : power/<ns>/status, power/<ns>/total, power/<ns>/groups/<group>
 *
 * Source inconnue ou pas de match : aucune écriture, ce n'est pas une erreur.
 * Le routeur est pur : la publication effective est faite par la boucle (bridge.rs).
 */

use crate::models::{AddressOutage, BusWrite, Fact, GroupsSummary, SourceBinding, SourceId};
use rumqttc::QoS;
use serde_json::{json, Value};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::{debug, info};

pub struct SourceRouter {
    bindings: HashMap<SourceId, SourceBinding>,
    qos: QoS,
}

impl SourceRouter {
    /// Les identités sont supposées uniques (vérifié par `sources::build_bindings`) ;
    /// en cas de doublon, le dernier binding l'emporte.
    pub fn new(bindings: Vec<SourceBinding>, qos: QoS) -> Self {
        let bindings = bindings.into_iter().map(|b| (b.identity.clone(), b)).collect();
        Self { bindings, qos }
    }

    pub fn binding(&self, identity: &SourceId) -> Option<&SourceBinding> {
        self.bindings.get(identity)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &SourceBinding> {
        self.bindings.values()
    }

    pub fn route(&self, identity: &SourceId, text: &str, observed_at: OffsetDateTime) -> Vec<BusWrite> {
        let Some(binding) = self.bindings.get(identity) else {
            debug!(source = %identity, "message from unbound source ignored");
            return Vec::new();
        };

        info!(source = %identity, namespace = %binding.namespace, "new message: {text}");

        match binding.parser.parse(text) {
            Some(Fact::Address(fact)) => vec![self.address_write(&binding.namespace, fact, observed_at)],
            Some(Fact::Summary(fact)) => self.summary_writes(&binding.namespace, &fact),
            None => {
                info!(
                    namespace = %binding.namespace,
                    parser = %binding.parser.kind(),
                    "skipping: parser found no match"
                );
                Vec::new()
            }
        }
    }

    fn address_write(&self, namespace: &str, fact: AddressOutage, observed_at: OffsetDateTime) -> BusWrite {
        let mut payload = fact.attributes;
        payload.insert("timestamp".to_string(), json!(observed_at.unix_timestamp()));
        let topic = format!("power/{namespace}/json/{}/{}", fact.state.label(), fact.group);
        self.json_write(topic, &Value::Object(payload))
    }

    fn summary_writes(&self, namespace: &str, fact: &GroupsSummary) -> Vec<BusWrite> {
        let status = json!({ "total": fact.total, "groups": fact.ordered_values() });

        let mut writes = Vec::with_capacity(fact.groups.len() + 2);
        writes.push(self.json_write(format!("power/{namespace}/status"), &status));
        writes.push(self.number_write(format!("power/{namespace}/total"), fact.total));
        for (group, percent) in &fact.groups {
            writes.push(self.number_write(format!("power/{namespace}/groups/{group}"), *percent));
        }
        writes
    }

    fn json_write(&self, topic: String, payload: &Value) -> BusWrite {
        BusWrite {
            topic,
            payload: payload.to_string().into_bytes(),
            qos: self.qos,
            retain: true,
        }
    }

    fn number_write(&self, topic: String, value: u16) -> BusWrite {
        BusWrite {
            topic,
            payload: value.to_string().into_bytes(),
            qos: self.qos,
            retain: true,
        }
    }
}
