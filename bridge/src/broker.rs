use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock, PoisonError,
    },
    time::Duration,
};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, Outgoing, QoS};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use irmqtt_common::{AirConditioner, DeviceConfig, StatusUpdate, TopicSet};

use crate::{
    ack::AckTracker,
    capability::CommandPublisher,
    options::build_connection_options,
};

const MAX_STATUS_PAYLOAD_BYTES: usize = 256;
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Live connection handle shared by publishers and the event-loop task.
#[derive(Clone)]
pub struct BrokerConnection {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    acks: Arc<AckTracker>,
    // Held across enqueue and hand-off so waiters match packet order.
    publish_order: Arc<std::sync::Mutex<()>>,
}

impl BrokerConnection {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Owns one accessory's broker connection and its inbound status path.
///
/// The inbound path only mutates the shared [`AirConditioner`] record. Commands
/// leave through [`BrokerBridge::publish`], which nothing on the inbound path calls.
pub struct BrokerBridge {
    name: String,
    topics: TopicSet,
    accessory: Arc<Mutex<AirConditioner>>,
    connection: OnceLock<BrokerConnection>,
}

impl BrokerBridge {
    pub fn new(name: &str, topics: TopicSet, accessory: Arc<Mutex<AirConditioner>>) -> Self {
        Self {
            name: name.to_string(),
            topics,
            accessory,
            connection: OnceLock::new(),
        }
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Opens the connection and subscribes to the prefix subtree. Calling it again
    /// returns the existing handle.
    pub async fn connect(
        self: &Arc<Self>,
        config: &DeviceConfig,
    ) -> anyhow::Result<BrokerConnection> {
        if let Some(existing) = self.connection.get() {
            debug!("{}: already connected to mqtt broker, skipping connection", self.name);
            return Ok(existing.clone());
        }

        let options = build_connection_options(config)?;
        info!(
            "{}: connecting to mqtt://{}:{} as '{}' (tls: {})",
            self.name,
            options.address.host,
            options.address.port,
            options.client_id,
            options.tls.is_some()
        );

        let (client, eventloop) =
            AsyncClient::new(options.mqtt_options()?, REQUEST_CHANNEL_CAPACITY);
        let connection = BrokerConnection {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            acks: Arc::new(AckTracker::default()),
            publish_order: Arc::new(std::sync::Mutex::new(())),
        };

        if self.connection.set(connection.clone()).is_err() {
            debug!("{}: connection raced with another connect call", self.name);
            return self
                .connection
                .get()
                .cloned()
                .context("mqtt connection vanished after initialisation");
        }

        self.clone().spawn_event_loop(connection.clone(), eventloop);

        let filter = self.topics.subscription();
        connection
            .client
            .subscribe(filter.as_str(), QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {filter}"))?;

        Ok(connection)
    }

    /// Publishes at QoS 2 with retain and waits for the broker's PUBCOMP.
    /// Without a live connection the message is logged and dropped.
    pub async fn publish(&self, topic: &str, payload: &str) {
        let Some(completion) = self.enqueue(topic, payload) else {
            return;
        };
        if completion.await.is_err() {
            warn!("{}: publish to '{topic}' was abandoned before completion", self.name);
        }
    }

    /// Queues a QoS 2 retained publish without waiting on the network. The
    /// receiver fires on PUBCOMP.
    pub fn enqueue(&self, topic: &str, payload: &str) -> Option<oneshot::Receiver<()>> {
        let connection = match self.connection.get() {
            Some(connection) if connection.is_connected() => connection,
            _ => {
                error!("{}: not connected to mqtt server", self.name);
                error!("{}: cannot send message to '{topic}': '{payload}'", self.name);
                return None;
            }
        };

        debug!(
            "{}: publish to '{topic}': '{payload}' ({} awaiting completion)",
            self.name,
            connection.acks.pending()
        );

        let _order = connection
            .publish_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let completion = connection.acks.enqueue();
        if let Err(err) = connection.client.try_publish(
            topic,
            QoS::ExactlyOnce,
            true,
            payload.as_bytes().to_vec(),
        ) {
            connection.acks.cancel_last();
            error!("{}: failed to queue publish to '{topic}': {err}", self.name);
            return None;
        }
        Some(completion)
    }

    pub fn on_connect(&self) {
        info!("{}: connected to mqtt server", self.name);
    }

    /// Reconnection is left to the client's event loop, which retries on the next poll.
    pub fn on_close(&self, reason: &str) {
        error!("{}: disconnected from mqtt server: {reason}", self.name);
    }

    pub async fn on_message(&self, topic: &str, payload: &[u8]) {
        if payload.len() > MAX_STATUS_PAYLOAD_BYTES {
            warn!(
                "{}: dropping oversized mqtt payload on '{topic}' ({} bytes)",
                self.name,
                payload.len()
            );
            return;
        }

        let message = String::from_utf8_lossy(payload).trim().to_lowercase();
        debug!("{}: received mqtt message on '{topic}': {message}", self.name);

        if !self.topics.in_namespace(topic) {
            debug!("{}: ignoring message on unexpected topic '{topic}'", self.name);
            return;
        }

        let Some(attribute) = self.topics.status_attribute(topic) else {
            debug!("{}: no status mapping for '{topic}'", self.name);
            return;
        };

        let result = {
            let mut accessory = self.accessory.lock().await;
            accessory.apply_status(attribute, &message)
        };

        match result {
            Ok(StatusUpdate::Ignored(attribute)) => {
                debug!("{}: {} status has no capability", self.name, attribute.as_str());
            }
            Ok(update) => debug!("{}: status update {update:?}", self.name),
            Err(err) => {
                error!(
                    "{}: failed to process mqtt message on '{topic}' (maybe check the mqtt version?): {err}",
                    self.name
                );
            }
        }
    }

    fn spawn_event_loop(self: Arc<Self>, connection: BrokerConnection, mut eventloop: EventLoop) {
        tokio::spawn(async move {
            let mut ever_connected = false;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        self.on_message(&message.topic, &message.payload).await;
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        connection.connected.store(true, Ordering::Relaxed);
                        self.on_connect();
                        // A clean session forgets the subscription made before the outage.
                        if ever_connected && !ack.session_present {
                            self.resubscribe(&connection);
                        }
                        ever_connected = true;
                    }
                    Ok(Event::Incoming(Incoming::PubComp(ack))) => {
                        connection.acks.on_complete(ack.pkid);
                    }
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                        connection.acks.on_outgoing(pkid);
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        connection.connected.store(false, Ordering::Relaxed);
                        self.on_close("broker sent disconnect");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        if connection.connected.swap(false, Ordering::Relaxed) {
                            self.on_close(&err.to_string());
                        } else {
                            warn!("{}: mqtt poll error: {err}", self.name);
                        }
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                }
            }
        });
    }

    fn resubscribe(&self, connection: &BrokerConnection) {
        let filter = self.topics.subscription();
        if let Err(err) = connection.client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
            error!("{}: failed to resubscribe to {filter}: {err}", self.name);
        }
    }
}

impl CommandPublisher for BrokerBridge {
    fn enqueue(&self, topic: &str, payload: &str) -> Option<oneshot::Receiver<()>> {
        BrokerBridge::enqueue(self, topic, payload)
    }
}
