// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! An outbound sink publishing to an MQTT broker through rumqttc.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::PublisherError;
use crate::pubsub::{models::*, sink::*};

/// MQTT scheme
pub const MQTT_SCHEME: &str = "mqtt";

/// Default MQTT port
pub const MQTT_DEFAULT_PORT: u16 = 1883;

/// MQTT over TLS scheme
pub const MQTTS_SCHEME: &str = "mqtts";

/// Default MQTT over TLS port
pub const MQTTS_DEFAULT_PORT: u16 = 8883;

/// Max capacity of the request channel between client and event loop
const CHANNEL_CAPACITY: usize = 1000;

#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Transport {
    Tcp,
    Tls,
}

/// Configuration of an MQTT connection
#[derive(Debug, Clone, PartialEq)]
pub struct MQTTConfig {
    transport: Transport,
    domain: String,
    port: u16,
    path: String,
    client_id: String,
    keep_alive: Duration,
}

impl TryFrom<&str> for MQTTConfig {
    type Error = PublisherError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|err| {
            error!("Cannot parse MQTT url from {}", value);
            PublisherError::InvalidConfiguration(format!("{} is not a url, {}", value, err))
        })?;
        let domain = url.host_str().unwrap_or("");
        let path = url.path();
        match url.scheme() {
            MQTT_SCHEME => {
                let port = url.port().unwrap_or(MQTT_DEFAULT_PORT);
                Ok(MQTTConfig::new(Transport::Tcp, domain, port, path))
            }
            MQTTS_SCHEME => {
                let port = url.port().unwrap_or(MQTTS_DEFAULT_PORT);
                Ok(MQTTConfig::new(Transport::Tls, domain, port, path))
            }
            scheme => Err(PublisherError::InvalidConfiguration(format!(
                "{} is not an MQTT scheme",
                scheme
            ))),
        }
    }
}

impl MQTTConfig {
    pub fn new<S, T>(transport: Transport, domain: S, port: u16, path: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            transport,
            domain: domain.into(),
            port,
            path: path.into(),
            client_id: "OPCUARustPublisher".into(),
            keep_alive: Duration::from_secs(30),
        }
    }

    pub fn set_client_id<S>(&mut self, client_id: S)
    where
        S: Into<String>,
    {
        self.client_id = client_id.into();
    }

    pub fn as_url(&self) -> String {
        let (scheme, default_port) = match self.transport {
            Transport::Tcp => (MQTT_SCHEME, MQTT_DEFAULT_PORT),
            Transport::Tls => (MQTTS_SCHEME, MQTTS_DEFAULT_PORT),
        };
        if self.port == default_port {
            format!("{}://{}{}", scheme, self.domain, self.path)
        } else {
            format!("{}://{}:{}{}", scheme, self.domain, self.port, self.path)
        }
    }

    /// Prefix for topics, taken from the url path
    pub fn topic_prefix(&self) -> &str {
        self.path.trim_matches('/')
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.domain, self.port);
        options.set_keep_alive(self.keep_alive);
        if self.transport == Transport::Tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        options
    }
}

/// Publishes outbound messages to an MQTT broker
pub struct MqttSink {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttSink {
    /// Creates the sink and spawns the task driving its connection. The task reconnects on error
    /// until the token is cancelled.
    pub fn connect(config: &MQTTConfig, cancel: CancellationToken) -> (MqttSink, JoinHandle<()>) {
        info!("Connecting to MQTT broker {}", config.as_url());
        let (client, event_loop) = AsyncClient::new(config.options(), CHANNEL_CAPACITY);
        let poll_client = client.clone();
        let handle = tokio::spawn(poll(event_loop, poll_client, cancel));
        let sink = MqttSink {
            client,
            topic_prefix: config.topic_prefix().to_string(),
        };
        (sink, handle)
    }

    fn topic(&self, topic: &str) -> String {
        if self.topic_prefix.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{}", self.topic_prefix, topic)
        }
    }
}

fn qos(qos: BrokerTransportQualityOfService) -> QoS {
    match qos {
        BrokerTransportQualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        BrokerTransportQualityOfService::ExactlyOnce => QoS::ExactlyOnce,
        BrokerTransportQualityOfService::AtMostOnce | BrokerTransportQualityOfService::BestEffort => {
            QoS::AtMostOnce
        }
        BrokerTransportQualityOfService::NotSpecified => QoS::AtLeastOnce,
    }
}

async fn poll(mut event_loop: EventLoop, client: AsyncClient, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = client.disconnect().await;
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to MQTT broker"),
                Ok(event) => trace!("MQTT event {:?}", event),
                Err(err) => {
                    warn!("MQTT connection error {}, retrying", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    debug!("MQTT event loop has stopped");
}

#[async_trait]
impl OutboundSink for MqttSink {
    async fn enqueue(&self, message: OutboundMessage) -> EnqueueResult {
        let topic = self.topic(&message.topic);
        match self
            .client
            .try_publish(topic, qos(message.qos), message.retain, message.payload)
        {
            Ok(_) => EnqueueResult::Ok,
            Err(err) => {
                debug!("MQTT client refused message, {}", err);
                EnqueueResult::Dropped
            }
        }
    }
}

#[test]
fn parse_mqtt_url() {
    // Default port
    let cfg = MQTTConfig::try_from("mqtt://foo/xyz").unwrap();
    assert_eq!(cfg.transport, Transport::Tcp);
    assert_eq!(cfg.port, MQTT_DEFAULT_PORT);
    assert_eq!(cfg.as_url(), "mqtt://foo/xyz");
    assert_eq!(cfg.topic_prefix(), "xyz");

    // Other port
    let cfg = MQTTConfig::try_from("mqtt://foo:1234/xyz").unwrap();
    assert_eq!(cfg.transport, Transport::Tcp);
    assert_eq!(cfg.domain, "foo");
    assert_eq!(cfg.port, 1234);
    assert_eq!(cfg.path, "/xyz");
    assert_eq!(cfg.as_url(), "mqtt://foo:1234/xyz");

    // Tls
    let cfg = MQTTConfig::try_from("mqtts://foo/xyz").unwrap();
    assert_eq!(cfg.transport, Transport::Tls);
    assert_eq!(cfg.port, MQTTS_DEFAULT_PORT);
    assert_eq!(cfg.as_url(), "mqtts://foo/xyz");

    // Path
    let cfg = MQTTConfig::try_from("mqtt://foo").unwrap();
    assert_eq!(cfg.port, MQTT_DEFAULT_PORT);
    assert_eq!(cfg.path, "/");
    assert_eq!(cfg.topic_prefix(), "");

    assert!(MQTTConfig::try_from("mtqq:/").is_err());
    assert!(MQTTConfig::try_from("foo:1234/").is_err());
}

#[test]
fn map_qos() {
    assert_eq!(qos(BrokerTransportQualityOfService::NotSpecified), QoS::AtLeastOnce);
    assert_eq!(qos(BrokerTransportQualityOfService::BestEffort), QoS::AtMostOnce);
    assert_eq!(qos(BrokerTransportQualityOfService::ExactlyOnce), QoS::ExactlyOnce);
}
