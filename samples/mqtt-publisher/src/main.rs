// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! This sample publishes simulated values of the variables in a publisher configuration to an
//! MQTT broker.
//!
//! 1. Read the publisher configuration (publisher.yaml unless --config says otherwise)
//! 2. Connect to the broker specified by the url
//! 3. Feed simulated values of every published variable to the publisher until Ctrl-C
use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use opcua_publisher::{
    core::config::Config,
    pubsub::{
        prelude::*,
        sink::mqtt::{MQTTConfig, MqttSink},
    },
    types::{DataValue, DateTime},
};

struct Args {
    help: bool,
    config: String,
    url: String,
    client_id: String,
    rate: u64,
}

impl Args {
    pub fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();
        Ok(Args {
            help: args.contains(["-h", "--help"]),
            config: args
                .opt_value_from_str("--config")?
                .unwrap_or_else(|| String::from(DEFAULT_CONFIG)),
            url: args
                .opt_value_from_str("--url")?
                .unwrap_or_else(|| String::from(DEFAULT_URL)),
            client_id: args
                .opt_value_from_str("--client-id")?
                .unwrap_or_else(|| String::from(DEFAULT_CLIENT_ID)),
            rate: args.opt_value_from_str("--rate")?.unwrap_or(DEFAULT_RATE),
        })
    }

    pub fn usage() {
        println!(
            r#"MQTT Publisher
Usage:
  -h, --help           Show help
  --config [file]      Publisher configuration to load (default: {})
  --url [url]          MQTT broker url, a path becomes the topic prefix (default: {})
  --client-id [id]     MQTT client id (default: {})
  --rate [ms]          Interval between simulated values (default: {})"#,
            DEFAULT_CONFIG, DEFAULT_URL, DEFAULT_CLIENT_ID, DEFAULT_RATE
        );
    }
}

const DEFAULT_CONFIG: &str = "publisher.yaml";
const DEFAULT_URL: &str = "mqtt://broker.hivemq.com/opcua-rust";
const DEFAULT_CLIENT_ID: &str = "opcua-rust-publisher";
const DEFAULT_RATE: u64 = 500;

/// Produces a new value for every published variable on each tick
struct SimulatedSource {
    fields: Vec<(u16, u16, String)>,
    timer: Interval,
    next: usize,
    tick: u64,
}

impl SimulatedSource {
    fn new(config: &PublisherConfig, rate: Duration) -> SimulatedSource {
        let mut fields = Vec::new();
        for group in &config.writer_groups {
            for writer in &group.data_set_writers {
                let Some(data_set) = writer.data_set.as_ref() else {
                    continue;
                };
                if let PublishedDataSetSource::PublishedVariables(variables) = &data_set.data_set_source {
                    for v in variables {
                        fields.push((
                            group.writer_group_id,
                            writer.data_set_writer_id,
                            v.field_id(),
                        ));
                    }
                }
            }
        }
        let mut timer = interval(rate);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        SimulatedSource {
            fields,
            timer,
            next: 0,
            tick: 0,
        }
    }
}

#[async_trait]
impl NotificationSource for SimulatedSource {
    async fn next(&mut self) -> Option<SourceEvent> {
        if self.fields.is_empty() {
            return None;
        }
        if self.next == 0 {
            self.timer.tick().await;
            self.tick += 1;
        }
        let (writer_group_id, data_set_writer_id, field_id) = self.fields[self.next].clone();
        let phase = self.next as f64 + self.tick as f64 / 20.0;
        self.next = (self.next + 1) % self.fields.len();
        Some(SourceEvent::Notification {
            writer_group_id,
            data_set_writer_id,
            notification: Notification::DataChange {
                field_id,
                value: DataValue::new_at(50.0 + 25.0 * phase.sin(), DateTime::now()),
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), ()> {
    // Read command line arguments
    let args = Args::parse_args().map_err(|_| Args::usage())?;
    if args.help {
        Args::usage();
        return Ok(());
    }

    // Optional - enable logging
    opcua_publisher::console_logging::init();

    let config: PublisherConfig = PublisherConfig::load(&PathBuf::from(&args.config)).map_err(|err| {
        println!("ERROR: Cannot load configuration {}, {}", args.config, err);
    })?;
    let mut mqtt = MQTTConfig::try_from(args.url.as_str()).map_err(|err| {
        println!("ERROR: {}", err);
    })?;
    mqtt.set_client_id(&args.client_id);

    let cancel = CancellationToken::new();
    let (sink, connection) = MqttSink::connect(&mqtt, cancel.clone());
    let source = SimulatedSource::new(&config, Duration::from_millis(args.rate));

    let mut publisher = PublisherBuilder::new()
        .config(config)
        .sink(Arc::new(sink))
        .build()
        .map_err(|err| {
            println!("ERROR: Cannot create the publisher, {}", err);
        })?;
    publisher.start(Box::new(source)).await.map_err(|err| {
        println!("ERROR: Cannot start the publisher, {}", err);
    })?;

    println!("Publishing to {}, press Ctrl-C to stop", mqtt.as_url());
    let _ = tokio::signal::ctrl_c().await;

    publisher.stop(false).await;
    // Let the client flush what was published during the stop
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    let _ = connection.await;
    Ok(())
}
