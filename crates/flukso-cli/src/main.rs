//! # Flukso CLI
//!
//! Command-line utilities for inspecting device configurations, the
//! entities derived from them, and live devices.

use anyhow::{bail, Context, Result};
use flukso_core::{
    build_entities, AuxDocument, ConfigDocument, ConfigDocuments, ConfigKind, DeviceHash, DeviceProfile,
    Identity, Reading, TransformError, ValueTransform,
};
use flukso_discovery::{DiscoveryCoordinator, DiscoveryTimeouts, MqttBus, MqttBusConfig, PubSub};
use flukso_proto::TopicScheme;
use std::env;
use std::path::Path;
use std::sync::Arc;

const PLACEHOLDER_HASH: &str = "00000000000000000000000000000000";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "entities" => {
            if args.len() < 3 {
                eprintln!("Usage: flukso entities <sensor.json> [--kube <file>] [--flx <file>] [--hash <hash>] [--serial <s> --firmware <f>]");
                std::process::exit(1);
            }
            let options = EntityOptions::parse(&args[2..])?;
            let profile = options.load()?;
            let topics = TopicScheme::default();
            let report = build_entities(&profile);

            let documents: Vec<serde_json::Value> = report
                .descriptors()
                .map(|descriptor| {
                    serde_json::json!({
                        "topic": topics.discovery(descriptor.platform, &descriptor.unique_id),
                        "config": descriptor,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&documents)?);

            for issue in &report.issues {
                eprintln!("skipped {issue}");
            }
        }
        "check-hash" => {
            if args.len() < 3 {
                eprintln!("Usage: flukso check-hash <hash>");
                std::process::exit(1);
            }
            let hash = DeviceHash::parse(args[2].as_str()).context("Invalid device hash")?;
            println!("{}", hash.device_identifier());
        }
        "topics" => {
            if args.len() < 3 {
                eprintln!("Usage: flukso topics <hash>");
                std::process::exit(1);
            }
            let hash = DeviceHash::parse(args[2].as_str()).context("Invalid device hash")?;
            let topics = TopicScheme::default();
            for kind in ConfigKind::ALL {
                println!("{}", topics.config(&hash, kind));
            }
            println!("{}", topics.tap(&hash));
        }
        "eval" => {
            if args.len() < 4 {
                eprintln!("Usage: flukso eval <plain|temperature|battery|gas|pf|problem|event> <payload>");
                std::process::exit(1);
            }
            let transform = transform_by_name(&args[2])?;
            let line = describe_reading(&transform, &args[3])
                .with_context(|| format!("Failed to evaluate {}", args[2]))?;
            println!("{line}");
        }
        "discover" => {
            if args.len() < 3 {
                eprintln!("Usage: flukso discover <hash> [broker]");
                std::process::exit(1);
            }
            let hash = DeviceHash::parse(args[2].as_str()).context("Invalid device hash")?;
            let broker = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| "tcp://localhost:1883".to_string());
            let profile = tokio::runtime::Runtime::new()
                .context("Failed to start runtime")?
                .block_on(discover(&broker, &hash))?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Inputs of the `entities` command.
#[derive(Debug, Default, PartialEq)]
struct EntityOptions {
    sensor: String,
    kube: Option<String>,
    flx: Option<String>,
    hash: Option<String>,
    serial: Option<String>,
    firmware: Option<String>,
}

impl EntityOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.iter();

        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .cloned()
                    .with_context(|| format!("{arg} needs a value"))
            };
            match arg.as_str() {
                "--kube" => options.kube = Some(value()?),
                "--flx" => options.flx = Some(value()?),
                "--hash" => options.hash = Some(value()?),
                "--serial" => options.serial = Some(value()?),
                "--firmware" => options.firmware = Some(value()?),
                flag if flag.starts_with("--") => bail!("Unknown option: {flag}"),
                path if options.sensor.is_empty() => options.sensor = path.to_string(),
                extra => bail!("Unexpected argument: {extra}"),
            }
        }

        if options.sensor.is_empty() {
            bail!("Missing sensor config file");
        }
        Ok(options)
    }

    fn load(&self) -> Result<DeviceProfile> {
        let hash = DeviceHash::parse(self.hash.as_deref().unwrap_or(PLACEHOLDER_HASH))
            .context("Invalid device hash")?;

        let ConfigDocument::Sensor(sensor) = read_document(Path::new(&self.sensor), ConfigKind::Sensor)? else {
            bail!("{} is not a sensor config", self.sensor);
        };
        let kube = self
            .kube
            .as_deref()
            .map(|path| read_aux(Path::new(path), ConfigKind::Kube))
            .transpose()?;
        let flx = self
            .flx
            .as_deref()
            .map(|path| read_aux(Path::new(path), ConfigKind::Flx))
            .transpose()?;

        let identity = match (&self.serial, &self.firmware) {
            (Some(serial), Some(firmware)) => Some(Identity {
                serial: serial.clone(),
                firmware: firmware.clone(),
            }),
            (None, None) => None,
            _ => bail!("--serial and --firmware go together"),
        };

        Ok(DeviceProfile::new(
            hash,
            identity,
            ConfigDocuments { sensor, kube, flx },
        ))
    }
}

fn read_document(path: &Path, kind: ConfigKind) -> Result<ConfigDocument> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ConfigDocument::parse(kind, &bytes).with_context(|| format!("Invalid {kind} config in {}", path.display()))
}

fn read_aux(path: &Path, kind: ConfigKind) -> Result<AuxDocument> {
    match read_document(path, kind)? {
        ConfigDocument::Kube(doc) | ConfigDocument::Flx(doc) => Ok(doc),
        ConfigDocument::Sensor(_) => bail!("{} is not a {kind} config", path.display()),
    }
}

fn transform_by_name(name: &str) -> Result<ValueTransform> {
    Ok(match name {
        "plain" => ValueTransform::plain(),
        "temperature" => ValueTransform::temperature(),
        "battery" => ValueTransform::battery(),
        "gas" => ValueTransform::gas(),
        "pf" => ValueTransform::power_factor(),
        "problem" => ValueTransform::ProblemCode,
        "event" => ValueTransform::EventFlag,
        other => bail!("Unknown transform: {other}"),
    })
}

/// Transformed state, followed by the device time when the payload carries one.
fn describe_reading(transform: &ValueTransform, payload: &str) -> Result<String, TransformError> {
    let value = transform.evaluate(payload)?;
    let read_at = Reading::parse(payload).ok().and_then(|reading| reading.timestamp);
    Ok(match read_at {
        Some(time) => format!("{value} at {}", time.to_rfc3339()),
        None => value.to_string(),
    })
}

async fn discover(broker: &str, hash: &DeviceHash) -> Result<DeviceProfile> {
    let bus = Arc::new(
        MqttBus::connect(&MqttBusConfig {
            mqtt_broker: broker.to_string(),
            client_id: format!("flukso-cli-{}", std::process::id()),
            ..MqttBusConfig::default()
        })
        .context("Failed to create MQTT bus")?,
    );
    let coordinator = DiscoveryCoordinator::new(
        Arc::clone(&bus) as Arc<dyn PubSub>,
        TopicScheme::default(),
        DiscoveryTimeouts::default(),
    );
    let result = coordinator.discover(hash).await;
    bus.disconnect().await;
    result.context("Discovery failed")
}

fn print_help() {
    println!(
        r#"Flukso CLI

USAGE:
    flukso <COMMAND> [OPTIONS]

COMMANDS:
    entities <sensor.json> [OPTIONS]  Print the entities a sensor config yields
        --kube <file>                 Kube config
        --flx <file>                  Flx config
        --hash <hash>                 Device hash
        --serial <s> --firmware <f>   Identity banner contents (selects FLM03 tables)
    check-hash <hash>                 Validate a device hash
    topics <hash>                     List the discovery topics of a device
    eval <transform> <payload>        Apply a value transform to a state payload
    discover <hash> [broker]          Discover a live device
    help                              Show this help message

EXAMPLES:
    flukso entities sensor.json --flx flx.json --serial FL03000001 --firmware 3.0.1
    flukso eval battery "1700000000,3.3"
"#
    );
}
