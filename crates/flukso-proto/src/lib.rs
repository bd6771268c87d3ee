//! # Flukso Protocol
//!
//! Topic scheme and payload parsing for the Flukso device discovery
//! protocol.
//!
//! ## Topics
//!
//! - `/device/{hash}/config/{sensor|kube|flx}`: JSON configuration documents
//! - `/device/{hash}/test/tap`: identity banner
//! - `/sensor/{channel id}/{data type}`: `"<timestamp>,<value>"` state
//!
//! ## Payloads
//!
//! - Identity banner: `# serial: ...` and `# firmware: ...` lines

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod banner;
pub mod topics;

pub use banner::{parse_banner, BannerError};
pub use topics::{topic_matches, DeviceMessage, DeviceTopic, TopicError, TopicScheme};
