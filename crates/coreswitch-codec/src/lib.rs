//! Proxy engine configuration codecs for coreswitch.
//!
//! This crate parses native engine configurations into a canonical listener
//! model and serializes that model back into any supported engine's format.
//!
//! # Architecture
//!
//! ```text
//!   native JSON ──► Codec::parse ──► [Inbound] ──► Codec::to_native ──► native JSON
//!   (engine A)      (per engine)    (canonical)     (per engine)         (engine B)
//! ```
//!
//! Codecs are selected by [`CoreEngine`](coreswitch_core::CoreEngine) with an
//! exhaustive match in [`registry::codec`]. Conversion is lossy; anything the
//! target engine cannot express is dropped and reported as a warning.
//!
//! # Example
//!
//! ```
//! use coreswitch_codec::convert_config;
//!
//! let xray = br#"{"inbounds": [{"protocol": "trojan", "port": 443,
//!     "settings": {"clients": [{"password": "secret"}]}}]}"#;
//! let converted = convert_config("xray", "sing-box", xray).unwrap();
//! assert!(converted.raw.contains("\"listen_port\": 443"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod inbound;
pub mod registry;
pub mod singbox;
pub mod xray;

pub use codec::{Codec, Native, Parsed};
pub use error::{CodecError, Result};
pub use inbound::{
    Brutal, Handshake, Inbound, Multiplex, Protocol, Reality, Tls, Transport, TransportKind, User,
};
pub use registry::{
    convert, convert_config, detect_engine, engine_from_name, parse, parse_file, to_native,
    Converted,
};
pub use singbox::SingBoxCodec;
pub use xray::XrayCodec;
