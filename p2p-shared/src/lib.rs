#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod queue;
pub(crate) mod transport;
pub mod util;

pub use transport::{
    DiffServCodePoint, PacketOptions, TaggedBytesMut, TransportContext, TransportMessage,
    TransportProtocol,
};

#[cfg(test)]
mod queue_test;
#[cfg(test)]
mod util_test;
