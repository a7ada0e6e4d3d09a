#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod candidate;
pub mod channel;
pub mod description;
pub mod network;
pub mod port;
pub mod rand;
pub mod resolver;
pub mod role;
pub mod socket;
pub mod state;
pub mod transport;
