#![doc = include_str!("../README.md")]

mod error;

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod continuity;
pub mod dedup;
pub mod encode;
pub mod multireader;
pub mod packet;
pub mod query;
pub mod timecode;

pub use error::{Error, Result, Status};
pub use packet::{Family, Id, Info, Packet, View};
