//! Adapters Layer - Implementations of the ports
//!
//! - `bsc`: BNB Smart Chain client, PancakeSwap executor and token classifier
//! - `cli`: command-line interface

pub mod bsc;
pub mod cli;
