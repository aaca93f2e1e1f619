//! Load sentinel agent
//!
//! HTTP surface and configuration around the detection engine.

pub mod api;
pub mod config;
