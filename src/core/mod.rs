//! Core module - Configuration, settings store and events

pub mod config;
pub mod events;
pub mod store;
