//! Host-side implementations plugged into the engine.

pub mod catalog;
