// src/config/mod.rs
pub mod train;

pub use train::{TrainConfig, TrainSection};
