//! YOLOv3 training-model assembly with selectable backbones.
//!
//! The crate wires a backbone/head network variant to per-scale ground-truth
//! tensors, attaches the multi-term YOLOv3 loss, applies a layer-freezing
//! policy for transfer learning, and hands back a single optimizable
//! [`TrainingModel`].

mod common;

pub mod anchors;
pub mod arch;
pub mod body;
pub mod config;
pub mod freeze;
pub mod loss;
pub mod training;
pub mod weights;

pub use anchors::ScaleMode;
pub use arch::{select, Backbone};
pub use freeze::FreezeLevel;
pub use loss::{YoloLoss, YoloLossInit, YoloLossOutput};
pub use training::{TrainingModel, TrainingModelInit};
