#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
pub mod core;

pub mod app;
pub use app::run;

pub use crate::core::alerts::engine::{AlertEngine, EngineConfig};
pub use crate::core::alerts::selector::{ChannelMessage, OutputSnapshot};
pub use crate::core::model::{SignalFrame, SignalSource, SignalValue};
