pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod model;
pub mod replay_engine;
