pub mod batch;
pub mod error;
pub mod executable_utils;
pub mod features;
pub mod importer;
pub mod model;
pub mod model_cache;
pub mod online;
pub mod processor;
pub mod queue;
pub mod scorers;
pub mod storage;
pub mod triggers;
