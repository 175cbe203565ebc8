//! Infrastructure layer: event stores, the command dispatcher, workflows,
//! read models and background workers.

pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod projections;
pub mod read_model;
pub mod streams;
pub mod workers;
pub mod workflows;

mod integration_tests;
