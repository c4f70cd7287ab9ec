//! Domain layer: aggregates, value objects, events and reporting
pub mod aggregates;
pub mod analytics;
pub mod events;
pub mod value_objects;
