//! Domain model: aggregates, value objects, totals and events.
pub mod aggregates;
pub mod events;
pub mod totals;
pub mod value_objects;
