pub mod alerts;
pub mod association;
pub mod cases;
pub mod endpoint;
pub mod error;
pub mod exceptions;
pub mod rules;
pub mod saved_objects;
