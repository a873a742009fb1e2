pub mod chemistry;
pub mod comm;
pub mod domain;
pub mod error;
pub mod spatial;
pub mod topology;
