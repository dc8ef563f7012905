pub mod aggregate;
pub mod models;
pub mod normalize;
pub mod telemetry;
pub mod view;
