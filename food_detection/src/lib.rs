mod app;
mod routes;

pub mod catalog;
pub mod config;
pub mod detection;
pub mod detection_service;
pub mod labels;
pub mod lifecycle;
pub mod model_service;
pub mod ort_service;
pub mod preprocess;
pub mod server;

pub use app::start_app;
