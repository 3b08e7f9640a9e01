mod app;
mod render;
pub mod state;

pub use app::{App, StartRequest};
