mod app;
mod config;
mod render;

pub(crate) use app::run_app;
