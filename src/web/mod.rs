//! Job-submission API: an axum layer over the plotter request channel.

pub mod api;
pub mod models;
pub mod plotter_channel;
