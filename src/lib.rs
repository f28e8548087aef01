//! Uploads benchmark results to the performance dashboard.
//!
//! Chart results go to `/add_point` as form data, histogram sets go to
//! `/add_histograms` as a compressed body with bearer auth. Each upload is
//! retried on transient failures up to a fixed number of attempts.

pub mod chart_points;
pub mod config;
pub mod errors;
pub mod security;
pub mod uploader;
