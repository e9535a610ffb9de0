mod client;

pub use client::{today, MetricsProvider, OuraClient};
