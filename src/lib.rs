pub mod clock;
pub mod cohort;
pub mod db;
pub mod engagement;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod report;
pub mod sessions;
