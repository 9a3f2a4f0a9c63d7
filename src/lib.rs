pub mod backtester;
pub mod balance;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod context;
pub mod data_context;
pub mod error;
pub mod models;
pub mod performance;
pub mod prediction_utils;
pub mod report;
pub mod sector_aggregator;
pub mod significance;
