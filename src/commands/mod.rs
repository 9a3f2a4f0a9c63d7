pub mod backtest;
pub mod input_files;
pub mod run;
pub mod sector_baseline;
pub mod verify;
