use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use signal_engine::{
    commands::{
        backtest::{self, BacktestOptions},
        run, sector_baseline, stats_tests, verify,
    },
    config::SelectionPolicy,
    context::{AppContext, RunVariant},
};
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser)]
#[command(name = "signal-engine")]
#[command(about = "Daily sector-signal backtester and significance tester")]
struct Cli {
    /// Directory holding backtest inputs and outputs
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// JSON settings file (COST_BPS_RT, SELECTION_POLICY, TOP_N, SECTORS, BALANCE_SEED)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    TopPerSector,
    TopN,
}

#[derive(clap::Args, Clone, Debug)]
struct BacktestArgs {
    /// Prediction table (date,ticker,sector,predicted_probability,forward_return)
    #[arg(long, value_name = "FILE")]
    predictions: PathBuf,
    /// Downsample every sector to the minority sector's row count before selecting
    #[arg(long)]
    balance_sectors: bool,
    /// Selection policy (overrides SELECTION_POLICY)
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    /// Positions per day for the top-n policy (overrides TOP_N)
    #[arg(long)]
    top_n: Option<usize>,
    /// Round-trip cost in basis points, charged once per day (overrides COST_BPS_RT)
    #[arg(long)]
    cost_bps: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily selection backtest and write equity curve and sector tables
    Backtest(BacktestArgs),
    /// Run one-sample and best-vs-rest t-tests on the sector daily returns
    StatsTests {
        /// Test the balanced run's sector returns
        #[arg(long)]
        balanced: bool,
    },
    /// Summarize equal-weight sector returns of the whole candidate universe
    SectorBaseline {
        #[arg(long, value_name = "FILE")]
        predictions: PathBuf,
    },
    /// Check sector-stats artifacts for completeness and consistency
    Verify,
    /// Backtest followed by stats tests
    Run(BacktestArgs),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let Cli {
        data_dir,
        settings,
        command,
    } = cli;

    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let app_context = AppContext::initialize(data_dir, settings.as_deref())?;
    info!(
        "Starting signal-engine with data directory {}",
        app_context.data_dir().display()
    );

    match command {
        Commands::Backtest(args) => {
            let options = backtest_options(&app_context, args)?;
            backtest::run(&app_context, &options)?;
        }
        Commands::StatsTests { balanced } => {
            stats_tests::run(&app_context, RunVariant::from_flag(balanced))?;
        }
        Commands::SectorBaseline { predictions } => {
            sector_baseline::run(&app_context, &predictions)?;
        }
        Commands::Verify => {
            verify::run(&app_context)?;
        }
        Commands::Run(args) => {
            let options = backtest_options(&app_context, args)?;
            run::run(&app_context, &options)?;
        }
    }

    Ok(())
}

fn backtest_options(app: &AppContext, args: BacktestArgs) -> Result<BacktestOptions> {
    let policy = match (args.policy, args.top_n) {
        (Some(PolicyArg::TopPerSector), _) => Some(SelectionPolicy::TopPerSector),
        (Some(PolicyArg::TopN), top_n) => Some(app.settings().top_n_policy(top_n)?),
        (None, Some(top_n)) => Some(app.settings().top_n_policy(Some(top_n))?),
        (None, None) => None,
    };

    let mut options = BacktestOptions::new(args.predictions, RunVariant::from_flag(args.balance_sectors));
    options.policy = policy;
    options.cost_bps = args.cost_bps;
    options.show_progress = true;
    Ok(options)
}
