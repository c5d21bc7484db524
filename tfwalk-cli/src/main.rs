//! tfwalk CLI — run, validate and synth commands.
//!
//! Commands:
//! - `run`: walk every instrument of a TOML config forward and report
//! - `validate`: parse and check a config without running it
//! - `synth`: write seeded synthetic candle files plus a ready-to-run config
//!
//! Logging goes through `tracing`; set `RUST_LOG` to change the level.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tfwalk_core::domain::{AssetClass, Timeframe};
use tfwalk_core::engine::EngineConfig;
use tfwalk_runner::{
    feedback_store, generate, run_all, save_csv, seed_for, InstrumentResult, RunConfig,
    SynthConfig,
};

#[derive(Parser)]
#[command(
    name = "tfwalk",
    about = "tfwalk — multi-timeframe walk-forward strategy evaluator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every instrument in a TOML config.
    Run {
        /// Path to the run config.
        #[arg(long)]
        config: PathBuf,

        /// Run instruments in parallel, overriding the config.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Artifact directory, overriding the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print each report as JSON instead of the text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Parse and validate a config without running it.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Write synthetic candle files and a matching run config.
    Synth {
        /// Symbols to generate.
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Output directory. Defaults to ./synth.
        #[arg(long, default_value = "synth")]
        out: PathBuf,

        /// Number of 5-minute driver bars.
        #[arg(long, default_value_t = 5_000)]
        bars: usize,

        /// Master seed; each symbol derives its own.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First bar date (YYYY-MM-DD).
        #[arg(long, default_value = "2024-01-01")]
        start: String,

        /// forex or crypto.
        #[arg(long, default_value = "forex")]
        asset_class: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            parallel,
            output_dir,
            json,
        } => run_cmd(&config, parallel, output_dir, json),
        Commands::Validate { config } => validate_cmd(&config),
        Commands::Synth {
            symbols,
            out,
            bars,
            seed,
            start,
            asset_class,
        } => synth_cmd(&symbols, &out, bars, seed, &start, &asset_class),
    }
}

fn run_cmd(path: &Path, parallel: bool, output_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let mut config = RunConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config.parallel |= parallel;
    if output_dir.is_some() {
        config.output_dir = output_dir;
    }

    let store = feedback_store(&config.feedback);
    let outcomes = run_all(&config, store.as_ref());

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) if json => println!("{}", serde_json::to_string_pretty(&result.report)?),
            Ok(result) => print_summary(result),
            Err(err) => {
                failed += 1;
                eprintln!("Error for {}: {err}", outcome.symbol);
            }
        }
    }
    if let Some(dir) = &config.output_dir {
        println!("Artifacts saved to: {}", dir.display());
    }
    if failed > 0 {
        bail!("{failed} of {} instruments failed", outcomes.len());
    }
    Ok(())
}

fn validate_cmd(path: &Path) -> Result<()> {
    let config = RunConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    println!("Config OK: {}", path.display());
    println!(
        "Engine:         driver {} / {} (window {}, min {})",
        config.engine.driver, config.engine.triple, config.engine.history_window, config.engine.min_bars
    );
    for inst in &config.instruments {
        let timeframes: Vec<String> = inst.data.keys().map(Timeframe::to_string).collect();
        println!(
            "  {:<10} {:<6} [{}] run {}",
            inst.symbol,
            asset_label(inst.asset_class),
            timeframes.join(", "),
            &config.run_id(&inst.symbol)[..12]
        );
    }
    Ok(())
}

fn synth_cmd(
    symbols: &[String],
    out: &Path,
    bars: usize,
    seed: u64,
    start: &str,
    asset_class: &str,
) -> Result<()> {
    let asset_class = match asset_class {
        "forex" => AssetClass::Forex,
        "crypto" => AssetClass::Crypto,
        other => bail!("unknown asset class '{other}' (expected forex or crypto)"),
    };
    let date = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).context("invalid start time")?);
    let engine = EngineConfig::default();

    let mut toml = String::new();
    writeln!(toml, "[engine]")?;
    writeln!(toml, "driver = \"{}\"", engine.driver)?;
    writeln!(
        toml,
        "triple = {{ fast = \"{}\", mid = \"{}\", slow = \"{}\" }}",
        engine.triple.fast, engine.triple.mid, engine.triple.slow
    )?;

    for symbol in symbols {
        let series = generate(&SynthConfig {
            seed: seed_for(seed, symbol),
            start,
            driver: engine.driver,
            timeframes: engine.required_timeframes(),
            driver_bars: bars,
            start_price: match asset_class {
                AssetClass::Forex => 1.1000,
                AssetClass::Crypto => 40_000.0,
            },
            ..SynthConfig::default()
        });

        let mut data = Vec::new();
        for (tf, candles) in &series {
            let file = format!("{symbol}_{tf}.csv");
            save_csv(&out.join("data").join(&file), candles)?;
            data.push(format!("\"{tf}\" = \"data/{file}\""));
            info!(%symbol, timeframe = %tf, bars = candles.len(), "wrote synthetic series");
        }

        writeln!(toml)?;
        writeln!(toml, "[[instruments]]")?;
        writeln!(toml, "symbol = \"{symbol}\"")?;
        writeln!(toml, "asset_class = \"{}\"", asset_label(asset_class))?;
        writeln!(toml, "data = {{ {} }}", data.join(", "))?;
    }

    let config_path = out.join("run.toml");
    std::fs::write(&config_path, toml)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Config written to: {}", config_path.display());
    Ok(())
}

fn asset_label(asset_class: AssetClass) -> &'static str {
    match asset_class {
        AssetClass::Forex => "forex",
        AssetClass::Crypto => "crypto",
    }
}

fn print_summary(result: &InstrumentResult) {
    let r = &result.report;
    println!();
    println!("=== {} ({}) ===", result.symbol, result.variant);
    println!(
        "Window:         {} to {}",
        result.run.window.start, result.run.window.end
    );
    println!(
        "Bars:           {} ({} evaluated)",
        r.bars_processed, r.evaluations
    );
    println!("Trades:         {} ({} W / {} L)", r.trade_count, r.wins, r.losses);
    println!();
    println!("--- Performance ---");
    println!("Net P&L:        {:.2}", r.net_pnl);
    println!("Win Rate:       {:.1}%", r.win_rate * 100.0);
    println!("Profit Factor:  {}", r.profit_factor);
    println!("Max Drawdown:   {:.2}", r.max_drawdown);
    println!("Expectancy:     {:.2}", r.expectancy);
    println!("Average R:R:    {:.2}", r.average_rr);
    println!("Max Consec Win: {}", r.max_consecutive_wins);
    println!("Max Consec Loss:{}", r.max_consecutive_losses);
    println!("Final Balance:  {:.2}", r.final_balance);
    if r.position_open_at_end {
        println!("WARNING: position still open at end of data");
    }
    if !r.exit_reasons.is_empty() {
        println!();
        println!("--- Exits ---");
        for (reason, count) in &r.exit_reasons {
            println!("{:<16}{count}", format!("{reason}:"));
        }
    }
    if let Some((reason, count)) = r.dominant_rejection() {
        println!("Top rejection:  {reason} ({count})");
    }
    for weakness in &result.proposal.weaknesses {
        println!("WEAKNESS: {}", serde_json::to_string(weakness).unwrap_or_default());
    }
    if !result.overrides_applied.is_empty() {
        println!(
            "Overrides:      {}",
            serde_json::to_string(&result.overrides_applied).unwrap_or_default()
        );
    }
}
