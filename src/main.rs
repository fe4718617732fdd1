mod cache;
mod classify;
mod cli;
mod clock;
mod config;
mod error;
mod logging;
mod output;
mod report;
mod rng;
mod sampler;
mod stats;
mod timers;

use std::path::Path;
use std::process;

use clap::Parser;

use cli::{ClockArgs, Cli, Command, SessionArgs};
use clock::Capabilities;
use config::{ClockConfig, Config};
use error::Error;
use report::SessionReport;
use sampler::Sampler;

/// Apply clock CLI overrides (only if explicitly set).
fn apply_clock_args(cfg: &mut ClockConfig, args: &ClockArgs) {
    if let Some(v) = args.coarse_clock {
        cfg.coarse = v;
    }
    if let Some(v) = args.resolution_ns {
        cfg.resolution_ns = v;
    }
    if let Some(v) = args.counter_region_bytes {
        cfg.counter_region_bytes = v;
    }
    if let Some(v) = args.shared_counter {
        cfg.shared_counter = v;
    }
    cfg.validate();
}

/// Build the clock configuration by layering: defaults → TOML file → CLI overrides.
fn build_clock_config(config_file: Option<&Path>, args: &ClockArgs) -> Result<ClockConfig, Error> {
    let mut cfg = config::load_config(config_file)?.clock;
    apply_clock_args(&mut cfg, args);
    Ok(cfg)
}

/// Build the full session configuration by layering: defaults → TOML file → CLI overrides.
fn build_config(cli: &Cli) -> Result<Config, Error> {
    let mut cfg = config::load_config(cli.config_file.as_deref())?;

    let session: &SessionArgs = &cli.session;
    if let Some(v) = cli.repetitions {
        cfg.session.repetitions = v;
    }
    if let Some(v) = session.cache_size {
        cfg.session.cache_size = v;
    }
    if let Some(v) = session.eviction_set_size {
        cfg.session.eviction_set_size = v;
    }
    if let Some(v) = session.prime_rounds {
        cfg.session.prime_rounds = v;
    }
    if let Some(v) = session.warm_repetitions {
        cfg.session.warm_repetitions = v;
    }
    if session.seed.is_some() {
        cfg.session.seed = session.seed;
    }
    cfg.session.validate()?;

    apply_clock_args(&mut cfg.clock, &cli.clock_opts);
    Ok(cfg)
}

fn run_session(cli: &Cli) -> Result<(), Error> {
    let config = build_config(cli)?;

    let capabilities = Capabilities::detect(&config.clock);
    if let Some(reason) = capabilities.shared_counter_unavailable() {
        log::info!("shared counter clock unavailable: {}", reason);
    }

    let repetitions = config.session.repetitions;
    let mut sampler = Sampler::new(config.session, config.clock, capabilities)?;
    let session = sampler.run_session(cli.clock, repetitions)?;

    let report = SessionReport::build(&session, cli.error_reps, cli.threshold)?;
    if !report.separated {
        log::warn!(
            "hit median {:.1} and miss median {:.1} are not separated for the {} clock",
            report.hits.median,
            report.misses.median,
            cli.clock.name()
        );
    }

    output::write_output(&session, &report, &cli.format, cli.output_file.as_deref())?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Command::Distribution(args)) => {
            logging::init(&args.log);
            build_clock_config(args.config_file.as_deref(), &args.clock_opts)
                .and_then(|cfg| timers::run_distribution(args, &cfg))
        }
        Some(Command::Timers(args)) => {
            logging::init(&args.log);
            build_clock_config(args.config_file.as_deref(), &args.clock_opts)
                .and_then(|cfg| timers::run_timers(args, &cfg))
        }
        None => {
            logging::init(&cli.log);
            run_session(&cli)
        }
    };

    if let Err(e) = result {
        log::error!("{}", e);
        process::exit(1);
    }
}
