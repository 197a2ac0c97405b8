/// Reverie — run a paced stream of consciousness in the terminal.
///
/// Usage: reverie --config <path> [--persona <name>] [--seed <n>]
///                [--max-iterations <n> | --unbounded]
///
/// Ctrl-C (or SIGTERM) stops the stream at the next fragment boundary; a
/// second one exits at once.
use clap::Parser;
use reverie::core::display::TerminalRenderer;
use reverie::core::pipeline::StreamEngine;
use reverie::core::stop::StopSignal;
use reverie::logging;
use reverie::schema::config::StreamConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "reverie", about = "Paced stream-of-consciousness generation")]
struct Cli {
    /// RON config file.
    #[arg(short, long, default_value = "config/default.ron")]
    config: PathBuf,

    /// Persona to use instead of a random pick.
    #[arg(short, long)]
    persona: Option<String>,

    /// Seed for persona, topic and offline backend.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many generation iterations.
    #[arg(long, conflicts_with = "unbounded")]
    max_iterations: Option<u32>,

    /// Run until interrupted.
    #[arg(long)]
    unbounded: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StreamConfig::load_from_ron(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading {}: {}", cli.config.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => {
            if let Some(path) = guard.path() {
                eprintln!("Logging to {}", path.display());
            }
            Some(guard)
        }
        Err(err) => {
            eprintln!("Logging disabled: {}", err);
            None
        }
    };

    let stop = StopSignal::new();
    install_stop_handler(stop.clone());

    let mut builder = StreamEngine::builder()
        .with_config(config.clone())
        .with_stop_signal(stop);
    if let Some(name) = cli.persona {
        builder = builder.persona(name);
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    if cli.unbounded {
        builder = builder.max_iterations(None);
    } else if let Some(limit) = cli.max_iterations {
        builder = builder.max_iterations(Some(limit));
    }

    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "failed to prepare stream");
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!("{} on {}\n", engine.persona().display_name(), engine.topic());
    let renderer = TerminalRenderer::from_config(std::io::stdout(), &config.display);

    match engine.run(renderer) {
        Ok(summary) => {
            println!();
            info!(
                iterations = summary.iterations,
                fragments = summary.fragments,
                tangents = summary.tangents,
                empty = summary.empty_responses,
                reason = ?summary.reason,
                "Session summary"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "stream failed");
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
fn install_stop_handler(stop: StopSignal) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            tracing::warn!(error = %err, "could not install signal handlers");
            return;
        }
    };
    std::thread::spawn(move || {
        for signal in signals.forever() {
            match on_signal(&stop) {
                SignalAction::Stop => info!(signal, "stop requested"),
                SignalAction::Exit => {
                    tracing::warn!(signal, "second interrupt, exiting now");
                    std::process::exit(INTERRUPTED_EXIT);
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn install_stop_handler(_stop: StopSignal) {}

/// Exit status for a forced quit (128 + SIGINT).
#[cfg_attr(not(unix), allow(dead_code))]
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(not(unix), allow(dead_code))]
enum SignalAction {
    Stop,
    Exit,
}

/// The first interrupt asks for a graceful stop; any later one quits.
#[cfg_attr(not(unix), allow(dead_code))]
fn on_signal(stop: &StopSignal) -> SignalAction {
    if stop.is_stopped() {
        SignalAction::Exit
    } else {
        stop.stop();
        SignalAction::Stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interrupt_stops_and_second_exits() {
        let stop = StopSignal::new();
        assert_eq!(on_signal(&stop), SignalAction::Stop);
        assert!(stop.is_stopped());
        assert_eq!(on_signal(&stop), SignalAction::Exit);
        assert_eq!(on_signal(&stop), SignalAction::Exit);
    }

    #[test]
    fn interrupt_after_programmatic_stop_exits() {
        let stop = StopSignal::new();
        stop.clone().stop();
        assert_eq!(on_signal(&stop), SignalAction::Exit);
    }
}
