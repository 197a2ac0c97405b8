/// Backend check — build the configured backend and run one generation.
///
/// Usage: backend_check --config <path> [--prompt <text>]
///
/// Exit codes: 0 ok, 1 bad config, 3 backend could not be built,
/// 4 generation came back empty.
use clap::Parser;
use reverie::core::backend::{self, Backend};
use reverie::schema::config::StreamConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

const PREVIEW_CHARS: usize = 400;

#[derive(Debug, Parser)]
#[command(name = "backend_check", about = "Smoke-test the configured text backend")]
struct Cli {
    #[arg(short, long, default_value = "config/default.ron")]
    config: PathBuf,

    #[arg(short, long, default_value = "Say hello in one short sentence.")]
    prompt: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match StreamConfig::load_from_ron(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading {}: {}", cli.config.display(), err);
            return ExitCode::from(1);
        }
    };

    let loading = Instant::now();
    let mut backend = match backend::from_config(&config.backend, &config.generation, config.seed) {
        Ok(backend) => {
            eprintln!("Backend ready in {:.2?}", loading.elapsed());
            backend
        }
        Err(err) => {
            eprintln!("Backend error: {}", err);
            return ExitCode::from(3);
        }
    };

    let started = Instant::now();
    let output = backend.generate(&cli.prompt, config.generation.max_tokens);
    let elapsed = started.elapsed();

    if output.trim().is_empty() {
        eprintln!("Backend returned no text after {:.2?}", elapsed);
        return ExitCode::from(4);
    }

    let preview: String = output.chars().take(PREVIEW_CHARS).collect();
    let ellipsis = if output.chars().count() > PREVIEW_CHARS { "..." } else { "" };
    println!("--- response ---\n{}{}\n----------------", preview, ellipsis);
    eprintln!(
        "{} words in {:.2?}",
        output.split_whitespace().count(),
        elapsed
    );
    ExitCode::SUCCESS
}
