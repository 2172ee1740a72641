use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use digit_classifier::{
    artifact::{snapshot_path, DEFAULT_ARTIFACT_DIR},
    backend::ServeBackend,
    data::ColorConvention,
    logging::{init_logging, level},
    serving::{self, ServeConfig, DEFAULT_INPUT_CONVENTION, DEFAULT_PORT, DEFAULT_WORKERS},
};

/// Serves digit predictions over HTTP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Snapshot written by the `train` binary; its `config.json` must sit next to it.
    #[arg(long, default_value_os_t = snapshot_path(Path::new(DEFAULT_ARTIFACT_DIR)))]
    model: PathBuf,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Number of inference threads.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
    /// Color convention of payloads that don't state one.
    #[arg(long, default_value_t = DEFAULT_INPUT_CONVENTION)]
    convention: ColorConvention,
    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ServeConfig {
        ServeConfig::new(self.model.clone())
            .with_port(self.port)
            .with_workers(self.workers)
            .with_convention(self.convention)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(level(args.verbose));

    match serving::run::<ServeBackend>(&args.config(), Default::default()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Server stopped: {err}");
            ExitCode::FAILURE
        }
    }
}
