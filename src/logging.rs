use tracing_core::{Level, LevelFilter};
use tracing_subscriber::{
    filter::filter_fn, layer::SubscriberExt, registry, util::SubscriberInitExt, Layer,
};

/// Installs the process-wide log subscriber at `level`.
///
/// Records emitted through the `log` facade are forwarded to the same
/// formatter. Installing twice is a no-op.
pub fn init_logging(level: LevelFilter) {
    let layer = tracing_subscriber::fmt::layer()
        .with_filter(level)
        .with_filter(filter_fn(|metadata| {
            !is_gpu_chatter(metadata.module_path(), metadata.level())
        }));

    let _ = registry().with(layer).try_init();
}

/// Level used by the binaries, `verbose` adds per-batch losses.
pub fn level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// The wgpu backend reports every adapter and pipeline at `info`.
fn is_gpu_chatter(module_path: Option<&str>, level: &Level) -> bool {
    module_path.is_some_and(|path| path.starts_with("wgpu")) && *level >= Level::INFO
}
