use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize structured JSON logging on stderr.
///
/// `default_level` applies unless overridden by `MEDIAGRAB_LOG`. Stdout stays free for the
/// terminal front end's progress output.
pub fn init(default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_env_var("MEDIAGRAB_LOG")
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}
