use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Local wall-clock timestamps with millisecond precision
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Installs the global tracing subscriber. Safe to call more than once.
///
/// `RUST_LOG` always wins; otherwise the build-profile default from
/// [`crate::config::dev`] applies.
pub fn init() {
    INIT.get_or_init(|| {
        let from_env = std::env::var("RUST_LOG").is_ok();
        if !from_env && !(crate::config::LOGGING_ENABLED && crate::config::dev::ENABLE_LOGGING) {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(crate::config::dev::DEFAULT_FILTER));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .with_target(true)
            .try_init();
    });
}
