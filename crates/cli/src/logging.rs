//! Logging setup

use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber
///
/// `RUST_LOG` takes precedence over `level`. Each entry of
/// `debug_modules` (e.g. `backup::gc`) is raised to debug.
pub fn init(level: LevelFilter, debug_modules: &[String]) {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    for module in debug_modules {
        match format!("{}=debug", module).parse::<Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(err) => eprintln!("ignoring --debug-module {}: {}", module, err),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
