use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log targets of this package: the library and every binary.
const TARGETS: [&str; 6] = [
    "coursework",
    "catalog_site",
    "session_demo",
    "register_site",
    "image_fetch",
    "shop_api",
];

/// Filter used when `RUST_LOG` is unset. Verbose mode also lets dependencies log at `info`.
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    let mut directives: Vec<String> = TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    if verbose {
        directives.push("info".to_string());
    }
    directives.join(",")
}

/// Install the process-wide subscriber. `log` records from the library are
/// bridged into it; output goes to stderr so stdout stays for program output.
pub fn init_cli_logger(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
    if let Err(e) = installed {
        eprintln!("logger already initialised: {}", e);
    }
}
