use tracing_subscriber::EnvFilter;

/// Environment variable selecting `json` log output.
pub const LOG_FORMAT_ENV: &str = "WORDPUMP_LOG_FORMAT";

/// Install the global subscriber. Logs go to stderr so findings on stdout stay clean.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
