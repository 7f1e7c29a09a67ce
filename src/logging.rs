use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match json {
        true => builder.json().init(),
        false => builder.init(),
    }
}

fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,modproxy=info",
        1 => "warn,modproxy=debug",
        _ => "warn,modproxy=trace",
    }
}
