use log::LevelFilter;
use env_logger::Builder;
use std::io::Write;
use chrono::Local;

pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    Builder::new()
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        // Keep the HTTP stack quiet unless explicitly asked for via RUST_LOG
        .filter(Some("reqwest"), LevelFilter::Warn)
        .filter(Some("html5ever"), LevelFilter::Warn)
        .parse_default_env()
        .init();

    log::debug!("Logger initialized (verbose={}).", verbose);
}
