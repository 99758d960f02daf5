use log::LevelFilter;
use env_logger::Builder;
use std::io::Write;
use chrono::Local;

// headless_chrome and the HTML parser log every protocol message at info/debug.
const QUIET_TARGETS: [&str; 3] = ["headless_chrome", "html5ever", "selectors"];

pub fn init() {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info);
    for target in QUIET_TARGETS {
        builder.filter(Some(target), LevelFilter::Warn);
    }
    builder.parse_env("RUST_LOG").init();

    log::debug!("Logger initialized (RUST_LOG overrides the defaults).");
}
