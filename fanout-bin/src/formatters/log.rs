use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

use crate::{formatters::color::color_for_level, verbosity::Verbosity};

/// Initialize the logging system with the given verbosity level.
pub(crate) fn init_logging(verbose: &Verbosity) {
    // Overridden by RUST_LOG if it's set
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();

        // Other crates only log warnings, whatever the verbosity
        builder.filter_level(LevelFilter::Warn.min(level_filter));
        builder
            .filter_module("fanout", level_filter)
            .filter_module("fanout_lib", level_filter);
    }

    builder.format(|buf, record| {
        let level = record.level();
        writeln!(
            buf,
            "{} {}",
            color_for_level(level).apply_to(format!("[{level}]")),
            record.args()
        )
    });

    builder.init();
}
