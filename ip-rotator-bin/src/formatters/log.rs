use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::{formatters::color::color_for_level, options::OutputMode, verbosity::Verbosity};

/// Initialize the logging system with the given verbosity level.
///
/// `RUST_LOG` takes precedence over the verbosity flags.
pub(crate) fn init_logging(verbose: &Verbosity, mode: &OutputMode) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false);

    if std::env::var("RUST_LOG").is_err() {
        // Dependencies (the AWS SDK in particular) stay at `warn`; only our
        // own crates follow the flags.
        let level_filter = verbose.log_level_filter();
        builder
            .filter_level(LevelFilter::Warn.min(level_filter))
            .filter_module("ip_rotator", level_filter)
            .filter_module("ip_rotator_lib", level_filter);
    }

    if mode.is_plain() || !console::colors_enabled_stderr() {
        builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));
    } else {
        builder.format(|buf, record| {
            let level = record.level();
            writeln!(
                buf,
                "{} {}",
                color_for_level(level).apply_to(format!("[{level}]")),
                record.args()
            )
        });
    }

    builder.init();
}
