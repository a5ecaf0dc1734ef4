//! `log`/`env_logger` initialization. Long-running, multi-threaded runs
//! interleave worse with bare `println!`/`eprintln!` than with a leveled,
//! timestamped logger, so the CLI upgrades the teacher's `println!`-based
//! phase announcements to `log::info!`/`warn!`/`error!` call sites.

use std::io::Write;

/// Initialize the global logger. Safe to call more than once; only the
/// first call takes effect.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
