use env_logger::Env;
use log::LevelFilter;
use std::io::Write;

/// Installs the global logger. Messages go to stderr so that alignment output
/// on stdout stays clean.
pub fn setup_logger(filter_level: LevelFilter) {
  env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
    .filter_level(filter_level)
    .format(|buf, record| writeln!(buf, "[{:<5}] {}", record.level(), record.args()))
    .target(env_logger::Target::Stderr)
    .init();
}
