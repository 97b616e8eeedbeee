use super::config::BrokerConfig;

/// Install env_logger with the configured filter. `RUST_LOG` wins when set.
///
/// Returns false if a logger was already installed.
pub fn init_logging(config: &BrokerConfig) -> bool {
    let env = env_logger::Env::default().default_filter_or(config.log_filter.as_str());
    env_logger::Builder::from_env(env).try_init().is_ok()
}
