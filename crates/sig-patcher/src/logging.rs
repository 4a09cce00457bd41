use std::{env, panic, path::Path};

use color_eyre::config::PanicHook;
use eyre::Result;
use strip_ansi_escapes::Writer;
use tracing::{error, level_filters::LevelFilter};
use tracing_appender::rolling::RollingFileAppender;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::Targets, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Registry,
};

use crate::config::Config;

const LOG_FILE: &str = "sig-patcher.log";
const LOG_ENV: &str = "SIG_PATCHER_LOG";

struct StripAnsiWriter((String, String));

impl StripAnsiWriter {
    fn new(dir: &str, filename: &str) -> Self {
        Self((dir.to_owned(), filename.to_owned()))
    }
}

impl<'a> MakeWriter<'a> for StripAnsiWriter {
    type Writer = Writer<RollingFileAppender>;

    fn make_writer(&'a self) -> Self::Writer {
        Writer::new(tracing_appender::rolling::never(&self.0 .0, &self.0 .1))
    }
}

/// Filter directives come from `SIG_PATCHER_LOG` when it is set, otherwise from the config
fn env_filter(config: &Config) -> Result<EnvFilter> {
    let builder = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(LOG_ENV)
        .with_regex(false);

    let filter = if env::var_os(LOG_ENV).is_some() {
        builder.try_from_env()?
    } else {
        builder.parse(&config.log.level)?
    };

    Ok(filter)
}

/// Setup logging for the plugin, writing the log file into `dir`
pub fn setup_logging(dir: &Path, config: &Config) -> Result<()> {
    // per-query plans are trace level and very chatty
    let targets = Targets::new()
        .with_target("sigindex", LevelFilter::DEBUG)
        .with_default(LevelFilter::TRACE);

    let env_filter = env_filter(config)?;

    if cfg!(debug_assertions) {
        let stdout_layer = tracing_subscriber::fmt::Layer::default()
            .without_time()
            .with_ansi(true)
            .with_target(config.log.targets);

        Registry::default()
            .with(stdout_layer)
            .with(ErrorLayer::default())
            .with(targets)
            .with(env_filter)
            .init();
    } else {
        // a log writer which also strips ansi, because panic hook unfortunately outputs ansi into the normal stream
        let log_writer = StripAnsiWriter::new(&dir.to_string_lossy(), LOG_FILE);

        let log_layer = tracing_subscriber::fmt::Layer::default()
            .with_writer(log_writer)
            .with_ansi(false)
            .with_target(config.log.targets);

        let stdout_layer = tracing_subscriber::fmt::Layer::default()
            .without_time()
            .with_ansi(true)
            .with_target(config.log.targets);

        Registry::default()
            .with(stdout_layer)
            .with(log_layer)
            .with(ErrorLayer::default())
            .with(targets)
            .with(env_filter)
            .init();
    }

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .issue_url(concat!(env!("CARGO_PKG_REPOSITORY"), "/issues/new"))
        .add_issue_metadata("version", env!("CARGO_PKG_VERSION"))
        .into_hooks();

    eyre_hook.install()?;
    set_panic_hook(panic_hook);

    Ok(())
}

fn set_panic_hook(hook: PanicHook) {
    // this panic hook makes sure that eyre panic hook gets sent to all tracing layers
    panic::set_hook(Box::new(move |info| {
        let panic = hook.panic_report(info);
        error!("{panic}");
    }))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn config_level_builds_a_filter() {
        env::remove_var(LOG_ENV);

        let mut config = Config::default();
        config.log.level = "warn,sigindex=trace".to_owned();

        let filter = env_filter(&config).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    #[serial]
    fn bad_level_is_rejected() {
        env::remove_var(LOG_ENV);

        let mut config = Config::default();
        config.log.level = "sigindex=loud".to_owned();

        assert!(env_filter(&config).is_err());
    }

    #[test]
    #[serial]
    fn env_var_overrides_config_level() {
        let config = Config::default();

        env::set_var(LOG_ENV, "trace");
        let overridden = env_filter(&config).map(|f| f.max_level_hint());

        env::set_var(LOG_ENV, "sigindex=loud");
        let bad = env_filter(&config);

        env::remove_var(LOG_ENV);
        let configured = env_filter(&config).unwrap();

        assert_eq!(overridden.unwrap(), Some(LevelFilter::TRACE));
        assert!(bad.is_err());
        assert_eq!(configured.max_level_hint(), Some(LevelFilter::INFO));
    }
}
