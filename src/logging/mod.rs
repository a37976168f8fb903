//! Run logging for blueprint rules.
//!
//! Every event goes through `tracing`. The console formatter prints stage
//! headers, per-rule progress and the closing rule summary. The file layer
//! keeps a plain-text copy of the run in `$XDG_CACHE_HOME/blueprint/<command>.log`
//! with debug lines included. [`Logger`] collects one [`RuleEntry`] per rule
//! so the summary and the exit code agree on what failed.

mod logger;
mod subscriber;
mod types;
mod utils;

pub use logger::Logger;
pub use subscriber::init_subscriber;
pub use types::{Log, RuleEntry, RuleStatus};

/// Held while a test points `XDG_CACHE_HOME` at its own directory.
#[cfg(test)]
pub(crate) static CACHE_HOME_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Run `f` with `XDG_CACHE_HOME` set to `dir`, then put the old value back.
#[cfg(test)]
fn with_cache_home<T>(dir: &std::path::Path, f: impl FnOnce() -> T) -> T {
    let _lock = CACHE_HOME_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous = std::env::var_os("XDG_CACHE_HOME");
    // SAFETY: every writer of XDG_CACHE_HOME holds CACHE_HOME_LOCK.
    #[allow(unsafe_code)]
    unsafe {
        std::env::set_var("XDG_CACHE_HOME", dir);
    }
    let out = f();
    // SAFETY: still under CACHE_HOME_LOCK.
    #[allow(unsafe_code)]
    unsafe {
        match previous {
            Some(value) => std::env::set_var("XDG_CACHE_HOME", value),
            None => std::env::remove_var("XDG_CACHE_HOME"),
        }
    }
    out
}

/// A `test` run logger whose file layer writes into a fresh temp cache.
///
/// The dispatcher guard scopes the file layer to the calling thread; keep
/// it alive until the assertions on the run log are done.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn logger_with_run_log() -> (Logger, tempfile::TempDir, tracing::dispatcher::DefaultGuard) {
    use tracing_subscriber::{Layer as _, filter::LevelFilter, layer::SubscriberExt as _};
    let cache = tempfile::tempdir().expect("temp cache dir");
    let (file_layer, log) = with_cache_home(cache.path(), || {
        let layer = subscriber::FileLayer::new("test").expect("run log file");
        (layer, Logger::new("test"))
    });
    let dispatch = tracing::Dispatch::new(
        tracing_subscriber::registry().with(file_layer.with_filter(LevelFilter::DEBUG)),
    );
    let guard = tracing::dispatcher::set_default(&dispatch);
    (log, cache, guard)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_log_lives_under_the_blueprint_cache() {
        let (log, cache, _guard) = logger_with_run_log();
        assert_eq!(
            log.log_path().expect("log path"),
            &cache.path().join("blueprint").join("test.log")
        );
    }

    #[test]
    fn cache_home_is_restored_after_setup() {
        let before = {
            let _lock = CACHE_HOME_LOCK
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::env::var_os("XDG_CACHE_HOME")
        };
        let dir = tempfile::tempdir().unwrap();
        let seen = with_cache_home(dir.path(), || std::env::var_os("XDG_CACHE_HOME"));
        assert_eq!(seen.as_deref(), Some(dir.path().as_os_str()));
        let _lock = CACHE_HOME_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(std::env::var_os("XDG_CACHE_HOME"), before);
    }

    #[test]
    fn failed_rules_reach_the_run_log_summary() {
        let (log, _cache, _guard) = logger_with_run_log();
        log.record_rule("clone ~/src/app", RuleStatus::Failed, Some("exit 128"));
        log.print_summary();
        let contents = std::fs::read_to_string(log.log_path().expect("log path")).unwrap();
        assert!(contents.contains("clone ~/src/app"));
        assert!(contents.contains("exit 128"));
        assert_eq!(log.failure_count(), 1);
    }
}
