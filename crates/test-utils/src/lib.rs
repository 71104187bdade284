pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Budget of a whole scheduler run in tests.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise tracing for tests.
///
/// Logs go through `with_test_writer()`, so they only show up for failing
/// tests (or with `-- --nocapture`). `BLOGPILOT_TEST_LOG` takes an
/// `EnvFilter` directive; the default keeps the engine at `debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("BLOGPILOT_TEST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("blogpilot=debug,warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future, failing the test if it takes longer than `limit`.
pub async fn within<F, T>(limit: Duration, f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, f).await {
        Ok(value) => value,
        Err(_) => panic!("did not finish within {limit:?}"),
    }
}

/// [`within`] the default [`RUN_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    within(RUN_TIMEOUT, f).await
}

/// Poll `condition` every 5ms until it holds, failing the test after `limit`.
pub async fn eventually<F>(limit: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    within(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}
