//! Shared fakes for the z0rath-core integration tests.
#![allow(dead_code)]

pub mod api;
pub mod channel;

use std::time::Duration;

pub use api::{Answer, Call, FakeApi};
pub use channel::{ChannelHandle, FakeConnector};

pub const TEST_KEY: &str = "test-key";

const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds, panicking with `what` after a timeout.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + EVENTUALLY_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Give spawned tasks a chance to run before asserting that nothing
/// happened.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
