pub mod mock_openlist;

use shared::storage::backoff::BackoffSchedule;
use shared::{OpenListConfig, OpenListStorageProvider};

pub const TEST_TOKEN: &str = "openlist-test-token";

/// Short schedule so lag scenarios finish quickly against the mock.
pub fn fast_backoff() -> BackoffSchedule {
    BackoffSchedule::from_millis(&[0, 5, 5])
}

pub fn provider_for(base_url: &str, root_path: Option<&str>) -> OpenListStorageProvider {
    let config = OpenListConfig {
        token: Some(TEST_TOKEN.to_string()),
        root_path: root_path.map(str::to_string),
        ..OpenListConfig::new(base_url)
    };
    OpenListStorageProvider::new(config)
        .expect("provider should build")
        .with_backoff(fast_backoff())
}
