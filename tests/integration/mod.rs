//! Integration tests for sqlpipe.

pub mod live_test;
pub mod pipeline_test;
pub mod report_test;

use sqlpipe::db::RecordedPlanClient;
use sqlpipe::pipeline::Pipeline;
use std::path::PathBuf;

/// Path of a recorded plan under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A pipeline that replays the named fixture.
pub fn recorded_pipeline(name: &str) -> Pipeline {
    let client = RecordedPlanClient::from_file(&fixture_path(name)).unwrap();
    Pipeline::new(Box::new(client))
}
