pub(crate) mod answer_key;
pub(crate) mod attempt_timing;
pub(crate) mod blueprint_selector;
pub(crate) mod error;
pub(crate) mod grading;
pub(crate) mod integrity;
pub(crate) mod live_sync;
pub(crate) mod results;
pub(crate) mod session_machine;
pub(crate) mod snapshot_builder;
pub(crate) mod store;
pub(crate) mod violations;
