// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use composite_build::engine::{BuildLifecycle, BuildServices};
use composite_build::exec::WorkExecutor;
use composite_build::types::BuildIdentifier;

pub use composite_build_test_utils::builders;
pub use composite_build_test_utils::fakes;
pub use composite_build_test_utils::{init_tracing, with_timeout};

use self::fakes::FakeModelController;

/// A lifecycle for `model`'s build, running tasks through `executor`.
pub fn lifecycle_for(model: FakeModelController, executor: Arc<dyn WorkExecutor>) -> BuildLifecycle {
    let build = model.build().clone();
    BuildLifecycle::new(build, BuildServices::new(Arc::new(model), executor))
}

pub fn included(name: &str) -> BuildIdentifier {
    BuildIdentifier::included(name)
}
