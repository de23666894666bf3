//! Read step implementations.

mod version_1_0_0;

pub use version_1_0_0::ReadStep;

use crate::registry::{StepFactory, Version};
use std::collections::BTreeMap;

/// Version table for this step kind.
pub(crate) fn versions() -> BTreeMap<Version, StepFactory> {
    BTreeMap::from([(
        Version::new(1, 0, 0),
        version_1_0_0::factory as StepFactory,
    )])
}
