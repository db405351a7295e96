use std::fmt;

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque task identifier supplied by the caller or generated on ingress.
pub type TaskId = String;

/// Sequencing key of a compute item: `(scenario_id, business_type_id)`.
///
/// Work for the same key is executed strictly one task at a time; work for
/// different keys is independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub scenario_id: String,
    pub business_type_id: String,
}

impl TaskKey {
    pub fn new(scenario_id: impl Into<String>, business_type_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            business_type_id: business_type_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scenario_id, self.business_type_id)
    }
}
