use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::SessionDetails;

/// Run-level context shared by every test of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub details: SessionDetails,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunContext {
    /// Mark the session started, generating a run id if none is given.
    pub fn start(&mut self, run_id: Option<String>) -> &str {
        let run_id = run_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.run_id.take())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.run_id.insert(run_id)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub const fn is_running(&self) -> bool {
        self.started_at.is_some() && self.finished_at.is_none()
    }
}
