//! Lifecycle events submitted by test workers.
//!
//! Every event is named by a [`Hook`]. On the wire an event is a JSON object
//! tagged with its hook name, e.g.
//! `{"event": "finish_test", "test_location": "mod", "test_name": "t1"}`.
//! Keys the hub does not know are ignored.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::log_record::LogRecord;
use super::record::SkipInfo;
use super::status::Outcome;
use super::test_path::test_ident;

/// Slave identity used when a producer is not a distributed worker.
pub const DEFAULT_SLAVE: &str = "Master";

/// Resolve an optional slave identity to a concrete one.
pub fn slave_or_default(slaveid: Option<&str>) -> &str {
    match slaveid {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_SLAVE,
    }
}

/// Named lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    StartSession,
    FinishSession,
    BuildReport,
    SessionInfo,
    StartTest,
    ReportTest,
    FinishTest,
    SkipTest,
    TbInfo,
    LogMessage,
    Filedump,
    UpdateArtifact,
}

impl Hook {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartSession => "start_session",
            Self::FinishSession => "finish_session",
            Self::BuildReport => "build_report",
            Self::SessionInfo => "session_info",
            Self::StartTest => "start_test",
            Self::ReportTest => "report_test",
            Self::FinishTest => "finish_test",
            Self::SkipTest => "skip_test",
            Self::TbInfo => "tb_info",
            Self::LogMessage => "log_message",
            Self::Filedump => "filedump",
            Self::UpdateArtifact => "update_artifact",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event together with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    StartSession(StartSession),
    FinishSession,
    BuildReport,
    SessionInfo(SessionDetails),
    StartTest(StartTest),
    ReportTest(ReportTest),
    FinishTest(FinishTest),
    SkipTest(SkipTest),
    TbInfo(TbInfo),
    LogMessage(LogMessage),
    Filedump(Filedump),
    UpdateArtifact(UpdateArtifact),
}

impl HubEvent {
    pub const fn hook(&self) -> Hook {
        match self {
            Self::StartSession(_) => Hook::StartSession,
            Self::FinishSession => Hook::FinishSession,
            Self::BuildReport => Hook::BuildReport,
            Self::SessionInfo(_) => Hook::SessionInfo,
            Self::StartTest(_) => Hook::StartTest,
            Self::ReportTest(_) => Hook::ReportTest,
            Self::FinishTest(_) => Hook::FinishTest,
            Self::SkipTest(_) => Hook::SkipTest,
            Self::TbInfo(_) => Hook::TbInfo,
            Self::LogMessage(_) => Hook::LogMessage,
            Self::Filedump(_) => Hook::Filedump,
            Self::UpdateArtifact(_) => Hook::UpdateArtifact,
        }
    }

    /// `(test_location, test_name)` for events scoped to one test.
    pub fn test_location_and_name(&self) -> Option<(&str, &str)> {
        let (location, name) = match self {
            Self::StartTest(e) => (&e.test_location, &e.test_name),
            Self::ReportTest(e) => (&e.test_location, &e.test_name),
            Self::FinishTest(e) => (&e.test_location, &e.test_name),
            Self::SkipTest(e) => (&e.test_location, &e.test_name),
            Self::TbInfo(e) => (&e.test_location, &e.test_name),
            Self::Filedump(e) => (&e.test_location, &e.test_name),
            Self::UpdateArtifact(e) => (&e.test_location, &e.test_name),
            _ => return None,
        };
        Some((location.as_str(), name.as_str()))
    }

    /// Identifier of the test this event is about, if any.
    pub fn test_ident(&self) -> Option<String> {
        self.test_location_and_name()
            .map(|(location, name)| test_ident(location, name))
    }

    /// Slave identity carried by the event, if it names one.
    pub fn slaveid(&self) -> Option<&str> {
        match self {
            Self::StartTest(e) => e.slaveid.as_deref(),
            Self::FinishTest(e) => e.slaveid.as_deref(),
            Self::LogMessage(e) => e.slaveid.as_deref(),
            Self::Filedump(e) => e.slaveid.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Build information describing the product under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fw_version: Option<String>,
}

impl SessionDetails {
    /// Overwrite the fields present in `other`.
    pub fn merge(&mut self, other: Self) {
        for (slot, value) in [
            (&mut self.version, other.version),
            (&mut self.build, other.build),
            (&mut self.stream, other.stream),
            (&mut self.fw_version, other.fw_version),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTest {
    pub test_location: String,
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, alias = "param_dict", skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTest {
    pub test_location: String,
    pub test_name: String,
    /// Phase name: `setup`, `call` or `teardown`.
    pub test_when: String,
    pub test_outcome: Outcome,
    #[serde(default)]
    pub test_xfail: bool,
    #[serde(default)]
    pub test_phase_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishTest {
    pub test_location: String,
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipTest {
    pub test_location: String,
    pub test_name: String,
    pub skip_data: SkipInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TbInfo {
    pub test_location: String,
    pub test_name: String,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub file_line: Option<String>,
    #[serde(default)]
    pub short_tb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub log_record: LogRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
}

/// An artifact file produced for a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filedump {
    pub test_location: String,
    pub test_name: String,
    pub description: String,
    #[serde(default)]
    pub contents: String,
    pub file_type: String,
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_glyph: Option<String>,
    /// File already exists at `os_filename`; only record it.
    #[serde(default)]
    pub dont_write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_filename: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaveid: Option<String>,
}

/// A raw partial record update from an out-of-process observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateArtifact {
    pub test_location: String,
    pub test_name: String,
    pub update: Value,
}
