pub mod config;
pub mod event;
pub mod log_record;
pub mod record;
pub mod session;
pub mod status;
pub mod test_path;

pub use config::{Config, DispatchConfig, LoggingConfig, PerRun, PluginConfig, ServerConfig};
pub use event::{
    slave_or_default, FinishTest, Filedump, Hook, HubEvent, LogMessage, ReportTest,
    SessionDetails, SkipTest, StartSession, StartTest, TbInfo, UpdateArtifact, DEFAULT_SLAVE,
};
pub use log_record::{LogArgs, LogRecord};
pub use record::{ExceptionInfo, FileDescriptor, RecordUpdate, SkipInfo, TestRecord};
pub use session::RunContext;
pub use status::{classify, OverallStatus, Outcome, PhaseStatus, PhaseStatuses, StatusCounts};
pub use test_path::{segment, test_ident};
