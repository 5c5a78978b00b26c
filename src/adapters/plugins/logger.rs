//! Logger plugin.
//!
//! Writes the log records forwarded by each slave into a per-test file in
//! the test's artifact directory.
//!
//! ```yaml
//! plugins:
//!   logger:
//!     enabled: true
//!     level: DEBUG
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::domain::models::log_record::{level_from_name, LEVEL_DEBUG};
use crate::domain::models::{
    slave_or_default, FileDescriptor, Hook, HubEvent, LogRecord, PluginConfig, RecordUpdate,
};
use crate::domain::{PluginError, PluginResult};
use crate::services::hook_dispatcher::{Contribution, HookContext, Subscriber};
use crate::services::plugin::{ConfigGate, Plugin};
use crate::services::slave_state::{SlaveRegistry, SlaveResource};

pub const NAME: &str = "logger";

const LOG_GROUP_ID: &str = "pytest-logfile";
const LOG_FILE_TYPE: &str = "log";
const LOG_DESCRIPTION: &str = "iqe.log";
const LOG_GLYPH: &str = "align-justify";

struct Settings {
    level: u32,
}

/// Open log file of one slave's current test.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl LogSink {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn write_record(&mut self, record: &LogRecord) -> std::io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", record.format_line())?;
        }
        Ok(())
    }
}

impl SlaveResource for LogSink {
    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = ?self.path, error = %e, "Failed to flush log file");
            }
        }
    }
}

/// Per-slave, per-test log files.
#[derive(Default)]
pub struct LoggerPlugin {
    gate: ConfigGate<Settings>,
    slaves: SlaveRegistry<LogSink>,
}

impl LoggerPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    fn file_name() -> String {
        format!("{NAME}-iqe.log")
    }

    fn start_test(
        &self,
        test_ident: String,
        slaveid: &str,
        ctx: &HookContext,
    ) -> PluginResult<Contribution> {
        let dir = ctx.artifact_path(&test_ident);
        let path = dir.join(Self::file_name());

        self.slaves.begin(slaveid, &test_ident, || -> PluginResult<LogSink> {
            fs::create_dir_all(&dir)?;
            Ok(LogSink::create(path.clone())?)
        })?;
        debug!(slaveid, path = ?path, "Opened test log");

        let file = FileDescriptor {
            group_id: LOG_GROUP_ID.to_string(),
            file_type: LOG_FILE_TYPE.to_string(),
            os_filename: path,
            description: LOG_DESCRIPTION.to_string(),
            display_glyph: Some(LOG_GLYPH.to_string()),
            extra: Map::new(),
        };
        Ok(Contribution::record(test_ident, RecordUpdate::default().with_file(file)))
    }

    fn log_message(&self, settings: &Settings, record: &LogRecord, slaveid: &str) -> PluginResult<()> {
        if record.level() < settings.level {
            return Ok(());
        }
        if let Some(result) = self.slaves.with_resource(slaveid, |sink| sink.write_record(record)) {
            result?;
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for LoggerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(plugin = NAME, hook = %event.hook()))]
    async fn on_hook(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
    ) -> PluginResult<Option<Contribution>> {
        let Some(settings) = self.gate.settings() else {
            return Ok(None);
        };
        let slaveid = slave_or_default(event.slaveid());

        match event {
            HubEvent::StartTest(_) => {
                let test_ident = event.test_ident().unwrap_or_default();
                self.start_test(test_ident, slaveid, ctx).map(Some)
            }
            HubEvent::FinishTest(_) => {
                self.slaves.finish(slaveid)?;
                Ok(None)
            }
            HubEvent::LogMessage(message) => {
                self.log_message(&settings, &message.log_record, slaveid)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

impl Plugin for LoggerPlugin {
    fn initialize(&self) -> Vec<Hook> {
        vec![Hook::StartTest, Hook::FinishTest, Hook::LogMessage]
    }

    fn configure(&self, config: &PluginConfig) -> PluginResult<()> {
        let level = match config.get("level") {
            None => LEVEL_DEBUG,
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid_level(&n.to_string()))?,
            Some(Value::String(name)) => level_from_name(name).ok_or_else(|| invalid_level(name))?,
            Some(other) => return Err(invalid_level(&other.to_string())),
        };
        self.gate.configure(Settings { level });
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.gate.is_configured()
    }
}

fn invalid_level(value: &str) -> PluginError {
    PluginError::InvalidOption {
        plugin: NAME.to_string(),
        key: "level".to_string(),
        reason: format!("unknown log level '{value}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FinishTest, LogMessage, StartTest};
    use crate::domain::HubError;
    use crate::services::artifact_store::ArtifactStore;
    use crate::services::hook_dispatcher::HubUpdate;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> HookContext {
        HookContext::new(Arc::new(ArtifactStore::new()), dir.path().to_path_buf())
    }

    fn start(name: &str) -> HubEvent {
        HubEvent::StartTest(StartTest {
            test_location: "mod".to_string(),
            test_name: name.to_string(),
            slaveid: Some("gw0".to_string()),
            metadata: None,
            params: None,
        })
    }

    fn finish(name: &str) -> HubEvent {
        HubEvent::FinishTest(FinishTest {
            test_location: "mod".to_string(),
            test_name: name.to_string(),
            slaveid: Some("gw0".to_string()),
        })
    }

    fn log(msg: &str, args: Value, levelno: u32) -> HubEvent {
        HubEvent::LogMessage(LogMessage {
            log_record: serde_json::from_value(json!({
                "name": "iqe",
                "msg": msg,
                "args": args,
                "levelno": levelno,
                "pathname": "test_mod.py",
                "lineno": 7
            }))
            .unwrap(),
            slaveid: Some("gw0".to_string()),
        })
    }

    fn configured(level: &str) -> LoggerPlugin {
        let logger = LoggerPlugin::new();
        logger
            .configure(&PluginConfig::enabled().with_option("level", level))
            .unwrap();
        logger
    }

    #[tokio::test]
    async fn test_writes_filtered_records_to_test_log() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let logger = configured("INFO");

        let out = logger.on_hook(&start("t1"), &ctx).await.unwrap().unwrap();
        let HubUpdate::Record { test_ident, update } = &out.updates[0] else {
            panic!("Expected a record update");
        };
        assert_eq!(test_ident, "mod/t1");
        assert_eq!(update.files[0].group_id, LOG_GROUP_ID);

        logger.on_hook(&log("hidden %s", json!(["x"]), 10), &ctx).await.unwrap();
        logger.on_hook(&log("user %s logged in", json!(["bob"]), 20), &ctx).await.unwrap();
        logger.on_hook(&finish("t1"), &ctx).await.unwrap();

        let contents = fs::read_to_string(dir.path().join("mod/t1/logger-iqe.log")).unwrap();
        assert!(contents.contains("[I] [iqe] user bob logged in (test_mod.py:7)"));
        assert!(!contents.contains("hidden"));
    }

    #[tokio::test]
    async fn test_second_start_on_busy_slave_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let logger = configured("DEBUG");

        logger.on_hook(&start("t1"), &ctx).await.unwrap();
        let err = logger.on_hook(&start("t2"), &ctx).await.unwrap_err();
        assert!(matches!(err, PluginError::Hub(HubError::SlaveBusy { .. })));
        assert!(!dir.path().join("mod/t2").exists());

        logger.on_hook(&log("still here", json!([]), 20), &ctx).await.unwrap();
        logger.on_hook(&finish("t1"), &ctx).await.unwrap();
        let contents = fs::read_to_string(dir.path().join("mod/t1/logger-iqe.log")).unwrap();
        assert!(contents.contains("still here"));
    }

    #[tokio::test]
    async fn test_unconfigured_logger_ignores_events() {
        let dir = TempDir::new().unwrap();
        let logger = LoggerPlugin::new();
        assert!(logger.on_hook(&start("t1"), &context(&dir)).await.unwrap().is_none());
        assert!(!dir.path().join("mod").exists());
    }

    #[test]
    fn test_configure_rejects_unknown_level() {
        let logger = LoggerPlugin::new();
        let err = logger
            .configure(&PluginConfig::enabled().with_option("level", "LOUD"))
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidOption { .. }));
        assert!(!logger.is_configured());

        logger
            .configure(&PluginConfig::enabled().with_option("level", 30))
            .unwrap();
        assert!(logger.is_configured());
    }
}
