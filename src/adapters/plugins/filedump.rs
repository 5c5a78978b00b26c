//! Filedump plugin.
//!
//! Persists artifact contents sent by workers and attaches them to the
//! test's `files`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Map;
use tracing::{debug, instrument, warn};

use crate::domain::models::{
    test_ident, Filedump, FileDescriptor, Hook, HubEvent, PluginConfig, RecordUpdate,
};
use crate::domain::PluginResult;
use crate::services::hook_dispatcher::{Contribution, HookContext, Subscriber};
use crate::services::plugin::{ConfigGate, Plugin};

pub const NAME: &str = "filedump";

/// Writes `filedump` payloads into the test's artifact directory.
#[derive(Default)]
pub struct FiledumpPlugin {
    gate: ConfigGate<()>,
}

impl FiledumpPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the dump lands: a relative `os_filename` under the test's
    /// artifact directory, otherwise a name derived from the description and
    /// file type. Only `dont_write` descriptors may point outside the
    /// artifact directory; `None` means the requested path is refused.
    fn target(dump: &Filedump, artifact_path: PathBuf) -> Option<PathBuf> {
        match &dump.os_filename {
            Some(path) if dump.dont_write => Some(if path.is_absolute() {
                path.clone()
            } else {
                artifact_path.join(path)
            }),
            Some(path) => is_contained(path).then(|| artifact_path.join(path)),
            None => Some(artifact_path.join(format!(
                "{}.{}",
                safe_file_name(&dump.description),
                safe_file_name(&dump.file_type)
            ))),
        }
    }

    fn dump(&self, dump: &Filedump, ctx: &HookContext) -> PluginResult<Option<Contribution>> {
        let test_ident = test_ident(&dump.test_location, &dump.test_name);
        let Some(path) = Self::target(dump, ctx.artifact_path(&test_ident)) else {
            warn!(
                test_ident = %test_ident,
                os_filename = ?dump.os_filename,
                "Refusing artifact path outside the test directory"
            );
            return Ok(None);
        };

        if !dump.dont_write {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &dump.contents)?;
            debug!(path = ?path, bytes = dump.contents.len(), "Wrote artifact");
        }

        let file = FileDescriptor {
            group_id: dump.group_id.clone(),
            file_type: dump.file_type.clone(),
            os_filename: path,
            description: dump.description.clone(),
            display_glyph: dump.display_glyph.clone(),
            extra: Map::new(),
        };
        Ok(Some(Contribution::record(
            test_ident,
            RecordUpdate::default().with_file(file),
        )))
    }
}

/// A relative path that names a file and never climbs out of its base.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "artifact".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[async_trait]
impl Subscriber for FiledumpPlugin {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(plugin = NAME))]
    async fn on_hook(
        &self,
        event: &HubEvent,
        ctx: &HookContext,
    ) -> PluginResult<Option<Contribution>> {
        if !self.gate.is_configured() {
            return Ok(None);
        }
        match event {
            HubEvent::Filedump(dump) => self.dump(dump, ctx),
            _ => Ok(None),
        }
    }
}

impl Plugin for FiledumpPlugin {
    fn initialize(&self) -> Vec<Hook> {
        vec![Hook::Filedump]
    }

    fn configure(&self, _config: &PluginConfig) -> PluginResult<()> {
        self.gate.configure(());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.gate.is_configured()
    }
}
