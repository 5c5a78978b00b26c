pub mod artifact_store;
pub mod hook_dispatcher;
pub mod hub;
pub mod plugin;
pub mod report;
pub mod report_tree;
pub mod slave_state;

pub use artifact_store::ArtifactStore;
pub use hook_dispatcher::{Contribution, HookContext, HookDispatcher, HubUpdate, Subscriber, UpdateSink};
pub use hub::Hub;
pub use plugin::{ConfigGate, Plugin, PluginState};
pub use report::{JsonReportRenderer, ReportBuilder, ReportData, ReportOptions, ReportRenderer, TestRow};
pub use report_tree::{ReportNode, TreeEntry};
pub use slave_state::{SlaveRegistry, SlaveResource};
