//! Ambient settings/secrets/pending-state/run-log store (SPEC_FULL.md §1,
//! §3, §6 "[ADDED]"). Not one of `spec.md`'s lettered components — the
//! persisted backing the Step Engine and Scheduler need but the distilled
//! spec leaves as an interface.

pub mod pending;
pub mod run_log;
pub mod settings;

pub use pending::PendingStore;
pub use run_log::RunLog;
pub use settings::{CoreSettings, ProviderConfig, Secrets, Settings, ToolToggle};
