//! L. Runtime Context (spec.md §4.L): the process-wide bootstrap that owns
//! the Loader's discovered vaults, the Scheduler's job store, the single
//! process-wide Buffer Store, and the Gateway/Tool Registry every Step
//! Engine instance is built from. Constructed once and passed explicitly to
//! every engine call (spec.md REDESIGN FLAGS "Global mutable runtime"); the
//! module-level [`set_bootstrap_roots`]/[`global`] pair is a convenience
//! accessor only, not a substitute for that explicit passing.

pub mod context;

pub use context::{ReloadResult, RuntimeConfig, RuntimeContext};

use amd_core::{EngineError, Result};
use std::sync::OnceLock;

static GLOBAL: OnceLock<RuntimeContext> = OnceLock::new();

/// Bootstrap the process-wide convenience singleton. Callers that want an
/// explicitly-owned context instead should call [`RuntimeContext::bootstrap`]
/// directly and thread it through themselves.
pub fn set_bootstrap_roots(config: RuntimeConfig) -> Result<()> {
    let ctx = RuntimeContext::bootstrap(config)?;
    GLOBAL
        .set(ctx)
        .map_err(|_| EngineError::RuntimeStateError)
}

/// Access the process-wide singleton. Fails fast with `RuntimeStateError`
/// if [`set_bootstrap_roots`] hasn't run yet (spec.md §4.L).
pub fn global() -> Result<&'static RuntimeContext> {
    GLOBAL.get().ok_or(EngineError::RuntimeStateError)
}
