//! Process-wide inference runtime lifecycle.
//!
//! Hosts call [`init`] once at start-up and [`shutdown`] once at exit; both
//! are idempotent. Loaded models additionally hold a [`RuntimeHandle`], so
//! the runtime stays up while any model is loaded even if the host shuts it
//! down early. The runtime caches the detected hardware used for device
//! selection.

use super::hardware::{HardwareCapabilities, HardwareDetector};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

struct RuntimeState {
    host_initialized: bool,
    handles: usize,
    hardware: Option<HardwareCapabilities>,
}

impl RuntimeState {
    fn bring_up(&mut self) -> HardwareCapabilities {
        match &self.hardware {
            Some(hardware) => hardware.clone(),
            None => {
                info!("Initializing inference runtime");
                let hardware = HardwareDetector::detect();
                self.hardware = Some(hardware.clone());
                hardware
            }
        }
    }

    fn maybe_tear_down(&mut self) {
        if !self.host_initialized && self.handles == 0 && self.hardware.take().is_some() {
            info!("Inference runtime shut down");
        }
    }
}

static STATE: Mutex<RuntimeState> = Mutex::new(RuntimeState {
    host_initialized: false,
    handles: 0,
    hardware: None,
});

fn state() -> MutexGuard<'static, RuntimeState> {
    STATE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Brings the runtime up. Repeated calls are no-ops.
pub fn init() {
    let mut state = state();
    if state.host_initialized {
        debug!("Inference runtime already initialized");
        return;
    }
    state.host_initialized = true;
    state.bring_up();
}

/// Releases the host's hold on the runtime. Calls without a matching
/// [`init`] are no-ops.
pub fn shutdown() {
    let mut state = state();
    if !state.host_initialized {
        debug!("Inference runtime not initialized, nothing to shut down");
        return;
    }
    state.host_initialized = false;
    state.maybe_tear_down();
}

/// Whether the runtime is currently up
pub fn is_initialized() -> bool {
    state().hardware.is_some()
}

/// Hardware snapshot; cached while the runtime is up, detected fresh otherwise
pub fn hardware() -> HardwareCapabilities {
    let state = state();
    match &state.hardware {
        Some(hardware) => hardware.clone(),
        None => {
            drop(state);
            HardwareDetector::detect()
        }
    }
}

/// Keeps the runtime up for as long as it lives
#[derive(Debug)]
pub struct RuntimeHandle {
    hardware: HardwareCapabilities,
}

impl RuntimeHandle {
    pub(crate) fn acquire() -> Self {
        let mut state = state();
        state.handles += 1;
        let hardware = state.bring_up();
        Self { hardware }
    }

    pub fn hardware(&self) -> &HardwareCapabilities {
        &self.hardware
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        let mut state = state();
        state.handles = state.handles.saturating_sub(1);
        state.maybe_tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_and_shutdown_are_idempotent() {
        init();
        init();
        assert!(is_initialized());
        shutdown();
        assert!(!is_initialized());
        shutdown();
        assert!(!is_initialized());
    }

    #[test]
    #[serial]
    fn test_handle_keeps_runtime_up() {
        init();
        let handle = RuntimeHandle::acquire();
        shutdown();
        assert!(is_initialized());
        assert!(handle.hardware().cpu_cores > 0);
        drop(handle);
        assert!(!is_initialized());
    }

    #[test]
    #[serial]
    fn test_handle_without_host_init() {
        let first = RuntimeHandle::acquire();
        let second = RuntimeHandle::acquire();
        drop(first);
        assert!(is_initialized());
        drop(second);
        assert!(!is_initialized());
    }
}
