//! Failpoint injection for deterministic crash-simulation tests.
//!
//! With the `failpoints` feature compiled in, [`check`] consults a global
//! registry that tests populate via [`set`]; without it, [`check`] and the
//! [`fp`] macro compile away entirely.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailpointAction {
    Off,
    Error(String),
    Panic(String),
    Abort,
    Sleep(Duration),
}

static REGISTRY: LazyLock<Mutex<HashMap<&'static str, FailpointAction>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

pub fn set(name: &'static str, action: FailpointAction) {
    #[allow(clippy::unwrap_used)]
    REGISTRY.lock().unwrap().insert(name, action);
}

pub fn clear(name: &str) {
    #[allow(clippy::unwrap_used)]
    REGISTRY.lock().unwrap().remove(name);
}

pub fn clear_all() {
    #[allow(clippy::unwrap_used)]
    REGISTRY.lock().unwrap().clear();
}

/// Check a named failpoint, applying its configured action if any.
///
/// # Errors
/// Returns `Err(msg)` if the failpoint is configured as `Error`.
///
/// # Panics
/// Panics if the failpoint is configured as `Panic` or `Abort`.
#[allow(clippy::unwrap_used)]
pub fn check(name: &str) -> Result<(), String> {
    let action = {
        let registry = REGISTRY.lock().unwrap();
        registry.get(name).cloned().unwrap_or(FailpointAction::Off)
    };
    match action {
        FailpointAction::Off => Ok(()),
        FailpointAction::Error(msg) => Err(msg),
        FailpointAction::Panic(msg) => panic!("failpoint {name}: {msg}"),
        FailpointAction::Abort => std::process::abort(),
        FailpointAction::Sleep(d) => {
            std::thread::sleep(d);
            Ok(())
        }
    }
}

/// Failpoint injection point.
///
/// With the `failpoints` feature: checks the registry and may return `Err`.
/// Without it: compiles to nothing.
///
/// Usage: `crate::fp!("before_ponr")?;`
#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        $crate::failpoints::check($name).map_err($crate::error::TransactionError::Failpoint)
    };
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fp {
    ($name:expr) => {
        Ok::<(), $crate::error::TransactionError>(())
    };
}
