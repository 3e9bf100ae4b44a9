//! COM apartment RAII guard.
//!
//! [`ComGuard`] wraps `CoInitializeEx` / `CoUninitialize` so the apartment
//! is correctly torn down even on panic or early return.  The driver holds
//! one guard for its whole lifetime; UIA interfaces it hands out must not
//! outlive the driver.
//!
//! The `PhantomData<*const ()>` field enforces `!Send` + `!Sync` at compile
//! time, preventing the guard from crossing thread boundaries.

use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};

use crate::errors::DriveError;

/// RAII wrapper that calls `CoUninitialize` on `Drop` when a balancing
/// call is required.
#[must_use = "ComGuard must be kept alive for the duration of COM usage"]
pub struct ComGuard {
    should_uninit: bool,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    /// Initialise (or join) the thread's MTA COM apartment.
    ///
    /// `S_OK`, `S_FALSE` and `RPC_E_CHANGED_MODE` all leave COM usable;
    /// only the first two require a balancing `CoUninitialize`.
    pub fn init() -> Result<Self, DriveError> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };

        match hr.0 as u32 {
            // S_OK (newly initialised) or S_FALSE (already initialised).
            0x0 | 0x1 => Ok(Self {
                should_uninit: true,
                _not_send: std::marker::PhantomData,
            }),
            // RPC_E_CHANGED_MODE -- thread already has an STA apartment.
            0x8001_0106 => {
                log::warn!(
                    "CoInitializeEx: RPC_E_CHANGED_MODE -- thread already has an STA \
                     apartment, using it instead of MTA"
                );
                Ok(Self {
                    should_uninit: false,
                    _not_send: std::marker::PhantomData,
                })
            }
            value => Err(DriveError::Startup(format!(
                "CoInitializeEx failed: HRESULT 0x{value:08X}"
            ))),
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}
