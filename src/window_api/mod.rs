//! Capability interfaces over the operating system: the foreground window and the screen.
//! [GenericWindowManager] and [GenericScreenCapturer] pick the compiled-in backend.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;

use crate::daemon::error::TrackerError;

#[derive(Debug, Clone)]
pub struct ActiveWindowData {
    /// Title of the window. For example 'bash in hello' or 'Vibing in YouTube - Chrome'.
    /// Only ever hashed, never stored.
    pub window_title: Arc<str>,
    /// Name of the owning application. For example 'Code' or 'firefox'
    pub app_name: Arc<str>,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    /// Returns `None` when there is no foreground window, e.g. on a locked screen.
    fn get_active_window_data(&mut self) -> Result<Option<ActiveWindowData>>;
}

/// Grabs the contents of the screen. The returned buffer is only hashed and then dropped.
#[cfg_attr(test, mockall::automock)]
pub trait ScreenCapturer: Send {
    fn capture_screen(&mut self) -> Result<Vec<u8>>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                tracing::warn!("No window backend was compiled in, enable `win` or `x11`");
                Ok(Self {
                    inner: Box::new(NoBackend),
                })
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<Option<ActiveWindowData>> {
        self.inner.get_active_window_data()
    }
}

/// Serves as a cross-compatible ScreenCapturer implementation.
pub struct GenericScreenCapturer {
    inner: Box<dyn ScreenCapturer>,
}

impl GenericScreenCapturer {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsScreenCapturer;
                Ok(Self {
                    inner: Box::new(WindowsScreenCapturer::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxScreenCapturer;
                Ok(Self {
                    inner: Box::new(LinuxScreenCapturer::new()?),
                })
            }
            else {
                tracing::warn!("No screen backend was compiled in, enable `win` or `x11`");
                Ok(Self {
                    inner: Box::new(NoBackend),
                })
            }
        }
    }
}

impl ScreenCapturer for GenericScreenCapturer {
    fn capture_screen(&mut self) -> Result<Vec<u8>> {
        self.inner.capture_screen()
    }
}

/// Stand-in for builds without a platform backend. Every query reports the capability as
/// unavailable, so samplers keep ticking without producing records.
#[allow(dead_code)]
struct NoBackend;

impl WindowManager for NoBackend {
    fn get_active_window_data(&mut self) -> Result<Option<ActiveWindowData>> {
        Err(TrackerError::CaptureUnavailable("no window backend".into()).into())
    }
}

impl ScreenCapturer for NoBackend {
    fn capture_screen(&mut self) -> Result<Vec<u8>> {
        Err(TrackerError::CaptureUnavailable("no screen backend".into()).into())
    }
}
