//! Stereo rendering for head-mounted displays. Coordinates a vendor tracking runtime with a host
//! renderer across each displayed frame: per-eye pose prediction, lazily derived view and
//! projection matrices, a render target ring shared by both eyes, and frame submission.
//!
//! The runtime and the renderer are reached through the `device::Runtime`,
//! `device::TrackingDevice` and `target::HostRenderer` traits. When no headset is detected a
//! software `debug::DebugDevice` stands in, so the whole pipeline runs without hardware.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use thiserror::Error;

pub mod debug;
pub mod device;
pub mod math;
pub mod render;
pub mod session;
pub mod target;

pub use device::{HmdCaps, HmdDescription, HmdType, Runtime, StatusFlags, TrackingCaps, TrackingDevice};
pub use render::{FramePhase, FrameStatus, ScopedBind};
pub use session::{HostCamera, SessionSettings, StereoSession, TrackingCamera};
pub use target::HostRenderer;

/// Error produced while interacting with a headset or its runtime.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HmdError {
    /// The tracking runtime could not be started. Nothing downstream can work without it.
    #[error("{0}")]
    RuntimeError(String),

    /// A call into the vendor runtime failed. The string is the runtime's own description of the
    /// failure.
    #[error("{0}")]
    SdkError(String),

    /// Only one `Context` can be active at a time per process. This error occurs when a thread
    /// attempts to create a `Context` while another thread's `Context` is alive.
    #[error("Context creation failed because another Context is already active in this process")]
    DuplicateContext,

    /// The window's renderer can't run stereo draw hooks.
    #[error("stereo rendering requires a renderer that supports stereo draw hooks")]
    UnsupportedRenderer,

    /// The window is closed, or no window is attached.
    #[error("no valid window is attached")]
    InvalidWindow,

    /// The session was detached and its headset released.
    #[error("the session has been detached from its headset")]
    Detached,

    /// A frame protocol call was made out of order.
    #[error("cannot {action} while the frame is {phase:?}")]
    FramePhase {
        action: &'static str,
        phase: render::FramePhase,
    },

    /// A setting was given an out-of-range value.
    #[error("invalid setting: {0}")]
    InvalidSetting(&'static str),
}

pub type HmdResult<T> = Result<T, HmdError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Eye> {
        match index {
            0 => Some(Eye::Left),
            1 => Some(Eye::Right),
            _ => None,
        }
    }
}

static ACTIVE_CONTEXT: AtomicBool = AtomicBool::new(false);

thread_local! {
    static CURRENT_CONTEXT: RefCell<Weak<RuntimeGuard>> = RefCell::new(Weak::new());
}

/// Owns the initialized runtime; shuts it down when the last `Context` handle goes away.
struct RuntimeGuard {
    runtime: Box<dyn Runtime>,
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        self.runtime.shutdown();
        let was_active = ACTIVE_CONTEXT.swap(false, Ordering::SeqCst);
        debug_assert!(was_active);
        info!("tracking runtime shut down");
    }
}

/// Tracking runtime context. Ensures the runtime has been initialized exactly once, and serves as
/// a factory for builders that give access to the HMD.
#[derive(Clone)]
pub struct Context {
    guard: Rc<RuntimeGuard>,
}

impl Context {
    /// Initialize `runtime` and return a handle to it.
    ///
    /// Repeated calls on a thread that already holds a live `Context` are no-ops: the existing
    /// context is returned and `runtime` is dropped unused.
    ///
    /// # Failure
    ///
    /// Fails with `HmdError::DuplicateContext` if another thread holds a live `Context`, and with
    /// `HmdError::RuntimeError` if the runtime can't start. Neither is recoverable; callers are
    /// expected to abort setup.
    pub fn initialize<R: Runtime + 'static>(runtime: R) -> HmdResult<Context> {
        if let Some(guard) = CURRENT_CONTEXT.with(|current| current.borrow().upgrade()) {
            return Ok(Context { guard });
        }

        if ACTIVE_CONTEXT.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(HmdError::DuplicateContext);
        }

        if let Err(e) = runtime.initialize() {
            ACTIVE_CONTEXT.store(false, Ordering::SeqCst);
            error!("tracking runtime failed to initialize: {}", e);
            return Err(HmdError::RuntimeError(e.to_string()));
        }
        info!("tracking runtime initialized");

        let guard = Rc::new(RuntimeGuard { runtime: Box::new(runtime) });
        CURRENT_CONTEXT.with(|current| *current.borrow_mut() = Rc::downgrade(&guard));
        Ok(Context { guard })
    }

    /// True if a `Context` is alive anywhere in the process.
    pub fn is_active() -> bool {
        ACTIVE_CONTEXT.load(Ordering::SeqCst)
    }

    pub fn runtime(&self) -> &dyn Runtime {
        &*self.guard.runtime
    }

    pub fn time_in_seconds(&self) -> f64 {
        self.guard.runtime.time_in_seconds()
    }

    /// Create a builder for a stereo session.
    pub fn build_session(&self) -> SessionBuilder {
        SessionBuilder::new(self.clone())
    }
}

/// Options for specifying the enabled tracking capabilities of a headset.
pub struct TrackingOptions {
    track_caps: TrackingCaps,
}

impl TrackingOptions {
    /// `TrackingOptions` with no tracking options enabled.
    pub fn new() -> TrackingOptions {
        TrackingOptions { track_caps: TrackingCaps::empty() }
    }

    /// `TrackingOptions` with all supported tracking options enabled.
    pub fn with_all() -> TrackingOptions {
        TrackingOptions {
            track_caps: TrackingCaps::ORIENTATION | TrackingCaps::MAG_YAW_CORRECTION | TrackingCaps::POSITION,
        }
    }

    /// Enable tracking of head position.
    pub fn position(&mut self) -> &mut TrackingOptions {
        self.track_caps.insert(TrackingCaps::POSITION);
        self
    }

    /// Enable tracking of head orientation.
    pub fn orientation(&mut self) -> &mut TrackingOptions {
        self.track_caps.insert(TrackingCaps::ORIENTATION);
        self
    }

    /// Enable yaw drift correction.
    pub fn mag_yaw_correct(&mut self) -> &mut TrackingOptions {
        self.track_caps.insert(TrackingCaps::MAG_YAW_CORRECTION);
        self
    }

    pub fn caps(&self) -> TrackingCaps {
        self.track_caps
    }
}

impl Default for TrackingOptions {
    fn default() -> TrackingOptions {
        TrackingOptions::new()
    }
}

/// Builder to construct a stereo session. Allows the configuration of rendering settings, HMD
/// capabilities and tracking capabilities.
pub struct SessionBuilder {
    context: Context,
    settings: SessionSettings,
    caps: HmdCaps,
    track_caps: TrackingCaps,
    allow_debug: bool,
}

impl SessionBuilder {
    fn new(context: Context) -> SessionBuilder {
        SessionBuilder {
            context,
            settings: SessionSettings::default(),
            caps: HmdCaps::LOW_PERSISTENCE | HmdCaps::DYNAMIC_PREDICTION,
            track_caps: TrackingOptions::with_all().caps(),
            allow_debug: true,
        }
    }

    /// Render target supersampling factor; 1.0 renders at the headset's recommended size.
    pub fn screen_percentage(&mut self, percentage: f32) -> &mut SessionBuilder {
        self.settings.screen_percentage = percentage;
        self
    }

    /// Size of the desktop mirror relative to the headset's native resolution.
    pub fn mirror_percentage(&mut self, percentage: f32) -> &mut SessionBuilder {
        self.settings.mirror_percentage = percentage;
        self
    }

    pub fn head_scale(&mut self, scale: f32) -> &mut SessionBuilder {
        self.settings.head_scale = scale;
        self
    }

    /// Render both eyes from the same point, with no eye separation.
    pub fn monoscopic(&mut self) -> &mut SessionBuilder {
        self.settings.monoscopic = true;
        self
    }

    /// Disables mirroring of HMD output to the attached window. This may improve rendering
    /// performance slightly.
    pub fn no_mirror(&mut self) -> &mut SessionBuilder {
        self.settings.mirrored = false;
        self
    }

    /// Ignore tracked head position; only orientation affects the view.
    pub fn no_positional_tracking(&mut self) -> &mut SessionBuilder {
        self.settings.positional_tracking = false;
        self
    }

    /// Disable low persistence.
    pub fn no_low_persistence(&mut self) -> &mut SessionBuilder {
        self.caps.remove(HmdCaps::LOW_PERSISTENCE);
        self
    }

    /// Disable dynamic adjustment of tracking prediction based on internally measured latency.
    pub fn no_dynamic_prediction(&mut self) -> &mut SessionBuilder {
        self.caps.remove(HmdCaps::DYNAMIC_PREDICTION);
        self
    }

    /// Disable VSync.
    pub fn no_vsync(&mut self) -> &mut SessionBuilder {
        self.caps.insert(HmdCaps::NO_VSYNC);
        self
    }

    /// Enable tracking with the specified tracking options.
    pub fn track(&mut self, tracking_options: &TrackingOptions) -> &mut SessionBuilder {
        self.track_caps = tracking_options.caps();
        self
    }

    /// Fail instead of creating a "debug" HMD when no headset is found.
    pub fn require_hardware(&mut self) -> &mut SessionBuilder {
        self.allow_debug = false;
        self
    }

    /// Open the headset and build the session. If no headset is found, a debug headset is used
    /// unless `require_hardware` was set.
    pub fn build(&self) -> HmdResult<StereoSession> {
        self.settings.validate()?;

        let runtime = self.context.runtime();
        let detected = match runtime.detect() {
            Ok(detected) => detected,
            Err(e) => {
                warn!("headset detection failed: {}", e);
                false
            }
        };
        let device = if detected {
            runtime.create_device(0)
        } else {
            Err(HmdError::SdkError("no headset detected".to_string()))
        };
        let device = match device {
            Ok(device) => device,
            Err(e) if self.allow_debug => {
                warn!("{}; falling back to a debug headset", e);
                runtime.create_debug_device(HmdType::Dk2)?
            }
            Err(e) => {
                error!("failed to create headset: {}", e);
                return Err(e);
            }
        };

        Ok(StereoSession::new(self.context.clone(), device, self.settings, self.caps, self.track_caps))
    }
}
