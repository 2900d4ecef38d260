//! Driver session lifecycle
//!
//! ```text
//! Closed --open--> Initialized --configure--> Configured
//!   ^                  ^                          |
//!   |                  |                    create_buffers
//!   |            dispose_buffers                  v
//!   |                  +-------------------- BuffersCreated <--stop-- Streaming
//!   +------------------- close (from any open state) ---------start----^
//! ```
//!
//! Calling an operation outside its states is a caller defect and returns
//! [`SessionError::Precondition`] without touching the driver.

use std::ffi::c_void;
use std::ptr;

use ah_core::config::DriverConfig;
use ah_core::error::{AsioError, SessionError};
use ah_core::{realtime_debug, session_debug, session_info};
use tracing::{error, warn};

use crate::activation::Activator;
use crate::dispatch::{
    AsioDriver, BufferDescriptor, BufferSizeRange, ChannelCounts, ChannelInfo, ClockSource,
    Direction, Latencies, SamplePosition,
};
use crate::realtime::{
    BufferSwitchHandler, ChannelBuffer, DriverEvent, RealtimeContext, RealtimeStats, Registration,
    SwitchMode, CALLBACKS,
};
use crate::registry::DriverDescriptor;

/// Lifecycle state of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    Initialized,
    Configured,
    BuffersCreated,
    Streaming,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Initialized => "Initialized",
            Self::Configured => "Configured",
            Self::BuffersCreated => "BuffersCreated",
            Self::Streaming => "Streaming",
        }
    }
}

const OPEN_STATES: &[SessionState] = &[
    SessionState::Initialized,
    SessionState::Configured,
    SessionState::BuffersCreated,
    SessionState::Streaming,
];

/// Host-side session settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Accept the driver's time-info switch when offered
    pub time_info: bool,
    /// Slots in the realtime event queue
    pub event_queue_capacity: usize,
    /// Window handle passed to the driver's `init`, 0 for none
    pub sys_handle: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            time_info: true,
            event_queue_capacity: 64,
            sys_handle: 0,
        }
    }
}

impl From<&DriverConfig> for SessionOptions {
    fn from(config: &DriverConfig) -> Self {
        Self {
            time_info: config.time_info,
            event_queue_capacity: config.event_queue_capacity,
            ..Default::default()
        }
    }
}

struct Streams {
    registration: Registration,
    descriptors: Vec<BufferDescriptor>,
    buffer_size: i32,
}

/// One driver, driven through its lifecycle from a single control thread
pub struct Session<D: AsioDriver> {
    descriptor: DriverDescriptor,
    options: SessionOptions,
    state: SessionState,
    driver: Option<D>,
    streams: Option<Streams>,
    pending_events: Vec<DriverEvent>,
}

impl<D: AsioDriver> Session<D> {
    pub fn new(descriptor: DriverDescriptor) -> Self {
        Self::with_options(descriptor, SessionOptions::default())
    }

    pub fn with_options(descriptor: DriverDescriptor, options: SessionOptions) -> Self {
        Self {
            descriptor,
            options,
            state: SessionState::Closed,
            driver: None,
            streams: None,
            pending_events: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn descriptor(&self) -> &DriverDescriptor {
        &self.descriptor
    }

    fn precondition(&self, operation: &'static str) -> SessionError {
        error!(target: "session", "{} called in state {}", operation, self.state.name());
        SessionError::Precondition {
            operation,
            state: self.state.name(),
        }
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<&D, SessionError> {
        match &self.driver {
            Some(driver) if allowed.contains(&self.state) => Ok(driver),
            _ => Err(self.precondition(operation)),
        }
    }

    /// Activate and initialize the driver
    pub fn open<A>(&mut self, activator: &A) -> Result<(), SessionError>
    where
        A: Activator<Driver = D>,
    {
        if self.state != SessionState::Closed {
            return Err(self.precondition("open"));
        }
        let driver = activator.activate(&self.descriptor.activation_id)?;
        if !driver.init(self.options.sys_handle as *mut c_void) {
            let message = driver.error_message();
            drop(driver);
            warn!(target: "session", "{} refused to initialize: {}", self.descriptor.name, message);
            return Err(SessionError::InitFailed { message });
        }
        session_info!(
            "opened {:?}: {} version {}",
            self.descriptor.name,
            driver.driver_name(),
            driver.driver_version()
        );
        self.driver = Some(driver);
        self.state = SessionState::Initialized;
        Ok(())
    }

    pub fn driver_name(&self) -> Result<String, SessionError> {
        Ok(self.require("driver_name", OPEN_STATES)?.driver_name())
    }

    pub fn driver_version(&self) -> Result<i32, SessionError> {
        Ok(self.require("driver_version", OPEN_STATES)?.driver_version())
    }

    pub fn error_message(&self) -> Result<String, SessionError> {
        Ok(self.require("error_message", OPEN_STATES)?.error_message())
    }

    pub fn channels(&self) -> Result<ChannelCounts, SessionError> {
        Ok(self.require("channels", OPEN_STATES)?.channels()?)
    }

    pub fn latencies(&self) -> Result<Latencies, SessionError> {
        Ok(self.require("latencies", OPEN_STATES)?.latencies()?)
    }

    pub fn buffer_size(&self) -> Result<BufferSizeRange, SessionError> {
        Ok(self.require("buffer_size", OPEN_STATES)?.buffer_size()?)
    }

    pub fn channel_info(&self, channel: i32, direction: Direction) -> Result<ChannelInfo, SessionError> {
        Ok(self
            .require("channel_info", OPEN_STATES)?
            .channel_info(channel, direction)?)
    }

    pub fn can_sample_rate(&self, rate: f64) -> Result<bool, SessionError> {
        Ok(self.require("can_sample_rate", OPEN_STATES)?.can_sample_rate(rate))
    }

    pub fn sample_rate(&self) -> Result<f64, SessionError> {
        Ok(self.require("sample_rate", OPEN_STATES)?.sample_rate()?)
    }

    /// Change the rate without moving the session along.
    ///
    /// Drivers typically answer a change once buffers exist with a reset
    /// request, which shows up in [`Session::poll_events`].
    pub fn set_sample_rate(&self, rate: f64) -> Result<(), SessionError> {
        self.require("set_sample_rate", OPEN_STATES)?.set_sample_rate(rate)?;
        session_debug!("sample rate set to {} Hz in state {}", rate, self.state.name());
        Ok(())
    }

    pub fn clock_sources(&self) -> Result<Vec<ClockSource>, SessionError> {
        Ok(self.require("clock_sources", OPEN_STATES)?.clock_sources()?)
    }

    pub fn set_clock_source(&self, index: i32) -> Result<(), SessionError> {
        let driver = self.require(
            "set_clock_source",
            &[SessionState::Initialized, SessionState::Configured],
        )?;
        Ok(driver.set_clock_source(index)?)
    }

    pub fn sample_position(&self) -> Result<SamplePosition, SessionError> {
        Ok(self.require("sample_position", OPEN_STATES)?.sample_position()?)
    }

    pub fn control_panel(&self) -> Result<(), SessionError> {
        Ok(self.require("control_panel", OPEN_STATES)?.control_panel()?)
    }

    /// Tell the driver the current output half is ready early
    pub fn output_ready(&self) -> Result<bool, SessionError> {
        Ok(self
            .require("output_ready", &[SessionState::Streaming])?
            .output_ready())
    }

    /// Ask whether the driver supports a capability selector
    pub fn can_do(&self, selector: i32) -> Result<bool, SessionError> {
        let driver = self.require("can_do", OPEN_STATES)?;
        // SAFETY: capability queries take no argument
        Ok(unsafe { driver.future(selector, ptr::null_mut()) }.is_ok())
    }

    /// Raw extension call.
    ///
    /// # Safety
    /// `opt` must satisfy whatever `selector` requires of it.
    pub unsafe fn future(&self, selector: i32, opt: *mut c_void) -> Result<(), SessionError> {
        Ok(self.require("future", OPEN_STATES)?.future(selector, opt)?)
    }

    /// Set the sample rate the stream will run at
    pub fn configure(&mut self, sample_rate: f64) -> Result<(), SessionError> {
        let driver = self.require(
            "configure",
            &[SessionState::Initialized, SessionState::Configured],
        )?;
        driver.set_sample_rate(sample_rate)?;
        session_debug!("configured at {} Hz", sample_rate);
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Allocate double buffers and route the driver's callbacks to `handler`
    pub fn create_buffers<H>(
        &mut self,
        descriptors: Vec<BufferDescriptor>,
        buffer_size: i32,
        handler: H,
    ) -> Result<(), SessionError>
    where
        H: BufferSwitchHandler + 'static,
    {
        let driver = self.require("create_buffers", &[SessionState::Configured])?;
        if descriptors.is_empty() {
            return Err(SessionError::NoChannels);
        }

        let counts = driver.channels()?;
        for descriptor in &descriptors {
            let available = match descriptor.direction {
                Direction::Input => counts.inputs,
                Direction::Output => counts.outputs,
            };
            if !(0..available).contains(&descriptor.channel) {
                return Err(SessionError::ChannelOutOfRange {
                    channel: descriptor.channel,
                    direction: descriptor.direction.name(),
                    available,
                });
            }
        }

        let range = driver.buffer_size()?;
        if !range.accepts(buffer_size) {
            return Err(SessionError::InvalidBufferSize {
                requested: buffer_size,
                min: range.min,
                max: range.max,
                preferred: range.preferred,
                granularity: range.granularity,
            });
        }

        let mut layouts = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let info = driver.channel_info(descriptor.channel, descriptor.direction)?;
            let width = info
                .sample_type
                .bytes_per_sample()
                .ok_or(SessionError::UnsupportedSampleType {
                    channel: descriptor.channel,
                    raw: info.sample_type.to_raw(),
                })?;
            layouts.push((info.sample_type, width * buffer_size as usize));
        }

        let context = RealtimeContext::new(
            Box::new(handler),
            buffer_size as usize,
            self.options.time_info,
            self.options.event_queue_capacity,
        );
        let registration = Registration::install(context)?;

        let mut descriptors = descriptors;
        driver.create_buffers(&mut descriptors, buffer_size, &CALLBACKS)?;

        let channels: Option<Vec<ChannelBuffer>> = descriptors
            .iter()
            .zip(&layouts)
            .map(|(d, &(sample_type, bytes))| {
                ChannelBuffer::new(d.direction, d.channel, sample_type, d.buffers, bytes)
            })
            .collect();
        let Some(channels) = channels else {
            drop(registration);
            if let Err(e) = driver.dispose_buffers() {
                warn!(target: "session", "dispose after null buffer failed: {}", e);
            }
            return Err(SessionError::Driver(AsioError::NoMemory));
        };
        registration.context().set_channels(channels);

        session_info!(
            "created buffers for {} channels at {} frames",
            descriptors.len(),
            buffer_size
        );
        self.streams = Some(Streams {
            registration,
            descriptors,
            buffer_size,
        });
        self.state = SessionState::BuffersCreated;
        Ok(())
    }

    /// Descriptors with the driver's buffer addresses filled in
    pub fn buffers(&self) -> &[BufferDescriptor] {
        self.streams.as_ref().map_or(&[], |s| &s.descriptors)
    }

    /// Frames per buffer half, once buffers exist
    pub fn frames(&self) -> Option<i32> {
        self.streams.as_ref().map(|s| s.buffer_size)
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require("start", &[SessionState::BuffersCreated])?.start()?;
        session_info!("streaming");
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// Stop streaming; no buffer switch runs once this returns
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.require("stop", &[SessionState::Streaming])?.stop()?;
        session_info!("stopped");
        self.state = SessionState::BuffersCreated;
        Ok(())
    }

    /// Release the buffers, returning to [`SessionState::Initialized`].
    ///
    /// The callback slot is released before the driver frees its buffers. The
    /// state moves on even if the driver reports an error.
    pub fn dispose_buffers(&mut self) -> Result<(), SessionError> {
        self.require("dispose_buffers", &[SessionState::BuffersCreated])?;
        self.release_streams();
        let result = self
            .require("dispose_buffers", &[SessionState::BuffersCreated])?
            .dispose_buffers();
        self.state = SessionState::Initialized;
        session_debug!("buffers disposed");
        Ok(result?)
    }

    fn release_streams(&mut self) {
        if let Some(streams) = self.streams.take() {
            let context = streams.registration.context();
            self.pending_events
                .extend(std::iter::from_fn(|| context.pop_event()));
        }
    }

    /// Unwind from any open state and release the driver.
    ///
    /// Every step is attempted; the first failure is returned and the session
    /// ends up closed regardless.
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(self.precondition("close"));
        }
        let mut first_error = None;

        if self.state == SessionState::Streaming {
            if let Err(e) = self.stop() {
                warn!(target: "session", "stop during close failed: {}", e);
                first_error.get_or_insert(e);
                self.state = SessionState::BuffersCreated;
            }
        }
        if self.state == SessionState::BuffersCreated {
            if let Err(e) = self.dispose_buffers() {
                warn!(target: "session", "dispose during close failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        self.driver = None;
        self.state = SessionState::Closed;
        session_info!("closed {:?}", self.descriptor.name);
        first_error.map_or(Ok(()), Err)
    }

    /// Notifications raised by the driver since the last poll
    pub fn poll_events(&mut self) -> Vec<DriverEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        if let Some(streams) = &self.streams {
            let context = streams.registration.context();
            events.extend(std::iter::from_fn(|| context.pop_event()));
        }
        for event in &events {
            realtime_debug!("driver event {:?}", event);
        }
        events
    }

    /// Realtime counters for the current buffers
    pub fn stats(&self) -> RealtimeStats {
        self.streams
            .as_ref()
            .map(|s| s.registration.context().stats())
            .unwrap_or_default()
    }

    /// Which switch callback the driver has been using
    pub fn switch_mode(&self) -> Option<SwitchMode> {
        self.streams
            .as_ref()
            .and_then(|s| s.registration.context().switch_mode())
    }
}

impl<D: AsioDriver> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            let _ = self.close();
        }
    }
}
