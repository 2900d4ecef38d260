//! Typed driver interface
//!
//! [`AsioDriver`] exposes one method per driver entry point with Rust types in
//! and out. The implementation for [`DriverInstance`] marshals each call
//! through the dispatch table and decodes every status the same way.

use std::ffi::{c_char, c_void};
use std::ptr;

use ah_core::driver_trace;
use ah_core::error::{decode_status, AsioError, ASE_OK};
use ah_ffi::types::{
    fixed_str, BufferInfoRaw, Callbacks, ChannelInfoRaw, ClockSourceRaw, Samples, TimeStamp,
    ASIO_FALSE, ASIO_TRUE, DRIVER_TEXT_LEN,
};
use ah_ffi::{rate_arg, SampleType};

use crate::activation::DriverInstance;

/// Upper bound on clock sources requested from a driver
pub const MAX_CLOCK_SOURCES: usize = 32;

/// Input and output channel counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    pub inputs: i32,
    pub outputs: i32,
}

/// Input and output latencies, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latencies {
    pub input: i32,
    pub output: i32,
}

/// Buffer size geometry reported by the driver.
///
/// A granularity of `-1` means sizes are powers of two; `0` means only the
/// preferred size is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizeRange {
    pub min: i32,
    pub max: i32,
    pub preferred: i32,
    pub granularity: i32,
}

impl BufferSizeRange {
    /// Whether `size` is a buffer size this geometry allows
    pub fn accepts(&self, size: i32) -> bool {
        if size < self.min || size > self.max {
            return false;
        }
        match self.granularity {
            0 => size == self.preferred,
            -1 => size > 0 && (size as u32).is_power_of_two(),
            g if g > 0 => (size - self.preferred) % g == 0,
            _ => false,
        }
    }
}

/// Direction of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn is_input(self) -> bool {
        self == Self::Input
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Description of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: i32,
    pub direction: Direction,
    pub is_active: bool,
    pub group: i32,
    pub sample_type: SampleType,
    pub name: String,
}

/// One selectable clock source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSource {
    pub index: i32,
    pub associated_channel: i32,
    pub associated_group: i32,
    pub is_current: bool,
    pub name: String,
}

/// Sample position and the system time it was sampled at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePosition {
    pub samples: u64,
    pub system_time_ns: u64,
}

/// Request for one channel's double buffer; the driver fills in `buffers`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub direction: Direction,
    pub channel: i32,
    pub buffers: [*mut c_void; 2],
}

impl BufferDescriptor {
    pub fn new(direction: Direction, channel: i32) -> Self {
        Self {
            direction,
            channel,
            buffers: [ptr::null_mut(); 2],
        }
    }

    pub fn input(channel: i32) -> Self {
        Self::new(Direction::Input, channel)
    }

    pub fn output(channel: i32) -> Self {
        Self::new(Direction::Output, channel)
    }

    fn to_raw(self) -> BufferInfoRaw {
        BufferInfoRaw {
            is_input: if self.direction.is_input() { ASIO_TRUE } else { ASIO_FALSE },
            channel_num: self.channel,
            buffers: self.buffers,
        }
    }
}

/// Typed driver entry points.
///
/// Calls are blocking and must be issued from the thread that activated the
/// driver. Results outside the known status band come back as
/// [`AsioError::Unrecognized`] carrying the driver's own message.
pub trait AsioDriver {
    /// Initialize the driver; `false` means the driver is unusable
    fn init(&self, sys_handle: *mut c_void) -> bool;
    fn driver_name(&self) -> String;
    fn driver_version(&self) -> i32;
    /// Text for the most recent failure
    fn error_message(&self) -> String;

    fn start(&self) -> Result<(), AsioError>;
    fn stop(&self) -> Result<(), AsioError>;

    fn channels(&self) -> Result<ChannelCounts, AsioError>;
    fn latencies(&self) -> Result<Latencies, AsioError>;
    fn buffer_size(&self) -> Result<BufferSizeRange, AsioError>;

    /// Whether the hardware can run at `rate`
    fn can_sample_rate(&self, rate: f64) -> bool;
    fn sample_rate(&self) -> Result<f64, AsioError>;
    fn set_sample_rate(&self, rate: f64) -> Result<(), AsioError>;

    fn clock_sources(&self) -> Result<Vec<ClockSource>, AsioError>;
    fn set_clock_source(&self, index: i32) -> Result<(), AsioError>;
    fn sample_position(&self) -> Result<SamplePosition, AsioError>;
    fn channel_info(&self, channel: i32, direction: Direction) -> Result<ChannelInfo, AsioError>;

    /// Allocate double buffers for `descriptors` and register `callbacks`.
    ///
    /// On success each descriptor carries the driver's buffer addresses, valid
    /// until [`Self::dispose_buffers`] returns.
    fn create_buffers(
        &self,
        descriptors: &mut [BufferDescriptor],
        buffer_size: i32,
        callbacks: &'static Callbacks,
    ) -> Result<(), AsioError>;
    fn dispose_buffers(&self) -> Result<(), AsioError>;

    /// Show the driver's settings UI; returns without waiting for it
    fn control_panel(&self) -> Result<(), AsioError>;

    /// Extension entry point.
    ///
    /// # Safety
    /// `opt` must satisfy whatever `selector` requires of it.
    unsafe fn future(&self, selector: i32, opt: *mut c_void) -> Result<(), AsioError>;

    /// Tell the driver the output half is filled; `false` if unsupported
    fn output_ready(&self) -> bool;
}

impl DriverInstance {
    fn decode(&self, raw: i32) -> Result<(), AsioError> {
        decode_status(raw, || self.error_message())
    }

    fn read_text(&self, call: impl FnOnce(*mut c_char)) -> String {
        let mut buf = [0u8; DRIVER_TEXT_LEN];
        call(buf.as_mut_ptr().cast());
        fixed_str(&buf)
    }
}

// SAFETY (all unsafe blocks below): the instance holds a reference, so the
// object and its table are live, and every pointer argument refers to a local
// that outlives the call.
impl AsioDriver for DriverInstance {
    fn init(&self, sys_handle: *mut c_void) -> bool {
        driver_trace!("init");
        unsafe { (self.vtbl().init)(self.as_ptr(), sys_handle) != ASIO_FALSE }
    }

    fn driver_name(&self) -> String {
        self.read_text(|buf| unsafe { (self.vtbl().get_driver_name)(self.as_ptr(), buf) })
    }

    fn driver_version(&self) -> i32 {
        unsafe { (self.vtbl().get_driver_version)(self.as_ptr()) }
    }

    fn error_message(&self) -> String {
        self.read_text(|buf| unsafe { (self.vtbl().get_error_message)(self.as_ptr(), buf) })
    }

    fn start(&self) -> Result<(), AsioError> {
        driver_trace!("start");
        self.decode(unsafe { (self.vtbl().start)(self.as_ptr()) })
    }

    fn stop(&self) -> Result<(), AsioError> {
        driver_trace!("stop");
        self.decode(unsafe { (self.vtbl().stop)(self.as_ptr()) })
    }

    fn channels(&self) -> Result<ChannelCounts, AsioError> {
        let (mut inputs, mut outputs) = (0, 0);
        self.decode(unsafe { (self.vtbl().get_channels)(self.as_ptr(), &mut inputs, &mut outputs) })?;
        Ok(ChannelCounts { inputs, outputs })
    }

    fn latencies(&self) -> Result<Latencies, AsioError> {
        let (mut input, mut output) = (0, 0);
        self.decode(unsafe { (self.vtbl().get_latencies)(self.as_ptr(), &mut input, &mut output) })?;
        Ok(Latencies { input, output })
    }

    fn buffer_size(&self) -> Result<BufferSizeRange, AsioError> {
        let (mut min, mut max, mut preferred, mut granularity) = (0, 0, 0, 0);
        self.decode(unsafe {
            (self.vtbl().get_buffer_size)(
                self.as_ptr(),
                &mut min,
                &mut max,
                &mut preferred,
                &mut granularity,
            )
        })?;
        Ok(BufferSizeRange {
            min,
            max,
            preferred,
            granularity,
        })
    }

    fn can_sample_rate(&self, rate: f64) -> bool {
        let raw = unsafe { (self.vtbl().can_sample_rate)(self.as_ptr(), rate_arg(&rate)) };
        driver_trace!("can_sample_rate({}) -> {}", rate, raw);
        self.decode(raw).is_ok()
    }

    fn sample_rate(&self) -> Result<f64, AsioError> {
        let mut rate = 0.0;
        self.decode(unsafe { (self.vtbl().get_sample_rate)(self.as_ptr(), &mut rate) })?;
        Ok(rate)
    }

    fn set_sample_rate(&self, rate: f64) -> Result<(), AsioError> {
        driver_trace!("set_sample_rate({})", rate);
        self.decode(unsafe { (self.vtbl().set_sample_rate)(self.as_ptr(), rate_arg(&rate)) })
    }

    fn clock_sources(&self) -> Result<Vec<ClockSource>, AsioError> {
        let mut raw = [ClockSourceRaw::default(); MAX_CLOCK_SOURCES];
        let mut count = MAX_CLOCK_SOURCES as i32;
        self.decode(unsafe {
            (self.vtbl().get_clock_sources)(self.as_ptr(), raw.as_mut_ptr(), &mut count)
        })?;
        let count = (count.max(0) as usize).min(MAX_CLOCK_SOURCES);
        Ok(raw[..count]
            .iter()
            .map(|source| ClockSource {
                index: source.index,
                associated_channel: source.associated_channel,
                associated_group: source.associated_group,
                is_current: source.is_current_source != ASIO_FALSE,
                name: fixed_str(&source.name),
            })
            .collect())
    }

    fn set_clock_source(&self, index: i32) -> Result<(), AsioError> {
        driver_trace!("set_clock_source({})", index);
        self.decode(unsafe { (self.vtbl().set_clock_source)(self.as_ptr(), index) })
    }

    fn sample_position(&self) -> Result<SamplePosition, AsioError> {
        let mut samples = Samples::default();
        let mut stamp = TimeStamp::default();
        self.decode(unsafe {
            (self.vtbl().get_sample_position)(self.as_ptr(), &mut samples, &mut stamp)
        })?;
        Ok(SamplePosition {
            samples: samples.to_u64(),
            system_time_ns: stamp.to_u64(),
        })
    }

    fn channel_info(&self, channel: i32, direction: Direction) -> Result<ChannelInfo, AsioError> {
        let mut raw = ChannelInfoRaw {
            channel,
            is_input: if direction.is_input() { ASIO_TRUE } else { ASIO_FALSE },
            ..Default::default()
        };
        self.decode(unsafe { (self.vtbl().get_channel_info)(self.as_ptr(), &mut raw) })?;
        Ok(ChannelInfo {
            channel,
            direction,
            is_active: raw.is_active != ASIO_FALSE,
            group: raw.channel_group,
            sample_type: SampleType::from_raw(raw.sample_type),
            name: fixed_str(&raw.name),
        })
    }

    fn create_buffers(
        &self,
        descriptors: &mut [BufferDescriptor],
        buffer_size: i32,
        callbacks: &'static Callbacks,
    ) -> Result<(), AsioError> {
        driver_trace!("create_buffers({} channels, {} frames)", descriptors.len(), buffer_size);
        let mut raw: Vec<BufferInfoRaw> = descriptors.iter().map(|d| d.to_raw()).collect();
        self.decode(unsafe {
            (self.vtbl().create_buffers)(
                self.as_ptr(),
                raw.as_mut_ptr(),
                raw.len() as i32,
                buffer_size,
                callbacks,
            )
        })?;
        for (descriptor, info) in descriptors.iter_mut().zip(&raw) {
            descriptor.buffers = info.buffers;
        }
        Ok(())
    }

    fn dispose_buffers(&self) -> Result<(), AsioError> {
        driver_trace!("dispose_buffers");
        self.decode(unsafe { (self.vtbl().dispose_buffers)(self.as_ptr()) })
    }

    fn control_panel(&self) -> Result<(), AsioError> {
        self.decode(unsafe { (self.vtbl().control_panel)(self.as_ptr()) })
    }

    unsafe fn future(&self, selector: i32, opt: *mut c_void) -> Result<(), AsioError> {
        let raw = (self.vtbl().future)(self.as_ptr(), selector, opt);
        driver_trace!("future({:#x}) -> {}", selector, raw);
        self.decode(raw)
    }

    fn output_ready(&self) -> bool {
        unsafe { (self.vtbl().output_ready)(self.as_ptr()) == ASE_OK }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activator;
    use crate::null::{EntryPoint, NullActivator, NullDriverConfig, NULL_DRIVER_ID};
    use ah_ffi::types::future;

    fn open(config: NullDriverConfig) -> (NullActivator, DriverInstance) {
        let activator = NullActivator::new(config);
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(driver.init(ptr::null_mut()));
        (activator, driver)
    }

    #[test]
    fn test_buffer_size_stepped() {
        let range = BufferSizeRange {
            min: 64,
            max: 2048,
            preferred: 256,
            granularity: 64,
        };
        assert!(range.accepts(64));
        assert!(range.accepts(256));
        assert!(range.accepts(2048));
        assert!(!range.accepts(100));
        assert!(!range.accepts(32));
        assert!(!range.accepts(4096));
    }

    #[test]
    fn test_buffer_size_power_of_two() {
        let range = BufferSizeRange {
            min: 64,
            max: 2048,
            preferred: 512,
            granularity: -1,
        };
        assert!(range.accepts(64));
        assert!(range.accepts(1024));
        assert!(!range.accepts(768));
        assert!(!range.accepts(4096));
    }

    #[test]
    fn test_buffer_size_fixed() {
        let range = BufferSizeRange {
            min: 64,
            max: 2048,
            preferred: 512,
            granularity: 0,
        };
        assert!(range.accepts(512));
        assert!(!range.accepts(64));
        assert!(!range.accepts(2048));
        assert!(!range.accepts(256));
        assert!(!range.accepts(1024));
    }

    #[test]
    fn test_identity_queries() {
        let (_activator, driver) = open(NullDriverConfig::default());
        assert_eq!(driver.driver_name(), "Null Driver");
        assert_eq!(driver.driver_version(), 1);
        assert_eq!(driver.channels().unwrap(), ChannelCounts { inputs: 2, outputs: 2 });
    }

    #[test]
    fn test_channel_name_truncated_at_nul() {
        let config = NullDriverConfig {
            input_names: vec!["Mic In".to_string()],
            ..Default::default()
        };
        let (_activator, driver) = open(config);
        let info = driver.channel_info(0, Direction::Input).unwrap();
        assert_eq!(info.name, "Mic In");
        assert_eq!(info.direction, Direction::Input);
        assert_eq!(info.sample_type, SampleType::Int32Lsb);
        // Active only once buffers exist for it
        assert!(!info.is_active);
    }

    #[test]
    fn test_channel_out_of_range() {
        let (_activator, driver) = open(NullDriverConfig::default());
        assert_eq!(
            driver.channel_info(7, Direction::Output),
            Err(AsioError::InvalidParameter)
        );
    }

    #[test]
    fn test_unrecognized_status_carries_driver_message() {
        let config = NullDriverConfig::default().fail(EntryPoint::SetClockSource, -12345);
        let (_activator, driver) = open(config);
        let err = driver.set_clock_source(0).unwrap_err();
        assert_eq!(err.code(), -12345);
        match err {
            AsioError::Unrecognized { message, .. } => {
                assert!(message.contains("set_clock_source"), "{message}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_sample_rates() {
        let (_activator, driver) = open(NullDriverConfig::default());
        assert!(driver.can_sample_rate(48000.0));
        assert!(!driver.can_sample_rate(12345.0));
        driver.set_sample_rate(48000.0).unwrap();
        assert_eq!(driver.sample_rate().unwrap(), 48000.0);
        assert_eq!(driver.set_sample_rate(12345.0), Err(AsioError::NoClock));
    }

    #[test]
    fn test_clock_sources() {
        let (_activator, driver) = open(NullDriverConfig::default());
        let sources = driver.clock_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].is_current);
        driver.set_clock_source(1).unwrap();
        assert!(driver.clock_sources().unwrap()[1].is_current);
        assert_eq!(driver.set_clock_source(5), Err(AsioError::InvalidParameter));
    }

    #[test]
    fn test_sample_position_idle() {
        let (_activator, driver) = open(NullDriverConfig::default());
        assert_eq!(driver.sample_position(), Err(AsioError::SpNotAdvancing));
    }

    #[test]
    fn test_future_selectors() {
        let (_activator, driver) = open(NullDriverConfig::default());
        unsafe {
            assert!(driver.future(future::CAN_TIME_INFO, ptr::null_mut()).is_ok());
            assert_eq!(
                driver.future(future::CAN_TIME_CODE, ptr::null_mut()),
                Err(AsioError::NotPresent)
            );
        }
    }

    #[test]
    fn test_output_ready_optional() {
        let (_activator, driver) = open(NullDriverConfig::default());
        assert!(!driver.output_ready());
        let (_activator, driver) = open(NullDriverConfig {
            output_ready: true,
            ..Default::default()
        });
        assert!(driver.output_ready());
    }
}
