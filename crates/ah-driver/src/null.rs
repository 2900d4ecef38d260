//! Software driver
//!
//! A complete driver object behind the same dispatch table real drivers
//! expose, so the host can run without audio hardware. Outputs are looped
//! back into the input channel of the same index one buffer later.
//!
//! The clock is either driven by hand through [`NullDriverHandle::tick`] or by
//! a thread that switches buffers at the nominal rate.

use std::ffi::{c_char, c_void};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ah_core::error::{
    ActivationError, ASE_INVALID_MODE, ASE_INVALID_PARAMETER, ASE_NOT_PRESENT, ASE_NO_CLOCK,
    ASE_NO_MEMORY, ASE_OK, ASE_SP_NOT_ADVANCING, ASE_SUCCESS,
};
use ah_ffi::com::E_NOINTERFACE;
use ah_ffi::types::{
    future, message, write_fixed_str, AsioBool, AsioTime, BufferInfoRaw, Callbacks,
    ChannelInfoRaw, ClockSourceRaw, Samples, TimeInfoFlags, TimeStamp, ASIO_FALSE, ASIO_TRUE,
    DRIVER_TEXT_LEN,
};
use ah_ffi::{read_rate_arg, AsioObject, AsioVtbl, Guid, RateArg, SampleType};
use bytemuck::Zeroable;
use parking_lot::Mutex;

use crate::activation::{Activator, DriverInstance};
use crate::dispatch::{BufferSizeRange, Direction};
use crate::registry::DriverDescriptor;

/// Activation identifier of the software driver
pub const NULL_DRIVER_ID: Guid = Guid::from_fields(0x4E55_4C4C, 0x4452, 0x5652, *b"ASIOHOST");

const IUNKNOWN_ID: Guid =
    Guid::from_fields(0, 0, 0, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]);

const CLOCK_SOURCES: [&str; 2] = ["Internal", "Word Clock"];

/// Frames added to the buffer size when reporting output latency
const OUTPUT_SAFETY_OFFSET: i32 = 32;

/// Entry points that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Start,
    Stop,
    GetChannels,
    GetLatencies,
    GetBufferSize,
    CanSampleRate,
    GetSampleRate,
    SetSampleRate,
    GetClockSources,
    SetClockSource,
    GetSamplePosition,
    GetChannelInfo,
    CreateBuffers,
    DisposeBuffers,
    ControlPanel,
}

impl EntryPoint {
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::GetChannels => "get_channels",
            Self::GetLatencies => "get_latencies",
            Self::GetBufferSize => "get_buffer_size",
            Self::CanSampleRate => "can_sample_rate",
            Self::GetSampleRate => "get_sample_rate",
            Self::SetSampleRate => "set_sample_rate",
            Self::GetClockSources => "get_clock_sources",
            Self::SetClockSource => "set_clock_source",
            Self::GetSamplePosition => "get_sample_position",
            Self::GetChannelInfo => "get_channel_info",
            Self::CreateBuffers => "create_buffers",
            Self::DisposeBuffers => "dispose_buffers",
            Self::ControlPanel => "control_panel",
        }
    }
}

/// What drives buffer switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullClock {
    /// Only [`NullDriverHandle::tick`] switches buffers
    Manual,
    /// A background thread switches at the nominal rate while started
    Thread,
}

/// Behaviour of the software driver
#[derive(Debug, Clone)]
pub struct NullDriverConfig {
    pub name: String,
    pub version: i32,
    pub inputs: i32,
    pub outputs: i32,
    /// Channel names; missing entries get a generated name
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub sample_type: SampleType,
    pub buffer_sizes: BufferSizeRange,
    pub sample_rates: Vec<f64>,
    pub clock: NullClock,
    /// Make `init` report failure
    pub fail_init: bool,
    /// Status codes to return instead of doing the work
    pub failures: Vec<(EntryPoint, i32)>,
    pub output_ready: bool,
}

impl Default for NullDriverConfig {
    fn default() -> Self {
        Self {
            name: "Null Driver".to_string(),
            version: 1,
            inputs: 2,
            outputs: 2,
            input_names: Vec::new(),
            output_names: Vec::new(),
            sample_type: SampleType::Int32Lsb,
            buffer_sizes: BufferSizeRange {
                min: 64,
                max: 2048,
                preferred: 512,
                granularity: -1,
            },
            sample_rates: vec![44100.0, 48000.0, 88200.0, 96000.0],
            clock: NullClock::Manual,
            fail_init: false,
            failures: Vec::new(),
            output_ready: false,
        }
    }
}

impl NullDriverConfig {
    /// Make `entry` return `code`
    pub fn fail(mut self, entry: EntryPoint, code: i32) -> Self {
        self.failures.push((entry, code));
        self
    }

    fn failure(&self, entry: EntryPoint) -> Option<i32> {
        self.failures
            .iter()
            .find(|(failing, _)| *failing == entry)
            .map(|&(_, code)| code)
    }

    fn channel_name(&self, direction: Direction, channel: i32) -> String {
        let (names, prefix) = match direction {
            Direction::Input => (&self.input_names, "Input"),
            Direction::Output => (&self.output_names, "Output"),
        };
        names
            .get(channel as usize)
            .cloned()
            .unwrap_or_else(|| format!("{} {}", prefix, channel + 1))
    }

    fn channel_count(&self, direction: Direction) -> i32 {
        match direction {
            Direction::Input => self.inputs,
            Direction::Output => self.outputs,
        }
    }
}

/// Heap block handed to the host as one half of a double buffer
struct RawHalf {
    words: NonNull<u64>,
    word_count: usize,
    len: usize,
}

// SAFETY: plain heap memory with no thread affinity
unsafe impl Send for RawHalf {}

impl RawHalf {
    fn new(len: usize) -> Self {
        // u64 backing keeps every sample type naturally aligned
        let word_count = len.div_ceil(8).max(1);
        let block: &mut [u64] = Box::leak(vec![0u64; word_count].into_boxed_slice());
        Self {
            words: NonNull::from(block).cast(),
            word_count,
            len,
        }
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        self.words.as_ptr().cast()
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the block is at least len bytes and lives as long as self
        unsafe { slice::from_raw_parts(self.as_mut_ptr(), self.len) }
    }
}

impl Drop for RawHalf {
    fn drop(&mut self) {
        // SAFETY: reconstitutes the box leaked in new
        drop(unsafe {
            Box::from_raw(ptr::slice_from_raw_parts_mut(self.words.as_ptr(), self.word_count))
        });
    }
}

struct StreamChannel {
    direction: Direction,
    channel: i32,
    halves: [RawHalf; 2],
    played: Vec<u8>,
}

struct Streams {
    frames: usize,
    callbacks: Callbacks,
    time_info: bool,
    channels: Vec<StreamChannel>,
}

impl Streams {
    /// Play the half the host filled last time and record the half it gets next
    fn exchange(&mut self, half: usize) {
        let other = 1 - half;
        for channel in self.channels.iter_mut() {
            if channel.direction == Direction::Output {
                channel.played.clear();
                channel.played.extend_from_slice(channel.halves[other].bytes());
            }
        }
        for i in 0..self.channels.len() {
            if self.channels[i].direction != Direction::Input {
                continue;
            }
            let number = self.channels[i].channel;
            let source = self
                .channels
                .iter()
                .find(|c| c.direction == Direction::Output && c.channel == number);
            let target = &self.channels[i].halves[half];
            match source {
                Some(source) => {
                    let len = source.played.len().min(target.len);
                    // SAFETY: distinct allocations, both at least len bytes
                    unsafe {
                        ptr::copy_nonoverlapping(source.played.as_ptr(), target.as_mut_ptr(), len)
                    };
                }
                // SAFETY: target owns len bytes
                None => unsafe { ptr::write_bytes(target.as_mut_ptr(), 0, target.len) },
            }
        }
    }
}

struct Device {
    initialized: bool,
    sample_rate: f64,
    clock_source: i32,
    last_error: String,
    streams: Option<Streams>,
    running: bool,
    next_half: usize,
    position: u64,
}

struct NullShared {
    config: NullDriverConfig,
    device: Mutex<Device>,
    clock: Mutex<Option<JoinHandle<()>>>,
    epoch: Instant,
    live_refs: AtomicU32,
    instances: AtomicU32,
    panel_opens: AtomicU32,
}

impl NullShared {
    fn with_device<T>(
        &self,
        entry: EntryPoint,
        f: impl FnOnce(&mut Device) -> Result<T, i32>,
    ) -> Result<T, i32> {
        let mut dev = self.device.lock();
        if !dev.initialized {
            dev.last_error = format!("null driver: {} called before init", entry.name());
            return Err(ASE_NOT_PRESENT);
        }
        if let Some(code) = self.config.failure(entry) {
            dev.last_error = format!("null driver: {} failed", entry.name());
            return Err(code);
        }
        let result = f(&mut dev);
        if let Err(code) = result {
            dev.last_error = format!("null driver: {} returned {}", entry.name(), code);
        }
        result
    }

    fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn sample_bytes(&self) -> usize {
        self.config.sample_type.bytes_per_sample().unwrap_or(4)
    }

    fn init(&self) -> bool {
        let mut dev = self.device.lock();
        if self.config.fail_init {
            dev.last_error = "null driver: device unavailable".to_string();
            return false;
        }
        dev.initialized = true;
        true
    }

    fn latencies(&self) -> Result<(i32, i32), i32> {
        self.with_device(EntryPoint::GetLatencies, |dev| {
            let frames = dev
                .streams
                .as_ref()
                .map_or(self.config.buffer_sizes.preferred, |s| s.frames as i32);
            Ok((frames, frames + OUTPUT_SAFETY_OFFSET))
        })
    }

    fn supports_rate(&self, rate: f64) -> bool {
        self.config.sample_rates.iter().any(|&r| r == rate)
    }

    fn set_sample_rate(&self, rate: f64) -> Result<(), i32> {
        self.with_device(EntryPoint::SetSampleRate, |dev| {
            if !self.supports_rate(rate) {
                return Err(ASE_NO_CLOCK);
            }
            if dev.running && dev.sample_rate != rate {
                return Err(ASE_INVALID_MODE);
            }
            dev.sample_rate = rate;
            Ok(())
        })
    }

    fn clock_sources(&self, out: &mut [ClockSourceRaw]) -> Result<usize, i32> {
        self.with_device(EntryPoint::GetClockSources, |dev| {
            let count = out.len().min(CLOCK_SOURCES.len());
            for (index, (slot, name)) in out.iter_mut().zip(CLOCK_SOURCES).enumerate() {
                *slot = ClockSourceRaw {
                    index: index as i32,
                    associated_channel: -1,
                    associated_group: -1,
                    is_current_source: if index as i32 == dev.clock_source {
                        ASIO_TRUE
                    } else {
                        ASIO_FALSE
                    },
                    ..Default::default()
                };
                write_fixed_str(&mut slot.name, name);
            }
            Ok(count)
        })
    }

    fn set_clock_source(&self, index: i32) -> Result<(), i32> {
        self.with_device(EntryPoint::SetClockSource, |dev| {
            if !(0..CLOCK_SOURCES.len() as i32).contains(&index) {
                return Err(ASE_INVALID_PARAMETER);
            }
            dev.clock_source = index;
            Ok(())
        })
    }

    fn sample_position(&self) -> Result<(u64, u64), i32> {
        self.with_device(EntryPoint::GetSamplePosition, |dev| {
            if !dev.running {
                return Err(ASE_SP_NOT_ADVANCING);
            }
            Ok((dev.position, self.now_ns()))
        })
    }

    fn channel_info(&self, info: &mut ChannelInfoRaw) -> Result<(), i32> {
        self.with_device(EntryPoint::GetChannelInfo, |dev| {
            let direction = if info.is_input != ASIO_FALSE {
                Direction::Input
            } else {
                Direction::Output
            };
            if !(0..self.config.channel_count(direction)).contains(&info.channel) {
                return Err(ASE_INVALID_PARAMETER);
            }
            let active = dev.streams.as_ref().is_some_and(|streams| {
                streams
                    .channels
                    .iter()
                    .any(|c| c.direction == direction && c.channel == info.channel)
            });
            info.is_active = if active { ASIO_TRUE } else { ASIO_FALSE };
            info.channel_group = 0;
            info.sample_type = self.config.sample_type.to_raw();
            write_fixed_str(&mut info.name, &self.config.channel_name(direction, info.channel));
            Ok(())
        })
    }

    fn create_buffers(
        &self,
        infos: &mut [BufferInfoRaw],
        frames: i32,
        callbacks: Callbacks,
    ) -> Result<(), i32> {
        self.with_device(EntryPoint::CreateBuffers, |dev| {
            if dev.streams.is_some() {
                return Err(ASE_INVALID_MODE);
            }
            if !self.config.buffer_sizes.accepts(frames) {
                return Err(ASE_INVALID_PARAMETER);
            }
            let half_bytes = frames as usize * self.sample_bytes();
            let mut channels = Vec::with_capacity(infos.len());
            for info in infos.iter_mut() {
                let direction = if info.is_input != ASIO_FALSE {
                    Direction::Input
                } else {
                    Direction::Output
                };
                if !(0..self.config.channel_count(direction)).contains(&info.channel_num) {
                    return Err(ASE_INVALID_PARAMETER);
                }
                let halves = [RawHalf::new(half_bytes), RawHalf::new(half_bytes)];
                info.buffers = [halves[0].as_mut_ptr().cast(), halves[1].as_mut_ptr().cast()];
                channels.push(StreamChannel {
                    direction,
                    channel: info.channel_num,
                    halves,
                    played: Vec::with_capacity(half_bytes),
                });
            }
            dev.streams = Some(Streams {
                frames: frames as usize,
                callbacks,
                time_info: false,
                channels,
            });
            Ok(())
        })?;

        // The host may call back into us while answering, so probe unlocked.
        // SAFETY: the host just handed us this table for the life of the buffers
        let time_info = unsafe {
            (callbacks.asio_message)(
                message::SELECTOR_SUPPORTED,
                message::SUPPORTS_TIME_INFO,
                ptr::null_mut(),
                ptr::null_mut(),
            ) == 1
                && (callbacks.asio_message)(
                    message::SUPPORTS_TIME_INFO,
                    0,
                    ptr::null_mut(),
                    ptr::null_mut(),
                ) == 1
        };
        if let Some(streams) = self.device.lock().streams.as_mut() {
            streams.time_info = time_info;
        }
        Ok(())
    }

    fn dispose_buffers(&self) -> Result<(), i32> {
        self.with_device(EntryPoint::DisposeBuffers, |dev| {
            if dev.streams.is_none() {
                return Err(ASE_INVALID_MODE);
            }
            Ok(())
        })?;
        self.halt();
        self.device.lock().streams = None;
        Ok(())
    }

    fn start(self: &Arc<Self>) -> Result<(), i32> {
        let period = self.with_device(EntryPoint::Start, |dev| {
            let frames = dev
                .streams
                .as_ref()
                .map(|s| s.frames)
                .ok_or(ASE_INVALID_MODE)?;
            if dev.running {
                return Ok(None);
            }
            dev.running = true;
            dev.next_half = 0;
            dev.position = 0;
            Ok(Some(Duration::from_secs_f64(frames as f64 / dev.sample_rate)))
        })?;

        if let (Some(period), NullClock::Thread) = (period, self.config.clock) {
            let shared = Arc::clone(self);
            let clock = thread::Builder::new()
                .name("null-driver-clock".to_string())
                .spawn(move || loop {
                    thread::sleep(period);
                    if !shared.tick() {
                        break;
                    }
                })
                .map_err(|_| {
                    self.device.lock().running = false;
                    ASE_NO_MEMORY
                })?;
            *self.clock.lock() = Some(clock);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), i32> {
        self.with_device(EntryPoint::Stop, |_| Ok(()))?;
        self.halt();
        Ok(())
    }

    /// Stop switching; no switch is in progress once this returns
    fn halt(&self) {
        self.device.lock().running = false;
        if let Some(clock) = self.clock.lock().take() {
            if clock.thread().id() != thread::current().id() {
                let _ = clock.join();
            }
        }
    }

    fn shutdown(&self) {
        self.halt();
        let mut dev = self.device.lock();
        dev.streams = None;
        dev.initialized = false;
    }

    fn time_info(&self, position: u64, rate: f64) -> AsioTime {
        let mut time = AsioTime::zeroed();
        time.time_info.speed = 1.0;
        time.time_info.system_time = TimeStamp::from_u64(self.now_ns());
        time.time_info.sample_position = Samples::from_u64(position);
        time.time_info.sample_rate = rate;
        time.time_info.flags = (TimeInfoFlags::SYSTEM_TIME_VALID
            | TimeInfoFlags::SAMPLE_POSITION_VALID
            | TimeInfoFlags::SAMPLE_RATE_VALID
            | TimeInfoFlags::SPEED_VALID)
            .bits();
        time
    }

    /// Perform one buffer switch; `false` when not running
    fn tick(&self) -> bool {
        let (callbacks, half, time) = {
            let mut dev = self.device.lock();
            if !dev.running {
                return false;
            }
            let half = dev.next_half;
            let position = dev.position;
            let rate = dev.sample_rate;
            let Some(streams) = dev.streams.as_mut() else {
                return false;
            };
            streams.exchange(half);
            let frames = streams.frames as u64;
            let callbacks = streams.callbacks;
            let time = streams.time_info.then(|| self.time_info(position, rate));
            dev.next_half = 1 - half;
            dev.position = position + frames;
            (callbacks, half, time)
        };

        // SAFETY: the host registered these callbacks with create_buffers
        unsafe {
            match time {
                Some(mut time) => {
                    (callbacks.buffer_switch_time_info)(&mut time, half as i32, ASIO_TRUE);
                }
                None => (callbacks.buffer_switch)(half as i32, ASIO_TRUE),
            }
        }
        true
    }

    fn callbacks(&self) -> Option<Callbacks> {
        self.device.lock().streams.as_ref().map(|s| s.callbacks)
    }
}

#[repr(C)]
struct NullObject {
    base: AsioObject,
    refs: AtomicU32,
    shared: Arc<NullShared>,
}

/// # Safety
/// `this` must be a live object created by [`NullActivator`].
unsafe fn object<'a>(this: *mut AsioObject) -> &'a NullObject {
    &*this.cast::<NullObject>()
}

fn status(result: Result<(), i32>) -> i32 {
    result.err().unwrap_or(ASE_OK)
}

/// # Safety
/// `buf` must be null or point at `DRIVER_TEXT_LEN` writable bytes.
unsafe fn write_text(buf: *mut c_char, text: &str) {
    if !buf.is_null() {
        write_fixed_str(slice::from_raw_parts_mut(buf.cast::<u8>(), DRIVER_TEXT_LEN), text);
    }
}

fn add_ref(obj: &NullObject) -> u32 {
    obj.shared.live_refs.fetch_add(1, Ordering::SeqCst);
    obj.refs.fetch_add(1, Ordering::AcqRel) + 1
}

ah_ffi::com_entry! {
    unsafe fn null_query_interface(
        this: *mut AsioObject,
        iid: *const Guid,
        out: *mut *mut c_void,
    ) -> i32 {
        if out.is_null() {
            return E_NOINTERFACE as i32;
        }
        if !iid.is_null() && (*iid == NULL_DRIVER_ID || *iid == IUNKNOWN_ID) {
            add_ref(object(this));
            *out = this.cast();
            0
        } else {
            *out = ptr::null_mut();
            E_NOINTERFACE as i32
        }
    }
}

ah_ffi::com_entry! {
    unsafe fn null_add_ref(this: *mut AsioObject) -> u32 {
        add_ref(object(this))
    }
}

ah_ffi::com_entry! {
    unsafe fn null_release(this: *mut AsioObject) -> u32 {
        let shared = Arc::clone(&object(this).shared);
        shared.live_refs.fetch_sub(1, Ordering::SeqCst);
        let remaining = object(this).refs.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            drop(Box::from_raw(this.cast::<NullObject>()));
            shared.shutdown();
            shared.instances.fetch_sub(1, Ordering::SeqCst);
        }
        remaining
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_init(this: *mut AsioObject, _sys_handle: *mut c_void) -> AsioBool {
        if object(this).shared.init() { ASIO_TRUE } else { ASIO_FALSE }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_driver_name(this: *mut AsioObject, name: *mut c_char) {
        write_text(name, &object(this).shared.config.name);
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_driver_version(this: *mut AsioObject) -> i32 {
        object(this).shared.config.version
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_error_message(this: *mut AsioObject, text: *mut c_char) {
        let message = object(this).shared.device.lock().last_error.clone();
        write_text(text, &message);
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_start(this: *mut AsioObject) -> i32 {
        status(object(this).shared.start())
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_stop(this: *mut AsioObject) -> i32 {
        status(object(this).shared.stop())
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_channels(this: *mut AsioObject, inputs: *mut i32, outputs: *mut i32) -> i32 {
        if inputs.is_null() || outputs.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        let shared = &object(this).shared;
        status(shared.with_device(EntryPoint::GetChannels, |_| {
            *inputs = shared.config.inputs;
            *outputs = shared.config.outputs;
            Ok(())
        }))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_latencies(this: *mut AsioObject, input: *mut i32, output: *mut i32) -> i32 {
        if input.is_null() || output.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        match object(this).shared.latencies() {
            Ok((i, o)) => {
                *input = i;
                *output = o;
                ASE_OK
            }
            Err(code) => code,
        }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_buffer_size(
        this: *mut AsioObject,
        min: *mut i32,
        max: *mut i32,
        preferred: *mut i32,
        granularity: *mut i32,
    ) -> i32 {
        if min.is_null() || max.is_null() || preferred.is_null() || granularity.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        let shared = &object(this).shared;
        status(shared.with_device(EntryPoint::GetBufferSize, |_| {
            let sizes = shared.config.buffer_sizes;
            *min = sizes.min;
            *max = sizes.max;
            *preferred = sizes.preferred;
            *granularity = sizes.granularity;
            Ok(())
        }))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_can_sample_rate(this: *mut AsioObject, rate: RateArg) -> i32 {
        let rate = read_rate_arg(rate);
        let shared = &object(this).shared;
        status(shared.with_device(EntryPoint::CanSampleRate, |_| {
            if shared.supports_rate(rate) { Ok(()) } else { Err(ASE_NO_CLOCK) }
        }))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_sample_rate(this: *mut AsioObject, rate: *mut f64) -> i32 {
        if rate.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        status(object(this).shared.with_device(EntryPoint::GetSampleRate, |dev| {
            *rate = dev.sample_rate;
            Ok(())
        }))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_set_sample_rate(this: *mut AsioObject, rate: RateArg) -> i32 {
        status(object(this).shared.set_sample_rate(read_rate_arg(rate)))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_clock_sources(
        this: *mut AsioObject,
        clocks: *mut ClockSourceRaw,
        count: *mut i32,
    ) -> i32 {
        if clocks.is_null() || count.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        let out = slice::from_raw_parts_mut(clocks, (*count).max(0) as usize);
        match object(this).shared.clock_sources(out) {
            Ok(written) => {
                *count = written as i32;
                ASE_OK
            }
            Err(code) => code,
        }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_set_clock_source(this: *mut AsioObject, index: i32) -> i32 {
        status(object(this).shared.set_clock_source(index))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_sample_position(
        this: *mut AsioObject,
        position: *mut Samples,
        stamp: *mut TimeStamp,
    ) -> i32 {
        if position.is_null() || stamp.is_null() {
            return ASE_INVALID_PARAMETER;
        }
        match object(this).shared.sample_position() {
            Ok((samples, ns)) => {
                *position = Samples::from_u64(samples);
                *stamp = TimeStamp::from_u64(ns);
                ASE_OK
            }
            Err(code) => code,
        }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_get_channel_info(this: *mut AsioObject, info: *mut ChannelInfoRaw) -> i32 {
        match info.as_mut() {
            Some(info) => status(object(this).shared.channel_info(info)),
            None => ASE_INVALID_PARAMETER,
        }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_create_buffers(
        this: *mut AsioObject,
        infos: *mut BufferInfoRaw,
        count: i32,
        frames: i32,
        callbacks: *const Callbacks,
    ) -> i32 {
        if infos.is_null() || callbacks.is_null() || count <= 0 {
            return ASE_INVALID_PARAMETER;
        }
        let infos = slice::from_raw_parts_mut(infos, count as usize);
        status(object(this).shared.create_buffers(infos, frames, *callbacks))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_dispose_buffers(this: *mut AsioObject) -> i32 {
        status(object(this).shared.dispose_buffers())
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_control_panel(this: *mut AsioObject) -> i32 {
        let shared = &object(this).shared;
        status(shared.with_device(EntryPoint::ControlPanel, |_| {
            shared.panel_opens.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }))
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_future(_this: *mut AsioObject, selector: i32, _opt: *mut c_void) -> i32 {
        match selector {
            future::CAN_TIME_INFO => ASE_SUCCESS,
            _ => ASE_NOT_PRESENT,
        }
    }
}

ah_ffi::vtbl_entry! {
    unsafe fn null_output_ready(this: *mut AsioObject) -> i32 {
        if object(this).shared.config.output_ready { ASE_OK } else { ASE_NOT_PRESENT }
    }
}

static NULL_VTBL: AsioVtbl = AsioVtbl {
    query_interface: null_query_interface,
    add_ref: null_add_ref,
    release: null_release,
    init: null_init,
    get_driver_name: null_get_driver_name,
    get_driver_version: null_get_driver_version,
    get_error_message: null_get_error_message,
    start: null_start,
    stop: null_stop,
    get_channels: null_get_channels,
    get_latencies: null_get_latencies,
    get_buffer_size: null_get_buffer_size,
    can_sample_rate: null_can_sample_rate,
    get_sample_rate: null_get_sample_rate,
    set_sample_rate: null_set_sample_rate,
    get_clock_sources: null_get_clock_sources,
    set_clock_source: null_set_clock_source,
    get_sample_position: null_get_sample_position,
    get_channel_info: null_get_channel_info,
    create_buffers: null_create_buffers,
    dispose_buffers: null_dispose_buffers,
    control_panel: null_control_panel,
    future: null_future,
    output_ready: null_output_ready,
};

/// Activator producing software driver instances that share one device
pub struct NullActivator {
    shared: Arc<NullShared>,
}

impl NullActivator {
    pub fn new(config: NullDriverConfig) -> Self {
        let sample_rate = config.sample_rates.first().copied().unwrap_or(44100.0);
        Self {
            shared: Arc::new(NullShared {
                config,
                device: Mutex::new(Device {
                    initialized: false,
                    sample_rate,
                    clock_source: 0,
                    last_error: String::new(),
                    streams: None,
                    running: false,
                    next_half: 0,
                    position: 0,
                }),
                clock: Mutex::new(None),
                epoch: Instant::now(),
                live_refs: AtomicU32::new(0),
                instances: AtomicU32::new(0),
                panel_opens: AtomicU32::new(0),
            }),
        }
    }

    /// Registry-style description of this driver
    pub fn descriptor(&self) -> DriverDescriptor {
        DriverDescriptor {
            name: self.shared.config.name.clone(),
            activation_id: NULL_DRIVER_ID,
        }
    }

    /// Inspection and control from outside the dispatch table
    pub fn handle(&self) -> NullDriverHandle {
        NullDriverHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Activator for NullActivator {
    type Driver = DriverInstance;

    fn activate(&self, id: &Guid) -> Result<DriverInstance, ActivationError> {
        if *id != NULL_DRIVER_ID {
            return Err(ActivationError::NotFound);
        }
        let object = Box::new(NullObject {
            base: AsioObject { vtbl: &NULL_VTBL },
            refs: AtomicU32::new(1),
            shared: Arc::clone(&self.shared),
        });
        self.shared.live_refs.fetch_add(1, Ordering::SeqCst);
        self.shared.instances.fetch_add(1, Ordering::SeqCst);
        let ptr = NonNull::from(Box::leak(object)).cast::<AsioObject>();
        // SAFETY: the object starts with its table pointer and carries one reference
        Ok(unsafe { DriverInstance::from_raw(ptr) })
    }
}

/// Side door into the software device
#[derive(Clone)]
pub struct NullDriverHandle {
    shared: Arc<NullShared>,
}

impl NullDriverHandle {
    /// References held across every instance
    pub fn live_refs(&self) -> u32 {
        self.shared.live_refs.load(Ordering::SeqCst)
    }

    /// Instances not yet destroyed
    pub fn instances(&self) -> u32 {
        self.shared.instances.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.device.lock().running
    }

    pub fn has_buffers(&self) -> bool {
        self.shared.device.lock().streams.is_some()
    }

    /// Whether the host accepted the time-info switch; `None` without buffers
    pub fn time_info_enabled(&self) -> Option<bool> {
        self.shared.device.lock().streams.as_ref().map(|s| s.time_info)
    }

    pub fn control_panel_opens(&self) -> u32 {
        self.shared.panel_opens.load(Ordering::Relaxed)
    }

    /// Switch buffers once; `false` if the device is not running
    pub fn tick(&self) -> bool {
        self.shared.tick()
    }

    /// Switch buffers up to `count` times, returning how many happened
    pub fn tick_n(&self, count: usize) -> usize {
        (0..count).take_while(|_| self.shared.tick()).count()
    }

    /// Bytes last played from output `channel`
    pub fn played(&self, channel: i32) -> Option<Vec<u8>> {
        let dev = self.shared.device.lock();
        dev.streams.as_ref()?.channels.iter().find_map(|c| {
            (c.direction == Direction::Output && c.channel == channel).then(|| c.played.clone())
        })
    }

    /// Send a host message the way a driver would; `None` without buffers
    pub fn send_message(&self, selector: i32, value: i32) -> Option<i32> {
        let callbacks = self.shared.callbacks()?;
        // SAFETY: registered by the host in create_buffers
        Some(unsafe { (callbacks.asio_message)(selector, value, ptr::null_mut(), ptr::null_mut()) })
    }

    /// Simulate the rate changing under the host
    pub fn change_sample_rate(&self, rate: f64) -> bool {
        self.shared.device.lock().sample_rate = rate;
        let Some(callbacks) = self.shared.callbacks() else {
            return false;
        };
        // SAFETY: registered by the host in create_buffers
        unsafe { (callbacks.sample_rate_did_change)(rate) };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AsioDriver, BufferDescriptor};
    use ah_core::error::AsioError;

    #[test]
    fn test_calls_before_init_are_not_present() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert_eq!(driver.channels(), Err(AsioError::NotPresent));
        assert!(driver.error_message().contains("before init"));
    }

    #[test]
    fn test_init_failure_reports_message() {
        let activator = NullActivator::new(NullDriverConfig {
            fail_init: true,
            ..Default::default()
        });
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(!driver.init(ptr::null_mut()));
        assert_eq!(driver.error_message(), "null driver: device unavailable");
    }

    #[test]
    fn test_start_without_buffers_is_invalid_mode() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(driver.init(ptr::null_mut()));
        assert_eq!(driver.start(), Err(AsioError::InvalidMode));
        assert!(!activator.handle().tick());
    }

    #[test]
    fn test_create_buffers_rejects_bad_geometry() {
        let _lock = crate::realtime::SLOT_LOCK.lock();
        let activator = NullActivator::new(NullDriverConfig::default());
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(driver.init(ptr::null_mut()));

        let callbacks = &crate::realtime::CALLBACKS;
        let mut odd = [BufferDescriptor::output(0)];
        assert_eq!(
            driver.create_buffers(&mut odd, 500, callbacks),
            Err(AsioError::InvalidParameter)
        );
        let mut missing = [BufferDescriptor::output(9)];
        assert_eq!(
            driver.create_buffers(&mut missing, 512, callbacks),
            Err(AsioError::InvalidParameter)
        );
        assert!(!activator.handle().has_buffers());
    }

    #[test]
    fn test_final_release_frees_buffers() {
        let _lock = crate::realtime::SLOT_LOCK.lock();
        let activator = NullActivator::new(NullDriverConfig::default());
        let handle = activator.handle();
        let driver = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(driver.init(ptr::null_mut()));

        let mut descriptors = [BufferDescriptor::input(0), BufferDescriptor::output(0)];
        driver
            .create_buffers(&mut descriptors, 256, &crate::realtime::CALLBACKS)
            .unwrap();
        assert!(descriptors.iter().all(|d| d.buffers.iter().all(|b| !b.is_null())));
        assert!(handle.has_buffers());

        drop(driver);
        assert!(!handle.has_buffers());
        assert_eq!(handle.instances(), 0);
    }
}
