//! asio-host - low-latency audio driver host
//!
//! Lists installed drivers, probes one, or streams a test tone through it.

mod tone;

use std::env;
use std::time::{Duration, Instant};

use ah_core::config::Config;
use ah_driver::null::{NullActivator, NullClock, NullDriverConfig};
use ah_driver::realtime::{handoff, DriverEvent};
use ah_driver::registry::{self, DriverDescriptor};
use ah_driver::{Activator, BufferDescriptor, Direction, Session, SessionOptions};
use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::tone::{Meter, Tone};

const USAGE: &str = "\
Usage: asio-host <command> [driver] [options]

Commands:
  list                      List installed drivers
  probe <name>|--null       Show what a driver reports
  run <name>|--null [secs]  Play a test tone for a few seconds (default 3)

Settings are read from the user config file; RUST_LOG overrides the log level.";

fn main() -> Result<()> {
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    if let Err(e) = ah_core::logging::init(&config) {
        ah_core::logging::init_default();
        warn!("Logging falls back to the console: {e}");
    }
    if let Some(e) = config_error {
        warn!("Ignoring unreadable config, using defaults: {e}");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    match command.as_str() {
        "list" => list(),
        "probe" => with_driver(&args, &config, |activator, descriptor| {
            probe(activator, descriptor, &config)
        }),
        "run" => {
            let seconds = match args.get(2) {
                Some(text) => text.parse().context("Seconds must be a number")?,
                None => 3.0,
            };
            with_driver(&args, &config, |activator, descriptor| {
                run(activator, descriptor, &config, seconds)
            })
        }
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("Unknown command {other:?}\n\n{USAGE}"),
    }
}

/// Resolve the driver argument and hand the matching activator to `f`
fn with_driver<F>(args: &[String], config: &Config, f: F) -> Result<()>
where
    F: FnOnce(&dyn DynActivator, DriverDescriptor) -> Result<()>,
{
    let name = args
        .get(1)
        .cloned()
        .or_else(|| config.driver.name.clone())
        .context("No driver named on the command line or in the config")?;

    if name == "--null" {
        let activator = NullActivator::new(NullDriverConfig {
            clock: NullClock::Thread,
            ..Default::default()
        });
        let descriptor = activator.descriptor();
        return f(&activator, descriptor);
    }
    open_installed(&name, f)
}

#[cfg(windows)]
fn open_installed<F>(name: &str, f: F) -> Result<()>
where
    F: FnOnce(&dyn DynActivator, DriverDescriptor) -> Result<()>,
{
    let descriptor = registry::find_driver(&ah_driver::SystemRegistry, name)?
        .with_context(|| format!("No installed driver named {name:?}"))?;
    let activator = ah_driver::ComActivator::new()?;
    f(&activator, descriptor)
}

#[cfg(not(windows))]
fn open_installed<F>(name: &str, _f: F) -> Result<()>
where
    F: FnOnce(&dyn DynActivator, DriverDescriptor) -> Result<()>,
{
    bail!("Installed drivers such as {name:?} are only available on Windows; try --null")
}

/// Object-safe view of an activator producing vtable-backed instances
trait DynActivator {
    fn open(&self, session: &mut Session<ah_driver::DriverInstance>) -> Result<()>;
}

impl<A> DynActivator for A
where
    A: Activator<Driver = ah_driver::DriverInstance>,
{
    fn open(&self, session: &mut Session<ah_driver::DriverInstance>) -> Result<()> {
        session.open(self)?;
        Ok(())
    }
}

fn list() -> Result<()> {
    let drivers = registry::installed_drivers().context("Failed to read installed drivers")?;
    if drivers.is_empty() {
        println!("No drivers installed");
    }
    for driver in drivers {
        println!("{:<40} {}", driver.name, driver.activation_id);
    }
    Ok(())
}

fn open_session(
    activator: &dyn DynActivator,
    descriptor: DriverDescriptor,
    config: &Config,
) -> Result<Session<ah_driver::DriverInstance>> {
    let mut session = Session::with_options(descriptor, SessionOptions::from(&config.driver));
    activator
        .open(&mut session)
        .with_context(|| format!("Failed to open {}", session.descriptor().name))?;
    Ok(session)
}

fn probe(activator: &dyn DynActivator, descriptor: DriverDescriptor, config: &Config) -> Result<()> {
    println!("=== {} ===", descriptor.name);
    println!("Activation id: {}", descriptor.activation_id);

    let mut session = open_session(activator, descriptor, config)?;
    println!("Driver:        {} (version {})", session.driver_name()?, session.driver_version()?);

    let counts = session.channels()?;
    println!("Channels:      {} in, {} out", counts.inputs, counts.outputs);

    let range = session.buffer_size()?;
    println!(
        "Buffer size:   min {} max {} preferred {} granularity {}",
        range.min, range.max, range.preferred, range.granularity
    );

    match session.latencies() {
        Ok(l) => println!("Latencies:     {} in, {} out", l.input, l.output),
        Err(e) => println!("Latencies:     unavailable ({e})"),
    }
    match session.sample_rate() {
        Ok(rate) => println!("Sample rate:   {rate} Hz"),
        Err(e) => println!("Sample rate:   unknown ({e})"),
    }

    let rates = [44100.0, 48000.0, 88200.0, 96000.0, 176400.0, 192000.0];
    let supported: Vec<String> = rates
        .iter()
        .filter(|&&rate| session.can_sample_rate(rate).unwrap_or(false))
        .map(|rate| rate.to_string())
        .collect();
    println!("Supported:     {}", supported.join(", "));

    for source in session.clock_sources().unwrap_or_default() {
        let marker = if source.is_current { "*" } else { " " };
        println!("Clock {}{}:      {}", source.index, marker, source.name);
    }

    for (direction, count) in [(Direction::Input, counts.inputs), (Direction::Output, counts.outputs)] {
        for channel in 0..count {
            let info = session.channel_info(channel, direction)?;
            println!(
                "  {:<6} {:>2}  {:<32} {:?} group {}",
                direction.name(),
                channel,
                info.name,
                info.sample_type,
                info.group
            );
        }
    }

    session.close()?;
    Ok(())
}

fn descriptors(inputs: u32, outputs: u32, available: (i32, i32)) -> Vec<BufferDescriptor> {
    let inputs = (0..available.0).take(inputs as usize).map(BufferDescriptor::input);
    let outputs = (0..available.1).take(outputs as usize).map(BufferDescriptor::output);
    inputs.chain(outputs).collect()
}

fn run(
    activator: &dyn DynActivator,
    descriptor: DriverDescriptor,
    config: &Config,
    seconds: f64,
) -> Result<()> {
    println!("=== Streaming through {} ===", descriptor.name);

    println!("\n[1/5] Opening driver...");
    let mut session = open_session(activator, descriptor, config)?;
    println!("✓ {} (version {})", session.driver_name()?, session.driver_version()?);

    println!("\n[2/5] Configuring {} Hz...", config.driver.sample_rate);
    session.configure(config.driver.sample_rate)?;
    let range = session.buffer_size()?;
    let frames = config.driver.buffer_size.unwrap_or(range.preferred);
    println!("✓ Buffer size {frames} frames (driver prefers {})", range.preferred);

    println!("\n[3/5] Creating buffers...");
    let counts = session.channels()?;
    let layout = descriptors(
        config.driver.input_channels,
        config.driver.output_channels,
        (counts.inputs, counts.outputs),
    );
    let (meters, meter_rx) = handoff::<Meter>(256);
    let tone = Tone::new(440.0, config.driver.sample_rate, 0.25, meters);
    session.create_buffers(layout, frames, tone)?;
    println!("✓ {} channels", session.buffers().len());

    println!("\n[4/5] Streaming for {seconds} s...");
    session.start()?;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut peak = 0.0f32;
    let mut last_position = None;
    let mut reset_requested = false;
    while Instant::now() < deadline && !reset_requested {
        std::thread::sleep(Duration::from_millis(100));
        for meter in meter_rx.drain() {
            peak = peak.max(meter.peak);
            last_position = meter.sample_position.or(last_position);
        }
        for event in session.poll_events() {
            info!("Driver event: {event:?}");
            reset_requested |= event == DriverEvent::ResetRequest;
        }
    }
    session.stop()?;

    let stats = session.stats();
    println!(
        "✓ {} buffer switches ({:?}), {} overlapped, input peak {:.3}",
        stats.switches,
        session.switch_mode(),
        stats.overlapped,
        peak
    );
    match last_position {
        Some(position) => println!("  Last switch at sample {position}"),
        None => println!("  Driver reported no sample positions"),
    }
    if meter_rx.dropped() > 0 {
        warn!("{} meter readings dropped", meter_rx.dropped());
    }

    println!("\n[5/5] Closing...");
    session.close()?;
    println!("✓ Done");
    Ok(())
}
