use log::{debug, info};
use std::fmt;
use std::time::Instant;

use super::traits::ValueSink;
use crate::modbus::transport::Transport;
use crate::registers::{holding, Catalog};
use crate::scheduler::{ResponseOutcome, Scheduler, SchedulerTimings, StepOutcome, WriteRequest};
use crate::utils::error::ModbusError;

/// Raw register value for a setpoint in degrees: hundredths, rounded to the
/// nearest step. Firmware tools that truncate instead store one less for
/// values like 20.07 (2006 rather than 2007), since `20.07 * 100` lands just
/// below 2007 in floating point.
pub fn temperature_to_raw(celsius: f32) -> Result<u16, ModbusError> {
    if !celsius.is_finite() {
        return Err(ModbusError::InvalidData(format!("Invalid temperature: {}", celsius)));
    }
    let hundredths = (celsius * 100.0).round();
    if hundredths < i16::MIN as f32 || hundredths > i16::MAX as f32 {
        return Err(ModbusError::InvalidData(format!(
            "Temperature out of range: {}",
            celsius
        )));
    }
    Ok(hundredths as i16 as u16)
}

/// One Nilan controller on one serial line: the poll scheduler plus the
/// transport it sends on and the sink it publishes to.
pub struct Nilan<T: Transport, S: ValueSink> {
    scheduler: Scheduler,
    transport: T,
    sink: S,
}

impl<T: Transport, S: ValueSink> Nilan<T, S> {
    pub fn new(slave: u8, catalog: Catalog, transport: T, sink: S) -> Self {
        Self::with_timings(slave, catalog, SchedulerTimings::default(), transport, sink)
    }

    pub fn with_timings(
        slave: u8,
        catalog: Catalog,
        timings: SchedulerTimings,
        transport: T,
        sink: S,
    ) -> Self {
        Self {
            scheduler: Scheduler::with_timings(slave, catalog, timings),
            transport,
            sink,
        }
    }

    /// Cycle tick: starts a new pass over the catalog when idle.
    pub fn update(&mut self) -> bool {
        self.scheduler.cycle_tick()
    }

    /// Step tick.
    pub fn loop_once(&mut self, now: Instant) -> Result<StepOutcome, ModbusError> {
        self.scheduler.step(now, &mut self.transport)
    }

    /// Response payload, already stripped of address, function code, byte
    /// count and CRC.
    pub fn on_modbus_data(&mut self, payload: &[u8]) -> ResponseOutcome {
        self.scheduler.on_response(payload, &mut self.sink)
    }

    pub fn write_target_temperature(
        &mut self,
        celsius: f32,
        now: Instant,
    ) -> Result<Option<StepOutcome>, ModbusError> {
        let raw = temperature_to_raw(celsius)?;
        debug!("Target temp write pending.... ({})", raw);
        self.queue(WriteRequest::new(holding::TEMPSET, raw), now)
    }

    pub fn write_fan_speed(&mut self, speed: u16, now: Instant) -> Result<Option<StepOutcome>, ModbusError> {
        debug!("Fan speed write pending.... ({})", speed);
        self.queue(WriteRequest::new(holding::VENTSET, speed), now)
    }

    pub fn write_operation_mode(&mut self, mode: u16, now: Instant) -> Result<Option<StepOutcome>, ModbusError> {
        debug!("Operation mode write pending.... ({})", mode);
        self.queue(WriteRequest::new(holding::MODESET, mode), now)
    }

    pub fn write_runset(&mut self, run: u16, now: Instant) -> Result<Option<StepOutcome>, ModbusError> {
        debug!("Runset write pending.... ({})", run);
        self.queue(WriteRequest::new(holding::RUNSET, run), now)
    }

    pub fn write_data_ignore_response(
        &mut self,
        register: u16,
        value: u16,
        now: Instant,
    ) -> Result<Option<StepOutcome>, ModbusError> {
        debug!("Data write pending.... ({} -> {})", value, register);
        self.queue(WriteRequest::ignoring_response(register, value), now)
    }

    pub fn write_register(
        &mut self,
        register: u16,
        value: u16,
        now: Instant,
    ) -> Result<Option<StepOutcome>, ModbusError> {
        self.queue(WriteRequest::new(register, value), now)
    }

    fn queue(&mut self, request: WriteRequest, now: Instant) -> Result<Option<StepOutcome>, ModbusError> {
        self.scheduler.enqueue(request, now, &mut self.transport)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn dump_config(&self) {
        info!("🌬️  Nilan controller at slave address {}", self.scheduler.slave());
        let blocks: Vec<&str> = self.scheduler.catalog().iter().map(|b| b.id.name()).collect();
        info!("📋 Register blocks ({}): {}", blocks.len(), blocks.join(", "));
        let timings = self.scheduler.timings();
        info!(
            "⏱️  Response timeout {} ms, min send interval {} ms",
            timings.response_timeout.as_millis(),
            timings.min_send_interval.as_millis()
        );
    }
}

/// A write requested from outside the poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NilanCommand {
    TargetTemperature(f32),
    FanSpeed(u16),
    OperationMode(u16),
    Runset(u16),
    WriteRegister { register: u16, value: u16, ignore_response: bool },
}

impl NilanCommand {
    pub fn apply<T: Transport, S: ValueSink>(
        self,
        nilan: &mut Nilan<T, S>,
        now: Instant,
    ) -> Result<Option<StepOutcome>, ModbusError> {
        match self {
            NilanCommand::TargetTemperature(celsius) => nilan.write_target_temperature(celsius, now),
            NilanCommand::FanSpeed(speed) => nilan.write_fan_speed(speed, now),
            NilanCommand::OperationMode(mode) => nilan.write_operation_mode(mode, now),
            NilanCommand::Runset(run) => nilan.write_runset(run, now),
            NilanCommand::WriteRegister { register, value, ignore_response: true } => {
                nilan.write_data_ignore_response(register, value, now)
            }
            NilanCommand::WriteRegister { register, value, ignore_response: false } => {
                nilan.write_register(register, value, now)
            }
        }
    }
}

impl fmt::Display for NilanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NilanCommand::TargetTemperature(c) => write!(f, "target temperature {:.2} °C", c),
            NilanCommand::FanSpeed(s) => write!(f, "fan speed {}", s),
            NilanCommand::OperationMode(m) => write!(f, "operation mode {}", m),
            NilanCommand::Runset(r) => write!(f, "runset {}", r),
            NilanCommand::WriteRegister { register, value, .. } => {
                write!(f, "register {} = {}", register, value)
            }
        }
    }
}
