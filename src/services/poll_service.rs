use log::{debug, error, info, warn};
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::devices::{
    ChannelSink, ClimateCall, Nilan, NilanClimate, NilanCommand, ReadingCache, TimestampedReading,
    ValueSink,
};
use crate::modbus::{ResponseSource, SerialTransport, Transport};
use crate::output::{formatter_for, ConsoleSender, DataFormatter, DataSender, FileSender};
use crate::registers::Catalog;
use crate::scheduler::{ResponseOutcome, SchedulerTimings, StepOutcome};
use crate::utils::error::ModbusError;

/// Runs one Nilan controller: feeds responses and ticks into the scheduler,
/// then fans the decoded readings out to the cache, the climate view and the
/// configured senders.
pub struct PollService<T: Transport + ResponseSource> {
    config: Config,
    nilan: Nilan<T, ChannelSink>,
    readings: UnboundedReceiver<TimestampedReading>,
    cache: ReadingCache,
    climate: NilanClimate,
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl PollService<SerialTransport> {
    pub fn open(config: Config) -> Result<Self, ModbusError> {
        let transport = SerialTransport::open(
            &config.serial_port,
            config.baud_rate,
            &config.parity,
            config.slave_address,
        )?;
        Self::new(config, transport)
    }
}

impl<T: Transport + ResponseSource> PollService<T> {
    pub fn new(config: Config, transport: T) -> Result<Self, ModbusError> {
        let timings = config.scheduler_timings();
        Self::with_timings(config, transport, timings)
    }

    /// Like `new`, but with bus timings that bypass the configured minimums.
    #[cfg(test)]
    pub(crate) fn with_fast_bus(
        config: Config,
        transport: T,
        timings: SchedulerTimings,
    ) -> Result<Self, ModbusError> {
        Self::with_timings(config, transport, timings)
    }

    fn with_timings(config: Config, transport: T, timings: SchedulerTimings) -> Result<Self, ModbusError> {
        config.validate()?;
        let (tx, readings) = mpsc::unbounded_channel();
        let nilan = Nilan::with_timings(
            config.slave_address,
            Catalog::from_enabled(config.enabled_blocks()),
            timings,
            transport,
            ChannelSink::new(tx),
        );

        let formatter = formatter_for(&config.output.default_format)?;
        let mut senders: Vec<Box<dyn DataSender>> = vec![Box::new(ConsoleSender)];
        if let Some(path) = config.output_file() {
            senders.push(Box::new(FileSender::new(path, true)));
        }

        Ok(Self {
            climate: NilanClimate::new(config.climate.current_temp_reading.clone()),
            config,
            nilan,
            readings,
            cache: ReadingCache::new(),
            formatter,
            senders,
        })
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn clear_senders(&mut self) {
        self.senders.clear();
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn DataFormatter>) {
        self.formatter = formatter;
    }

    pub fn formatter(&self) -> &dyn DataFormatter {
        self.formatter.as_ref()
    }

    pub fn cache(&self) -> &ReadingCache {
        &self.cache
    }

    pub fn climate(&self) -> &NilanClimate {
        &self.climate
    }

    pub fn nilan(&self) -> &Nilan<T, ChannelSink> {
        &self.nilan
    }

    pub fn log_config(&self) {
        info!("🚀 Nilan polling service");
        info!(
            "🔌 Serial: {} @ {} baud, parity {:?}",
            self.config.serial_port, self.config.baud_rate, self.config.parity
        );
        info!(
            "⏱️  Cycle every {} s, step every {} ms",
            self.config.update_interval_seconds, self.config.step_interval_ms
        );
        self.nilan.dump_config();
        info!(
            "📤 Output: {} via {}",
            self.config.output.default_format,
            self.senders
                .iter()
                .map(|s| format!("{}({})", s.sender_type(), s.destination()))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    /// Continuous polling until Ctrl-C.
    pub async fn run(&mut self, mut commands: UnboundedReceiver<NilanCommand>) -> Result<(), ModbusError> {
        self.log_config();
        let header = self.formatter.format_header();
        if !header.is_empty() {
            self.broadcast(&header).await;
        }

        let mut cycle = interval(self.config.update_interval());
        let mut step = interval(self.config.step_interval());
        step.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Stopping Nilan polling...");
                    break;
                }
                _ = cycle.tick() => {
                    if self.nilan.update() {
                        debug!("🔄 Poll cycle started");
                    } else {
                        debug!("Previous cycle still running ({})", self.nilan.scheduler().state());
                    }
                }
                Some(command) = commands.recv() => {
                    info!("🎛️  Command received: {}", command);
                    if let Err(e) = command.apply(&mut self.nilan, now()) {
                        error!("❌ Failed to send {}: {}", command, e);
                    }
                }
                _ = step.tick() => {
                    if let Err(e) = self.tick(now()) {
                        error!("❌ Modbus error: {}", e);
                    }
                    self.forward_readings().await;
                }
            }
        }
        Ok(())
    }

    /// One pass: applies `command` (or starts a read cycle) and keeps stepping
    /// until the scheduler is idle with nothing left to write.
    pub async fn run_cycle(&mut self, command: Option<NilanCommand>) -> Result<(), ModbusError> {
        match command {
            Some(command) => {
                info!("🎛️  Sending {}", command);
                command.apply(&mut self.nilan, now())?;
            }
            None => {
                self.nilan.update();
            }
        }
        self.drain().await
    }

    /// Applies a thermostat call the same way as `run_cycle`.
    pub async fn run_climate_call(&mut self, call: ClimateCall) -> Result<(), ModbusError> {
        self.climate.control(call, &mut self.nilan, now())?;
        self.drain().await
    }

    async fn drain(&mut self) -> Result<(), ModbusError> {
        let mut step = interval(self.config.step_interval());
        step.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.nilan.scheduler().is_settled() {
            step.tick().await;
            let outcome = self.tick(now());
            self.forward_readings().await;
            match outcome? {
                StepOutcome::TimedOut { .. } => return Err(ModbusError::Timeout),
                _ => continue,
            }
        }
        self.forward_readings().await;
        Ok(())
    }

    /// Hands any received payload to the scheduler, then lets it send. A
    /// failed read still steps the scheduler so the response timeout runs.
    fn tick(&mut self, now: Instant) -> Result<StepOutcome, ModbusError> {
        let received = match self.nilan.transport_mut().poll_response(now) {
            Ok(received) => received,
            Err(e) => {
                warn!("⚠️  Failed to read from the bus: {}", e);
                None
            }
        };
        if let Some(payload) = received {
            match self.nilan.on_modbus_data(&payload) {
                ResponseOutcome::Decoded { block, readings } => {
                    debug!("📥 {}: {} readings", block, readings);
                }
                ResponseOutcome::DecodeFailed { block } => {
                    warn!("⚠️  {} response could not be decoded", block);
                }
                ResponseOutcome::WriteAcknowledged => debug!("✅ Write acknowledged"),
                ResponseOutcome::Unsolicited => {}
            }
        }
        self.nilan.loop_once(now)
    }

    async fn forward_readings(&mut self) -> usize {
        let mut batch = Vec::new();
        while let Ok(item) = self.readings.try_recv() {
            self.cache.publish(item.reading.clone());
            if self.climate.observe(&item.reading) {
                debug!(
                    "🌡️  Climate: current {:?}, target {:?}, fan {}",
                    self.climate.current_temperature, self.climate.target_temperature, self.climate.fan_mode
                );
            }
            batch.push(item);
        }

        if !batch.is_empty() && !self.senders.is_empty() {
            let data = self.formatter.format_batch(&batch);
            self.broadcast(&data).await;
        }
        batch.len()
    }

    async fn broadcast(&self, data: &str) {
        for sender in &self.senders {
            if let Err(e) = sender.send(data).await {
                error!(
                    "❌ Failed to send data via {} to {}: {}",
                    sender.sender_type(),
                    sender.destination(),
                    e
                );
            }
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterSelection;
    use crate::devices::{ClimateFanMode, Value};
    use crate::modbus::protocol::encode_write;
    use crate::registers::BlockId;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Answers every request like a controller whose registers all hold
    /// `register_value`.
    #[derive(Default)]
    struct SimulatedNilan {
        frames: Vec<Vec<u8>>,
        pending: VecDeque<Vec<u8>>,
        register_value: u16,
        silent: bool,
        read_fails: bool,
    }

    impl Transport for SimulatedNilan {
        fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
            self.frames.push(frame.to_vec());
            if self.silent {
                return Ok(());
            }
            let payload = match frame[1] {
                3 | 4 => {
                    let count = u16::from_be_bytes([frame[4], frame[5]]) as usize;
                    self.register_value.to_be_bytes().repeat(count)
                }
                _ => frame[2..6].to_vec(),
            };
            self.pending.push_back(payload);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ModbusError> {
            Ok(())
        }
    }

    impl ResponseSource for SimulatedNilan {
        fn poll_response(&mut self, _now: Instant) -> Result<Option<Vec<u8>>, ModbusError> {
            if self.read_fails {
                return Err(ModbusError::CommunicationError("IO error: device unplugged".to_string()));
            }
            Ok(self.pending.pop_front())
        }
    }

    fn fast_config(blocks: &[BlockId]) -> Config {
        let mut config = Config::default();
        config.step_interval_ms = 1;
        config.registers = RegisterSelection::all(false);
        for &id in blocks {
            config.registers.set(id, true);
        }
        config
    }

    fn service(config: Config, device: SimulatedNilan) -> PollService<SimulatedNilan> {
        let timings = SchedulerTimings {
            response_timeout: Duration::from_millis(50),
            min_send_interval: Duration::ZERO,
        };
        let mut service = PollService::with_fast_bus(config, device, timings).unwrap();
        service.clear_senders();
        service
    }

    #[test]
    fn test_config_cannot_disable_bus_spacing() {
        let mut config = fast_config(&[BlockId::FanData]);
        config.min_send_interval_ms = 0;
        let result = PollService::new(config, SimulatedNilan::default());
        assert!(matches!(result, Err(ModbusError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_run_cycle_fills_cache() {
        let device = SimulatedNilan {
            register_value: 3,
            ..Default::default()
        };
        let mut service = service(
            fast_config(&[BlockId::ControlStateHolding, BlockId::FanData]),
            device,
        );

        service.run_cycle(None).await.unwrap();

        assert_eq!(service.nilan().transport().frames.len(), 2);
        assert_eq!(service.cache().get("ventilation_speed"), Some(&Value::Integer(3)));
        assert_eq!(service.cache().get("target_temp"), Some(&Value::Float(0.03)));
        assert_eq!(service.cache().get("inlet_fan"), Some(&Value::Float(0.03)));
        assert_eq!(service.climate().fan_mode, ClimateFanMode::Medium);
        assert!(service.nilan().scheduler().is_settled());
    }

    #[tokio::test]
    async fn test_command_is_written_before_the_cycle() {
        let mut service = service(fast_config(&[BlockId::FanData]), SimulatedNilan::default());

        service
            .run_cycle(Some(NilanCommand::TargetTemperature(21.5)))
            .await
            .unwrap();

        let frames = &service.nilan().transport().frames;
        assert_eq!(frames[0], encode_write(30, 1004, 2150));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][1], 3);
    }

    #[tokio::test]
    async fn test_climate_call_queues_both_writes() {
        let mut service = service(fast_config(&[]), SimulatedNilan::default());
        let call = ClimateCall {
            target_temperature: Some(19.0),
            fan_mode: Some(ClimateFanMode::High),
        };

        service.run_climate_call(call).await.unwrap();

        let frames = &service.nilan().transport().frames;
        assert_eq!(frames, &vec![encode_write(30, 1004, 1900), encode_write(30, 1003, 4)]);
        assert_eq!(service.climate().fan_mode, ClimateFanMode::High);
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let device = SimulatedNilan {
            silent: true,
            ..Default::default()
        };
        let mut service = service(fast_config(&[BlockId::DeviceInput]), device);

        let result = service.run_cycle(None).await;
        assert!(matches!(result, Err(ModbusError::Timeout)));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_failing_reads_still_time_out() {
        let device = SimulatedNilan {
            read_fails: true,
            ..Default::default()
        };
        let mut service = service(fast_config(&[BlockId::FanData]), device);

        let result = service.run_cycle(Some(NilanCommand::FanSpeed(2))).await;
        assert!(matches!(result, Err(ModbusError::Timeout)));
        assert_eq!(service.nilan().transport().frames.len(), 1);
        assert!(service.nilan().scheduler().queue().is_empty());
    }

    #[tokio::test]
    async fn test_readings_reach_file_sender() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        let mut config = fast_config(&[BlockId::AlarmInput]);
        config.output.default_format = "csv".to_string();

        let mut service = service(config, SimulatedNilan::default());
        service.add_sender(Box::new(FileSender::new(&path, true)));
        service.run_cycle(None).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(",active_alarms,integer,0"));
    }
}
