use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::registers::BlockId;
use crate::scheduler::{SchedulerTimings, MIN_SEND_INTERVAL};
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Serial link
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub slave_address: u8,

    // Timing
    pub step_interval_ms: u64,
    pub update_interval_seconds: u64,
    pub response_timeout_ms: u64,
    pub min_send_interval_ms: u64,

    pub registers: RegisterSelection,
    pub output: OutputConfig,
    pub climate: ClimateConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

/// One switch per register block; disabled blocks are never polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterSelection {
    pub device_input: bool,
    pub discrete_io_input: bool,
    pub discrete_io_holding: bool,
    pub analog_io_input: bool,
    pub alarm_input: bool,
    pub user_functions_holding: bool,
    pub control_input: bool,
    pub airflow_input: bool,
    pub airtemp_input: bool,
    pub central_heat_input: bool,
    pub user_panel_input: bool,
    pub airtemp_holding: bool,
    pub control_state_holding: bool,
    pub fan_data: bool,
}

impl Default for RegisterSelection {
    fn default() -> Self {
        Self::all(true)
    }
}

impl RegisterSelection {
    pub fn all(enabled: bool) -> Self {
        Self {
            device_input: enabled,
            discrete_io_input: enabled,
            discrete_io_holding: enabled,
            analog_io_input: enabled,
            alarm_input: enabled,
            user_functions_holding: enabled,
            control_input: enabled,
            airflow_input: enabled,
            airtemp_input: enabled,
            central_heat_input: enabled,
            user_panel_input: enabled,
            airtemp_holding: enabled,
            control_state_holding: enabled,
            fan_data: enabled,
        }
    }

    fn slot(&mut self, id: BlockId) -> &mut bool {
        match id {
            BlockId::DeviceInput => &mut self.device_input,
            BlockId::DiscreteIoInput => &mut self.discrete_io_input,
            BlockId::DiscreteIoHolding => &mut self.discrete_io_holding,
            BlockId::AnalogIoInput => &mut self.analog_io_input,
            BlockId::AlarmInput => &mut self.alarm_input,
            BlockId::UserFunctionsHolding => &mut self.user_functions_holding,
            BlockId::ControlInput => &mut self.control_input,
            BlockId::AirflowInput => &mut self.airflow_input,
            BlockId::AirtempInput => &mut self.airtemp_input,
            BlockId::CentralHeatInput => &mut self.central_heat_input,
            BlockId::UserPanelInput => &mut self.user_panel_input,
            BlockId::AirtempHolding => &mut self.airtemp_holding,
            BlockId::ControlStateHolding => &mut self.control_state_holding,
            BlockId::FanData => &mut self.fan_data,
        }
    }

    fn flags(&self) -> [bool; 14] {
        [
            self.device_input,
            self.discrete_io_input,
            self.discrete_io_holding,
            self.analog_io_input,
            self.alarm_input,
            self.user_functions_holding,
            self.control_input,
            self.airflow_input,
            self.airtemp_input,
            self.central_heat_input,
            self.user_panel_input,
            self.airtemp_holding,
            self.control_state_holding,
            self.fan_data,
        ]
    }

    pub fn is_enabled(&self, id: BlockId) -> bool {
        self.flags()[id as usize]
    }

    pub fn set(&mut self, id: BlockId, enabled: bool) {
        *self.slot(id) = enabled;
    }

    /// Enabled blocks in canonical poll order.
    pub fn enabled_blocks(&self) -> Vec<BlockId> {
        BlockId::ALL.into_iter().filter(|&id| self.is_enabled(id)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_format: String,
    pub file_output: Option<FileOutputConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "console".to_string(),
            file_output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutputConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "./data/nilan_readings.log".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Reading used as the thermostat's current temperature.
    pub current_temp_reading: String,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            current_temp_reading: "temp_t15".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            parity: ParityConfig::Even,
            slave_address: 30,

            step_interval_ms: 100,
            update_interval_seconds: 60,
            response_timeout_ms: 15_000,
            min_send_interval_ms: 1_000,

            registers: RegisterSelection::default(),
            output: OutputConfig::default(),
            climate: ClimateConfig::default(),
        }
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>, ModbusError>
where
    T::Err: std::fmt::Display,
{
    match matches.get_one::<String>(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ModbusError::ConfigError(format!("Invalid --{} '{}': {}", name, raw, e))),
        None => Ok(None),
    }
}

impl Config {
    /// Config file (if `--config` was given) or defaults, with command-line
    /// overrides applied on top.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = parse_arg(matches, "baud")? {
            config.baud_rate = baud;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            config.parity = match parity.to_lowercase().as_str() {
                "none" => ParityConfig::None,
                "even" => ParityConfig::Even,
                "odd" => ParityConfig::Odd,
                other => return Err(ModbusError::ConfigError(format!("Invalid parity: {}", other))),
            };
        }
        if let Some(slave) = parse_arg(matches, "slave")? {
            config.slave_address = slave;
        }
        if let Some(interval) = parse_arg(matches, "interval")? {
            config.update_interval_seconds = interval;
        }
        if let Some(format) = matches.get_one::<String>("format") {
            config.output.default_format = format.clone();
        }
        if let Some(path) = matches.get_one::<String>("output-file") {
            config.output.file_output = Some(FileOutputConfig {
                enabled: true,
                path: path.clone(),
            });
        }
        if let Some(blocks) = matches.get_one::<String>("blocks") {
            config.registers = Self::parse_block_list(blocks)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Comma separated block names to a selection enabling only those blocks.
    pub fn parse_block_list(list: &str) -> Result<RegisterSelection, ModbusError> {
        let mut selection = RegisterSelection::all(false);
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let id = BlockId::from_name(name)
                .ok_or_else(|| ModbusError::ConfigError(format!("Unknown register block: {}", name)))?;
            selection.set(id, true);
        }
        Ok(selection)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        debug!("Loading configuration from {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ModbusError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        info!("💾 Configuration written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if !(1..=247).contains(&self.slave_address) {
            return Err(ModbusError::ConfigError(format!(
                "Slave address must be 1-247, got {}",
                self.slave_address
            )));
        }
        if self.step_interval_ms == 0 {
            return Err(ModbusError::ConfigError("step_interval_ms must be positive".to_string()));
        }
        if self.min_send_interval_ms < MIN_SEND_INTERVAL.as_millis() as u64 {
            return Err(ModbusError::ConfigError(format!(
                "min_send_interval_ms must be at least {}, got {}",
                MIN_SEND_INTERVAL.as_millis(),
                self.min_send_interval_ms
            )));
        }
        if self.response_timeout_ms == 0 {
            return Err(ModbusError::ConfigError(
                "response_timeout_ms must be positive".to_string(),
            ));
        }
        if self.update_interval_seconds == 0 {
            return Err(ModbusError::ConfigError(
                "update_interval_seconds must be positive".to_string(),
            ));
        }
        if !matches!(self.output.default_format.as_str(), "console" | "json" | "csv") {
            return Err(ModbusError::ConfigError(format!(
                "Unknown output format: {}",
                self.output.default_format
            )));
        }
        Ok(())
    }

    pub fn enabled_blocks(&self) -> Vec<BlockId> {
        self.registers.enabled_blocks()
    }

    pub fn scheduler_timings(&self) -> SchedulerTimings {
        SchedulerTimings {
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            min_send_interval: Duration::from_millis(self.min_send_interval_ms),
        }
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds)
    }

    /// File the readings are appended to, when file output is switched on.
    pub fn output_file(&self) -> Option<&str> {
        self.output
            .file_output
            .as_ref()
            .filter(|f| f.enabled)
            .map(|f| f.path.as_str())
    }
}
