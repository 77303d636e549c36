use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use super::nilan::Nilan;
use super::traits::{Reading, ValueSink};
use crate::modbus::transport::Transport;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateFanMode {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl ClimateFanMode {
    /// Ventilation step written to the controller.
    pub fn write_value(self) -> u16 {
        match self {
            ClimateFanMode::Off => 0,
            ClimateFanMode::Low => 2,
            ClimateFanMode::Medium => 3,
            ClimateFanMode::High => 4,
        }
    }

    /// Mode shown for a reported ventilation step.
    pub fn from_speed(speed: u32) -> Self {
        match speed {
            1 | 2 => ClimateFanMode::Low,
            3 => ClimateFanMode::Medium,
            4 => ClimateFanMode::High,
            _ => ClimateFanMode::Off,
        }
    }
}

impl FromStr for ClimateFanMode {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ClimateFanMode::Off),
            "low" => Ok(ClimateFanMode::Low),
            "medium" => Ok(ClimateFanMode::Medium),
            "high" => Ok(ClimateFanMode::High),
            other => Err(ModbusError::InvalidData(format!("Unknown fan mode: {}", other))),
        }
    }
}

impl fmt::Display for ClimateFanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClimateFanMode::Off => "off",
            ClimateFanMode::Low => "low",
            ClimateFanMode::Medium => "medium",
            ClimateFanMode::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimateCall {
    pub target_temperature: Option<f32>,
    pub fan_mode: Option<ClimateFanMode>,
}

/// Thermostat view of the unit: current and target temperature plus fan mode.
#[derive(Debug, Clone, Serialize)]
pub struct NilanClimate {
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub fan_mode: ClimateFanMode,
    #[serde(skip)]
    current_temp_reading: String,
}

impl NilanClimate {
    pub fn new(current_temp_reading: impl Into<String>) -> Self {
        Self {
            current_temperature: None,
            target_temperature: None,
            fan_mode: ClimateFanMode::Off,
            current_temp_reading: current_temp_reading.into(),
        }
    }

    /// Tracks the readings this view cares about. Returns true if anything changed.
    pub fn observe(&mut self, reading: &Reading) -> bool {
        match reading.name {
            "target_temp" => {
                let value = reading.value.as_f32();
                let changed = value.is_some() && value != self.target_temperature;
                if changed {
                    self.target_temperature = value;
                }
                changed
            }
            "ventilation_speed" => match reading.value.as_u32() {
                Some(speed) => {
                    let mode = ClimateFanMode::from_speed(speed);
                    let changed = mode != self.fan_mode;
                    self.fan_mode = mode;
                    changed
                }
                None => false,
            },
            name if name == self.current_temp_reading => {
                let value = reading.value.as_f32();
                let changed = value.is_some() && value != self.current_temperature;
                if changed {
                    self.current_temperature = value;
                }
                changed
            }
            _ => false,
        }
    }

    /// Applies a thermostat call, queueing the matching writes.
    pub fn control<T: Transport, S: ValueSink>(
        &mut self,
        call: ClimateCall,
        nilan: &mut Nilan<T, S>,
        now: Instant,
    ) -> Result<(), ModbusError> {
        if let Some(target) = call.target_temperature {
            debug!("Target temperature changed to: {}", target);
            nilan.write_target_temperature(target, now)?;
            self.target_temperature = Some(target);
        }
        if let Some(mode) = call.fan_mode {
            debug!("Fan mode set to: {}", mode.write_value());
            nilan.write_fan_speed(mode.write_value(), now)?;
            self.fan_mode = mode;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::protocol::encode_write;
    use crate::modbus::transport::RecordingTransport;
    use crate::registers::Catalog;

    #[test]
    fn test_fan_mode_mapping() {
        assert_eq!(ClimateFanMode::Off.write_value(), 0);
        assert_eq!(ClimateFanMode::Low.write_value(), 2);
        assert_eq!(ClimateFanMode::Medium.write_value(), 3);
        assert_eq!(ClimateFanMode::High.write_value(), 4);

        assert_eq!(ClimateFanMode::from_speed(0), ClimateFanMode::Off);
        assert_eq!(ClimateFanMode::from_speed(1), ClimateFanMode::Low);
        assert_eq!(ClimateFanMode::from_speed(2), ClimateFanMode::Low);
        assert_eq!(ClimateFanMode::from_speed(3), ClimateFanMode::Medium);
        assert_eq!(ClimateFanMode::from_speed(4), ClimateFanMode::High);
        assert_eq!(ClimateFanMode::from_speed(7), ClimateFanMode::Off);

        assert_eq!("Medium".parse::<ClimateFanMode>().unwrap(), ClimateFanMode::Medium);
        assert!("turbo".parse::<ClimateFanMode>().is_err());
    }

    #[test]
    fn test_observe_tracks_relevant_readings() {
        let mut climate = NilanClimate::new("temp_t15");

        assert!(climate.observe(&Reading::float("target_temp", 21.5)));
        assert!(!climate.observe(&Reading::float("target_temp", 21.5)));
        assert!(climate.observe(&Reading::integer("ventilation_speed", 4)));
        assert!(climate.observe(&Reading::float("temp_t15", 19.25)));
        assert!(!climate.observe(&Reading::float("temp_t0", 5.0)));

        assert_eq!(climate.target_temperature, Some(21.5));
        assert_eq!(climate.current_temperature, Some(19.25));
        assert_eq!(climate.fan_mode, ClimateFanMode::High);
    }

    #[test]
    fn test_control_queues_writes_in_order() {
        let mut nilan = Nilan::new(30, Catalog::full(), RecordingTransport::default(), Vec::new());
        let mut climate = NilanClimate::new("temp_t15");
        let call = ClimateCall {
            target_temperature: Some(22.0),
            fan_mode: Some(ClimateFanMode::Low),
        };

        climate.control(call, &mut nilan, Instant::now()).unwrap();

        // the temperature goes out at once, the fan speed waits in the queue
        assert_eq!(nilan.transport().frames, vec![encode_write(30, 1004, 2200)]);
        assert_eq!(nilan.scheduler().queue().len(), 1);
        assert_eq!(nilan.scheduler().queue().front().map(|r| (r.register, r.value)), Some((1003, 2)));
        assert_eq!(climate.target_temperature, Some(22.0));
        assert_eq!(climate.fan_mode, ClimateFanMode::Low);
    }
}
