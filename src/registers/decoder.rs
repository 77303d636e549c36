use log::debug;

use super::catalog::{BlockId, RegisterBlock};
use super::labels;
use crate::devices::traits::{Reading, ValueSink};
use crate::utils::error::ModbusError;

const ANALOG_TEMPERATURES: [&str; 19] = [
    "temp_t0", "temp_t1", "temp_t2", "temp_t3", "temp_t4", "temp_t5", "temp_t6", "temp_t7",
    "temp_t8", "temp_t9", "temp_t10", "temp_t11", "temp_t12", "temp_t13", "temp_t14",
    "temp_t15", "temp_t16", "temp_t17", "temp_t18",
];

// (name, byte offset) of the plain on/off outputs in the discrete IO holding block.
const DISCRETE_OUTPUTS: [(&str, usize); 16] = [
    ("air_flap", 0),
    ("smoke_flap", 2),
    ("air_circ_pump", 8),
    ("air_heat_allow", 10),
    ("air_heat_1", 12),
    ("air_heat_2", 14),
    ("air_heat_3", 16),
    ("compressor", 18),
    ("compressor_2", 20),
    ("four_way_cool", 22),
    ("hotgas_heat", 24),
    ("hotgas_cool", 26),
    ("condenser_open", 28),
    ("condenser_close", 30),
    ("water_heat", 32),
    ("three_way_valve", 34),
];

const AIRTEMP_LIMITS: [(&str, usize); 5] = [
    ("cool_target_temp", 0),
    ("min_summer_temp", 2),
    ("min_winter_temp", 4),
    ("max_summer_temp", 6),
    ("max_winter_temp", 8),
];

/// Signed hundredths of a degree to degrees.
pub fn scale_temperature(raw: u16) -> f32 {
    raw as i16 as f32 / 100.0
}

/// Firmware version text from the device input block.
///
/// Bus version 8 stores the characters byte-swapped without separators; every
/// other version stores them in order as `xx.yy.zz`. Output ends at the first
/// NUL byte.
fn version_string(payload: &[u8; 8]) -> String {
    let bus_version = u16::from_be_bytes([payload[0], payload[1]]);
    let bytes = if bus_version == 8 {
        vec![payload[3], payload[2], payload[5], payload[4], payload[7], payload[6]]
    } else {
        vec![
            payload[2], payload[3], b'.', payload[4], payload[5], b'.', payload[6], payload[7],
        ]
    };
    bytes.into_iter().take_while(|&b| b != 0).map(char::from).collect()
}

/// Big-endian register view over a length-checked payload.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn word(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[offset..offset + N]);
        out
    }

    fn temperature(&self, offset: usize) -> f32 {
        scale_temperature(self.word(offset))
    }

    fn flag(&self, offset: usize) -> bool {
        self.word(offset) != 0
    }
}

/// Turns block payloads into readings.
///
/// Carries the latched bypass state, which only changes on an explicit
/// open/close edge reported by the controller.
#[derive(Debug, Default)]
pub struct Decoder {
    bypass_on: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the payload length, then publishes each decoded field.
    /// Returns how many readings were published.
    pub fn decode<S: ValueSink + ?Sized>(
        &mut self,
        block: &RegisterBlock,
        payload: &[u8],
        sink: &mut S,
    ) -> Result<usize, ModbusError> {
        if payload.len() != block.payload_len {
            debug!("{} data has wrong size: {}", block.id, hex::encode(payload));
            return Err(ModbusError::PayloadLength {
                block: block.id.name(),
                expected: block.payload_len,
                actual: payload.len(),
            });
        }

        let readings = self.readings(block.id, &Fields(payload));
        let count = readings.len();
        for reading in readings {
            sink.publish(reading);
        }
        Ok(count)
    }

    fn readings(&mut self, id: BlockId, data: &Fields<'_>) -> Vec<Reading> {
        match id {
            BlockId::DeviceInput => vec![
                Reading::integer("bus_version", data.word(0) as u32),
                Reading::text("version_info", version_string(&data.array(0))),
            ],
            BlockId::DiscreteIoInput => vec![
                Reading::flag("filter_ok", !data.flag(2)),
                Reading::flag("door_open", data.flag(4)),
            ],
            BlockId::DiscreteIoHolding => self.discrete_io_holding(data),
            BlockId::AnalogIoInput => {
                let mut readings: Vec<Reading> = ANALOG_TEMPERATURES
                    .iter()
                    .enumerate()
                    .map(|(i, &name)| Reading::float(name, data.temperature(i * 2)))
                    .collect();
                readings.push(Reading::float("measured_humidity", data.temperature(42)));
                readings.push(Reading::integer("co2_level", data.word(44) as u32));
                readings
            }
            BlockId::AlarmInput => vec![Reading::integer("active_alarms", data.word(0) as u32)],
            BlockId::UserFunctionsHolding => {
                debug!("User function holding data: {}", hex::encode(data.0));
                vec![
                    Reading::text("user_function_actual", labels::user_function(data.word(0))),
                    Reading::text("user_function_set", labels::user_function(data.word(2))),
                    Reading::integer("user_time_set", data.word(4) as u32),
                    Reading::integer("user_vent_set", data.word(6) as u32),
                    Reading::float("user_temp_set", data.temperature(8)),
                    Reading::float("user_offset_set", data.temperature(10)),
                ]
            }
            BlockId::ControlInput => vec![
                Reading::flag("on_off_state", data.flag(0)),
                Reading::text("operation_mode", labels::operation_mode(data.word(2))),
                Reading::text("control_state", labels::control_state(data.word(4))),
            ],
            BlockId::AirflowInput => {
                debug!("Airflow input data: {}", hex::encode(data.0));
                Vec::new()
            }
            BlockId::AirtempInput => vec![
                Reading::flag("is_summer", data.flag(0)),
                Reading::float("heat_exchange_efficiency", data.temperature(8)),
            ],
            BlockId::CentralHeatInput => {
                vec![Reading::float("external_heat_setpoint", data.temperature(0))]
            }
            BlockId::UserPanelInput => {
                debug!("User panel input data: {}", hex::encode(data.0));
                Vec::new()
            }
            BlockId::AirtempHolding => AIRTEMP_LIMITS
                .iter()
                .map(|&(name, offset)| Reading::float(name, data.temperature(offset)))
                .collect(),
            BlockId::ControlStateHolding => vec![
                Reading::flag("run_set", data.flag(2)),
                Reading::text("operation_mode_set", labels::operation_mode(data.word(4))),
                Reading::integer("ventilation_speed", data.word(6) as u32),
                Reading::float("target_temp", data.temperature(8)),
            ],
            BlockId::FanData => vec![
                Reading::float("exhaust_fan", data.temperature(0)),
                Reading::float("inlet_fan", data.temperature(2)),
            ],
        }
    }

    fn discrete_io_holding(&mut self, data: &Fields<'_>) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(DISCRETE_OUTPUTS.len() + 1);

        let bypass_open = data.flag(4);
        let bypass_close = data.flag(6);
        if self.bypass_on && bypass_close {
            self.bypass_on = false;
            readings.push(Reading::flag("bypass_on_off", false));
        } else if !self.bypass_on && bypass_open {
            self.bypass_on = true;
            readings.push(Reading::flag("bypass_on_off", true));
        }

        readings.extend(
            DISCRETE_OUTPUTS
                .iter()
                .map(|&(name, offset)| Reading::flag(name, data.flag(offset))),
        );
        readings
    }
}
