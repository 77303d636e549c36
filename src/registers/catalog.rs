use serde::{Deserialize, Serialize};
use std::fmt;

use crate::modbus::protocol::{FunctionCode, ModbusRequest};

/// The register blocks the controller exposes, in poll-cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockId {
    DeviceInput,
    DiscreteIoInput,
    DiscreteIoHolding,
    AnalogIoInput,
    AlarmInput,
    UserFunctionsHolding,
    ControlInput,
    AirflowInput,
    AirtempInput,
    CentralHeatInput,
    UserPanelInput,
    AirtempHolding,
    ControlStateHolding,
    FanData,
}

impl BlockId {
    pub const ALL: [BlockId; 14] = [
        BlockId::DeviceInput,
        BlockId::DiscreteIoInput,
        BlockId::DiscreteIoHolding,
        BlockId::AnalogIoInput,
        BlockId::AlarmInput,
        BlockId::UserFunctionsHolding,
        BlockId::ControlInput,
        BlockId::AirflowInput,
        BlockId::AirtempInput,
        BlockId::CentralHeatInput,
        BlockId::UserPanelInput,
        BlockId::AirtempHolding,
        BlockId::ControlStateHolding,
        BlockId::FanData,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            BlockId::DeviceInput => "device_input",
            BlockId::DiscreteIoInput => "discrete_io_input",
            BlockId::DiscreteIoHolding => "discrete_io_holding",
            BlockId::AnalogIoInput => "analog_io_input",
            BlockId::AlarmInput => "alarm_input",
            BlockId::UserFunctionsHolding => "user_functions_holding",
            BlockId::ControlInput => "control_input",
            BlockId::AirflowInput => "airflow_input",
            BlockId::AirtempInput => "airtemp_input",
            BlockId::CentralHeatInput => "central_heat_input",
            BlockId::UserPanelInput => "user_panel_input",
            BlockId::AirtempHolding => "airtemp_holding",
            BlockId::ControlStateHolding => "control_state_holding",
            BlockId::FanData => "fan_data",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn block(self) -> RegisterBlock {
        BLOCKS[self as usize]
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBlock {
    pub id: BlockId,
    pub function: FunctionCode,
    pub start_register: u16,
    pub register_count: u16,
    /// Payload bytes a well-formed response carries.
    pub payload_len: usize,
}

impl RegisterBlock {
    const fn new(id: BlockId, function: FunctionCode, start_register: u16, register_count: u16) -> Self {
        Self {
            id,
            function,
            start_register,
            register_count,
            payload_len: register_count as usize * 2,
        }
    }

    pub fn read_request(&self, slave: u8) -> ModbusRequest {
        ModbusRequest::ReadRegisters {
            slave,
            function: self.function,
            start_register: self.start_register,
            quantity: self.register_count,
        }
    }
}

const HOLDING: FunctionCode = FunctionCode::ReadHoldingRegisters;
const INPUT: FunctionCode = FunctionCode::ReadInputRegisters;

// Indexed by `BlockId as usize`.
const BLOCKS: [RegisterBlock; 14] = [
    RegisterBlock::new(BlockId::DeviceInput, INPUT, 0, 4),
    RegisterBlock::new(BlockId::DiscreteIoInput, INPUT, 100, 16),
    RegisterBlock::new(BlockId::DiscreteIoHolding, HOLDING, 100, 28),
    RegisterBlock::new(BlockId::AnalogIoInput, INPUT, 200, 23),
    RegisterBlock::new(BlockId::AlarmInput, INPUT, 400, 10),
    RegisterBlock::new(BlockId::UserFunctionsHolding, HOLDING, 600, 6),
    RegisterBlock::new(BlockId::ControlInput, INPUT, 1000, 4),
    RegisterBlock::new(BlockId::AirflowInput, INPUT, 1100, 5),
    RegisterBlock::new(BlockId::AirtempInput, INPUT, 1200, 7),
    RegisterBlock::new(BlockId::CentralHeatInput, INPUT, 1800, 1),
    RegisterBlock::new(BlockId::UserPanelInput, INPUT, 2000, 12),
    RegisterBlock::new(BlockId::AirtempHolding, HOLDING, 1200, 6),
    RegisterBlock::new(BlockId::ControlStateHolding, HOLDING, 1000, 5),
    RegisterBlock::new(BlockId::FanData, HOLDING, 200, 2),
];

/// Result of stepping past a catalog position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogCursor {
    Next(usize),
    Exhausted,
}

/// The enabled blocks, fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    blocks: Vec<RegisterBlock>,
}

impl Catalog {
    pub fn full() -> Self {
        Self { blocks: BLOCKS.to_vec() }
    }

    /// Enabled blocks always come out in canonical order, each at most once.
    pub fn from_enabled<I: IntoIterator<Item = BlockId>>(enabled: I) -> Self {
        let enabled: Vec<BlockId> = enabled.into_iter().collect();
        let blocks = BLOCKS
            .iter()
            .filter(|block| enabled.contains(&block.id))
            .copied()
            .collect();
        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&RegisterBlock> {
        self.blocks.get(position)
    }

    pub fn advance(&self, position: usize) -> CatalogCursor {
        let next = position + 1;
        if next < self.blocks.len() {
            CatalogCursor::Next(next)
        } else {
            CatalogCursor::Exhausted
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterBlock> {
        self.blocks.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_table_matches_ids() {
        for (index, id) in BlockId::ALL.iter().enumerate() {
            assert_eq!(BLOCKS[index].id, *id);
            assert_eq!(id.block().payload_len, id.block().register_count as usize * 2);
        }
    }

    #[test]
    fn test_expected_payload_lengths() {
        let lengths: Vec<usize> = Catalog::full().iter().map(|b| b.payload_len).collect();
        assert_eq!(lengths, vec![8, 32, 56, 46, 20, 12, 8, 10, 14, 2, 24, 12, 10, 4]);
    }

    #[test]
    fn test_read_request_for_fan_data() {
        let request = BlockId::FanData.block().read_request(30);
        assert_eq!(
            request,
            ModbusRequest::ReadRegisters {
                slave: 30,
                function: FunctionCode::ReadHoldingRegisters,
                start_register: 200,
                quantity: 2,
            }
        );
    }

    #[test]
    fn test_enabled_subset_keeps_canonical_order() {
        let catalog = Catalog::from_enabled([BlockId::FanData, BlockId::DeviceInput, BlockId::FanData]);
        let ids: Vec<BlockId> = catalog.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![BlockId::DeviceInput, BlockId::FanData]);
    }

    #[test]
    fn test_advance_reports_exhaustion() {
        let catalog = Catalog::from_enabled([BlockId::AlarmInput, BlockId::ControlInput]);
        assert_eq!(catalog.advance(0), CatalogCursor::Next(1));
        assert_eq!(catalog.advance(1), CatalogCursor::Exhausted);
        assert!(catalog.get(2).is_none());

        let empty = Catalog::from_enabled([]);
        assert!(empty.is_empty());
        assert_eq!(empty.advance(0), CatalogCursor::Exhausted);
    }

    #[test]
    fn test_block_names_round_trip() {
        for id in BlockId::ALL {
            assert_eq!(BlockId::from_name(id.name()), Some(id));
        }
        assert_eq!(BlockId::from_name("bogus"), None);
    }
}
