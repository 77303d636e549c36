use std::fmt;

use super::crc::append_crc;

/// Function codes this client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteMultipleRegisters,
}

impl FunctionCode {
    pub const fn code(self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 3,
            FunctionCode::ReadInputRegisters => 4,
            FunctionCode::WriteMultipleRegisters => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            3 => Some(FunctionCode::ReadHoldingRegisters),
            4 => Some(FunctionCode::ReadInputRegisters),
            16 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCode::ReadHoldingRegisters => "read holding",
            FunctionCode::ReadInputRegisters => "read input",
            FunctionCode::WriteMultipleRegisters => "write multiple",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

/// One outgoing request, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadRegisters {
        slave: u8,
        function: FunctionCode,
        start_register: u16,
        quantity: u16,
    },
    WriteRegister {
        slave: u8,
        register: u16,
        value: u16,
    },
}

impl ModbusRequest {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ModbusRequest::ReadRegisters {
                slave,
                function,
                start_register,
                quantity,
            } => encode_read(slave, function, start_register, quantity),
            ModbusRequest::WriteRegister {
                slave,
                register,
                value,
            } => encode_write(slave, register, value),
        }
    }
}

/// `[slave, fc, addrHi, addrLo, countHi, countLo, crcLo, crcHi]`
pub fn encode_read(slave: u8, function: FunctionCode, start_register: u16, quantity: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8);
    frame.push(slave);
    frame.push(function.code());
    frame.extend_from_slice(&start_register.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    append_crc(&mut frame);
    frame
}

/// Single register written through function 16:
/// `[slave, 16, addrHi, addrLo, 0x00, 0x01, 0x02, valueHi, valueLo, crcLo, crcHi]`
pub fn encode_write(slave: u8, register: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(11);
    frame.push(slave);
    frame.push(FunctionCode::WriteMultipleRegisters.code());
    frame.extend_from_slice(&register.to_be_bytes());
    frame.extend_from_slice(&1u16.to_be_bytes());
    frame.push(2);
    frame.extend_from_slice(&value.to_be_bytes());
    append_crc(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_read_layout() {
        let frame = encode_read(0x01, FunctionCode::ReadHoldingRegisters, 0x0000, 0x000A);
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
    }

    #[test]
    fn test_encode_read_input_registers() {
        let frame = encode_read(30, FunctionCode::ReadInputRegisters, 0, 4);
        assert_eq!(frame, vec![0x1E, 0x04, 0x00, 0x00, 0x00, 0x04, 0xF3, 0xA6]);
    }

    #[test]
    fn test_encode_write_uses_function_16() {
        let frame = encode_write(30, 1004, 2150);
        assert_eq!(
            frame,
            vec![0x1E, 0x10, 0x03, 0xEC, 0x00, 0x01, 0x02, 0x08, 0x66, 0x88, 0x26]
        );
    }

    #[test]
    fn test_request_encode_matches_free_functions() {
        let read = ModbusRequest::ReadRegisters {
            slave: 30,
            function: FunctionCode::ReadHoldingRegisters,
            start_register: 200,
            quantity: 2,
        };
        assert_eq!(read.encode(), vec![0x1E, 0x03, 0x00, 0xC8, 0x00, 0x02, 0x47, 0x9A]);

        let write = ModbusRequest::WriteRegister { slave: 30, register: 1003, value: 3 };
        assert_eq!(write.encode(), encode_write(30, 1003, 3));
    }

    #[test]
    fn test_function_code_round_trip() {
        for fc in [
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
            FunctionCode::WriteMultipleRegisters,
        ] {
            assert_eq!(FunctionCode::from_code(fc.code()), Some(fc));
        }
        assert_eq!(FunctionCode::from_code(6), None);
    }
}
