pub mod crc;
pub mod framing;
pub mod protocol;
pub mod transport;

pub use crc::crc16_modbus;
pub use framing::ResponseAssembler;
pub use protocol::{encode_read, encode_write, FunctionCode, ModbusRequest};
pub use transport::{list_serial_ports, ResponseSource, SerialTransport, Transport};
