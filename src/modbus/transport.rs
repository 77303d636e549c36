use log::{debug, error, info, warn};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::framing::ResponseAssembler;
use crate::config::settings::ParityConfig;
use crate::utils::error::ModbusError;

/// Outgoing half of the serial link as the scheduler sees it.
pub trait Transport {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError>;
    fn flush(&mut self) -> Result<(), ModbusError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        (**self).send_frame(frame)
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        (**self).flush()
    }
}

/// Incoming half: complete response payloads, stripped of address, function
/// code, byte count and CRC.
pub trait ResponseSource {
    fn poll_response(&mut self, now: Instant) -> Result<Option<Vec<u8>>, ModbusError>;
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    assembler: ResponseAssembler,
    read_buf: [u8; 256],
}

impl SerialTransport {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        parity: &ParityConfig,
        slave: u8,
    ) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", port_name);
        info!("⚙️  Configuration: {} baud, 8 data bits, 1 stop bit, parity {:?}", baud_rate, parity);

        let serial_parity = match parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", port_name, e);
                ModbusError::ConnectionError(format!("Failed to open port: {}", e))
            })?;

        info!("✅ Modbus RTU connection established successfully");
        Ok(Self {
            port,
            assembler: ResponseAssembler::new(slave),
            read_buf: [0u8; 256],
        })
    }
}

impl ResponseSource for SerialTransport {
    /// Drains whatever the line has buffered and returns the next complete
    /// response payload, if any. Never blocks on an empty line.
    fn poll_response(&mut self, now: Instant) -> Result<Option<Vec<u8>>, ModbusError> {
        let available = self.port.bytes_to_read()? as usize;
        let received: &[u8] = if available == 0 {
            &[]
        } else {
            let want = available.min(self.read_buf.len());
            let n = match self.port.read(&mut self.read_buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
                Err(e) => return Err(e.into()),
            };
            &self.read_buf[..n]
        };

        let mut payload = None;
        for frame in self.assembler.push(received, now) {
            match frame {
                Ok(bytes) => {
                    if payload.is_some() {
                        warn!("Discarding extra response frame received in the same poll");
                        continue;
                    }
                    payload = Some(bytes);
                }
                Err(e) => {
                    warn!("Dropping response frame: {}", e);
                }
            }
        }
        Ok(payload)
    }
}

impl Transport for SerialTransport {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        debug!("📤 Sending frame: {}", hex::encode(frame));
        self.port
            .write_all(frame)
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        self.port
            .flush()
            .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))
    }
}

/// Prints the serial ports the OS knows about.
pub fn list_serial_ports() -> Result<(), ModbusError> {
    println!("📡 Available Serial Ports:");

    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }

    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port.port_name);
        if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
            if let Some(manufacturer) = &usb_info.manufacturer {
                println!("      📱 Manufacturer: {}", manufacturer);
            }
            if let Some(serial_number) = &usb_info.serial_number {
                println!("      🔢 Serial Number: {}", serial_number);
            }
        }
    }

    Ok(())
}

/// Records every frame instead of touching hardware.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    pub frames: Vec<Vec<u8>>,
    pub flushes: usize,
    pub fail_sends: bool,
}

#[cfg(test)]
impl Transport for RecordingTransport {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), ModbusError> {
        if self.fail_sends {
            return Err(ModbusError::CommunicationError("line down".to_string()));
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ModbusError> {
        self.flushes += 1;
        Ok(())
    }
}
