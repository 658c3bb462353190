//! Device communication client.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

use crate::protocol::{build_command, parse_reply, CommandId, Reply, BANNER};

/// Find the device by probing USB serial ports with a ReadAll frame.
pub fn find_data_port(baud_rate: u32) -> Result<String> {
    let ports = serialport::available_ports()?;

    for port_info in ports {
        if !(port_info.port_name.contains("ttyUSB") || port_info.port_name.contains("ttyACM")) {
            continue;
        }

        if let Ok(mut client) = DeviceClient::new(&port_info.port_name, baud_rate) {
            client.set_timeout(Duration::from_millis(500));
            if let Ok(Reply::Command { cmd_id, .. }) = client.send_command(CommandId::ReadAll, [0, 0]) {
                if cmd_id == CommandId::ReadAll as u8 {
                    return Ok(port_info.port_name);
                }
            }
        }
    }

    anyhow::bail!("No device found - ensure it is connected and powered")
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud_rate: u32) -> Result<String> {
    if port_arg == "auto" {
        find_data_port(baud_rate)
    } else {
        Ok(port_arg.to_string())
    }
}

/// Client for communicating with the bridge device.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl DeviceClient {
    /// Create a new device client.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Set the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Clear any pending data in the serial buffer.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    /// Reset the device through DTR/RTS and wait for the banner.
    pub fn wait_for_banner(&mut self) -> Result<()> {
        self.port.write_data_terminal_ready(false)?;
        self.port.write_request_to_send(true)?;
        std::thread::sleep(Duration::from_millis(100));
        self.port.write_request_to_send(false)?;
        self.clear_buffer()?;

        let mut seen = Vec::new();
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            let mut buf = [0u8; 1];
            match self.port.read(&mut buf) {
                Ok(1) => {
                    seen.push(buf[0]);
                    if seen.ends_with(BANNER) {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!("No banner after reset, got {:02x?}", seen)
    }

    /// Send a command and wait for its reply.
    pub fn send_command(&mut self, cmd_id: CommandId, params: [u8; 2]) -> Result<Reply> {
        let frame = build_command(cmd_id, params);
        self.send_frame(&frame, cmd_id.reply_len())
    }

    /// Write bytes without waiting for a reply.
    pub fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send arbitrary frame bytes and read an exact-length reply.
    pub fn send_frame(&mut self, frame: &[u8], reply_len: usize) -> Result<Reply> {
        self.send_bytes(frame)?;

        let data = self.read_exact(reply_len)?;
        parse_reply(&data)
    }

    /// Collect whatever arrives within `window`.
    pub fn expect_silence(&mut self, window: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let start = Instant::now();
        let mut buf = [0u8; 16];

        while start.elapsed() < window {
            match self.port.read(&mut buf) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data)
    }

    /// Read exactly `len` bytes or time out.
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; 1];
        let start = Instant::now();

        while start.elapsed() < self.timeout {
            match self.port.read(&mut buf) {
                Ok(1) => {
                    data.push(buf[0]);
                    if data.len() == len {
                        return Ok(data);
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!(
            "Timeout waiting for response, got {} of {} bytes: {:02x?}",
            data.len(),
            len,
            data
        );
    }
}
