use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::{Config, GattConfig};
use crate::error::AttError;
use crate::output::Output;
use crate::service::{CharacteristicId, ServiceDescriptor};
use crate::strand::{CharacteristicHandler, Sinks, StrandService};

const RECV_BUFFER_SIZE: usize = 4096;
const HEADER_LEN: usize = 4;

// ATT-style opcodes
pub const ERROR_RSP: u8 = 0x01;
pub const DISCOVER_REQ: u8 = 0x02;
pub const DISCOVER_RSP: u8 = 0x03;
pub const READ_REQ: u8 = 0x0A;
pub const READ_RSP: u8 = 0x0B;
pub const WRITE_REQ: u8 = 0x12;
pub const WRITE_RSP: u8 = 0x13;
pub const WRITE_CMD: u8 = 0x52;

/// Frame: opcode, handle, payload length (u16 little-endian), payload
pub fn encode_frame(opcode: u8, handle: u8, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(u16::MAX as usize)];

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(opcode);
    frame.push(handle);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Serves the pixel strand service to one TCP client at a time.
///
/// Requests are handled in arrival order, so the strand sees a single writer.
pub struct GattServer {
    config: GattConfig,
    descriptor: ServiceDescriptor,
    service: StrandService,
    outputs: Vec<Arc<Output>>,
    requests_handled: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    stats: bool,
}

impl GattServer {
    /// Build the service and open the LED output, if one is configured
    pub fn new(config: Config, stats: bool) -> Result<Self> {
        let descriptor = ServiceDescriptor::new(
            &config.gatt.local_name,
            &config.strand.color_format,
            config.strand.pixel_count,
        )
        .context(format!("Invalid color format {:?}", config.strand.color_format))?;

        let mut outputs = Vec::new();
        let mut sinks = Sinks::default();

        if let Some(output_config) = config.output {
            let port = output_config.port.clone();
            let output = Output::new(
                output_config,
                descriptor.format.clone(),
                descriptor.pixel_count.get() as usize,
            )
            .context(format!("Failed to start output {}", port))?;

            let output = Arc::new(output);
            sinks.color_write = Some(output.clone());
            sinks.color_read = Some(output.clone());
            sinks.animate = Some(output.clone());
            outputs.push(output);
        } else {
            info!("No output configured, color writes stay in memory");
        }

        let service = StrandService::new(&descriptor, sinks);
        Ok(Self::with_service(config.gatt, descriptor, service, outputs, stats))
    }

    pub fn with_service(
        config: GattConfig,
        descriptor: ServiceDescriptor,
        service: StrandService,
        outputs: Vec<Arc<Output>>,
        stats: bool,
    ) -> Self {
        GattServer {
            config,
            descriptor,
            service,
            outputs,
            requests_handled: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(true)),
            stats,
        }
    }

    /// Clone of the running flag for signal handlers
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    #[allow(dead_code)]
    pub fn service(&self) -> &StrandService {
        &self.service
    }

    /// Stop outputs; each blanks its LEDs
    pub fn shutdown(&self) {
        info!("Turning off LEDs...");
        for output in &self.outputs {
            output.stop();
        }
        info!("✓ Server stopped");
    }

    /// Bind the configured address and serve until the running flag clears
    pub fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .context(format!("Failed to bind to {}", addr))?;

        info!(
            "✓ '{}' serving {} ({} pixels, {}) on {}",
            self.descriptor.local_name,
            self.descriptor.uuid,
            self.descriptor.pixel_count,
            self.descriptor.format,
            addr
        );

        self.serve(listener)
    }

    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        // Nonblocking so accept() can check the running flag periodically
        listener.set_nonblocking(true)?;

        if self.stats {
            self.spawn_stats_thread();
        }

        while self.running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    info!("✓ Client connected from {}", peer_addr);

                    if let Err(e) = self.handle_client(stream) {
                        error!("Error handling client: {}", e);
                    }

                    info!("Client disconnected");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        Ok(())
    }

    fn handle_client(&self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)
            .context("Failed to set socket to blocking mode")?;
        stream.set_read_timeout(Some(Duration::from_millis(100)))
            .context("Failed to set socket read timeout")?;

        let mut buffer = Vec::new();
        let mut read_buf = vec![0u8; RECV_BUFFER_SIZE];

        while self.running.load(Ordering::Relaxed) {
            match stream.read(&mut read_buf) {
                Ok(0) => return Ok(()),
                Ok(n) => buffer.extend_from_slice(&read_buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            // Process every complete request in the buffer
            while buffer.len() >= HEADER_LEN {
                let opcode = buffer[0];
                let handle = buffer[1];
                let length = u16::from_le_bytes([buffer[2], buffer[3]]) as usize;

                let message_size = HEADER_LEN + length;
                if buffer.len() < message_size {
                    break;
                }

                let payload: Vec<u8> = buffer.drain(..message_size).skip(HEADER_LEN).collect();
                trace!("<- op={:#04x} handle={:#04x} {:02x?}", opcode, handle, payload);

                if let Some(response) = self.handle_request(opcode, handle, &payload) {
                    trace!("-> {:02x?}", response);
                    stream.write_all(&response)?;
                }
                self.requests_handled.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Dispatch one request; `None` when the request takes no response
    pub fn handle_request(&self, opcode: u8, handle: u8, payload: &[u8]) -> Option<Vec<u8>> {
        match opcode {
            DISCOVER_REQ => Some(encode_frame(DISCOVER_RSP, 0, &self.discovery_payload())),
            READ_REQ => Some(
                match self.characteristic(handle).and_then(|id| self.service.read(id)) {
                    Ok(value) => encode_frame(READ_RSP, handle, &value),
                    Err(e) => error_frame(opcode, handle, e),
                },
            ),
            WRITE_REQ => Some(
                match self.characteristic(handle).and_then(|id| self.service.write(id, payload)) {
                    Ok(()) => encode_frame(WRITE_RSP, handle, &[]),
                    Err(e) => error_frame(opcode, handle, e),
                },
            ),
            WRITE_CMD => {
                if let Err(e) = self.characteristic(handle).and_then(|id| self.service.write(id, payload)) {
                    debug!("Write command to {:#04x} dropped: {}", handle, e);
                }
                None
            }
            _ => {
                warn!("Unsupported opcode {:#04x}", opcode);
                Some(error_frame(opcode, handle, AttError::RequestNotSupported))
            }
        }
    }

    fn characteristic(&self, handle: u8) -> Result<CharacteristicId, AttError> {
        let id = self
            .descriptor
            .characteristic(handle)
            .map(|c| c.id)
            .ok_or(AttError::InvalidHandle)?;
        trace!("handle {:#04x} is {}", handle, id.name());
        Ok(id)
    }

    /// Service UUID, local name, then handle/access/UUID per characteristic
    fn discovery_payload(&self) -> Vec<u8> {
        let name = self.descriptor.local_name.as_bytes();
        let name = &name[..name.len().min(u8::MAX as usize)];

        let mut payload = Vec::new();
        payload.extend_from_slice(&self.descriptor.uuid.as_u128().to_le_bytes());
        payload.push(name.len() as u8);
        payload.extend_from_slice(name);

        for characteristic in &self.descriptor.characteristics {
            payload.push(characteristic.handle);
            payload.push(characteristic.access.bits());
            payload.extend_from_slice(&characteristic.uuid.as_u128().to_le_bytes());
        }

        payload
    }

    fn spawn_stats_thread(&self) {
        let requests_handled = Arc::clone(&self.requests_handled);
        let running = Arc::clone(&self.running);
        let output_counters: Vec<_> = self
            .outputs
            .iter()
            .map(|o| (o.config().port.clone(), o.frames_sent_counter()))
            .collect();

        thread::spawn(move || {
            let mut last_handled = 0u64;
            let mut last_sent: Vec<u64> = vec![0; output_counters.len()];

            while running.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(5));

                let current = requests_handled.load(Ordering::Relaxed);
                let mut line = format!("[Stats] Requests: {:.1}/s", (current - last_handled) as f64 / 5.0);
                last_handled = current;

                for (i, (port, counter)) in output_counters.iter().enumerate() {
                    let sent = counter.load(Ordering::Relaxed);
                    line.push_str(&format!(", {}: {:.1} fps", port, (sent - last_sent[i]) as f64 / 5.0));
                    last_sent[i] = sent;
                }

                debug!("{}", line);
            }
        });
    }
}

fn error_frame(request_opcode: u8, handle: u8, err: AttError) -> Vec<u8> {
    debug!("Request {:#04x} on {:#04x} failed: {}", request_opcode, handle, err);
    encode_frame(ERROR_RSP, handle, &[request_opcode, handle, err.code()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SERVICE_UUID;
    use std::net::SocketAddr;
    use std::num::NonZeroU32;

    fn server(format: &str, count: u32) -> GattServer {
        let descriptor =
            ServiceDescriptor::new("Fishy", format, NonZeroU32::new(count).unwrap()).unwrap();
        let service = StrandService::new(&descriptor, Sinks::default());
        let config = GattConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            local_name: "Fishy".to_string(),
        };
        GattServer::with_service(config, descriptor, service, Vec::new(), false)
    }

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame(READ_RSP, 3, &[1, 2]), vec![0x0B, 3, 2, 0, 1, 2]);
        assert_eq!(encode_frame(WRITE_RSP, 4, &[]), vec![0x13, 4, 0, 0]);
    }

    #[test]
    fn test_read_and_write_requests() {
        let server = server("R8G8B8", 10);
        let count = CharacteristicId::Count.handle();
        let select = CharacteristicId::Select.handle();

        assert_eq!(
            server.handle_request(READ_REQ, count, &[]),
            Some(encode_frame(READ_RSP, count, &[10, 0, 0, 0]))
        );
        assert_eq!(
            server.handle_request(WRITE_REQ, select, &[6, 0, 0, 0]),
            Some(encode_frame(WRITE_RSP, select, &[]))
        );
        assert_eq!(server.service().selection(), 6);

        // Out-of-range select still acknowledges
        assert_eq!(
            server.handle_request(WRITE_REQ, select, &[60, 0, 0, 0]),
            Some(encode_frame(WRITE_RSP, select, &[]))
        );
        assert_eq!(server.service().selection(), 6);
    }

    #[test]
    fn test_error_responses() {
        let server = server("R8G8B8", 10);
        let color = CharacteristicId::Color.handle();
        let format = CharacteristicId::Format.handle();
        let animate = CharacteristicId::Animate.handle();

        assert_eq!(
            server.handle_request(WRITE_REQ, color, &[1, 2]),
            Some(encode_frame(ERROR_RSP, color, &[WRITE_REQ, color, 0x0D]))
        );
        assert_eq!(
            server.handle_request(WRITE_REQ, format, b"R8"),
            Some(encode_frame(ERROR_RSP, format, &[WRITE_REQ, format, 0x03]))
        );
        assert_eq!(
            server.handle_request(READ_REQ, animate, &[]),
            Some(encode_frame(ERROR_RSP, animate, &[READ_REQ, animate, 0x02]))
        );
        assert_eq!(
            server.handle_request(READ_REQ, 0x40, &[]),
            Some(encode_frame(ERROR_RSP, 0x40, &[READ_REQ, 0x40, 0x01]))
        );
        assert_eq!(
            server.handle_request(0x7F, 0, &[]),
            Some(encode_frame(ERROR_RSP, 0, &[0x7F, 0, 0x06]))
        );
    }

    #[test]
    fn test_write_command_has_no_response() {
        let server = server("R8G8B8", 10);
        let mode = CharacteristicId::Mode.handle();
        let color = CharacteristicId::Color.handle();

        assert_eq!(server.handle_request(WRITE_CMD, mode, &[1]), None);
        assert_eq!(server.handle_request(WRITE_CMD, color, &[1, 2, 3]), None);
        assert_eq!(server.handle_request(WRITE_CMD, color, &[1]), None);
        assert_eq!(server.service().selection(), 1);
    }

    #[test]
    fn test_discovery() {
        let server = server("R8G8B8", 3);
        let response = server.handle_request(DISCOVER_REQ, 0, &[]).unwrap();
        let payload = &response[HEADER_LEN..];

        assert_eq!(response[0], DISCOVER_RSP);
        assert_eq!(&payload[..16], &SERVICE_UUID.as_u128().to_le_bytes());
        assert_eq!(payload[16], 5);
        assert_eq!(&payload[17..22], b"Fishy");

        let entries = &payload[22..];
        assert_eq!(entries.len(), 7 * 18);
        // First entry: Format, read-only
        assert_eq!(entries[0], 0x01);
        assert_eq!(entries[1], 0x02);
        assert_eq!(
            &entries[2..18],
            &CharacteristicId::Format.uuid().as_u128().to_le_bytes()
        );
    }

    #[test]
    fn test_tcp_session() {
        let server = Arc::new(server("R8G8B8", 3));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();

        let serving = Arc::clone(&server);
        let handle = thread::spawn(move || serving.serve(listener).unwrap());

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mode = CharacteristicId::Mode.handle();
        let select = CharacteristicId::Select.handle();
        let color = CharacteristicId::Color.handle();

        // Pipelined requests arrive in one segment
        let mut requests = encode_frame(WRITE_REQ, mode, &[1]);
        requests.extend(encode_frame(WRITE_REQ, select, &[1, 0, 0, 0]));
        requests.extend(encode_frame(WRITE_REQ, color, &[10, 20, 30]));
        requests.extend(encode_frame(READ_REQ, select, &[]));
        client.write_all(&requests).unwrap();

        let mut responses = vec![0u8; 3 * 4 + 8];
        client.read_exact(&mut responses).unwrap();
        assert_eq!(&responses[..4], &encode_frame(WRITE_RSP, mode, &[])[..]);
        assert_eq!(&responses[12..], &encode_frame(READ_RSP, select, &[2, 0, 0, 0])[..]);
        assert_eq!(server.service().color_at(1), Some(vec![10, 20, 30]));

        drop(client);
        server.get_running_flag().store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
