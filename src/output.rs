use anyhow::{bail, Context, Result};
use log::{debug, error, info, trace, warn};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::color_format::ColorFormat;
use crate::config::OutputConfig;
use crate::pixel_buffer::PixelColorBuffer;
use crate::pixel_format::PixelOrder;
use crate::protocol::FrameProtocol;
use crate::strand::{AnimateSink, ColorReadSink, ColorWriteSink};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Everything the worker thread needs to render a frame
struct Renderer {
    format: ColorFormat,
    order: PixelOrder,
    protocol: FrameProtocol,
}

impl Renderer {
    /// Packed strand -> protocol frame, rotated right by `offset` pixels
    fn render(&self, packed: &[u8], offset: usize) -> Vec<u8> {
        let mut rgb: Vec<u8> = packed
            .chunks_exact(self.format.bytes_per_color())
            .flat_map(|color| self.format.to_rgb8(color))
            .collect();

        if !rgb.is_empty() {
            let pixels = rgb.len() / 3;
            rgb.rotate_right((offset % pixels) * 3);
        }

        let ordered = self.order.apply(rgb);
        self.protocol.frame(&ordered, self.order.stride())
    }
}

/// Serial LED strand driven by color writes and animation triggers.
///
/// Keeps its own copy of the packed colors so it can answer Color reads. Writes
/// only mark the strand dirty; a worker thread renders the latest state, so a
/// burst of writes collapses into one frame.
pub struct Output {
    config: OutputConfig,
    strand: Arc<Mutex<PixelColorBuffer>>,
    wake: SyncSender<()>,
    animation_step: Arc<AtomicU8>,
    frames_sent: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Output {
    /// Open the configured serial port and start the worker
    pub fn new(config: OutputConfig, format: ColorFormat, pixel_count: usize) -> Result<Self> {
        let port = Self::open_standard_port(&config)?;
        let output = Self::with_writer(config, format, pixel_count, port)?;

        info!(
            "✓ Opened {} ({} @ {} baud, {} LEDs)",
            output.config.port, output.config.protocol, output.config.baud_rate, pixel_count
        );

        Ok(output)
    }

    /// Drive any byte sink instead of a serial port
    pub fn with_writer<W>(
        config: OutputConfig,
        format: ColorFormat,
        pixel_count: usize,
        writer: W,
    ) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let protocol: FrameProtocol = config.protocol.parse()?;
        if pixel_count > protocol.max_leds() {
            bail!(
                "{} LEDs exceed the {} frame limit of {}",
                pixel_count,
                config.protocol,
                protocol.max_leds()
            );
        }
        let order: PixelOrder = match config.pixel_format.as_deref() {
            Some(order) => order.parse()?,
            None => PixelOrder::default(),
        };

        let strand = Arc::new(Mutex::new(PixelColorBuffer::new(
            pixel_count,
            format.bytes_per_color(),
        )));

        // Capacity 1: a pending wake-up already covers any later write
        let (wake, receiver) = mpsc::sync_channel::<()>(1);

        let animation_step = Arc::new(AtomicU8::new(0));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let worker = Worker {
            writer,
            receiver,
            renderer: Renderer { format, order, protocol },
            strand: Arc::clone(&strand),
            port_name: config.port.clone(),
            interval: Duration::from_millis(config.animation_interval_ms.max(1)),
            animation_step: Arc::clone(&animation_step),
            frames_sent: Arc::clone(&frames_sent),
            running: Arc::clone(&running),
        };
        let worker_handle = thread::spawn(move || worker.run());

        Ok(Output {
            config,
            strand,
            wake,
            animation_step,
            frames_sent,
            running,
            worker_handle: Mutex::new(Some(worker_handle)),
        })
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Counter shared with the statistics thread
    pub fn frames_sent_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_sent)
    }

    /// Stop the worker; it blanks the strand on its way out
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);

        let handle = self
            .worker_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn notify(&self) {
        // Full means a render is already pending
        let _ = self.wake.try_send(());
    }

    fn open_standard_port(config: &OutputConfig) -> Result<Box<dyn serialport::SerialPort>> {
        let mut port = serialport::new(&config.port, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .context(format!("Failed to open serial port {}", config.port))?;

        port.set_timeout(Duration::from_millis(1000))
            .context("Failed to set serial port timeout")?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!("Failed to set DTR on {}: {}", config.port, e);
        }

        // Allow device to initialize
        thread::sleep(Duration::from_millis(100));

        Ok(port)
    }
}

impl ColorWriteSink for Output {
    fn color_written(&self, color: &[u8], index: usize) {
        let stored = self
            .strand
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set(index, color);

        match stored {
            Ok(()) => self.notify(),
            Err(e) => warn!("{}: dropping color for pixel {}: {}", self.config.port, index, e),
        }
    }
}

impl ColorReadSink for Output {
    fn read_color(&self, index: usize) -> Vec<u8> {
        let strand = self.strand.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match strand.get(index) {
            Ok(color) => color.to_vec(),
            Err(_) => vec![0u8; strand.bytes_per_color()],
        }
    }
}

impl AnimateSink for Output {
    /// Non-zero rotates the strand by that many pixels per tick; zero stops
    fn animate(&self, trigger: u8) {
        debug!("{}: animation step {}", self.config.port, trigger);
        self.animation_step.store(trigger, Ordering::Relaxed);
        self.notify();
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<W> {
    writer: W,
    receiver: Receiver<()>,
    renderer: Renderer,
    strand: Arc<Mutex<PixelColorBuffer>>,
    port_name: String,
    interval: Duration,
    animation_step: Arc<AtomicU8>,
    frames_sent: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl<W: Write> Worker<W> {
    /// Wait for wake-ups or animation ticks and push frames until stopped
    fn run(mut self) {
        let mut offset = 0usize;
        let mut last_tick = Instant::now();

        while self.running.load(Ordering::Relaxed) {
            let step = self.animation_step.load(Ordering::Relaxed) as usize;
            let timeout = if step > 0 {
                self.interval.saturating_sub(last_tick.elapsed())
            } else {
                IDLE_POLL
            };

            let mut dirty = match self.receiver.recv_timeout(timeout) {
                Ok(()) => true,
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            if step > 0 && last_tick.elapsed() >= self.interval {
                offset = offset.wrapping_add(step);
                last_tick = Instant::now();
                dirty = true;
            } else if step == 0 && offset != 0 {
                offset = 0;
                dirty = true;
            }

            if !dirty {
                continue;
            }

            let frame = {
                let strand = self.strand.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                self.renderer.render(strand.as_bytes(), offset)
            };

            trace!("[{}] Sending frame: {:02x?}", self.port_name, frame);

            if let Err(e) = self.writer.write_all(&frame).and_then(|_| self.writer.flush()) {
                error!("✗ Serial error on {}: {}", self.port_name, e);
                error!("✗ Output {} is now disconnected", self.port_name);
                return;
            }

            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }

        // Best effort: leave the LEDs dark
        let blank = {
            let strand = self.strand.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            vec![0u8; strand.as_bytes().len()]
        };
        let frame = self.renderer.render(&blank, 0);
        let _ = self.writer.write_all(&frame);
        let _ = self.writer.flush();
    }
}
