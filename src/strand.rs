//! Pixel strand state machine: selection, select mode, and the color buffer,
//! driven by characteristic reads and writes.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace, warn};

use crate::codec::{decode_int, encode_u32, encode_u8};
use crate::color_format::ColorFormat;
use crate::error::{AttError, BufferError};
use crate::pixel_buffer::PixelColorBuffer;
use crate::service::{CharacteristicId, ServiceDescriptor};

const SELECT_WIDTH: usize = 4;
const MODE_WIDTH: usize = 1;
const ANIMATE_WIDTH: usize = 1;

/// How the selection moves after a color write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SelectMode {
    #[default]
    Hold = 0,
    AutoIncrement = 1,
}

impl SelectMode {
    fn step(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for SelectMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SelectMode::Hold),
            1 => Ok(SelectMode::AutoIncrement),
            other => Err(other),
        }
    }
}

/// Receives every accepted color write
pub trait ColorWriteSink: Send + Sync {
    fn color_written(&self, color: &[u8], index: usize);
}

/// Supplies the value of a Color read
pub trait ColorReadSink: Send + Sync {
    fn read_color(&self, index: usize) -> Vec<u8>;
}

/// Receives Animate triggers
pub trait AnimateSink: Send + Sync {
    fn animate(&self, trigger: u8);
}

/// External callbacks; any of them may be absent
#[derive(Default, Clone)]
pub struct Sinks {
    pub color_write: Option<Arc<dyn ColorWriteSink>>,
    pub color_read: Option<Arc<dyn ColorReadSink>>,
    pub animate: Option<Arc<dyn AnimateSink>>,
}

/// Read/write entry points a transport dispatches into
pub trait CharacteristicHandler {
    fn read(&self, id: CharacteristicId) -> Result<Vec<u8>, AttError>;
    fn write(&self, id: CharacteristicId, value: &[u8]) -> Result<(), AttError>;
}

struct StrandState {
    selection: usize,
    mode: SelectMode,
    buffer: PixelColorBuffer,
}

pub struct StrandService {
    format: ColorFormat,
    /// Format spec exactly as configured
    format_spec: String,
    count: usize,
    state: Mutex<StrandState>,
    sinks: Sinks,
}

impl StrandService {
    pub fn new(descriptor: &ServiceDescriptor, sinks: Sinks) -> Self {
        let format = descriptor.format.clone();
        let count = descriptor.pixel_count.get() as usize;

        StrandService {
            state: Mutex::new(StrandState {
                selection: 0,
                mode: SelectMode::Hold,
                buffer: PixelColorBuffer::new(count, format.bytes_per_color()),
            }),
            format,
            format_spec: descriptor.format_spec.clone(),
            count,
            sinks,
        }
    }

    pub fn selection(&self) -> usize {
        self.lock().selection
    }

    pub fn mode(&self) -> SelectMode {
        self.lock().mode
    }

    /// Copy of a stored color, `None` outside the strand
    #[allow(dead_code)]
    pub fn color_at(&self, index: usize) -> Option<Vec<u8>> {
        self.lock().buffer.get(index).ok().map(<[u8]>::to_vec)
    }

    fn lock(&self) -> MutexGuard<'_, StrandState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_select(&self, value: &[u8]) {
        if value.len() != SELECT_WIDTH {
            debug!("Ignoring select write of {} bytes", value.len());
            return;
        }

        let index = decode_int(value, false);
        let mut state = self.lock();
        if (0..self.count as i128).contains(&index) {
            state.selection = index as usize;
        } else {
            debug!("Ignoring select {} outside strand of {} pixels", index, self.count);
        }
    }

    fn write_mode(&self, value: &[u8]) {
        if value.len() != MODE_WIDTH {
            debug!("Ignoring mode write of {} bytes", value.len());
            return;
        }

        match SelectMode::try_from(value[0]) {
            Ok(mode) => self.lock().mode = mode,
            Err(raw) => debug!("Ignoring unknown select mode {}", raw),
        }
    }

    fn write_color(&self, value: &[u8]) -> Result<(), AttError> {
        let mut state = self.lock();
        let index = state.selection;

        match state.buffer.set(index, value) {
            Ok(()) => {}
            Err(BufferError::Length { expected, actual }) => {
                debug!("Rejecting color of {} bytes, expected {}", actual, expected);
                return Err(AttError::InvalidLength);
            }
            Err(err @ BufferError::Index { .. }) => {
                panic!("selection escaped the strand: {}", err);
            }
        }

        // Advance before the sink runs so a panicking sink leaves no half-applied write
        state.selection = (index + state.mode.step()) % self.count;
        trace!("Color {:02x?} -> pixel {}, selection now {}", value, index, state.selection);

        if let Some(sink) = &self.sinks.color_write {
            sink.color_written(value, index);
        }

        Ok(())
    }

    fn read_color(&self) -> Vec<u8> {
        let index = self.lock().selection;
        let expected = self.format.bytes_per_color();

        match &self.sinks.color_read {
            Some(sink) => {
                let color = sink.read_color(index);
                if color.len() == expected {
                    color
                } else {
                    warn!(
                        "Color sink returned {} bytes for pixel {}, expected {}",
                        color.len(),
                        index,
                        expected
                    );
                    vec![0u8; expected]
                }
            }
            None => vec![0u8; expected],
        }
    }

    fn write_animate(&self, value: &[u8]) {
        if value.len() != ANIMATE_WIDTH {
            debug!("Ignoring animate write of {} bytes", value.len());
            return;
        }

        let trigger = decode_int(value, false) as u8;
        if let Some(sink) = &self.sinks.animate {
            sink.animate(trigger);
        }
    }
}

impl CharacteristicHandler for StrandService {
    fn read(&self, id: CharacteristicId) -> Result<Vec<u8>, AttError> {
        if !id.access().read {
            return Err(AttError::ReadNotPermitted);
        }

        let value = match id {
            CharacteristicId::Format => self.format_spec.clone().into_bytes(),
            CharacteristicId::Resolution => self.format.resolution(),
            CharacteristicId::Count => encode_u32(self.count as u32),
            CharacteristicId::Select => encode_u32(self.selection() as u32),
            CharacteristicId::Mode => encode_u8(self.mode() as u8),
            CharacteristicId::Color => self.read_color(),
            CharacteristicId::Animate => return Err(AttError::ReadNotPermitted),
        };

        Ok(value)
    }

    fn write(&self, id: CharacteristicId, value: &[u8]) -> Result<(), AttError> {
        if !id.access().write {
            return Err(AttError::WriteNotPermitted);
        }

        match id {
            CharacteristicId::Select => self.write_select(value),
            CharacteristicId::Mode => self.write_mode(value),
            CharacteristicId::Color => self.write_color(value)?,
            CharacteristicId::Animate => self.write_animate(value),
            CharacteristicId::Format | CharacteristicId::Resolution | CharacteristicId::Count => {
                return Err(AttError::WriteNotPermitted)
            }
        }

        Ok(())
    }
}
