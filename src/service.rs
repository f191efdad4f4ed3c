//! Static declaration of the pixel strand service and its characteristics.

use std::num::NonZeroU32;

use uuid::Uuid;

use crate::color_format::ColorFormat;
use crate::error::FormatError;

/// Pixel strand service UUID ("pixelstrandble")
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x70697865_6c73_7472_616e_64626c650000);

/// Characteristic UUIDs share the service base; the low byte is the handle
const CHARACTERISTIC_BASE: u128 = 0x70697865_6c73_7472_616e_64626c650000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    Format,
    Resolution,
    Count,
    Select,
    Mode,
    Color,
    Animate,
}

impl CharacteristicId {
    pub const ALL: [CharacteristicId; 7] = [
        CharacteristicId::Format,
        CharacteristicId::Resolution,
        CharacteristicId::Count,
        CharacteristicId::Select,
        CharacteristicId::Mode,
        CharacteristicId::Color,
        CharacteristicId::Animate,
    ];

    pub fn handle(self) -> u8 {
        match self {
            CharacteristicId::Format => 0x01,
            CharacteristicId::Resolution => 0x02,
            CharacteristicId::Count => 0x03,
            CharacteristicId::Select => 0x04,
            CharacteristicId::Mode => 0x05,
            CharacteristicId::Color => 0x06,
            CharacteristicId::Animate => 0x07,
        }
    }

    pub fn uuid(self) -> Uuid {
        Uuid::from_u128(CHARACTERISTIC_BASE | self.handle() as u128)
    }

    pub fn access(self) -> Access {
        match self {
            CharacteristicId::Format | CharacteristicId::Resolution | CharacteristicId::Count => {
                Access::READ
            }
            CharacteristicId::Select | CharacteristicId::Mode | CharacteristicId::Color => {
                Access::READ_WRITE
            }
            CharacteristicId::Animate => Access::WRITE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CharacteristicId::Format => "format",
            CharacteristicId::Resolution => "resolution",
            CharacteristicId::Count => "count",
            CharacteristicId::Select => "select",
            CharacteristicId::Mode => "mode",
            CharacteristicId::Color => "color",
            CharacteristicId::Animate => "animate",
        }
    }
}

/// Characteristic access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

impl Access {
    pub const READ: Access = Access { read: true, write: false };
    pub const WRITE: Access = Access { read: false, write: true };
    pub const READ_WRITE: Access = Access { read: true, write: true };

    /// Property bits as used in a GATT characteristic declaration
    pub fn bits(self) -> u8 {
        let mut bits = 0;
        if self.read {
            bits |= 0x02;
        }
        if self.write {
            bits |= 0x08;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub id: CharacteristicId,
    pub handle: u8,
    pub uuid: Uuid,
    pub access: Access,
}

/// Everything a transport needs to register the service
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub local_name: String,
    pub format: ColorFormat,
    /// Spec string as given, served by the Format characteristic
    pub format_spec: String,
    pub pixel_count: NonZeroU32,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    /// Build the descriptor; an invalid format spec means the service cannot start
    pub fn new(local_name: &str, format_spec: &str, pixel_count: NonZeroU32) -> Result<Self, FormatError> {
        let format = ColorFormat::parse(format_spec)?;

        let characteristics = CharacteristicId::ALL
            .into_iter()
            .map(|id| CharacteristicDescriptor {
                id,
                handle: id.handle(),
                uuid: id.uuid(),
                access: id.access(),
            })
            .collect();

        Ok(ServiceDescriptor {
            uuid: SERVICE_UUID,
            local_name: local_name.to_string(),
            format,
            format_spec: format_spec.to_string(),
            pixel_count,
            characteristics,
        })
    }

    pub fn characteristic(&self, handle: u8) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.handle == handle)
    }
}
