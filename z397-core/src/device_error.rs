//! Fault codes carried by `0x02` frames

use std::fmt;

/// Fault reported by the converter
///
/// The body of a fault frame is a short run of code bytes. Unrecognised runs
/// are kept verbatim in their `0xHH, 0xHH` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("ERROR CRC")]
    Crc,

    #[error("ERROR license command")]
    LicenseCommand,

    #[error("ERROR unknown controller")]
    UnknownController,

    #[error("ERROR license not active")]
    LicenseInactive,

    #[error("ERROR license is old")]
    LicenseOld,

    #[error("ERROR too many controllers")]
    TooManyControllers,

    #[error("ERROR read too many cards")]
    TooManyCardReads,

    #[error("ERROR write too many cards")]
    TooManyCardWrites,

    #[error("ERROR write license is old")]
    WriteLicenseOld,

    #[error("ERROR packet first byte")]
    PacketFirstByte,

    #[error("ERROR unknown code {0}")]
    Unknown(String),
}

impl DeviceError {
    /// Decode the body of a fault frame (bytes between type and terminator)
    ///
    /// # Examples
    ///
    /// ```
    /// use z397_core::DeviceError;
    ///
    /// assert_eq!(DeviceError::from_code(&[0x48, 0x48]), DeviceError::Crc);
    /// ```
    pub fn from_code(body: &[u8]) -> Self {
        match body {
            [0x48, 0x48] => Self::Crc,
            [0x48, 0x4c, 0x43] => Self::LicenseCommand,
            [0x48, 0x43] => Self::UnknownController,
            [0x48, 0x4c, 0x31] => Self::LicenseInactive,
            [0x48, 0x4c, 0x32] => Self::LicenseOld,
            [0x48, 0x4c, 0x33] => Self::TooManyControllers,
            [0x48, 0x4c, 0x34] => Self::TooManyCardReads,
            [0x48, 0x4c, 0x35] => Self::TooManyCardWrites,
            [0x48, 0x4c, 0x36] => Self::WriteLicenseOld,
            [0x48, 0x4a] => Self::PacketFirstByte,
            _ => Self::Unknown(CodeBytes(body).to_string()),
        }
    }
}

/// Renders code bytes as `0xHH, 0xHH, ...`
pub struct CodeBytes<'a>(pub &'a [u8]);

impl fmt::Display for CodeBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:#04x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_known_codes() {
        assert_eq!(DeviceError::from_code(&[0x48, 0x4c, 0x43]), DeviceError::LicenseCommand);
        assert_eq!(DeviceError::from_code(&[0x48, 0x43]), DeviceError::UnknownController);
        assert_eq!(DeviceError::from_code(&[0x48, 0x4a]), DeviceError::PacketFirstByte);
    }

    #[test]
    fn test_license_states() {
        let expected = [
            DeviceError::LicenseInactive,
            DeviceError::LicenseOld,
            DeviceError::TooManyControllers,
            DeviceError::TooManyCardReads,
            DeviceError::TooManyCardWrites,
            DeviceError::WriteLicenseOld,
        ];
        for (code, error) in (0x31u8..=0x36).zip(expected) {
            assert_eq!(DeviceError::from_code(&[0x48, 0x4c, code]), error);
        }
    }

    #[test]
    fn test_unknown_code_verbatim() {
        let error = DeviceError::from_code(&[0x48, 0x05, 0xab]);
        assert_eq!(error, DeviceError::Unknown("0x48, 0x05, 0xab".into()));
        assert_eq!(error.to_string(), "ERROR unknown code 0x48, 0x05, 0xab");
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(DeviceError::from_code(&[]), DeviceError::Unknown(String::new()));
    }
}
