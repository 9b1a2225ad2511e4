//! Big-endian primitive encoding shared by all serialized structures
//!
//! Strings use the modified UTF-8 layout of the JVM `DataOutput.writeUTF`
//! (u16 byte length, NUL as `C0 80`, supplementary characters as two
//! three-byte surrogates) so payloads stay readable by existing peers.

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Maximum encoded byte length of one string
pub const MAX_UTF_LENGTH: usize = 65535;

/// Reading side of the primitive encoding
pub trait DataRead: Read {
    fn read_u8_value(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8_value()? != 0)
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i32_be(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_i64_be(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_utf(&mut self) -> Result<String> {
        let length = self.read_u16_be()? as usize;
        let mut bytes = vec![0u8; length];
        self.read_exact(&mut bytes)?;
        decode_modified_utf8(&bytes)
    }

    fn read_nullable_utf(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_utf()?))
        } else {
            Ok(None)
        }
    }
}

impl<R: Read + ?Sized> DataRead for R {}

/// Writing side of the primitive encoding
pub trait DataWrite: Write {
    fn write_u8_value(&mut self, value: u8) -> Result<()> {
        self.write_all(&[value])?;
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8_value(u8::from(value))
    }

    fn write_i32_be(&mut self, value: i32) -> Result<()> {
        self.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn write_i64_be(&mut self, value: i64) -> Result<()> {
        self.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn write_utf(&mut self, text: &str) -> Result<()> {
        let bytes = encode_modified_utf8(text);
        if bytes.len() > MAX_UTF_LENGTH {
            return Err(Error::InvalidInput(format!(
                "encoded string too long: {} bytes",
                bytes.len()
            )));
        }
        self.write_all(&(bytes.len() as u16).to_be_bytes())?;
        self.write_all(&bytes)?;
        Ok(())
    }

    fn write_nullable_utf(&mut self, text: Option<&str>) -> Result<()> {
        self.write_bool(text.is_some())?;
        if let Some(text) = text {
            self.write_utf(text)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> DataWrite for W {}

fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let malformed = || Error::WireFormat("malformed modified UTF-8 string".to_string());
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let first = bytes[i] as u16;
        match first >> 4 {
            0..=7 => {
                units.push(first);
                i += 1;
            }
            12 | 13 => {
                let second = *bytes.get(i + 1).ok_or_else(malformed)? as u16;
                if second & 0xC0 != 0x80 {
                    return Err(malformed());
                }
                units.push(((first & 0x1F) << 6) | (second & 0x3F));
                i += 2;
            }
            14 => {
                let second = *bytes.get(i + 1).ok_or_else(malformed)? as u16;
                let third = *bytes.get(i + 2).ok_or_else(malformed)? as u16;
                if second & 0xC0 != 0x80 || third & 0xC0 != 0x80 {
                    return Err(malformed());
                }
                units.push(((first & 0x0F) << 12) | ((second & 0x3F) << 6) | (third & 0x3F));
                i += 3;
            }
            _ => return Err(malformed()),
        }
    }

    String::from_utf16(&units).map_err(|_| malformed())
}
