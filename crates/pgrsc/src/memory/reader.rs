use crate::error::{Error, Result};

/// Maximum length of a C string read from chunk memory (excluding NUL).
pub const MAX_STRING_LEN: usize = 256;

/// Trait for reading from chunk memory.
///
/// Addresses are live addresses inside a chunk heap. Implementations must
/// reject any access that is not fully contained in one allocated chunk.
pub trait ReadMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u64) -> Result<u8> {
        let buffer = self.read_bytes(address, 1)?;
        Ok(buffer[0])
    }

    fn read_u16(&self, address: u64) -> Result<u16> {
        let buffer = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([buffer[0], buffer[1]]))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let buffer = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([
            buffer[0], buffer[1], buffer[2], buffer[3],
        ]))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let buffer = self.read_bytes(address, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buffer);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a NUL-terminated string, stopping at [`MAX_STRING_LEN`] bytes.
    fn read_c_string(&self, address: u64) -> Result<String> {
        let mut bytes = Vec::new();
        while bytes.len() < MAX_STRING_LEN {
            let at = address
                .checked_add(bytes.len() as u64)
                .ok_or(Error::UnmappedAddress { address, size: bytes.len() + 1 })?;
            let byte = self.read_u8(at)?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Trait for writing to chunk memory.
pub trait WriteMemory: ReadMemory {
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<()>;

    fn write_u8(&mut self, address: u64, value: u8) -> Result<()> {
        self.write_bytes(address, &[value])
    }

    fn write_u16(&mut self, address: u64, value: u16) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u64(&mut self, address: u64, value: u64) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Memory where every address holds the same non-NUL byte.
    struct Filled;

    impl ReadMemory for Filled {
        fn read_bytes(&self, _address: u64, size: usize) -> Result<Vec<u8>> {
            Ok(vec![b'x'; size])
        }
    }

    #[test]
    fn test_read_c_string_stops_at_max_len() {
        assert_eq!(Filled.read_c_string(0x1000).unwrap().len(), MAX_STRING_LEN);
    }

    #[test]
    fn test_read_c_string_at_end_of_address_space() {
        let err = Filled.read_c_string(u64::MAX - 2).unwrap_err();
        assert!(matches!(
            err,
            Error::UnmappedAddress { address, size: 4 } if address == u64::MAX - 2
        ));
    }
}
