//! Bounds-checked access to guest linear memory.
//!
//! A view is built from the guest's memory slice at the start of every entry
//! point and dropped before it returns. Guest memory may grow (and move) once
//! control goes back to the guest, so nothing read here is ever kept as a
//! borrow: strings and payloads are copied out.

use bytemuck::Pod;

use crate::error::BridgeError;

/// Read-only view of guest memory for the duration of one call.
#[derive(Clone, Copy)]
pub struct MemoryView<'a> {
    data: &'a [u8],
}

impl<'a> MemoryView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Borrow `len` bytes at `ptr`.
    pub fn bytes(&self, ptr: u32, len: u64) -> Result<&'a [u8], BridgeError> {
        checked_range(self.data.len(), ptr, len).map(|range| &self.data[range])
    }

    /// Copy `len` bytes at `ptr` out of guest memory.
    pub fn copy_bytes(&self, ptr: u32, len: u32) -> Result<Vec<u8>, BridgeError> {
        self.bytes(ptr, len as u64).map(<[u8]>::to_vec)
    }

    pub fn read_u32(&self, ptr: u32) -> Result<u32, BridgeError> {
        self.read_pod(ptr).map(u32::from_le)
    }

    pub fn read_u64(&self, ptr: u32) -> Result<u64, BridgeError> {
        self.read_pod(ptr).map(u64::from_le)
    }

    /// A single byte; any nonzero value is true.
    pub fn read_bool(&self, ptr: u32) -> Result<bool, BridgeError> {
        self.bytes(ptr, 1).map(|b| b[0] != 0)
    }

    /// Read a fixed-layout record at any alignment.
    pub fn read_pod<T: Pod>(&self, ptr: u32) -> Result<T, BridgeError> {
        let bytes = self.bytes(ptr, std::mem::size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Read `count` consecutive records of `T`.
    pub fn read_pod_array<T: Pod>(&self, ptr: u32, count: u32) -> Result<Vec<T>, BridgeError> {
        let stride = std::mem::size_of::<T>() as u64;
        let bytes = self.bytes(ptr, stride * count as u64)?;
        Ok(bytes
            .chunks_exact(stride as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn read_u32_array(&self, ptr: u32, count: u32) -> Result<Vec<u32>, BridgeError> {
        self.read_pod_array::<u32>(ptr, count)
            .map(|values| values.into_iter().map(u32::from_le).collect())
    }

    /// Length-delimited UTF-8 string.
    pub fn read_str(&self, ptr: u32, len: u32) -> Result<String, BridgeError> {
        let bytes = self.bytes(ptr, len as u64)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| BridgeError::InvalidUtf8 { ptr })
    }

    /// NUL-terminated UTF-8 string. A string that runs to the end of memory
    /// without a terminator is out of bounds.
    pub fn read_c_str(&self, ptr: u32) -> Result<String, BridgeError> {
        let tail = self.bytes(ptr, 0).map(|_| &self.data[ptr as usize..])?;
        let Some(end) = tail.iter().position(|&b| b == 0) else {
            return Err(BridgeError::OutOfBounds {
                ptr,
                len: tail.len() as u64 + 1,
                size: self.data.len(),
            });
        };
        self.read_str(ptr, end as u32)
    }
}

/// Writable view of guest memory for the duration of one call.
pub struct MemoryViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> MemoryViewMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn as_view(&self) -> MemoryView<'_> {
        MemoryView::new(self.data)
    }

    pub fn write_bytes(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), BridgeError> {
        let range = checked_range(self.data.len(), ptr, bytes.len() as u64)?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }
}

fn checked_range(size: usize, ptr: u32, len: u64) -> Result<std::ops::Range<usize>, BridgeError> {
    let out_of_bounds = || BridgeError::OutOfBounds { ptr, len, size };
    let start = ptr as u64;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > size as u64 {
        return Err(out_of_bounds());
    }
    Ok(start as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut mem = vec![0u8; 64];
        mem[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        mem[9..17].copy_from_slice(&0x0102_0304_0506_0708u64.to_le_bytes());
        mem[20..25].copy_from_slice(b"hello");
        mem[30..33].copy_from_slice(b"abc");
        mem
    }

    #[test]
    fn test_scalar_reads_little_endian_and_unaligned() {
        let mem = sample();
        let view = MemoryView::new(&mem);
        assert_eq!(view.read_u32(4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(view.read_u64(9).unwrap(), 0x0102_0304_0506_0708);
        assert!(view.read_bool(4).unwrap());
        assert!(!view.read_bool(0).unwrap());
    }

    #[test]
    fn test_strings() {
        let mem = sample();
        let view = MemoryView::new(&mem);
        assert_eq!(view.read_str(20, 5).unwrap(), "hello");
        assert_eq!(view.read_str(20, 0).unwrap(), "");
        assert_eq!(view.read_c_str(30).unwrap(), "abc");
    }

    #[test]
    fn test_invalid_utf8() {
        let mut mem = sample();
        mem[40] = 0xFF;
        let view = MemoryView::new(&mem);
        assert_eq!(view.read_str(40, 1), Err(BridgeError::InvalidUtf8 { ptr: 40 }));
    }

    #[test]
    fn test_unterminated_c_str_is_out_of_bounds() {
        let mem = vec![b'x'; 8];
        let view = MemoryView::new(&mem);
        assert!(matches!(view.read_c_str(2), Err(BridgeError::OutOfBounds { .. })));
    }

    #[test]
    fn test_out_of_bounds_reads() {
        let mem = sample();
        let view = MemoryView::new(&mem);
        assert!(view.read_u32(61).is_err());
        assert!(view.read_u64(u32::MAX).is_err());
        assert!(view.bytes(60, 5).is_err());
        assert!(view.bytes(64, 0).is_ok());
        assert!(view.bytes(65, 0).is_err());
    }

    #[test]
    fn test_u32_array() {
        let mut mem = vec![0u8; 16];
        for (i, v) in [3u32, 5, 9].iter().enumerate() {
            mem[1 + i * 4..5 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        let view = MemoryView::new(&mem);
        assert_eq!(view.read_u32_array(1, 3).unwrap(), vec![3, 5, 9]);
        assert_eq!(view.read_u32_array(1, 0).unwrap(), Vec::<u32>::new());
        assert!(view.read_u32_array(1, 4).is_err());
    }

    #[test]
    fn test_write_bytes() {
        let mut mem = vec![0u8; 8];
        let mut view = MemoryViewMut::new(&mut mem);
        view.write_bytes(2, b"ok").unwrap();
        assert!(view.write_bytes(7, b"no").is_err());
        assert_eq!(view.as_view().read_str(2, 2).unwrap(), "ok");
    }
}
