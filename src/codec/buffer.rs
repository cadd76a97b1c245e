//! # Packet Buffer
//!
//! Cursor-based binary reader/writer every packet serializes through.
//!
//! A [`PacketBuffer`] owns a byte vector and a read position. Writes append at the
//! end, reads advance the position; reads can never move past the written bytes
//! and fail with `BufferUnderflow` instead. All fixed-width integers are
//! big-endian on the wire; varints use 7-bit little-endian groups with the high
//! bit as a continuation flag.
//!
//! ## Wire invariants
//! - Varint: 1-5 bytes (32-bit) / 1-10 bytes (64-bit); an over-long encoding is
//!   `MalformedVarInt`
//! - String: varint byte length + UTF-8, bounded in characters
//! - Counted collections: varint count prefix, bounded before allocation
//! - 128-bit identifier: two raw big-endian `u64` (high, then low)

use crate::config::DEFAULT_MAX_STRING;
use crate::error::{ProtocolError, Result};
use bytes::Bytes;

/// Packed integer block position: x and z in 26 signed bits, y in 12.
/// The bit layout is a stable wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Enums with a dense wire ordinal, encoded as a varint.
pub trait WireEnum: Sized + Copy {
    fn ordinal(self) -> i32;
    fn from_ordinal(ordinal: i32) -> Option<Self>;
}

/// Binary cursor over an owned byte vector.
#[derive(Debug, Default, Clone)]
pub struct PacketBuffer {
    data: Vec<u8>,
    read: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read: 0,
        }
    }

    /// Wrap received bytes for decoding.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            read: 0,
        }
    }

    /// Unread bytes remaining.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read
    }

    /// Current read position, in bytes from the start.
    pub fn position(&self) -> usize {
        self.read
    }

    /// Total bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the buffer, yielding the written bytes.
    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::BufferUnderflow {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.read..self.read + n];
        self.read += n;
        Ok(slice)
    }

    // ---- fixed-width primitives -------------------------------------------

    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn write_i8(&mut self, v: i8) {
        self.write_u8(v as u8);
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16);
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn write_i32(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_i64(&mut self, v: i64) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn write_u64(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.read_i64()? as u64)
    }

    pub fn write_f32(&mut self, v: f32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_i32()? as u32))
    }

    pub fn write_f64(&mut self, v: f64) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    // ---- varints -----------------------------------------------------------

    pub fn write_varint(&mut self, v: i32) {
        let mut value = v as u32;
        loop {
            if value & !0x7F == 0 {
                self.write_u8(value as u8);
                return;
            }
            self.write_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::MalformedVarInt)
    }

    pub fn write_varlong(&mut self, v: i64) {
        let mut value = v as u64;
        loop {
            if value & !0x7F == 0 {
                self.write_u8(value as u8);
                return;
            }
            self.write_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
    }

    pub fn read_varlong(&mut self) -> Result<i64> {
        let mut value: u64 = 0;
        for i in 0..10 {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(ProtocolError::MalformedVarInt)
    }

    /// Encoded width of a varint, without writing it.
    pub fn varint_len(v: i32) -> usize {
        let bits = 32 - (v as u32).leading_zeros().min(31);
        (bits as usize + 6) / 7
    }

    fn read_count(&mut self, max: usize) -> Result<usize> {
        let declared = self.read_varint()?;
        if declared < 0 {
            return Err(ProtocolError::NegativeLength(declared));
        }
        let len = declared as usize;
        if len > max {
            return Err(ProtocolError::CollectionTooLong { len, max });
        }
        Ok(len)
    }

    // ---- strings -----------------------------------------------------------

    pub fn write_string(&mut self, s: &str, max_chars: usize) -> Result<()> {
        let len = s.chars().count();
        if len > max_chars {
            return Err(ProtocolError::StringTooLong {
                len,
                max: max_chars,
            });
        }
        self.write_varint(s.len() as i32);
        self.data.extend_from_slice(s.as_bytes());
        Ok(())
    }

    pub fn read_string(&mut self, max_chars: usize) -> Result<String> {
        // A UTF-8 char is at most 4 bytes; reject before decoding.
        let byte_len = self.read_count(max_chars.saturating_mul(4)).map_err(|e| {
            match e {
                ProtocolError::CollectionTooLong { len, .. } => ProtocolError::StringTooLong {
                    len,
                    max: max_chars,
                },
                other => other,
            }
        })?;
        let bytes = self.take(byte_len)?.to_vec();
        let s = String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let chars = s.chars().count();
        if chars > max_chars {
            return Err(ProtocolError::StringTooLong {
                len: chars,
                max: max_chars,
            });
        }
        Ok(s)
    }

    /// String with the default 32767-character bound.
    pub fn write_utf(&mut self, s: &str) -> Result<()> {
        self.write_string(s, DEFAULT_MAX_STRING)
    }

    /// String with the default 32767-character bound.
    pub fn read_utf(&mut self) -> Result<String> {
        self.read_string(DEFAULT_MAX_STRING)
    }

    // ---- counted arrays ----------------------------------------------------

    pub fn write_byte_array(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as i32);
        self.data.extend_from_slice(bytes);
    }

    pub fn read_byte_array(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let len = self.read_count(max_len)?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn write_varint_array(&mut self, values: &[i32]) {
        self.write_varint(values.len() as i32);
        for &v in values {
            self.write_varint(v);
        }
    }

    pub fn read_varint_array(&mut self, max_len: usize) -> Result<Vec<i32>> {
        let len = self.read_count(max_len)?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(self.read_varint()?);
        }
        Ok(out)
    }

    pub fn write_long_array(&mut self, values: &[i64]) {
        self.write_varint(values.len() as i32);
        for &v in values {
            self.write_i64(v);
        }
    }

    pub fn read_long_array(&mut self, max_len: usize) -> Result<Vec<i64>> {
        let len = self.read_count(max_len)?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(self.read_i64()?);
        }
        Ok(out)
    }

    // ---- generic composites ------------------------------------------------

    pub fn write_collection<T>(
        &mut self,
        items: &[T],
        mut write: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.write_varint(items.len() as i32);
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    pub fn read_collection<T>(
        &mut self,
        max_len: usize,
        mut read: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let len = self.read_count(max_len)?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            out.push(read(self)?);
        }
        Ok(out)
    }

    pub fn write_map<K, V>(
        &mut self,
        entries: &[(K, V)],
        mut write_key: impl FnMut(&mut Self, &K) -> Result<()>,
        mut write_value: impl FnMut(&mut Self, &V) -> Result<()>,
    ) -> Result<()> {
        self.write_varint(entries.len() as i32);
        for (key, value) in entries {
            write_key(self, key)?;
            write_value(self, value)?;
        }
        Ok(())
    }

    pub fn read_map<K, V>(
        &mut self,
        max_len: usize,
        mut read_key: impl FnMut(&mut Self) -> Result<K>,
        mut read_value: impl FnMut(&mut Self) -> Result<V>,
    ) -> Result<Vec<(K, V)>> {
        let len = self.read_count(max_len)?;
        let mut out = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = read_key(self)?;
            let value = read_value(self)?;
            out.push((key, value));
        }
        Ok(out)
    }

    pub fn write_option<T>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        match value {
            Some(v) => {
                self.write_bool(true);
                write(self, v)
            }
            None => {
                self.write_bool(false);
                Ok(())
            }
        }
    }

    pub fn read_option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.read_bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }

    // ---- enums and identifiers ---------------------------------------------

    pub fn write_enum<E: WireEnum>(&mut self, value: E) {
        self.write_varint(value.ordinal());
    }

    pub fn read_enum<E: WireEnum>(&mut self) -> Result<E> {
        let ordinal = self.read_varint()?;
        E::from_ordinal(ordinal).ok_or(ProtocolError::InvalidEnumOrdinal(ordinal))
    }

    /// 128-bit identifier as two raw big-endian u64s, high half first.
    pub fn write_uuid(&mut self, uuid: u128) {
        self.write_u64((uuid >> 64) as u64);
        self.write_u64(uuid as u64);
    }

    pub fn read_uuid(&mut self) -> Result<u128> {
        let high = self.read_u64()?;
        let low = self.read_u64()?;
        Ok((u128::from(high) << 64) | u128::from(low))
    }

    // ---- packed positions --------------------------------------------------

    pub fn write_block_pos(&mut self, pos: BlockPos) {
        let packed = ((u64::from(pos.x as u32) & 0x3FF_FFFF) << 38)
            | ((u64::from(pos.z as u32) & 0x3FF_FFFF) << 12)
            | (u64::from(pos.y as u32) & 0xFFF);
        self.write_u64(packed);
    }

    pub fn read_block_pos(&mut self) -> Result<BlockPos> {
        let packed = self.read_u64()?;
        // Shift left then arithmetic-shift right to sign-extend each field.
        let x = ((packed as i64) >> 38) as i32;
        let z = (((packed << 26) as i64) >> 38) as i32;
        let y = (((packed << 52) as i64) >> 52) as i32;
        Ok(BlockPos { x, y, z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip_extremes() {
        for v in [0, 1, -1, 127, 128, 255, 25565, i32::MAX, i32::MIN] {
            let mut buf = PacketBuffer::new();
            buf.write_varint(v);
            assert_eq!(buf.read_varint().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn varint_known_encodings() {
        let mut buf = PacketBuffer::new();
        buf.write_varint(300);
        assert_eq!(buf.as_slice(), &[0xAC, 0x02]);

        let mut buf = PacketBuffer::new();
        buf.write_varint(-1);
        assert_eq!(buf.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn varint_rejects_sixth_continuation_byte() {
        let mut buf = PacketBuffer::from_bytes(vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(
            buf.read_varint(),
            Err(ProtocolError::MalformedVarInt)
        ));
    }

    #[test]
    fn varlong_roundtrip_extremes() {
        for v in [0, 1, -1, i64::from(i32::MAX), i64::MAX, i64::MIN] {
            let mut buf = PacketBuffer::new();
            buf.write_varlong(v);
            assert_eq!(buf.read_varlong().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn varlong_rejects_eleventh_byte() {
        let mut buf = PacketBuffer::from_bytes(vec![0x80; 11]);
        assert!(matches!(
            buf.read_varlong(),
            Err(ProtocolError::MalformedVarInt)
        ));
    }

    #[test]
    fn varint_len_matches_encoding() {
        for v in [0, 1, 127, 128, 16_383, 16_384, 2_097_151, i32::MAX, -1] {
            let mut buf = PacketBuffer::new();
            buf.write_varint(v);
            assert_eq!(PacketBuffer::varint_len(v), buf.len(), "value {v}");
        }
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = PacketBuffer::new();
        buf.write_utf("hello, världen 世界").unwrap();
        assert_eq!(buf.read_utf().unwrap(), "hello, världen 世界");
    }

    #[test]
    fn string_boundary_at_max_chars() {
        let exact = "x".repeat(16);
        let mut buf = PacketBuffer::new();
        buf.write_string(&exact, 16).unwrap();
        assert_eq!(buf.read_string(16).unwrap(), exact);

        let over = "x".repeat(17);
        let mut buf = PacketBuffer::new();
        assert!(matches!(
            buf.write_string(&over, 16),
            Err(ProtocolError::StringTooLong { len: 17, max: 16 })
        ));

        // Write wide, read narrow: the reader enforces its own bound.
        let mut buf = PacketBuffer::new();
        buf.write_string(&over, 32).unwrap();
        assert!(matches!(
            buf.read_string(16),
            Err(ProtocolError::StringTooLong { .. })
        ));
    }

    #[test]
    fn string_rejects_oversized_byte_length_before_decoding() {
        let mut buf = PacketBuffer::new();
        // Claims 1000 bytes for a 4-char budget (cap is 16 bytes).
        buf.write_varint(1000);
        assert!(matches!(
            buf.read_string(4),
            Err(ProtocolError::StringTooLong { .. })
        ));
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut buf = PacketBuffer::new();
        buf.write_varint(2);
        buf.write_u8(0xC3);
        buf.write_u8(0x28);
        assert!(matches!(buf.read_utf(), Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn collection_boundary_at_max_len() {
        let values: Vec<i32> = (0..8).collect();
        let mut buf = PacketBuffer::new();
        buf.write_varint_array(&values);
        let mut ok = PacketBuffer::from_bytes(buf.as_slice().to_vec());
        assert_eq!(ok.read_varint_array(8).unwrap(), values);

        let mut too_narrow = PacketBuffer::from_bytes(buf.as_slice().to_vec());
        assert!(matches!(
            too_narrow.read_varint_array(7),
            Err(ProtocolError::CollectionTooLong { len: 8, max: 7 })
        ));
    }

    #[test]
    fn negative_count_rejected() {
        let mut buf = PacketBuffer::new();
        buf.write_varint(-5);
        assert!(matches!(
            buf.read_byte_array(64),
            Err(ProtocolError::NegativeLength(-5))
        ));
    }

    #[test]
    fn long_array_roundtrip() {
        let values = [i64::MIN, -1, 0, 1, i64::MAX];
        let mut buf = PacketBuffer::new();
        buf.write_long_array(&values);
        assert_eq!(buf.read_long_array(5).unwrap(), values);
    }

    #[test]
    fn map_roundtrip() {
        let entries = vec![("a".to_string(), 1i32), ("b".to_string(), 2)];
        let mut buf = PacketBuffer::new();
        buf.write_map(
            &entries,
            |b, k| b.write_utf(k),
            |b, v| {
                b.write_varint(*v);
                Ok(())
            },
        )
        .unwrap();
        let decoded = buf
            .read_map(16, |b| b.read_utf(), |b| b.read_varint())
            .unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn option_roundtrip() {
        let mut buf = PacketBuffer::new();
        buf.write_option(Some(&42i32), |b, v| {
            b.write_varint(*v);
            Ok(())
        })
        .unwrap();
        buf.write_option(None::<&i32>, |b, v| {
            b.write_varint(*v);
            Ok(())
        })
        .unwrap();
        assert_eq!(buf.read_option(|b| b.read_varint()).unwrap(), Some(42));
        assert_eq!(buf.read_option(|b| b.read_varint()).unwrap(), None);
    }

    #[test]
    fn uuid_is_two_big_endian_u64s() {
        let uuid: u128 = 0x0123_4567_89AB_CDEF_1122_3344_5566_7788;
        let mut buf = PacketBuffer::new();
        buf.write_uuid(uuid);
        assert_eq!(
            buf.as_slice(),
            &[
                0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x11, 0x22, 0x33, 0x44, 0x55,
                0x66, 0x77, 0x88
            ]
        );
        assert_eq!(buf.read_uuid().unwrap(), uuid);
    }

    #[test]
    fn block_pos_roundtrip_with_negatives() {
        for pos in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(-1, -1, -1),
            BlockPos::new(33_554_431, 2047, -33_554_432),
            BlockPos::new(-30_000_000, -2048, 30_000_000),
        ] {
            let mut buf = PacketBuffer::new();
            buf.write_block_pos(pos);
            assert_eq!(buf.read_block_pos().unwrap(), pos, "{pos:?}");
        }
    }

    #[test]
    fn read_past_end_underflows() {
        let mut buf = PacketBuffer::from_bytes(vec![1, 2]);
        assert!(matches!(
            buf.read_i32(),
            Err(ProtocolError::BufferUnderflow {
                needed: 4,
                remaining: 2
            })
        ));
    }
}
