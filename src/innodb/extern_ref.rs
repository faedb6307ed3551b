//! External (off-page) field references.
//!
//! A field stored off-page keeps a local prefix in the record followed by a
//! 20-byte reference to the first overflow page. The reference holds the
//! space id, page number and byte offset of the BLOB header on that page,
//! and an 8-byte length whose top byte carries the owner and inherited flags.
//! A reference that is all zeroes has not been written yet.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::constants::*;
use crate::innodb::offsets::Offsets;

/// All-zero reference written by the externalizer before the BLOB pages exist.
pub const FIELD_REF_ZERO: [u8; BTR_EXTERN_FIELD_REF_SIZE] = [0; BTR_EXTERN_FIELD_REF_SIZE];

/// Parsed 20-byte external field reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExternRef {
    /// Tablespace id of the first overflow page.
    pub space_id: u32,
    /// Page number of the first overflow page.
    pub page_no: u32,
    /// Byte offset of the BLOB header on that page.
    pub offset: u32,
    /// Number of bytes stored off-page.
    pub length: u32,
    /// False when the owner flag is set: another record owns the BLOB.
    pub owner: bool,
    /// The BLOB was inherited from an earlier version of the record.
    pub inherited: bool,
}

impl ExternRef {
    /// Parse a reference from the first 20 bytes of `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::extern_ref::ExternRef;
    ///
    /// let r = ExternRef { space_id: 5, page_no: 9, offset: 38, length: 70_000, owner: true, inherited: false };
    /// let mut bytes = [0u8; 20];
    /// r.write(&mut bytes);
    /// assert_eq!(ExternRef::parse(&bytes), Some(r));
    /// assert_eq!(ExternRef::parse(&bytes[..10]), None);
    /// ```
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < BTR_EXTERN_FIELD_REF_SIZE {
            return None;
        }
        let flags = data[BTR_EXTERN_LEN];
        Some(ExternRef {
            space_id: BigEndian::read_u32(&data[BTR_EXTERN_SPACE_ID..]),
            page_no: BigEndian::read_u32(&data[BTR_EXTERN_PAGE_NO..]),
            offset: BigEndian::read_u32(&data[BTR_EXTERN_OFFSET..]),
            length: BigEndian::read_u32(&data[BTR_EXTERN_LEN + 4..]),
            owner: flags & BTR_EXTERN_OWNER_FLAG == 0,
            inherited: flags & BTR_EXTERN_INHERITED_FLAG != 0,
        })
    }

    /// Serialize into the first 20 bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        let out = &mut out[..BTR_EXTERN_FIELD_REF_SIZE];
        BigEndian::write_u32(&mut out[BTR_EXTERN_SPACE_ID..], self.space_id);
        BigEndian::write_u32(&mut out[BTR_EXTERN_PAGE_NO..], self.page_no);
        BigEndian::write_u32(&mut out[BTR_EXTERN_OFFSET..], self.offset);
        let mut flags = 0;
        if !self.owner {
            flags |= BTR_EXTERN_OWNER_FLAG;
        }
        if self.inherited {
            flags |= BTR_EXTERN_INHERITED_FLAG;
        }
        out[BTR_EXTERN_LEN..BTR_EXTERN_LEN + 4].copy_from_slice(&[flags, 0, 0, 0]);
        BigEndian::write_u32(&mut out[BTR_EXTERN_LEN + 4..], self.length);
    }

    /// Returns true if the BLOB pages have not been allocated yet.
    pub fn is_zero(data: &[u8]) -> bool {
        data.len() >= BTR_EXTERN_FIELD_REF_SIZE && data[..BTR_EXTERN_FIELD_REF_SIZE] == FIELD_REF_ZERO
    }
}

/// The reference bytes at the end of externally stored field `n`.
pub fn field_ref<'b>(buf: &'b [u8], origin: usize, offsets: &Offsets, n: usize) -> &'b [u8] {
    assert!(offsets.nth_extern(n));
    let end = origin + offsets.nth_end(n);
    assert!(offsets.nth_size(n) >= BTR_EXTERN_FIELD_REF_SIZE);
    &buf[end - BTR_EXTERN_FIELD_REF_SIZE..end]
}

/// Local prefix length of externally stored field `n`.
pub fn local_len(offsets: &Offsets, n: usize) -> usize {
    offsets.nth_size(n) - BTR_EXTERN_FIELD_REF_SIZE
}

/// Parsed references of every externally stored field, with field numbers.
pub fn extern_refs(buf: &[u8], origin: usize, offsets: &Offsets) -> Vec<(usize, ExternRef)> {
    if !offsets.any_extern() {
        return Vec::new();
    }
    (0..offsets.n_fields())
        .filter(|&i| offsets.nth_extern(i))
        .filter_map(|i| ExternRef::parse(field_ref(buf, origin, offsets, i)).map(|r| (i, r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut bytes = [0u8; 20];
        BigEndian::write_u32(&mut bytes[BTR_EXTERN_PAGE_NO..], 42);
        bytes[BTR_EXTERN_LEN] = BTR_EXTERN_OWNER_FLAG | BTR_EXTERN_INHERITED_FLAG;
        BigEndian::write_u32(&mut bytes[BTR_EXTERN_LEN + 4..], 8000);
        let r = ExternRef::parse(&bytes).unwrap();
        assert_eq!(r.page_no, 42);
        assert_eq!(r.length, 8000);
        assert!(!r.owner);
        assert!(r.inherited);

        let mut out = [0xFFu8; 20];
        r.write(&mut out);
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_zero() {
        assert!(ExternRef::is_zero(&FIELD_REF_ZERO));
        assert!(!ExternRef::is_zero(&[0u8; 19]));
        let mut b = [0u8; 20];
        b[7] = 1;
        assert!(!ExternRef::is_zero(&b));
        let r = ExternRef::parse(&FIELD_REF_ZERO).unwrap();
        assert!(r.owner);
        assert_eq!(r.length, 0);
    }
}
