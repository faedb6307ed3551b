//! Packed record views and header accessors.
//!
//! A packed record is addressed by its *origin*: the header lies at lower
//! addresses and is read backwards from the origin, the field data follows
//! it. [`Rec`] and [`RecMut`] pair a buffer with an origin offset, and every
//! header access is a negative-offset read checked against the buffer.
//!
//! Both header formats are supported:
//! - new-style (COMPACT, DYNAMIC): 5 bytes with info bits, n_owned, 13-bit
//!   heap number, 3-bit status and a page-relative next pointer;
//! - old-style (REDUNDANT): 6 bytes with info bits, n_owned, heap number,
//!   10-bit field count, a 1-byte-offsets flag and an absolute next pointer,
//!   preceded by one end offset (1 or 2 bytes) per field.
//!
//! [`RecKind`] decodes the record type once so that callers can branch on an
//! enum instead of re-reading header bits.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::constants::*;

/// Record status stored in the 3 low bits of a new-style header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecStatus {
    /// Ordinary user record (leaf page).
    Ordinary,
    /// Node pointer record (non-leaf page).
    NodePtr,
    /// Infimum system record.
    Infimum,
    /// Supremum system record.
    Supremum,
    /// Leaf record carrying instantly added columns.
    Instant,
}

impl RecStatus {
    /// Convert a 3-bit status value from the record header.
    ///
    /// Only the lowest 3 bits of `val` are used; the reserved values 5-7
    /// return `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::record::RecStatus;
    ///
    /// assert_eq!(RecStatus::from_u8(0), Some(RecStatus::Ordinary));
    /// assert_eq!(RecStatus::from_u8(1), Some(RecStatus::NodePtr));
    /// assert_eq!(RecStatus::from_u8(4), Some(RecStatus::Instant));
    /// assert_eq!(RecStatus::from_u8(0x0A), Some(RecStatus::Infimum));
    /// assert_eq!(RecStatus::from_u8(7), None);
    ///
    /// assert_eq!(RecStatus::Supremum.name(), "REC_STATUS_SUPREMUM");
    /// ```
    pub fn from_u8(val: u8) -> Option<Self> {
        match val & REC_NEW_STATUS_MASK {
            REC_STATUS_ORDINARY => Some(RecStatus::Ordinary),
            REC_STATUS_NODE_PTR => Some(RecStatus::NodePtr),
            REC_STATUS_INFIMUM => Some(RecStatus::Infimum),
            REC_STATUS_SUPREMUM => Some(RecStatus::Supremum),
            REC_STATUS_INSTANT => Some(RecStatus::Instant),
            _ => None,
        }
    }

    /// The 3-bit value written to the header.
    pub fn as_u8(&self) -> u8 {
        match self {
            RecStatus::Ordinary => REC_STATUS_ORDINARY,
            RecStatus::NodePtr => REC_STATUS_NODE_PTR,
            RecStatus::Infimum => REC_STATUS_INFIMUM,
            RecStatus::Supremum => REC_STATUS_SUPREMUM,
            RecStatus::Instant => REC_STATUS_INSTANT,
        }
    }

    /// Returns the MySQL source-style name (e.g. `"REC_STATUS_ORDINARY"`).
    pub fn name(&self) -> &'static str {
        match self {
            RecStatus::Ordinary => "REC_STATUS_ORDINARY",
            RecStatus::NodePtr => "REC_STATUS_NODE_PTR",
            RecStatus::Infimum => "REC_STATUS_INFIMUM",
            RecStatus::Supremum => "REC_STATUS_SUPREMUM",
            RecStatus::Instant => "REC_STATUS_INSTANT",
        }
    }
}

/// Record type decoded once from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecKind {
    Ordinary,
    NodePtr,
    Infimum,
    Supremum,
    /// Leaf record with instantly added columns.
    Instant,
    /// Metadata pseudo-record of instant ADD COLUMN.
    AddMetadata,
    /// Metadata pseudo-record of instant DROP/reorder COLUMN; carries a
    /// metadata BLOB reference in place of the first user field.
    AlterMetadata,
}

impl RecKind {
    /// Returns true for the two metadata pseudo-records.
    pub fn is_metadata(&self) -> bool {
        matches!(self, RecKind::AddMetadata | RecKind::AlterMetadata)
    }

    /// Returns true for infimum and supremum.
    pub fn is_system(&self) -> bool {
        matches!(self, RecKind::Infimum | RecKind::Supremum)
    }
}

/// Parsed record header, for either format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecHeader {
    /// Number of records owned by this record in the page directory.
    pub n_owned: u8,
    /// Delete mark flag.
    pub delete_mark: bool,
    /// Min-rec flag (leftmost node pointer, or metadata record).
    pub min_rec: bool,
    /// Record's position in the heap.
    pub heap_no: u16,
    /// Record status (new-style only).
    pub status: Option<RecStatus>,
    /// Number of fields (old-style only).
    pub n_fields: Option<u16>,
    /// Field end offsets take 1 byte (old-style only).
    pub short_offsets: Option<bool>,
    /// Raw next-record field: relative in new-style, absolute in old-style.
    pub next: u16,
}

impl RecHeader {
    /// Parse a record header from the extra bytes preceding the origin.
    ///
    /// `data` must hold the 5 (`comp`) or 6 header bytes, ending at the origin.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::record::{RecHeader, RecStatus};
    /// use byteorder::{BigEndian, ByteOrder};
    ///
    /// let mut data = vec![0u8; 5];
    /// // delete_mark (0x20) and n_owned = 2
    /// data[0] = 0x22;
    /// // heap_no = 7, status = ordinary
    /// BigEndian::write_u16(&mut data[1..3], 7 << 3);
    /// BigEndian::write_u16(&mut data[3..5], 42);
    ///
    /// let hdr = RecHeader::parse(&data, true).unwrap();
    /// assert_eq!(hdr.n_owned, 2);
    /// assert!(hdr.delete_mark);
    /// assert!(!hdr.min_rec);
    /// assert_eq!(hdr.heap_no, 7);
    /// assert_eq!(hdr.status, Some(RecStatus::Ordinary));
    /// assert_eq!(hdr.next, 42);
    /// ```
    pub fn parse(data: &[u8], comp: bool) -> Option<Self> {
        let extra = if comp {
            REC_N_NEW_EXTRA_BYTES
        } else {
            REC_N_OLD_EXTRA_BYTES
        };
        if data.len() < extra {
            return None;
        }
        let rec = Rec::new(data, data.len());
        let info = rec.info_bits(comp);
        Some(RecHeader {
            n_owned: rec.n_owned(comp),
            delete_mark: info & REC_INFO_DELETED_FLAG != 0,
            min_rec: info & REC_INFO_MIN_REC_FLAG != 0,
            heap_no: rec.heap_no(comp) as u16,
            status: if comp { RecStatus::from_u8(rec.status_bits()) } else { None },
            n_fields: (!comp).then(|| rec.n_fields_old() as u16),
            short_offsets: (!comp).then(|| rec.one_byte_offs_flag()),
            next: rec.next_raw(),
        })
    }
}

/// Read-only view of a packed record.
#[derive(Debug, Clone, Copy)]
pub struct Rec<'a> {
    buf: &'a [u8],
    origin: usize,
}

impl<'a> Rec<'a> {
    /// View the record whose origin is at `origin` within `buf`.
    pub fn new(buf: &'a [u8], origin: usize) -> Self {
        Rec { buf, origin }
    }

    /// Offset of the origin within the buffer.
    pub fn origin(&self) -> usize {
        self.origin
    }

    /// The underlying buffer.
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// Byte `back` positions before the origin.
    #[inline]
    pub fn byte_before(&self, back: usize) -> u8 {
        self.buf[self.origin - back]
    }

    #[inline]
    fn u16_before(&self, back: usize) -> u16 {
        BigEndian::read_u16(&self.buf[self.origin - back..])
    }

    /// Bytes of the record starting `start` bytes after the origin.
    pub fn data(&self, start: usize, len: usize) -> &'a [u8] {
        &self.buf[self.origin + start..self.origin + start + len]
    }

    /// Info bits (delete mark, min-rec flag) in the upper nibble.
    pub fn info_bits(&self, comp: bool) -> u8 {
        let back = if comp { REC_NEW_INFO_BITS } else { REC_OLD_INFO_BITS };
        self.byte_before(back) & REC_INFO_BITS_MASK
    }

    /// Info bits combined with the status bits (new-style only).
    pub fn info_and_status_bits(&self, comp: bool) -> u8 {
        if comp {
            self.info_bits(true) | self.status_bits()
        } else {
            self.info_bits(false)
        }
    }

    /// Number of records owned by this record in the directory.
    pub fn n_owned(&self, comp: bool) -> u8 {
        let back = if comp { REC_NEW_N_OWNED } else { REC_OLD_N_OWNED };
        self.byte_before(back) & REC_N_OWNED_MASK
    }

    /// Heap number.
    pub fn heap_no(&self, comp: bool) -> usize {
        let back = if comp { REC_NEW_HEAP_NO } else { REC_OLD_HEAP_NO };
        ((self.u16_before(back) & REC_HEAP_NO_MASK) >> REC_HEAP_NO_SHIFT) as usize
    }

    /// Raw 3-bit status of a new-style record.
    pub fn status_bits(&self) -> u8 {
        self.byte_before(REC_NEW_STATUS) & REC_NEW_STATUS_MASK
    }

    /// Status of a new-style record.
    pub fn status(&self) -> Option<RecStatus> {
        RecStatus::from_u8(self.status_bits())
    }

    /// Raw next-record field.
    pub fn next_raw(&self) -> u16 {
        self.u16_before(REC_NEXT)
    }

    /// Offset of the next record in the page, or 0 at the end of the list.
    pub fn next_offs(&self, comp: bool) -> usize {
        let raw = self.next_raw();
        if raw == 0 {
            0
        } else if comp {
            (self.origin as u16).wrapping_add(raw) as usize
        } else {
            raw as usize
        }
    }

    /// Returns true if the record is delete-marked (and not a metadata record).
    pub fn is_delete_marked(&self, comp: bool) -> bool {
        self.info_bits(comp) & (REC_INFO_MIN_REC_FLAG | REC_INFO_DELETED_FLAG)
            == REC_INFO_DELETED_FLAG
    }

    /// Returns true if the min-rec flag is set.
    pub fn is_min_rec(&self, comp: bool) -> bool {
        self.info_bits(comp) & REC_INFO_MIN_REC_FLAG != 0
    }

    /// Returns true if the leaf record is an instant ALTER metadata record.
    pub fn is_alter_metadata(&self, comp: bool) -> bool {
        let flags = REC_INFO_MIN_REC_FLAG | REC_INFO_DELETED_FLAG;
        self.info_bits(comp) & flags == flags
    }

    /// Decode the record type. `leaf` tells old-style records apart, since
    /// they carry no status bits.
    pub fn kind(&self, comp: bool, leaf: bool) -> RecKind {
        if comp {
            match self.status() {
                Some(RecStatus::NodePtr) => RecKind::NodePtr,
                Some(RecStatus::Infimum) => RecKind::Infimum,
                Some(RecStatus::Supremum) => RecKind::Supremum,
                Some(RecStatus::Instant) | Some(RecStatus::Ordinary) if self.is_min_rec(true) => {
                    if self.is_alter_metadata(true) {
                        RecKind::AlterMetadata
                    } else {
                        RecKind::AddMetadata
                    }
                }
                Some(RecStatus::Instant) => RecKind::Instant,
                Some(RecStatus::Ordinary) | None => RecKind::Ordinary,
            }
        } else {
            match self.heap_no(false) {
                PAGE_HEAP_NO_INFIMUM => RecKind::Infimum,
                PAGE_HEAP_NO_SUPREMUM => RecKind::Supremum,
                _ if !leaf => RecKind::NodePtr,
                _ if self.is_alter_metadata(false) => RecKind::AlterMetadata,
                _ if self.is_min_rec(false) => RecKind::AddMetadata,
                _ => RecKind::Ordinary,
            }
        }
    }

    /// Number of fields of an old-style record.
    pub fn n_fields_old(&self) -> usize {
        ((self.u16_before(REC_OLD_N_FIELDS) & REC_OLD_N_FIELDS_MASK) >> REC_OLD_N_FIELDS_SHIFT)
            as usize
    }

    /// Returns true if an old-style record uses 1-byte field end offsets.
    pub fn one_byte_offs_flag(&self) -> bool {
        self.byte_before(REC_OLD_SHORT) & REC_OLD_SHORT_MASK != 0
    }

    /// Raw 1-byte end info of field `n` (offset with the SQL NULL bit).
    pub fn field_end_info_1(&self, n: usize) -> u16 {
        u16::from(self.byte_before(REC_N_OLD_EXTRA_BYTES + n + 1))
    }

    /// Raw 2-byte end info of field `n` (offset with SQL NULL / extern bits).
    pub fn field_end_info_2(&self, n: usize) -> u16 {
        self.u16_before(REC_N_OLD_EXTRA_BYTES + 2 * n + 2)
    }

    /// End offset of field `n` of an old-style record, without flag bits.
    pub fn field_end_old(&self, n: usize) -> usize {
        if self.one_byte_offs_flag() {
            (self.field_end_info_1(n) & !REC_1BYTE_SQL_NULL_MASK) as usize
        } else {
            (self.field_end_info_2(n) & !(REC_2BYTE_SQL_NULL_MASK | REC_2BYTE_EXTERN_MASK))
                as usize
        }
    }

    /// Start offset of field `n` of an old-style record.
    pub fn field_start_old(&self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.field_end_old(n - 1)
        }
    }

    /// Returns true if field `n` of an old-style record is SQL NULL.
    pub fn field_is_null_old(&self, n: usize) -> bool {
        if self.one_byte_offs_flag() {
            self.field_end_info_1(n) & REC_1BYTE_SQL_NULL_MASK != 0
        } else {
            self.field_end_info_2(n) & REC_2BYTE_SQL_NULL_MASK != 0
        }
    }

    /// Length of field `n` of an old-style record, `None` for SQL NULL.
    pub fn field_len_old(&self, n: usize) -> Option<usize> {
        if self.field_is_null_old(n) {
            None
        } else {
            Some(self.field_end_old(n) - self.field_start_old(n))
        }
    }

    /// Bytes occupied by field `n`, also for NULL fields.
    pub fn field_size_old(&self, n: usize) -> usize {
        self.field_end_old(n) - self.field_start_old(n)
    }

    /// Header size of an old-style record.
    pub fn extra_size_old(&self) -> usize {
        let per_field = if self.one_byte_offs_flag() { 1 } else { 2 };
        REC_N_OLD_EXTRA_BYTES + per_field * self.n_fields_old()
    }

    /// Data size of an old-style record.
    pub fn data_size_old(&self) -> usize {
        self.field_start_old(self.n_fields_old())
    }
}

/// Mutable view of a packed record.
#[derive(Debug)]
pub struct RecMut<'a> {
    buf: &'a mut [u8],
    origin: usize,
}

impl<'a> RecMut<'a> {
    /// Mutable view of the record at `origin` within `buf`.
    pub fn new(buf: &'a mut [u8], origin: usize) -> Self {
        RecMut { buf, origin }
    }

    /// Read-only view of the same record.
    pub fn as_rec(&self) -> Rec<'_> {
        Rec::new(self.buf, self.origin)
    }

    fn set_bits_1(&mut self, back: usize, val: u8, mask: u8) {
        let b = &mut self.buf[self.origin - back];
        *b = (*b & !mask) | (val & mask);
    }

    fn set_bits_2(&mut self, back: usize, val: u16, mask: u16) {
        let at = self.origin - back;
        let cur = BigEndian::read_u16(&self.buf[at..]);
        BigEndian::write_u16(&mut self.buf[at..], (cur & !mask) | (val & mask));
    }

    /// Set the info bits (upper nibble).
    pub fn set_info_bits(&mut self, comp: bool, bits: u8) {
        let back = if comp { REC_NEW_INFO_BITS } else { REC_OLD_INFO_BITS };
        self.set_bits_1(back, bits, REC_INFO_BITS_MASK);
    }

    /// Set or clear the delete mark.
    pub fn set_deleted(&mut self, comp: bool, deleted: bool) {
        let bits = self.as_rec().info_bits(comp);
        let bits = if deleted {
            bits | REC_INFO_DELETED_FLAG
        } else {
            bits & !REC_INFO_DELETED_FLAG
        };
        self.set_info_bits(comp, bits);
    }

    /// Set the n_owned count.
    pub fn set_n_owned(&mut self, comp: bool, n_owned: u8) {
        debug_assert!(n_owned as usize <= REC_MAX_N_OWNED);
        let back = if comp { REC_NEW_N_OWNED } else { REC_OLD_N_OWNED };
        self.set_bits_1(back, n_owned, REC_N_OWNED_MASK);
    }

    /// Set the heap number.
    pub fn set_heap_no(&mut self, comp: bool, heap_no: usize) {
        debug_assert!(heap_no < 1 << 13);
        let back = if comp { REC_NEW_HEAP_NO } else { REC_OLD_HEAP_NO };
        self.set_bits_2(back, (heap_no as u16) << REC_HEAP_NO_SHIFT, REC_HEAP_NO_MASK);
    }

    /// Set the status of a new-style record.
    pub fn set_status(&mut self, status: RecStatus) {
        self.set_bits_1(REC_NEW_STATUS, status.as_u8(), REC_NEW_STATUS_MASK);
    }

    /// Point the record at `next` (an offset in the same page, 0 = none).
    pub fn set_next_offs(&mut self, comp: bool, next: usize) {
        let at = self.origin - REC_NEXT;
        let raw = if comp && next != 0 {
            (next as u16).wrapping_sub(self.origin as u16)
        } else {
            next as u16
        };
        BigEndian::write_u16(&mut self.buf[at..], raw);
    }

    /// Set the field count of an old-style record.
    pub fn set_n_fields_old(&mut self, n_fields: usize) {
        debug_assert!(n_fields > 0 && n_fields <= REC_MAX_N_FIELDS);
        self.set_bits_2(
            REC_OLD_N_FIELDS,
            (n_fields as u16) << REC_OLD_N_FIELDS_SHIFT,
            REC_OLD_N_FIELDS_MASK,
        );
    }

    /// Set the 1-byte-offsets flag of an old-style record.
    pub fn set_one_byte_offs_flag(&mut self, flag: bool) {
        self.set_bits_1(REC_OLD_SHORT, u8::from(flag), REC_OLD_SHORT_MASK);
    }

    /// Write the 1-byte end info of field `n`.
    pub fn set_field_end_info_1(&mut self, n: usize, info: u16) {
        debug_assert!(info <= 0xFF);
        self.buf[self.origin - (REC_N_OLD_EXTRA_BYTES + n + 1)] = info as u8;
    }

    /// Write the 2-byte end info of field `n`.
    pub fn set_field_end_info_2(&mut self, n: usize, info: u16) {
        let at = self.origin - (REC_N_OLD_EXTRA_BYTES + 2 * n + 2);
        BigEndian::write_u16(&mut self.buf[at..], info);
    }
}

/// Validate the self-consistency of an old-style record: 1..=1023 fields,
/// every field shorter than the page, field sizes adding up to the data size.
pub fn validate_old(rec: Rec<'_>, page_size: usize) -> bool {
    let n_fields = rec.n_fields_old();
    if n_fields == 0 || n_fields > REC_MAX_N_FIELDS {
        tracing::error!(offset = rec.origin(), n_fields, "record has an invalid field count");
        return false;
    }
    let mut len_sum = 0;
    for i in 0..n_fields {
        let size = rec.field_size_old(i);
        if rec.field_len_old(i).is_some() && size >= page_size {
            tracing::error!(offset = rec.origin(), field = i, len = size, "record field too long");
            return false;
        }
        len_sum += size;
    }
    if len_sum != rec.data_size_old() {
        tracing::error!(
            offset = rec.origin(),
            expected = len_sum,
            actual = rec.data_size_old(),
            "record data size mismatch"
        );
        return false;
    }
    true
}

/// A record position on a page, with its parsed header.
#[derive(Debug, Clone, Serialize)]
pub struct RecordInfo {
    /// Absolute offset of the record origin within the page.
    pub offset: usize,
    /// Parsed record header.
    pub header: RecHeader,
}

/// Walk all user records on an index page in key order.
///
/// Starts from infimum and follows next-record pointers until reaching
/// supremum. Returns the user records (excluding infimum/supremum). A broken
/// or circular chain ends the walk early.
pub fn walk_records(page_data: &[u8], comp: bool) -> Vec<RecordInfo> {
    let mut records = Vec::new();
    let (infimum, supremum, extra) = if comp {
        (PAGE_NEW_INFIMUM, PAGE_NEW_SUPREMUM, REC_N_NEW_EXTRA_BYTES)
    } else {
        (PAGE_OLD_INFIMUM, PAGE_OLD_SUPREMUM, REC_N_OLD_EXTRA_BYTES)
    };
    if page_data.len() < supremum {
        return records;
    }

    let mut current = Rec::new(page_data, infimum).next_offs(comp);
    // A chain longer than the number of possible records is circular.
    let max_iter = page_data.len() / (extra + 1);

    while current != 0 && records.len() <= max_iter {
        if current == supremum || current < extra || current >= page_data.len() {
            break;
        }
        let header = match RecHeader::parse(&page_data[current - extra..current], comp) {
            Some(h) => h,
            None => break,
        };
        records.push(RecordInfo {
            offset: current,
            header,
        });
        current = Rec::new(page_data, current).next_offs(comp);
    }

    records
}
