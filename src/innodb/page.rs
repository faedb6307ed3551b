//! Slotted INDEX page layout.
//!
//! An INDEX page (page type 17855, or 17854 for R-trees) carries a 36-byte
//! page header at `FIL_PAGE_DATA` (byte 38), followed by two 10-byte file
//! segment headers ([`FsegHeader`]), the infimum and supremum records, the
//! record heap growing upward, and the page directory growing downward from
//! the FIL trailer. Directory slot 0 points at infimum and the last slot at
//! supremum; each slot points at the record that owns the records since the
//! previous slot.
//!
//! [`Page`] wraps any byte buffer. Read accessors need `AsRef<[u8]>`;
//! mutations additionally need `AsMut<[u8]>` and log every byte range they
//! touch through a [`Mtr`].

use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::cmp::{cmp_rec_rec, RecRef};
use crate::innodb::constants::*;
use crate::innodb::dict::Index;
use crate::innodb::offsets::Offsets;
use crate::innodb::page_cur::Mtr;
use crate::innodb::record::{Rec, RecMut};
use crate::RecError;

const INFIMUM_SUPREMUM_COMPACT: [u8; 26] = [
    0x01, 0x00, 0x02, 0x00, 0x0d, b'i', b'n', b'f', b'i', b'm', b'u', b'm', 0x00, // infimum
    0x01, 0x00, 0x0b, 0x00, 0x00, b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm', // supremum
];

const INFIMUM_SUPREMUM_REDUNDANT: [u8; 31] = [
    0x08, 0x01, 0x00, 0x00, 0x03, 0x00, 0x74, b'i', b'n', b'f', b'i', b'm', b'u', b'm',
    0x00, // infimum
    0x09, 0x01, 0x00, 0x08, 0x03, 0x00, 0x00, b's', b'u', b'p', b'r', b'e', b'm', b'u', b'm',
    0x00, // supremum
];

/// Validated physical page size.
///
/// # Examples
///
/// ```
/// use innorec::innodb::page::PageSize;
///
/// let ps = PageSize::default();
/// assert_eq!(ps.bytes(), 16384);
/// assert_eq!(ps.free_space_of_empty(true), 16384 - 120 - 8 - 4);
/// assert_eq!(ps.max_rec_size(true), 8126);
/// assert!(PageSize::new(10000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageSize(u32);

impl PageSize {
    /// Accepts powers of two between 4 KiB and 64 KiB.
    pub fn new(size: u32) -> Result<Self, RecError> {
        if !size.is_power_of_two() || !(SIZE_PAGE_MIN..=SIZE_PAGE_MAX).contains(&size) {
            return Err(RecError::Argument(format!(
                "unsupported page size {}, expected a power of two in {}..={}",
                size, SIZE_PAGE_MIN, SIZE_PAGE_MAX
            )));
        }
        Ok(PageSize(size))
    }

    /// Size in bytes.
    pub fn bytes(&self) -> usize {
        self.0 as usize
    }

    /// Free space on an empty page, less the two directory slots an empty
    /// page already uses.
    pub fn free_space_of_empty(&self, comp: bool) -> usize {
        let end = if comp { PAGE_NEW_SUPREMUM_END } else { PAGE_OLD_SUPREMUM_END };
        self.bytes() - end - PAGE_DIR - 2 * PAGE_DIR_SLOT_SIZE
    }

    /// Largest record that may be stored in the page without moving
    /// fields off-page.
    pub fn max_rec_size(&self, comp: bool) -> usize {
        let limit = if comp { COMPRESSED_REC_MAX_DATA_SIZE } else { REDUNDANT_REC_MAX_DATA_SIZE };
        (self.free_space_of_empty(comp) / 2).min(limit)
    }

    /// Byte position of directory slot `n`.
    pub fn dir_slot_pos(&self, n: usize) -> usize {
        self.bytes() - PAGE_DIR - (n + 1) * PAGE_DIR_SLOT_SIZE
    }
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize(SIZE_PAGE_DEFAULT)
    }
}

/// Space reserved in the directory for `n_recs` records.
pub fn dir_reserved_space(n_recs: usize) -> usize {
    (PAGE_DIR_SLOT_SIZE * n_recs + PAGE_DIR_SLOT_MIN_N_OWNED - 1) / PAGE_DIR_SLOT_MIN_N_OWNED
}

/// Snapshot of the INDEX page header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHeader {
    /// Number of directory slots.
    pub n_dir_slots: u16,
    /// Pointer to the record heap top.
    pub heap_top: u16,
    /// Records in the heap. Bit 15 is the compact format flag.
    pub n_heap_raw: u16,
    /// Head of the free record list (0 if none).
    pub free: u16,
    /// Bytes in deleted records.
    pub garbage: u16,
    /// Last inserted record (0 if reset).
    pub last_insert: u16,
    /// Core field count of an instant ALTER root page.
    pub instant: u16,
    /// Last insert direction.
    pub direction: u8,
    /// Consecutive inserts in the same direction.
    pub n_direction: u16,
    /// Number of user records.
    pub n_recs: u16,
    /// PAGE_MAX_TRX_ID, or PAGE_ROOT_AUTO_INC on a clustered index root.
    pub max_trx_id: u64,
    /// Level in the B-tree (0 = leaf).
    pub level: u16,
    /// Index id.
    pub index_id: u64,
    /// Leaf segment header.
    pub seg_leaf: FsegHeader,
    /// Non-leaf segment header.
    pub seg_top: FsegHeader,
}

impl PageHeader {
    /// Parse the header from a full page buffer.
    pub fn parse(page_data: &[u8]) -> Option<Self> {
        if page_data.len() < PAGE_DATA {
            return None;
        }
        let d = &page_data[PAGE_HEADER..];
        Some(PageHeader {
            n_dir_slots: BigEndian::read_u16(&d[PAGE_N_DIR_SLOTS..]),
            heap_top: BigEndian::read_u16(&d[PAGE_HEAP_TOP..]),
            n_heap_raw: BigEndian::read_u16(&d[PAGE_N_HEAP..]),
            free: BigEndian::read_u16(&d[PAGE_FREE..]),
            garbage: BigEndian::read_u16(&d[PAGE_GARBAGE..]),
            last_insert: BigEndian::read_u16(&d[PAGE_LAST_INSERT..]),
            instant: BigEndian::read_u16(&d[PAGE_INSTANT..]) >> 3,
            direction: d[PAGE_DIRECTION_B] & 7,
            n_direction: BigEndian::read_u16(&d[PAGE_N_DIRECTION..]),
            n_recs: BigEndian::read_u16(&d[PAGE_N_RECS..]),
            max_trx_id: BigEndian::read_u64(&d[PAGE_MAX_TRX_ID..]),
            level: BigEndian::read_u16(&d[PAGE_LEVEL..]),
            index_id: BigEndian::read_u64(&d[PAGE_INDEX_ID..]),
            seg_leaf: FsegHeader::parse(&d[PAGE_BTR_SEG_LEAF..])?,
            seg_top: FsegHeader::parse(&d[PAGE_BTR_SEG_TOP..])?,
        })
    }

    /// Number of heap records, without the compact flag.
    pub fn n_heap(&self) -> u16 {
        self.n_heap_raw & 0x7FFF
    }

    /// Returns true for new-style (COMPACT family) pages.
    pub fn is_compact(&self) -> bool {
        self.n_heap_raw & 0x8000 != 0
    }

    /// Human-readable insert direction.
    pub fn direction_name(&self) -> &'static str {
        match self.direction {
            PAGE_LEFT => "Left",
            PAGE_RIGHT => "Right",
            PAGE_SAME_REC => "Same Record",
            PAGE_SAME_PAGE => "Same Page",
            PAGE_NO_DIRECTION => "No Direction",
            _ => "Unknown",
        }
    }

    /// Returns true for leaf pages.
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }
}

/// File segment header (10 bytes): inode space id, page number and offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FsegHeader {
    /// Space ID of the inode.
    pub space_id: u32,
    /// Page number of the inode.
    pub page_no: u32,
    /// Byte offset of the inode within its page.
    pub offset: u16,
}

impl FsegHeader {
    /// Parse from a slice of at least 10 bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::page::FsegHeader;
    ///
    /// let seg = FsegHeader { space_id: 3, page_no: 7, offset: 50 };
    /// let mut data = [0u8; 10];
    /// seg.write(&mut data);
    /// assert_eq!(FsegHeader::parse(&data), Some(seg));
    /// ```
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FSEG_HEADER_SIZE {
            return None;
        }
        Some(FsegHeader {
            space_id: BigEndian::read_u32(&data[0..]),
            page_no: BigEndian::read_u32(&data[4..]),
            offset: BigEndian::read_u16(&data[8..]),
        })
    }

    /// Serialize into the first 10 bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        BigEndian::write_u32(&mut out[0..], self.space_id);
        BigEndian::write_u32(&mut out[4..], self.page_no);
        BigEndian::write_u16(&mut out[8..], self.offset);
    }
}

/// An INDEX page over a byte buffer.
#[derive(Debug, Clone)]
pub struct Page<B> {
    buf: B,
    size: PageSize,
}

impl<B: AsRef<[u8]>> Page<B> {
    /// Wrap an existing INDEX page. Fails on an unsupported buffer length
    /// or a page type other than INDEX / RTREE.
    pub fn new(buf: B) -> Result<Self, RecError> {
        let size = PageSize::new(buf.as_ref().len() as u32)?;
        let page_type = BigEndian::read_u16(&buf.as_ref()[FIL_PAGE_TYPE..]);
        if page_type != FIL_PAGE_INDEX && page_type != FIL_PAGE_RTREE && page_type != FIL_PAGE_TYPE_INSTANT {
            return Err(RecError::Parse(format!(
                "page type {} is not an index page",
                page_type
            )));
        }
        Ok(Page { buf, size })
    }

    /// The page bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// Unwrap the buffer.
    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Page size.
    pub fn size(&self) -> PageSize {
        self.size
    }

    fn hdr_u16(&self, field: usize) -> u16 {
        BigEndian::read_u16(&self.as_bytes()[PAGE_HEADER + field..])
    }

    /// Parsed header snapshot.
    pub fn header(&self) -> Option<PageHeader> {
        PageHeader::parse(self.as_bytes())
    }

    /// FIL page type.
    pub fn page_type(&self) -> u16 {
        BigEndian::read_u16(&self.as_bytes()[FIL_PAGE_TYPE..])
    }

    /// Page number from the FIL header.
    pub fn page_no(&self) -> u32 {
        BigEndian::read_u32(&self.as_bytes()[FIL_PAGE_OFFSET..])
    }

    /// Returns true if the page has a left sibling.
    pub fn has_prev(&self) -> bool {
        let prev = BigEndian::read_u32(&self.as_bytes()[FIL_PAGE_PREV..]);
        prev != FIL_NULL
    }

    /// Returns true if the page has a right sibling.
    pub fn has_next(&self) -> bool {
        let next = BigEndian::read_u32(&self.as_bytes()[FIL_PAGE_NEXT..]);
        next != FIL_NULL
    }

    /// Returns true for new-style (COMPACT family) pages.
    pub fn is_comp(&self) -> bool {
        self.hdr_u16(PAGE_N_HEAP) & 0x8000 != 0
    }

    /// Number of directory slots.
    pub fn n_dir_slots(&self) -> usize {
        self.hdr_u16(PAGE_N_DIR_SLOTS) as usize
    }

    /// Heap top.
    pub fn heap_top(&self) -> usize {
        self.hdr_u16(PAGE_HEAP_TOP) as usize
    }

    /// Records in the heap, including infimum, supremum and free records.
    pub fn n_heap(&self) -> usize {
        (self.hdr_u16(PAGE_N_HEAP) & 0x7FFF) as usize
    }

    /// Head of the free list (0 if empty).
    pub fn free(&self) -> usize {
        self.hdr_u16(PAGE_FREE) as usize
    }

    /// Bytes occupied by deleted records.
    pub fn garbage(&self) -> usize {
        self.hdr_u16(PAGE_GARBAGE) as usize
    }

    /// Last inserted record (0 if unknown).
    pub fn last_insert(&self) -> usize {
        self.hdr_u16(PAGE_LAST_INSERT) as usize
    }

    /// Core field count stored in the 13 high bits of PAGE_INSTANT.
    pub fn instant(&self) -> usize {
        (self.hdr_u16(PAGE_INSTANT) >> 3) as usize
    }

    /// Last insert direction (3 low bits of PAGE_DIRECTION_B).
    pub fn direction(&self) -> u8 {
        self.as_bytes()[PAGE_HEADER + PAGE_DIRECTION_B] & 7
    }

    /// Consecutive inserts in the same direction.
    pub fn n_direction(&self) -> usize {
        self.hdr_u16(PAGE_N_DIRECTION) as usize
    }

    /// Number of user records.
    pub fn n_recs(&self) -> usize {
        self.hdr_u16(PAGE_N_RECS) as usize
    }

    /// PAGE_MAX_TRX_ID.
    pub fn max_trx_id(&self) -> u64 {
        BigEndian::read_u64(&self.as_bytes()[PAGE_HEADER + PAGE_MAX_TRX_ID..])
    }

    /// PAGE_ROOT_AUTO_INC (the same bytes as PAGE_MAX_TRX_ID).
    pub fn root_auto_inc(&self) -> u64 {
        self.max_trx_id()
    }

    /// B-tree level.
    pub fn level(&self) -> usize {
        self.hdr_u16(PAGE_LEVEL) as usize
    }

    /// Returns true for leaf pages.
    pub fn is_leaf(&self) -> bool {
        self.level() == 0
    }

    /// PAGE_INDEX_ID.
    pub fn index_id(&self) -> u64 {
        BigEndian::read_u64(&self.as_bytes()[PAGE_HEADER + PAGE_INDEX_ID..])
    }

    /// Origin of the infimum record.
    pub fn infimum(&self) -> usize {
        if self.is_comp() {
            PAGE_NEW_INFIMUM
        } else {
            PAGE_OLD_INFIMUM
        }
    }

    /// Origin of the supremum record.
    pub fn supremum(&self) -> usize {
        if self.is_comp() {
            PAGE_NEW_SUPREMUM
        } else {
            PAGE_OLD_SUPREMUM
        }
    }

    /// First byte after the supremum record.
    pub fn supremum_end(&self) -> usize {
        if self.is_comp() {
            PAGE_NEW_SUPREMUM_END
        } else {
            PAGE_OLD_SUPREMUM_END
        }
    }

    /// Returns true unless `origin` is infimum or supremum.
    pub fn is_user_rec(&self, origin: usize) -> bool {
        origin != self.infimum() && origin != self.supremum()
    }

    /// Record view.
    pub fn rec(&self, origin: usize) -> Rec<'_> {
        Rec::new(self.as_bytes(), origin)
    }

    /// Next record in the chain (0 after supremum).
    pub fn next(&self, origin: usize) -> usize {
        self.rec(origin).next_offs(self.is_comp())
    }

    /// First user record, or supremum on an empty page.
    pub fn first_rec(&self) -> usize {
        self.next(self.infimum())
    }

    /// User records in key order.
    pub fn user_recs(&self) -> RecIter<'_, B> {
        RecIter {
            page: self,
            cur: self.infimum(),
            remaining: self.n_heap(),
        }
    }

    /// Compute the offsets of the record at `origin`.
    pub fn rec_offsets(&self, origin: usize, index: &Index, max_fields: usize, offsets: &mut Offsets) {
        let n_core = if self.is_leaf() { index.n_core_fields() } else { 0 };
        offsets.compute(self.as_bytes(), origin, index, n_core, max_fields);
    }

    /// Position of directory slot `n`.
    pub fn dir_slot_pos(&self, n: usize) -> usize {
        self.size.dir_slot_pos(n)
    }

    /// Record that directory slot `n` points to.
    pub fn dir_slot_rec(&self, n: usize) -> usize {
        BigEndian::read_u16(&self.as_bytes()[self.dir_slot_pos(n)..]) as usize
    }

    /// Records owned by directory slot `n`.
    pub fn dir_slot_n_owned(&self, n: usize) -> usize {
        self.rec(self.dir_slot_rec(n)).n_owned(self.is_comp()) as usize
    }

    /// Record that owns `origin` in the directory: the first record from
    /// `origin` on with a nonzero `n_owned`.
    fn owner_rec(&self, origin: usize) -> Result<usize, RecError> {
        let comp = self.is_comp();
        let mut r = origin;
        let mut steps = 0;
        while self.rec(r).n_owned(comp) == 0 {
            r = self.next(r);
            steps += 1;
            if r == 0 || steps > PAGE_DIR_SLOT_MAX_N_OWNED * 2 {
                return Err(RecError::Corruption(format!(
                    "page {}: no owner record after {}",
                    self.page_no(),
                    origin
                )));
            }
        }
        Ok(r)
    }

    fn no_owner_slot(&self, origin: usize, owner: usize) -> RecError {
        tracing::error!(
            page_no = self.page_no(),
            offset = origin,
            owner,
            "cannot find the directory slot for record"
        );
        RecError::Corruption(format!(
            "page {}: no directory slot owns record at {}",
            self.page_no(),
            origin
        ))
    }

    /// Find the directory slot that owns `origin` by scanning the slot
    /// array. Needs no index; see [`Page::dir_search_owner_slot`] for the
    /// keyed lookup.
    pub fn dir_find_owner_slot(&self, origin: usize) -> Result<usize, RecError> {
        let owner = self.owner_rec(origin)?;
        (0..self.n_dir_slots())
            .rev()
            .find(|&slot| self.dir_slot_rec(slot) == owner)
            .ok_or_else(|| self.no_owner_slot(origin, owner))
    }

    /// Find the directory slot that owns `origin` by binary search over the
    /// slots, comparing the owner record with slot records on the keys of
    /// `index`.
    pub fn dir_search_owner_slot(&self, index: &Index, origin: usize) -> Result<usize, RecError> {
        let owner = self.owner_rec(origin)?;
        let n_slots = self.n_dir_slots();
        if owner == self.infimum() {
            return Ok(0);
        }
        if owner == self.supremum() {
            return Ok(n_slots - 1);
        }

        let buf = self.as_bytes();
        let mut owner_offsets = Offsets::new();
        self.rec_offsets(owner, index, usize::MAX, &mut owner_offsets);
        let mut slot_offsets = Offsets::new();
        // user-record slots are 1..n_slots - 1
        let (mut low, mut high) = (1, n_slots - 1);
        while low < high {
            let mid = (low + high) / 2;
            let mid_rec = self.dir_slot_rec(mid);
            if mid_rec == owner {
                return Ok(mid);
            }
            self.rec_offsets(mid_rec, index, usize::MAX, &mut slot_offsets);
            let ord = cmp_rec_rec(
                RecRef { buf, origin: owner, offsets: &owner_offsets },
                RecRef { buf, origin: mid_rec, offsets: &slot_offsets },
                index,
                false,
                None,
            );
            match ord {
                Ordering::Less => high = mid,
                Ordering::Greater => low = mid + 1,
                // duplicate keys: the slot order no longer decides
                Ordering::Equal => return self.dir_find_owner_slot(owner),
            }
        }
        Err(self.no_owner_slot(origin, owner))
    }

    /// Number of records before `origin` in the chain, counting infimum as 0.
    pub fn rec_n_recs_before(&self, origin: usize) -> Result<usize, RecError> {
        let comp = self.is_comp();
        let mut r = origin;
        let mut n: isize = 0;
        while self.rec(r).n_owned(comp) == 0 {
            r = self.next(r);
            n -= 1;
            if r == 0 {
                return Err(RecError::Corruption(format!("broken record chain at {}", origin)));
            }
        }
        for slot in 0..self.n_dir_slots() {
            let slot_rec = self.dir_slot_rec(slot);
            n += self.rec(slot_rec).n_owned(comp) as isize;
            if slot_rec == r {
                return Ok((n - 1) as usize);
            }
        }
        Err(RecError::Corruption(format!(
            "page {}: no directory slot owns record at {}",
            self.page_no(),
            origin
        )))
    }

    /// The `nth` record in the chain (0 = infimum). Out-of-range positions
    /// return supremum.
    pub fn rec_get_nth(&self, mut nth: usize) -> usize {
        if nth == 0 {
            return self.infimum();
        }
        let n_slots = self.n_dir_slots();
        let mut i = 0;
        while i < n_slots {
            let n_owned = self.dir_slot_n_owned(i);
            if n_owned > nth {
                break;
            }
            nth -= n_owned;
            i += 1;
        }
        if i == 0 || i == n_slots {
            return self.supremum();
        }
        let mut rec = self.dir_slot_rec(i - 1);
        loop {
            rec = self.next(rec);
            if nth == 0 {
                return rec;
            }
            nth -= 1;
        }
    }

    /// Previous record in the chain; `None` for infimum.
    pub fn rec_prev(&self, origin: usize) -> Result<Option<usize>, RecError> {
        if origin == self.infimum() {
            return Ok(None);
        }
        let slot = self.dir_find_owner_slot(origin)?;
        if slot == 0 {
            return Err(RecError::Corruption(format!("record {} owned by slot 0", origin)));
        }
        let mut rec = self.dir_slot_rec(slot - 1);
        loop {
            let next = self.next(rec);
            if next == origin {
                return Ok(Some(rec));
            }
            if next == 0 {
                return Err(RecError::Corruption(format!("record {} not in chain", origin)));
            }
            rec = next;
        }
    }

    /// The record with heap number `heap_no`, if it is in the chain.
    pub fn find_rec_with_heap_no(&self, heap_no: usize) -> Option<usize> {
        let comp = self.is_comp();
        let mut rec = self.infimum();
        for _ in 0..=self.n_heap() {
            let h = self.rec(rec).heap_no(comp);
            if h == heap_no {
                return Some(rec);
            }
            if h == PAGE_HEAP_NO_SUPREMUM {
                return None;
            }
            rec = self.next(rec);
            if rec == 0 {
                return None;
            }
        }
        None
    }

    /// Bytes used by live records in the heap.
    pub fn data_size(&self) -> usize {
        self.heap_top() - self.supremum_end() - self.garbage()
    }

    /// Free space of an empty page of this format.
    pub fn free_space_of_empty(&self) -> usize {
        self.size.free_space_of_empty(self.is_comp())
    }

    /// Largest record that can be inserted from the heap top, assuming
    /// `n_recs` more records.
    pub fn max_insert_size(&self, n_recs: usize) -> usize {
        let occupied = self.heap_top() - self.supremum_end()
            + dir_reserved_space(n_recs + self.n_heap() - 2);
        self.free_space_of_empty().saturating_sub(occupied)
    }

    /// Largest record that could be inserted after reorganizing the page.
    pub fn max_insert_size_after_reorganize(&self, n_recs: usize) -> usize {
        let occupied = self.data_size() + dir_reserved_space(n_recs + self.n_recs());
        self.free_space_of_empty().saturating_sub(occupied)
    }
}

/// Iterator over the user record origins of a page.
#[derive(Debug)]
pub struct RecIter<'p, B> {
    page: &'p Page<B>,
    cur: usize,
    remaining: usize,
}

impl<B: AsRef<[u8]>> Iterator for RecIter<'_, B> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let next = self.page.next(self.cur);
        if next == 0 || next == self.page.supremum() || next >= self.page.as_bytes().len() {
            self.remaining = 0;
            return None;
        }
        self.cur = next;
        Some(next)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Page<B> {
    /// Mutable page bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.buf.as_mut()
    }

    /// Write `data` at `offset` and log it.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8], mtr: &mut dyn Mtr) {
        self.buf.as_mut()[offset..offset + data.len()].copy_from_slice(data);
        mtr.log_write(offset, data);
    }

    pub(crate) fn write_u8(&mut self, offset: usize, val: u8, mtr: &mut dyn Mtr) {
        self.write_bytes(offset, &[val], mtr);
    }

    pub(crate) fn write_u16(&mut self, offset: usize, val: u16, mtr: &mut dyn Mtr) {
        self.write_bytes(offset, &val.to_be_bytes(), mtr);
    }

    pub(crate) fn write_u64(&mut self, offset: usize, val: u64, mtr: &mut dyn Mtr) {
        self.write_bytes(offset, &val.to_be_bytes(), mtr);
    }

    /// Fill `len` bytes at `offset` with `val` and log it.
    pub(crate) fn memset(&mut self, offset: usize, len: usize, val: u8, mtr: &mut dyn Mtr) {
        self.buf.as_mut()[offset..offset + len].fill(val);
        mtr.log_memset(offset, len, val);
    }

    /// Log bytes already modified in place.
    pub(crate) fn log_range(&self, offset: usize, len: usize, mtr: &mut dyn Mtr) {
        mtr.log_write(offset, &self.as_bytes()[offset..offset + len]);
    }

    /// Initialize `buf` as an empty INDEX page.
    ///
    /// Clears the page header up to PAGE_LEVEL, writes infimum and supremum,
    /// and sets up the two-slot directory. Level, index id and the segment
    /// headers are left as they are.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::page::Page;
    /// use innorec::innodb::page_cur::NoLog;
    ///
    /// let page = Page::create(vec![0u8; 16384], true, &mut NoLog).unwrap();
    /// assert!(page.is_comp());
    /// assert_eq!(page.n_dir_slots(), 2);
    /// assert_eq!(page.n_heap(), 2);
    /// assert_eq!(page.first_rec(), page.supremum());
    /// ```
    pub fn create(mut buf: B, comp: bool, mtr: &mut dyn Mtr) -> Result<Self, RecError> {
        let size = PageSize::new(buf.as_mut().len() as u32)?;
        let mut page = Page { buf, size };
        page.init(comp, mtr);
        Ok(page)
    }

    fn init(&mut self, comp: bool, mtr: &mut dyn Mtr) {
        let ps = self.size.bytes();
        self.write_u16(FIL_PAGE_TYPE, FIL_PAGE_INDEX, mtr);

        let mut hdr = [0u8; PAGE_HEADER_PRIV_END];
        hdr[PAGE_N_DIR_SLOTS + 1] = 2;
        hdr[PAGE_DIRECTION_B] = PAGE_NO_DIRECTION;
        let (template, infimum, supremum, end): (&[u8], _, _, _) = if comp {
            hdr[PAGE_N_HEAP] = 0x80;
            (&INFIMUM_SUPREMUM_COMPACT, PAGE_NEW_INFIMUM, PAGE_NEW_SUPREMUM, PAGE_NEW_SUPREMUM_END)
        } else {
            (&INFIMUM_SUPREMUM_REDUNDANT, PAGE_OLD_INFIMUM, PAGE_OLD_SUPREMUM, PAGE_OLD_SUPREMUM_END)
        };
        hdr[PAGE_N_HEAP + 1] = PAGE_HEAP_NO_USER_LOW as u8;
        BigEndian::write_u16(&mut hdr[PAGE_HEAP_TOP..], end as u16);
        self.write_bytes(PAGE_HEADER, &hdr, mtr);
        self.write_bytes(PAGE_DATA, template, mtr);
        self.memset(end, ps - PAGE_DIR - end, 0, mtr);
        self.write_u16(self.size.dir_slot_pos(1), supremum as u16, mtr);
        self.write_u16(self.size.dir_slot_pos(0), infimum as u16, mtr);
    }

    /// Empty the page, keeping level, index id, segment headers and,
    /// for secondary index leaf pages and clustered index pages,
    /// PAGE_MAX_TRX_ID / PAGE_ROOT_AUTO_INC.
    pub fn create_empty(&mut self, index: &Index, mtr: &mut dyn Mtr) {
        let max_trx_id = if index.is_primary() || self.is_leaf() {
            self.max_trx_id()
        } else {
            0
        };
        tracing::debug!(page_no = self.page_no(), index = %index.name, "emptying page");
        self.init(index.is_comp(), mtr);
        if index.is_spatial() {
            self.write_u16(FIL_PAGE_TYPE, FIL_PAGE_RTREE, mtr);
        }
        if max_trx_id != 0 {
            self.write_u64(PAGE_HEADER + PAGE_MAX_TRX_ID, max_trx_id, mtr);
        }
    }

    pub(crate) fn set_hdr_u16(&mut self, field: usize, val: usize, mtr: &mut dyn Mtr) {
        debug_assert!(val <= u16::MAX as usize);
        self.write_u16(PAGE_HEADER + field, val as u16, mtr);
    }

    /// Set the B-tree level.
    pub fn set_level(&mut self, level: usize, mtr: &mut dyn Mtr) {
        self.set_hdr_u16(PAGE_LEVEL, level, mtr);
    }

    /// Set PAGE_INDEX_ID.
    pub fn set_index_id(&mut self, id: u64, mtr: &mut dyn Mtr) {
        self.write_u64(PAGE_HEADER + PAGE_INDEX_ID, id, mtr);
    }

    /// Set a segment header (`leaf` selects PAGE_BTR_SEG_LEAF).
    pub fn set_fseg_header(&mut self, leaf: bool, seg: &FsegHeader, mtr: &mut dyn Mtr) {
        let at = PAGE_HEADER + if leaf { PAGE_BTR_SEG_LEAF } else { PAGE_BTR_SEG_TOP };
        let mut bytes = [0u8; FSEG_HEADER_SIZE];
        seg.write(&mut bytes);
        self.write_bytes(at, &bytes, mtr);
    }

    /// Set the core field count in PAGE_INSTANT, keeping the direction bits.
    pub fn set_instant(&mut self, n_core_fields: usize, mtr: &mut dyn Mtr) {
        debug_assert!(n_core_fields > 0 && n_core_fields <= REC_MAX_N_FIELDS);
        let dir = u16::from(self.direction());
        self.write_u16(PAGE_HEADER + PAGE_INSTANT, (n_core_fields as u16) << 3 | dir, mtr);
    }

    /// Overwrite PAGE_MAX_TRX_ID.
    pub fn set_max_trx_id(&mut self, trx_id: u64, mtr: &mut dyn Mtr) {
        self.write_u64(PAGE_HEADER + PAGE_MAX_TRX_ID, trx_id, mtr);
    }

    /// Raise PAGE_MAX_TRX_ID to `trx_id` if it is larger.
    pub fn update_max_trx_id(&mut self, trx_id: u64, mtr: &mut dyn Mtr) {
        if self.max_trx_id() < trx_id {
            self.set_max_trx_id(trx_id, mtr);
        }
    }

    /// Store PAGE_ROOT_AUTO_INC. Without `reset` the value only grows.
    pub fn set_root_auto_inc(&mut self, autoinc: u64, reset: bool, mtr: &mut dyn Mtr) {
        if reset || self.root_auto_inc() < autoinc {
            self.write_u64(PAGE_HEADER + PAGE_ROOT_AUTO_INC, autoinc, mtr);
        }
    }

    pub(crate) fn set_dir_slot_rec(&mut self, n: usize, origin: usize, mtr: &mut dyn Mtr) {
        let pos = self.dir_slot_pos(n);
        self.write_u16(pos, origin as u16, mtr);
    }

    pub(crate) fn set_rec_n_owned(&mut self, origin: usize, n_owned: usize, mtr: &mut dyn Mtr) {
        let comp = self.is_comp();
        RecMut::new(self.buf.as_mut(), origin).set_n_owned(comp, n_owned as u8);
        let back = if comp { REC_NEW_N_OWNED } else { REC_OLD_N_OWNED };
        self.log_range(origin - back, 1, mtr);
    }

    pub(crate) fn set_rec_next(&mut self, origin: usize, next: usize, mtr: &mut dyn Mtr) {
        let comp = self.is_comp();
        RecMut::new(self.buf.as_mut(), origin).set_next_offs(comp, next);
        self.log_range(origin - REC_NEXT, 2, mtr);
    }

    pub(crate) fn set_dir_slot_n_owned(&mut self, n: usize, n_owned: usize, mtr: &mut dyn Mtr) {
        let rec = self.dir_slot_rec(n);
        self.set_rec_n_owned(rec, n_owned, mtr);
    }
}
