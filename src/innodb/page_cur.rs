//! Page cursor operations: search, insert and delete on one INDEX page.
//!
//! A cursor is simply the origin of a record on the page. Every mutation is
//! written to the page buffer and reported to a [`Mtr`] as a byte-range
//! write, so that a [`MtrLog`] replayed on the original page image produces
//! the mutated page.

use std::cmp::Ordering;

use serde::Serialize;

use crate::innodb::cmp::cmp_dtuple_rec_with_match;
use crate::innodb::constants::*;
use crate::innodb::convert::{convert_tuple_to_record, converted_size};
use crate::innodb::data::Tuple;
use crate::innodb::dict::Index;
use crate::innodb::offsets::Offsets;
use crate::innodb::page::Page;
use crate::innodb::record::{RecKind, RecMut};
use crate::RecError;

/// Redo sink for page mutations.
pub trait Mtr {
    /// `data` was written at byte `offset` of the page.
    fn log_write(&mut self, offset: usize, data: &[u8]);

    /// `len` bytes at `offset` were set to `val`.
    fn log_memset(&mut self, offset: usize, len: usize, val: u8) {
        self.log_write(offset, &vec![val; len]);
    }
}

/// Discards all log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLog;

impl Mtr for NoLog {
    fn log_write(&mut self, _offset: usize, _data: &[u8]) {}

    fn log_memset(&mut self, _offset: usize, _len: usize, _val: u8) {}
}

/// One logged page write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogRecord {
    Write1 { offset: usize, value: u8 },
    Write2 { offset: usize, value: u16 },
    Write4 { offset: usize, value: u32 },
    Write8 { offset: usize, value: u64 },
    Memcpy { offset: usize, data: Vec<u8> },
    Memset { offset: usize, len: usize, value: u8 },
}

/// In-memory redo log of page writes.
///
/// # Examples
///
/// ```
/// use innorec::innodb::page::Page;
/// use innorec::innodb::page_cur::MtrLog;
///
/// let mut log = MtrLog::new();
/// let page = Page::create(vec![0u8; 16384], true, &mut log).unwrap();
///
/// let mut replica = vec![0u8; 16384];
/// log.apply(&mut replica);
/// assert_eq!(replica, page.as_bytes());
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct MtrLog {
    records: Vec<LogRecord>,
}

impl MtrLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged writes, oldest first.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Replay every write onto `page`.
    pub fn apply(&self, page: &mut [u8]) {
        for rec in &self.records {
            match rec {
                LogRecord::Write1 { offset, value } => page[*offset] = *value,
                LogRecord::Write2 { offset, value } => {
                    page[*offset..*offset + 2].copy_from_slice(&value.to_be_bytes())
                }
                LogRecord::Write4 { offset, value } => {
                    page[*offset..*offset + 4].copy_from_slice(&value.to_be_bytes())
                }
                LogRecord::Write8 { offset, value } => {
                    page[*offset..*offset + 8].copy_from_slice(&value.to_be_bytes())
                }
                LogRecord::Memcpy { offset, data } => {
                    page[*offset..*offset + data.len()].copy_from_slice(data)
                }
                LogRecord::Memset { offset, len, value } => page[*offset..*offset + len].fill(*value),
            }
        }
    }
}

impl Mtr for MtrLog {
    fn log_write(&mut self, offset: usize, data: &[u8]) {
        let rec = match data.len() {
            1 => LogRecord::Write1 { offset, value: data[0] },
            2 => LogRecord::Write2 {
                offset,
                value: u16::from_be_bytes([data[0], data[1]]),
            },
            4 => LogRecord::Write4 {
                offset,
                value: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            },
            8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(data);
                LogRecord::Write8 { offset, value: u64::from_be_bytes(b) }
            }
            _ => LogRecord::Memcpy { offset, data: data.to_vec() },
        };
        self.records.push(rec);
    }

    fn log_memset(&mut self, offset: usize, len: usize, val: u8) {
        self.records.push(LogRecord::Memset { offset, len, value: val });
    }
}

/// Search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchMode {
    /// First record greater than the tuple.
    G = 1,
    /// First record greater than or equal to the tuple.
    GE = 2,
    /// Last record less than the tuple.
    L = 3,
    /// Last record less than or equal to the tuple.
    LE = 4,
}

/// Fields known to match at the upper and lower search limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Matched {
    pub up_fields: usize,
    pub low_fields: usize,
}

/// Position a cursor on the page for `tuple`.
///
/// Binary search over the directory slots, then a linear scan of the
/// records owned by the upper slot. G/GE land on the upper limit record,
/// L/LE on the lower one; the result may be infimum or supremum.
pub fn search_with_match<B: AsRef<[u8]>>(
    page: &Page<B>,
    index: &Index,
    tuple: &Tuple<'_>,
    mode: SearchMode,
    matched: &mut Matched,
) -> usize {
    let buf = page.as_bytes();
    let n_cmp = tuple.n_fields_cmp();
    let mut offsets = Offsets::with_capacity(n_cmp);
    let mut up_matched = matched.up_fields;
    let mut low_matched = matched.low_fields;
    let low_on_equal = matches!(mode, SearchMode::G | SearchMode::LE);

    let mut compare = |rec: usize, cur_matched: &mut usize| {
        page.rec_offsets(rec, index, n_cmp, &mut offsets);
        cmp_dtuple_rec_with_match(tuple, buf, rec, index, &offsets, cur_matched)
    };

    let mut low = 0;
    let mut up = page.n_dir_slots() - 1;
    while up - low > 1 {
        let mid = (low + up) / 2;
        let mut cur_matched = low_matched.min(up_matched);
        match compare(page.dir_slot_rec(mid), &mut cur_matched) {
            Ordering::Greater => {
                low = mid;
                low_matched = cur_matched;
            }
            Ordering::Equal if low_on_equal => {
                low = mid;
                low_matched = cur_matched;
            }
            _ => {
                up = mid;
                up_matched = cur_matched;
            }
        }
    }

    let mut low_rec = page.dir_slot_rec(low);
    let mut up_rec = page.dir_slot_rec(up);
    loop {
        let mid_rec = page.next(low_rec);
        if mid_rec == up_rec || mid_rec == 0 {
            break;
        }
        let mut cur_matched = low_matched.min(up_matched);
        match compare(mid_rec, &mut cur_matched) {
            Ordering::Greater => {
                low_rec = mid_rec;
                low_matched = cur_matched;
            }
            Ordering::Equal if low_on_equal => {
                if cur_matched == 0 {
                    // the min-rec record compared equal without matching fields
                    cur_matched = n_cmp;
                }
                low_rec = mid_rec;
                low_matched = cur_matched;
            }
            _ => {
                up_rec = mid_rec;
                up_matched = cur_matched;
            }
        }
    }

    matched.up_fields = up_matched;
    matched.low_fields = low_matched;
    match mode {
        SearchMode::G | SearchMode::GE => up_rec,
        SearchMode::L | SearchMode::LE => low_rec,
    }
}

/// Position a cursor on the page for `tuple`, with no prior match
/// information.
pub fn search<B: AsRef<[u8]>>(page: &Page<B>, index: &Index, tuple: &Tuple<'_>, mode: SearchMode) -> usize {
    let mut matched = Matched::default();
    search_with_match(page, index, tuple, mode, &mut matched)
}

/// Split directory slot `s`, which owns one record more than the maximum.
fn split_slot<B>(page: &mut Page<B>, s: usize, mtr: &mut dyn Mtr)
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    debug_assert!(s > 0);
    let n_owned = PAGE_DIR_SLOT_MAX_N_OWNED + 1;
    debug_assert_eq!(page.dir_slot_n_owned(s), n_owned);

    let mut rec = page.dir_slot_rec(s - 1);
    for _ in 0..n_owned / 2 {
        rec = page.next(rec);
    }

    let n_slots = page.n_dir_slots();
    let last = page.dir_slot_pos(n_slots);
    let len = (n_slots - s) * PAGE_DIR_SLOT_SIZE;
    page.as_bytes_mut().copy_within(last + PAGE_DIR_SLOT_SIZE..last + PAGE_DIR_SLOT_SIZE + len, last);
    page.log_range(last, len, mtr);
    page.set_hdr_u16(PAGE_N_DIR_SLOTS, n_slots + 1, mtr);
    page.set_dir_slot_rec(s, rec, mtr);

    let half = n_owned / 2;
    page.set_dir_slot_n_owned(s, half, mtr);
    page.set_dir_slot_n_owned(s + 1, n_owned - half, mtr);
    tracing::trace!(slot = s, n_slots = n_slots + 1, "split directory slot");
}

/// Bring slot `s`, which owns one record less than the minimum, back into
/// range by merging it into the next slot or borrowing one record from it.
fn balance_slot<B>(page: &mut Page<B>, s: usize, mtr: &mut dyn Mtr)
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    debug_assert!(s > 0);
    let n_slots = page.n_dir_slots();
    if s + 1 == n_slots {
        return;
    }
    let up = s + 1;
    let up_n_owned = page.dir_slot_n_owned(up);

    if up_n_owned <= PAGE_DIR_SLOT_MIN_N_OWNED {
        let n_owned = page.dir_slot_n_owned(s);
        page.set_dir_slot_n_owned(s, 0, mtr);
        page.set_dir_slot_n_owned(up, n_owned + up_n_owned, mtr);

        let last = page.dir_slot_pos(n_slots - 1);
        let len = (n_slots - 1 - s) * PAGE_DIR_SLOT_SIZE;
        page.as_bytes_mut().copy_within(last..last + len, last + PAGE_DIR_SLOT_SIZE);
        page.log_range(last + PAGE_DIR_SLOT_SIZE, len, mtr);
        page.write_u16(last, 0, mtr);
        page.set_hdr_u16(PAGE_N_DIR_SLOTS, n_slots - 1, mtr);
        tracing::trace!(slot = s, n_slots = n_slots - 1, "merged directory slots");
        return;
    }

    let old_rec = page.dir_slot_rec(s);
    let new_rec = page.next(old_rec);
    page.set_rec_n_owned(old_rec, 0, mtr);
    page.set_rec_n_owned(new_rec, PAGE_DIR_SLOT_MIN_N_OWNED, mtr);
    page.set_dir_slot_rec(s, new_rec, mtr);
    page.set_dir_slot_n_owned(up, up_n_owned - 1, mtr);
    tracing::trace!(slot = s, "moved one record into directory slot");
}

/// Insert the record at `rec_origin` of `rec_buf` after the cursor record
/// `cur`. Returns the origin of the inserted record.
///
/// The head of the free list is reused when it is large enough; otherwise
/// the record is allocated at the heap top. Fails with
/// [`RecError::PageFull`] when neither has room.
pub fn insert_rec_after<B>(
    page: &mut Page<B>,
    cur: usize,
    rec_buf: &[u8],
    rec_origin: usize,
    offsets: &Offsets,
    index: &Index,
    mtr: &mut dyn Mtr,
) -> Result<usize, RecError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let comp = page.is_comp();
    assert_eq!(comp, offsets.comp());
    assert_ne!(cur, page.supremum(), "cannot insert after supremum");
    let rec_size = offsets.size();
    let extra = offsets.extra_size();

    let mut reused = None;
    let free = page.free();
    if free != 0 {
        let mut foffsets = Offsets::new();
        page.rec_offsets(free, index, usize::MAX, &mut foffsets);
        if foffsets.size() >= rec_size {
            let heap_no = page.rec(free).heap_no(comp);
            let next_free = page.next(free);
            let garbage = page.garbage();
            debug_assert!(garbage >= rec_size);
            page.set_hdr_u16(PAGE_FREE, next_free, mtr);
            page.set_hdr_u16(PAGE_GARBAGE, garbage - rec_size, mtr);
            reused = Some((free - foffsets.extra_size(), heap_no));
        }
    }
    let (insert_buf, heap_no) = match reused {
        Some(r) => r,
        None => {
            let available = page.max_insert_size(1);
            if rec_size > available {
                return Err(RecError::PageFull { need: rec_size, available });
            }
            let top = page.heap_top();
            let heap_no = page.n_heap();
            page.set_hdr_u16(PAGE_HEAP_TOP, top + rec_size, mtr);
            let n_heap = (heap_no + 1) | if comp { 0x8000 } else { 0 };
            page.set_hdr_u16(PAGE_N_HEAP, n_heap, mtr);
            (top, heap_no)
        }
    };
    let insert_rec = insert_buf + extra;
    let next_rec = page.next(cur);

    let last_insert = page.last_insert();
    let mut dir = page.direction();
    let mut n_dir = page.n_direction();
    if !index.is_spatial() {
        if last_insert == 0 {
            dir = PAGE_NO_DIRECTION;
            n_dir = 0;
        } else if last_insert == cur && dir != PAGE_LEFT {
            dir = PAGE_RIGHT;
            n_dir += 1;
        } else if next_rec == last_insert && dir != PAGE_RIGHT {
            dir = PAGE_LEFT;
            n_dir += 1;
        } else {
            dir = PAGE_NO_DIRECTION;
            n_dir = 0;
        }
    }
    page.set_hdr_u16(PAGE_LAST_INSERT, insert_rec, mtr);
    let dir_byte = page.as_bytes()[PAGE_HEADER + PAGE_DIRECTION_B] & !7 | dir;
    page.write_u8(PAGE_HEADER + PAGE_DIRECTION_B, dir_byte, mtr);
    page.set_hdr_u16(PAGE_N_DIRECTION, n_dir, mtr);
    let n_recs = page.n_recs();
    page.set_hdr_u16(PAGE_N_RECS, n_recs + 1, mtr);

    {
        let bytes = page.as_bytes_mut();
        bytes[insert_buf..insert_buf + rec_size]
            .copy_from_slice(&rec_buf[rec_origin - extra..rec_origin - extra + rec_size]);
        let mut r = RecMut::new(bytes, insert_rec);
        r.set_n_owned(comp, 0);
        r.set_heap_no(comp, heap_no);
        r.set_next_offs(comp, next_rec);
    }
    page.log_range(insert_buf, rec_size, mtr);
    page.set_rec_next(cur, insert_rec, mtr);

    let mut owner = next_rec;
    let mut n_owned = page.rec(owner).n_owned(comp) as usize;
    while n_owned == 0 {
        owner = page.next(owner);
        n_owned = page.rec(owner).n_owned(comp) as usize;
    }
    page.set_rec_n_owned(owner, n_owned + 1, mtr);

    if n_owned == PAGE_DIR_SLOT_MAX_N_OWNED {
        let slot = page.dir_search_owner_slot(index, owner)?;
        split_slot(page, slot, mtr);
    }
    Ok(insert_rec)
}

/// Convert `tuple` and insert it after the cursor record `cur`.
///
/// A record above the page's maximum record size is rejected with
/// [`RecError::RowTooLarge`]; long fields must be moved off-page first.
///
/// # Examples
///
/// ```
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
/// use innorec::innodb::page::Page;
/// use innorec::innodb::page_cur::{search, tuple_insert, NoLog, SearchMode};
///
/// let index = IndexBuilder::new("k", 5, RowFormat::Dynamic)
///     .column("name", DataType::varchar(16, true))
///     .build()
///     .unwrap();
/// let mut page = Page::create(vec![0u8; 16384], true, &mut NoLog).unwrap();
///
/// for name in [&b"carol"[..], b"alice", b"bob"] {
///     let mut t = Tuple::new(1);
///     t.field_mut(0).set_data(name);
///     t.set_types_from_index(&index);
///     let cur = search(&page, &index, &t, SearchMode::LE);
///     tuple_insert(&mut page, cur, &index, &t, 0, &mut NoLog).unwrap();
/// }
/// assert_eq!(page.n_recs(), 3);
/// let first = page.first_rec();
/// assert_eq!(&page.as_bytes()[first..first + 5], b"alice");
/// ```
pub fn tuple_insert<B>(
    page: &mut Page<B>,
    cur: usize,
    index: &Index,
    tuple: &Tuple<'_>,
    n_ext: usize,
    mtr: &mut dyn Mtr,
) -> Result<usize, RecError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let size = converted_size(index, tuple, n_ext);
    let max = page.size().max_rec_size(page.is_comp());
    if size > max {
        return Err(RecError::RowTooLarge { size, max });
    }
    let mut buf = vec![0u8; size];
    let origin = convert_tuple_to_record(&mut buf, index, tuple, n_ext);
    let n_core = if page.is_leaf() { index.n_core_fields() } else { 0 };
    let mut offsets = Offsets::new();
    offsets.compute(&buf, origin, index, n_core, usize::MAX);
    insert_rec_after(page, cur, &buf, origin, &offsets, index, mtr)
}

/// Delete the user record `cur`. Returns the record that followed it.
///
/// The record goes to the head of the free list and its size is added to
/// PAGE_GARBAGE. Deleting the only user record empties the page, unless
/// it is the instant ALTER metadata record.
pub fn delete_rec<B>(
    page: &mut Page<B>,
    cur: usize,
    index: &Index,
    offsets: &Offsets,
    mtr: &mut dyn Mtr,
) -> Result<usize, RecError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    assert!(page.is_user_rec(cur), "cannot delete a system record");
    let comp = page.is_comp();

    if page.n_recs() == 1 && page.rec(cur).kind(comp, page.is_leaf()) != RecKind::AlterMetadata {
        page.create_empty(index, mtr);
        return Ok(page.supremum());
    }

    let slot = page.dir_search_owner_slot(index, cur)?;
    if slot == 0 {
        return Err(RecError::Corruption(format!("user record {} owned by slot 0", cur)));
    }
    let cur_n_owned = page.dir_slot_n_owned(slot);
    page.set_hdr_u16(PAGE_LAST_INSERT, 0, mtr);

    let mut prev_rec = page.dir_slot_rec(slot - 1);
    loop {
        let next = page.next(prev_rec);
        if next == cur {
            break;
        }
        if next == 0 {
            return Err(RecError::Corruption(format!("record {} is not in the chain", cur)));
        }
        prev_rec = next;
    }
    let next_rec = page.next(cur);

    let mut slot_rec = page.dir_slot_rec(slot);
    if cur == slot_rec {
        slot_rec = prev_rec;
        page.set_dir_slot_rec(slot, slot_rec, mtr);
    }
    page.set_rec_next(prev_rec, next_rec, mtr);
    page.set_rec_n_owned(slot_rec, cur_n_owned - 1, mtr);

    let free = page.free();
    page.set_rec_next(cur, free, mtr);
    page.set_hdr_u16(PAGE_FREE, cur, mtr);
    let garbage = page.garbage();
    page.set_hdr_u16(PAGE_GARBAGE, garbage + offsets.size(), mtr);
    let n_recs = page.n_recs();
    page.set_hdr_u16(PAGE_N_RECS, n_recs - 1, mtr);

    if cur_n_owned <= PAGE_DIR_SLOT_MIN_N_OWNED {
        balance_slot(page, slot, mtr);
    }
    Ok(next_rec)
}
