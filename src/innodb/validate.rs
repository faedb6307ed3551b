//! Read-only structural validation of INDEX pages.
//!
//! [`simple_report`] checks the record chain, directory and free list
//! without looking at record contents. [`report`] adds per-record checks
//! against an index descriptor: record formats, owned counts, heap numbers,
//! key order and space accounting. Every issue found is logged and collected
//! into a [`PageValidation`]; validation never fails or panics on a
//! damaged page.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{error, warn};

use crate::innodb::cmp::{cmp_rec_rec, RecRef};
use crate::innodb::constants::*;
use crate::innodb::dict::Index;
use crate::innodb::offsets::Offsets;
use crate::innodb::page::Page;
use crate::innodb::record::RecStatus;

/// Kind of structural check that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageCheck {
    /// Number of directory slots is plausible for the page size.
    DirSlotCount,
    /// Record heap does not grow into the page directory.
    HeapDirOverlap,
    /// Next-record pointers stay within the page and the chain terminates.
    RecordChain,
    /// Owned counts in the chain agree with the directory.
    OwnedCount,
    /// Each directory slot points to the record that owns its group.
    DirSlotPointer,
    /// Slot 0 points to infimum and the last slot to supremum.
    DirEnds,
    /// PAGE_N_RECS matches the number of records in the chain.
    RecCount,
    /// Free list stays within the page and terminates.
    FreeList,
    /// PAGE_N_HEAP equals live plus free records.
    HeapCount,
    /// Record header and field lengths are consistent.
    RecordFormat,
    /// Heap numbers are below PAGE_N_HEAP and unique.
    HeapNo,
    /// Records do not overlap each other.
    RecordOverlap,
    /// User records are in ascending key order.
    KeyOrder,
    /// PAGE_HEAP_TOP and PAGE_GARBAGE agree with the record sizes.
    DataSize,
    /// Page format does not match the index.
    Format,
}

impl std::fmt::Display for PageCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageCheck::DirSlotCount => "dir_slot_count",
            PageCheck::HeapDirOverlap => "heap_dir_overlap",
            PageCheck::RecordChain => "record_chain",
            PageCheck::OwnedCount => "owned_count",
            PageCheck::DirSlotPointer => "dir_slot_pointer",
            PageCheck::DirEnds => "dir_ends",
            PageCheck::RecCount => "rec_count",
            PageCheck::FreeList => "free_list",
            PageCheck::HeapCount => "heap_count",
            PageCheck::RecordFormat => "record_format",
            PageCheck::HeapNo => "heap_no",
            PageCheck::RecordOverlap => "record_overlap",
            PageCheck::KeyOrder => "key_order",
            PageCheck::DataSize => "data_size",
            PageCheck::Format => "format",
        };
        f.write_str(name)
    }
}

/// A single inconsistency found on a page.
#[derive(Debug, Clone, Serialize)]
pub struct PageIssue {
    /// Which check produced this issue.
    pub check: PageCheck,
    /// Record origin the issue was found at, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Human-readable description.
    pub message: String,
}

/// Result of validating one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageValidation {
    pub page_no: u32,
    pub n_recs: usize,
    pub n_heap: usize,
    pub n_dir_slots: usize,
    /// Records visited in the chain, infimum and supremum included.
    pub records_checked: usize,
    pub issues: Vec<PageIssue>,
}

impl PageValidation {
    fn new<B: AsRef<[u8]>>(page: &Page<B>) -> Self {
        PageValidation {
            page_no: page.page_no(),
            n_recs: page.n_recs(),
            n_heap: page.n_heap(),
            n_dir_slots: page.n_dir_slots(),
            records_checked: 0,
            issues: Vec::new(),
        }
    }

    /// Returns true if no issue was found.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns true if an issue of kind `check` was found.
    pub fn has(&self, check: PageCheck) -> bool {
        self.issues.iter().any(|i| i.check == check)
    }

    fn error(&mut self, check: PageCheck, offset: Option<usize>, message: String) {
        error!(page_no = self.page_no, %check, offset, "{}", message);
        self.issues.push(PageIssue { check, offset, message });
    }

    fn warn(&mut self, check: PageCheck, offset: Option<usize>, message: String) {
        warn!(page_no = self.page_no, %check, offset, "{}", message);
        self.issues.push(PageIssue { check, offset, message });
    }
}

/// Check that the directory starts at infimum and ends at supremum.
pub fn check_dir<B: AsRef<[u8]>>(page: &Page<B>) -> bool {
    let mut v = PageValidation::new(page);
    check_dir_into(page, &mut v);
    v.is_valid()
}

fn check_dir_into<B: AsRef<[u8]>>(page: &Page<B>, v: &mut PageValidation) {
    let n_slots = page.n_dir_slots();
    if n_slots < 2 {
        v.error(PageCheck::DirEnds, None, format!("page has {} directory slots", n_slots));
        return;
    }
    if page.dir_slot_rec(0) != page.infimum() {
        v.error(PageCheck::DirEnds, None, "page directory corruption: infimum not pointed to".into());
    }
    if page.dir_slot_rec(n_slots - 1) != page.supremum() {
        v.error(PageCheck::DirEnds, None, "page directory corruption: supremum not pointed to".into());
    }
}

fn rec_in_bounds<B: AsRef<[u8]>>(page: &Page<B>, rec: usize) -> bool {
    rec >= PAGE_DATA && rec < page.size().bytes()
}

/// Check the page structure without looking inside records.
///
/// Covers the directory slot count, heap/directory overlap, the record chain
/// against the directory, PAGE_N_RECS, the free list and PAGE_N_HEAP.
pub fn simple_report<B: AsRef<[u8]>>(page: &Page<B>) -> PageValidation {
    let mut v = PageValidation::new(page);
    simple_validate_into(page, &mut v);
    v
}

/// Returns true if [`simple_report`] finds no issue.
///
/// # Examples
///
/// ```
/// use innorec::innodb::page::Page;
/// use innorec::innodb::page_cur::NoLog;
/// use innorec::innodb::validate::simple_validate;
///
/// let page = Page::create(vec![0u8; 16384], false, &mut NoLog).unwrap();
/// assert!(simple_validate(&page));
/// ```
pub fn simple_validate<B: AsRef<[u8]>>(page: &Page<B>) -> bool {
    simple_report(page).is_valid()
}

fn simple_validate_into<B: AsRef<[u8]>>(page: &Page<B>, v: &mut PageValidation) -> bool {
    let comp = page.is_comp();
    let page_size = page.size().bytes();
    let n_slots = page.n_dir_slots();

    if n_slots < 2 || n_slots > page_size / 4 {
        v.error(PageCheck::DirSlotCount, None, format!("nonsensical number of page dir slots: {}", n_slots));
        return false;
    }
    let heap_top = page.heap_top();
    if heap_top > page.dir_slot_pos(n_slots - 1) {
        v.error(
            PageCheck::HeapDirOverlap,
            None,
            format!(
                "record heap and dir overlap on a page, heap top {}, dir {}",
                heap_top,
                page.dir_slot_pos(n_slots - 1)
            ),
        );
        return false;
    }
    check_dir_into(page, v);

    let mut count = 0;
    let mut own_count = 1;
    let mut slot_no = 0;
    let mut rec = page.infimum();
    loop {
        if rec > heap_top {
            v.error(PageCheck::RecordChain, Some(rec), format!("record {} is above heap top {}", rec, heap_top));
            return false;
        }
        let n_owned = page.rec(rec).n_owned(comp) as usize;
        if n_owned != 0 {
            if n_owned != own_count {
                v.error(
                    PageCheck::OwnedCount,
                    Some(rec),
                    format!("wrong owned count {}, {}, rec {}", n_owned, own_count, rec),
                );
                return false;
            }
            if slot_no >= n_slots || page.dir_slot_rec(slot_no) != rec {
                v.error(PageCheck::DirSlotPointer, Some(rec), format!("dir slot {} does not point to right rec {}", slot_no, rec));
                return false;
            }
            own_count = 0;
            if rec != page.supremum() {
                slot_no += 1;
            }
        }
        if rec == page.supremum() {
            break;
        }
        let next = page.next(rec);
        if !rec_in_bounds(page, next) {
            v.error(PageCheck::RecordChain, Some(rec), format!("next record offset nonsensical {} for rec {}", next, rec));
            return false;
        }
        count += 1;
        if count > page_size {
            v.error(PageCheck::RecordChain, Some(rec), "page record list appears to be circular".into());
            return false;
        }
        rec = next;
        own_count += 1;
    }
    v.records_checked = count + 1;

    if page.rec(page.supremum()).n_owned(comp) == 0 {
        v.error(PageCheck::OwnedCount, Some(page.supremum()), "n owned is zero in a supremum rec".into());
        return false;
    }
    if slot_no != n_slots - 1 {
        v.error(PageCheck::DirSlotCount, None, format!("n slots wrong {}, {}", slot_no, n_slots - 1));
        return false;
    }
    if page.n_recs() + PAGE_HEAP_NO_USER_LOW != count + 1 {
        v.error(PageCheck::RecCount, None, format!("n recs wrong {} {}", page.n_recs() + PAGE_HEAP_NO_USER_LOW, count + 1));
        return false;
    }

    let mut rec = page.free();
    while rec != 0 {
        if !rec_in_bounds(page, rec) || rec > heap_top {
            v.error(PageCheck::FreeList, Some(rec), format!("free list record has a nonsensical offset {}", rec));
            return false;
        }
        count += 1;
        if count > page_size {
            v.error(PageCheck::FreeList, Some(rec), "page free list appears to be circular".into());
            return false;
        }
        rec = page.next(rec);
    }
    if page.n_heap() != count + 1 {
        v.error(PageCheck::HeapCount, None, format!("n heap is wrong {}, {}", page.n_heap(), count + 1));
        return false;
    }
    true
}

/// Check a single record against its offsets.
fn check_rec<B: AsRef<[u8]>>(
    page: &Page<B>,
    rec: usize,
    offsets: &Offsets,
    heap_seen: &mut [bool],
    v: &mut PageValidation,
) -> bool {
    let comp = page.is_comp();
    let r = page.rec(rec);
    let heap_no = r.heap_no(comp);
    if heap_no >= page.n_heap() {
        v.error(PageCheck::HeapNo, Some(rec), format!("heap_no is {} should be < {}", heap_no, page.n_heap()));
        return false;
    }
    if heap_seen[heap_no] {
        v.error(PageCheck::HeapNo, Some(rec), format!("heap_no {} is used twice", heap_no));
        return false;
    }
    heap_seen[heap_no] = true;
    let n_owned = r.n_owned(comp) as usize;
    if n_owned > REC_MAX_N_OWNED {
        v.error(PageCheck::OwnedCount, Some(rec), format!("record has {} owned", n_owned));
        return false;
    }
    if !offsets.validate_record(page.as_bytes(), rec, page.size().bytes()) {
        v.error(PageCheck::RecordFormat, Some(rec), "record lengths are inconsistent".into());
        return false;
    }
    true
}

/// Returns false if a COMPACT record has an unexpected status for the page
/// level.
fn check_status<B: AsRef<[u8]>>(page: &Page<B>, rec: usize, v: &mut PageValidation) -> bool {
    if !page.is_comp() || !page.is_user_rec(rec) {
        return true;
    }
    let ok = match page.rec(rec).status() {
        Some(RecStatus::Ordinary) | Some(RecStatus::Instant) => page.is_leaf(),
        Some(RecStatus::NodePtr) => !page.is_leaf(),
        _ => false,
    };
    if !ok {
        v.error(
            PageCheck::RecordFormat,
            Some(rec),
            format!("record status {} does not match page level {}", page.rec(rec).status_bits(), page.level()),
        );
    }
    ok
}

/// Mark the bytes of a record as used, reporting overlaps.
fn mark_used<B: AsRef<[u8]>>(page: &Page<B>, rec: usize, offsets: &Offsets, used: &mut [bool], v: &mut PageValidation) {
    let start = rec - offsets.extra_size();
    let size = offsets.size();
    if start + size >= page.size().bytes() {
        v.error(PageCheck::RecordOverlap, Some(rec), format!("record offset out of bounds: {}+{}", start, size));
        return;
    }
    if used[start..start + size].iter().any(|&b| b) {
        v.error(PageCheck::RecordOverlap, Some(rec), "record overlaps another record".into());
    }
    used[start..start + size].fill(true);
}

/// Full validation of a page belonging to `index`.
///
/// Runs [`simple_report`] first and only inspects records when the chain
/// and directory are sound enough to walk.
pub fn report<B: AsRef<[u8]>>(page: &Page<B>, index: &Index) -> PageValidation {
    let mut v = PageValidation::new(page);
    if !simple_validate_into(page, &mut v) {
        return v;
    }
    let comp = page.is_comp();
    if comp != index.is_comp() {
        v.error(PageCheck::Format, None, format!("page compact flag {} does not match index {}", comp, index.name));
        return v;
    }

    let page_size = page.size().bytes();
    let buf = page.as_bytes();
    let mut used = vec![false; page_size];
    let mut heap_seen = vec![false; page.n_heap()];
    let mut offsets = Offsets::new();
    let mut old_offsets = Offsets::new();
    let mut old_rec: Option<usize> = None;
    let mut data_size = 0;
    let mut own_count = 1;
    let mut slot_no = 0;
    let n_slots = page.n_dir_slots();

    let mut rec = page.infimum();
    loop {
        let valid = check_status(page, rec, &mut v);
        if valid {
            page.rec_offsets(rec, index, usize::MAX, &mut offsets);
        }
        if valid && check_rec(page, rec, &offsets, &mut heap_seen, &mut v) {
            if let Some(prev) = old_rec.filter(|&p| page.is_user_rec(p) && page.is_user_rec(rec)) {
                let ord = cmp_rec_rec(
                    RecRef { buf, origin: rec, offsets: &offsets },
                    RecRef { buf, origin: prev, offsets: &old_offsets },
                    index,
                    false,
                    None,
                );
                if ord != Ordering::Greater && !index.is_spatial() {
                    v.error(PageCheck::KeyOrder, Some(rec), format!("records in wrong order: {} after {}", rec, prev));
                }
            }
            if page.is_user_rec(rec) {
                data_size += offsets.size();
            }
            mark_used(page, rec, &offsets, &mut used, &mut v);
        }

        let n_owned = page.rec(rec).n_owned(comp) as usize;
        if n_owned != 0 {
            let slot_owned = page.dir_slot_n_owned(slot_no);
            if slot_owned > PAGE_DIR_SLOT_MAX_N_OWNED {
                v.warn(PageCheck::OwnedCount, Some(rec), format!("slot {} owns {} records", slot_no, slot_owned));
            } else if slot_no != 0 && slot_no != n_slots - 1 && slot_owned < PAGE_DIR_SLOT_MIN_N_OWNED {
                v.warn(PageCheck::OwnedCount, Some(rec), format!("slot {} owns only {} records", slot_no, slot_owned));
            }
            own_count = 0;
            if rec != page.supremum() {
                slot_no += 1;
            }
        }
        if rec == page.supremum() {
            break;
        }
        own_count += 1;
        old_rec = Some(rec);
        std::mem::swap(&mut offsets, &mut old_offsets);
        rec = page.next(rec);
    }
    debug_assert_eq!(own_count, 0);

    if data_size != page.data_size() {
        v.error(
            PageCheck::DataSize,
            None,
            format!("summed data size {}, returned by func {}", data_size, page.data_size()),
        );
    }

    let mut garbage = 0;
    let mut rec = page.free();
    while rec != 0 {
        let mut free_offsets = Offsets::new();
        if check_status(page, rec, &mut v) {
            page.rec_offsets(rec, index, usize::MAX, &mut free_offsets);
            if check_rec(page, rec, &free_offsets, &mut heap_seen, &mut v) {
                garbage += free_offsets.size();
                mark_used(page, rec, &free_offsets, &mut used, &mut v);
            }
        }
        rec = page.next(rec);
    }
    if garbage > page.garbage() {
        v.error(
            PageCheck::DataSize,
            None,
            format!("free records take {} bytes, PAGE_GARBAGE is {}", garbage, page.garbage()),
        );
    }
    v
}

/// Returns true if [`report`] finds no issue.
pub fn validate<B: AsRef<[u8]>>(page: &Page<B>, index: &Index) -> bool {
    report(page, index).is_valid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::data::Tuple;
    use crate::innodb::dict::{IndexBuilder, RowFormat};
    use crate::innodb::dtype::DataType;
    use crate::innodb::page_cur::{search, tuple_insert, NoLog, SearchMode};
    use byteorder::{BigEndian, ByteOrder};

    fn index(format: RowFormat) -> Index {
        IndexBuilder::new("PRIMARY", 3, format)
            .clustered(1)
            .column("id", DataType::int(4, true))
            .column("name", DataType::varchar(20, false))
            .build()
            .unwrap()
    }

    fn filled(format: RowFormat, n: u32) -> (Index, Page<Vec<u8>>) {
        let index = index(format);
        let mut page = Page::create(vec![0u8; 16384], format.is_comp(), &mut NoLog).unwrap();
        for i in 0..n {
            let k = (i * 13 % n).to_be_bytes();
            let mut t = Tuple::new(2);
            t.field_mut(0).set_data(&k);
            t.field_mut(1).set_data(b"row");
            t.set_types_from_index(&index);
            t.set_n_fields_cmp(1);
            let cur = search(&page, &index, &t, SearchMode::LE);
            tuple_insert(&mut page, cur, &index, &t, 0, &mut NoLog).unwrap();
        }
        (index, page)
    }

    #[test]
    fn test_valid_pages() {
        for format in [RowFormat::Redundant, RowFormat::Dynamic] {
            let (index, page) = filled(format, 50);
            assert!(check_dir(&page));
            assert!(simple_validate(&page));
            let r = report(&page, &index);
            assert!(r.is_valid(), "{:?}", r.issues);
            assert_eq!(r.records_checked, 52);
        }
    }

    #[test]
    fn test_wrong_n_recs() {
        let (index, mut page) = filled(RowFormat::Compact, 20);
        let at = PAGE_HEADER + PAGE_N_RECS;
        BigEndian::write_u16(&mut page.as_bytes_mut()[at..], 21);
        let r = report(&page, &index);
        assert!(r.has(PageCheck::RecCount));
        assert!(!validate(&page, &index));
    }

    #[test]
    fn test_wrong_order() {
        let (index, mut page) = filled(RowFormat::Compact, 20);
        let first = page.first_rec();
        page.as_bytes_mut()[first..first + 4].copy_from_slice(&100u32.to_be_bytes());
        assert!(simple_validate(&page));
        let r = report(&page, &index);
        assert!(r.has(PageCheck::KeyOrder));
    }

    #[test]
    fn test_bad_dir() {
        let (_, mut page) = filled(RowFormat::Compact, 20);
        let pos = page.dir_slot_pos(0);
        let sup = page.supremum() as u16;
        BigEndian::write_u16(&mut page.as_bytes_mut()[pos..], sup);
        assert!(!check_dir(&page));
        assert!(!simple_validate(&page));
    }

    #[test]
    fn test_circular_chain() {
        let (_, mut page) = filled(RowFormat::Redundant, 10);
        let first = page.first_rec();
        // point the first record at itself
        let at = first - REC_NEXT;
        BigEndian::write_u16(&mut page.as_bytes_mut()[at..], first as u16);
        let r = simple_report(&page);
        assert!(!r.is_valid());
    }
}
