//! Integration tests for index pages: insert, delete, search, redo log
//! replay and validation.

use std::collections::BTreeSet;

use byteorder::{BigEndian, ByteOrder};
use proptest::prelude::*;

use innorec::innodb::constants::*;
use innorec::innodb::data::Tuple;
use innorec::innodb::dict::{Index, IndexBuilder, RowFormat};
use innorec::innodb::dtype::DataType;
use innorec::innodb::offsets::Offsets;
use innorec::innodb::page::{FsegHeader, Page, PageSize};
use innorec::innodb::page_cur::{
    delete_rec, search, search_with_match, tuple_insert, LogRecord, Matched, MtrLog, NoLog,
    SearchMode,
};
use innorec::innodb::record::walk_records;
use innorec::innodb::validate::{report, simple_validate, validate, PageCheck};
use innorec::RecError;

const PS: usize = 16384;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn index(format: RowFormat) -> Index {
    IndexBuilder::new("PRIMARY", 21, format)
        .clustered(1)
        .column("id", DataType::int(4, true))
        .system_columns()
        .column("name", DataType::varchar(40, false))
        .build()
        .unwrap()
}

fn key(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

fn key_of(page: &Page<Vec<u8>>, rec: usize) -> u32 {
    BigEndian::read_u32(&page.as_bytes()[rec..])
}

fn insert_row(
    page: &mut Page<Vec<u8>>,
    index: &Index,
    id: u32,
    name: &[u8],
    mtr: &mut MtrLog,
) -> Result<usize, RecError> {
    let k = key(id);
    let mut t = Tuple::new(4);
    t.field_mut(0).set_data(&k);
    t.field_mut(1).set_data(&[0, 0, 0, 0, 0, 9]);
    t.field_mut(2).set_data(&[0x80, 0, 0, 0, 0, 0, 1]);
    if name.is_empty() {
        t.field_mut(3).set_null();
    } else {
        t.field_mut(3).set_data(name);
    }
    t.set_types_from_index(index);
    t.set_n_fields_cmp(1);
    let cur = search(page, index, &t, SearchMode::LE);
    tuple_insert(page, cur, index, &t, 0, mtr)
}

fn find(page: &Page<Vec<u8>>, index: &Index, id: u32) -> Option<usize> {
    let k = key(id);
    let mut t = Tuple::new(1);
    t.field_mut(0).set_data(&k);
    t.set_types_from_index(index);
    let rec = search(page, index, &t, SearchMode::GE);
    (page.is_user_rec(rec) && key_of(page, rec) == id).then_some(rec)
}

fn delete_row(page: &mut Page<Vec<u8>>, index: &Index, id: u32, mtr: &mut MtrLog) -> bool {
    let rec = match find(page, index, id) {
        Some(rec) => rec,
        None => return false,
    };
    let mut offsets = Offsets::new();
    page.rec_offsets(rec, index, usize::MAX, &mut offsets);
    delete_rec(page, rec, index, &offsets, mtr).unwrap();
    true
}

fn assert_dir_invariant(page: &Page<Vec<u8>>) {
    let n = page.n_dir_slots();
    assert!(n >= 2);
    assert_eq!(page.dir_slot_rec(0), page.infimum());
    assert_eq!(page.dir_slot_rec(n - 1), page.supremum());
    let mut total = 0;
    for s in 0..n {
        let owned = page.dir_slot_n_owned(s);
        if s == 0 {
            assert_eq!(owned, 1);
        } else if s == n - 1 {
            assert!((1..=PAGE_DIR_SLOT_MAX_N_OWNED).contains(&owned));
        } else {
            assert!(
                (PAGE_DIR_SLOT_MIN_N_OWNED..=PAGE_DIR_SLOT_MAX_N_OWNED).contains(&owned),
                "slot {} owns {}",
                s,
                owned
            );
        }
        total += owned;
    }
    assert_eq!(total, page.n_recs() + 2);
}

// ---------------------------------------------------------------------------
// Page creation and header
// ---------------------------------------------------------------------------

#[test]
fn test_create_and_header() {
    let mut log = MtrLog::new();
    let mut page = Page::create(vec![0u8; PS], true, &mut log).unwrap();
    page.set_level(0, &mut log);
    page.set_index_id(21, &mut log);
    page.set_fseg_header(true, &FsegHeader { space_id: 5, page_no: 3, offset: 242 }, &mut log);

    let header = page.header().unwrap();
    assert_eq!(header.n_dir_slots, 2);
    assert_eq!(header.n_heap(), 2);
    assert!(header.is_compact());
    assert_eq!(header.index_id, 21);
    assert_eq!(page.heap_top(), PAGE_NEW_SUPREMUM_END);
    assert_eq!(page.max_insert_size(1), page.free_space_of_empty() - 1);

    let mut replica = vec![0u8; PS];
    log.apply(&mut replica);
    assert_eq!(replica, page.as_bytes());
}

#[test]
fn test_page_size_limits() {
    assert!(PageSize::new(4096).is_ok());
    assert!(PageSize::new(65536).is_ok());
    assert!(matches!(PageSize::new(5000), Err(RecError::Argument(_))));
    let ps = PageSize::default();
    assert_eq!(ps.bytes(), 16384);
    assert!(ps.max_rec_size(true) < ps.free_space_of_empty(true));
}

// ---------------------------------------------------------------------------
// Insert, search, delete
// ---------------------------------------------------------------------------

#[test]
fn test_insert_search_delete() {
    for format in [RowFormat::Redundant, RowFormat::Dynamic] {
        let index = index(format);
        let mut log = MtrLog::new();
        let mut page = Page::create(vec![0u8; PS], format.is_comp(), &mut log).unwrap();
        for i in 0..120u32 {
            insert_row(&mut page, &index, (i * 53) % 120 * 2, b"someone", &mut log).unwrap();
        }
        assert_eq!(page.n_recs(), 120);
        assert_dir_invariant(&page);
        assert!(validate(&page, &index));

        let keys: Vec<u32> = page.user_recs().map(|r| key_of(&page, r)).collect();
        assert_eq!(keys, (0..120).map(|i| i * 2).collect::<Vec<_>>());

        // odd keys fall between neighbours
        let k = key(51);
        let mut t = Tuple::new(1);
        t.field_mut(0).set_data(&k);
        t.set_types_from_index(&index);
        let mut matched = Matched::default();
        let le = search_with_match(&page, &index, &t, SearchMode::LE, &mut matched);
        assert_eq!(key_of(&page, le), 50);
        assert_eq!(matched.up_fields, 0);
        let g = search(&page, &index, &t, SearchMode::G);
        assert_eq!(key_of(&page, g), 52);

        for id in (0..240).step_by(4) {
            assert!(delete_row(&mut page, &index, id, &mut log));
        }
        assert_eq!(page.n_recs(), 60);
        assert!(find(&page, &index, 4).is_none());
        assert!(find(&page, &index, 6).is_some());
        assert_dir_invariant(&page);
        assert!(validate(&page, &index));

        let mut replica = vec![0u8; PS];
        log.apply(&mut replica);
        assert_eq!(replica, page.as_bytes(), "{:?}", format);
    }
}

#[test]
fn test_owner_slot_binary_search() {
    for format in [RowFormat::Redundant, RowFormat::Dynamic] {
        let index = index(format);
        let mut log = MtrLog::new();
        let mut page = Page::create(vec![0u8; PS], format.is_comp(), &mut log).unwrap();
        for i in 0..90u32 {
            insert_row(&mut page, &index, (i * 37) % 90, b"owner", &mut log).unwrap();
        }
        let n_slots = page.n_dir_slots();
        assert!(n_slots > 10);

        let mut recs: Vec<usize> = page.user_recs().collect();
        recs.push(page.supremum());
        for rec in recs {
            let slot = page.dir_search_owner_slot(&index, rec).unwrap();
            assert_eq!(slot, page.dir_find_owner_slot(rec).unwrap());
            assert!(slot > 0);

            // rec lies after the previous slot's record and at or before its own
            let mut r = page.dir_slot_rec(slot - 1);
            let mut owned = false;
            while r != page.dir_slot_rec(slot) {
                r = page.next(r);
                owned |= r == rec;
            }
            assert!(owned, "slot {} does not own {}", slot, rec);
        }
        assert_eq!(page.dir_search_owner_slot(&index, page.infimum()).unwrap(), 0);
    }
}

#[test]
fn test_walk_records_and_reorganize_space() {
    for format in [RowFormat::Redundant, RowFormat::Compact] {
        let index = index(format);
        let mut log = MtrLog::new();
        let mut page = Page::create(vec![0u8; PS], format.is_comp(), &mut log).unwrap();
        for id in 0..30u32 {
            insert_row(&mut page, &index, id, b"walker", &mut log).unwrap();
        }
        for id in (0..30).step_by(3) {
            assert!(delete_row(&mut page, &index, id, &mut log));
        }

        let walked = walk_records(page.as_bytes(), format.is_comp());
        let chain: Vec<usize> = page.user_recs().collect();
        assert_eq!(walked.iter().map(|r| r.offset).collect::<Vec<_>>(), chain);
        assert!(walked.iter().all(|r| r.header.n_owned <= 8));

        // garbage from the deletes comes back after a reorganize
        assert!(page.garbage() > 0);
        assert!(page.max_insert_size_after_reorganize(1) > page.max_insert_size(1));
    }
}

#[test]
fn test_delete_last_record_empties_page() {
    let index = index(RowFormat::Compact);
    let mut log = MtrLog::new();
    let mut page = Page::create(vec![0u8; PS], true, &mut log).unwrap();
    page.set_index_id(21, &mut log);
    insert_row(&mut page, &index, 1, b"only", &mut log).unwrap();
    assert!(delete_row(&mut page, &index, 1, &mut log));
    assert_eq!(page.n_recs(), 0);
    assert_eq!(page.free(), 0);
    assert_eq!(page.heap_top(), PAGE_NEW_SUPREMUM_END);
    assert_eq!(page.index_id(), 21);
    assert!(simple_validate(&page));

    let mut replica = vec![0u8; PS];
    log.apply(&mut replica);
    assert_eq!(replica, page.as_bytes());
}

#[test]
fn test_page_full_is_recoverable() {
    let index = index(RowFormat::Dynamic);
    let mut page = Page::create(vec![0u8; PS], true, &mut NoLog).unwrap();
    let name = [b'n'; 40];
    let mut log = MtrLog::new();
    let mut id = 0;
    let err = loop {
        match insert_row(&mut page, &index, id, &name, &mut log) {
            Ok(_) => id += 1,
            Err(e) => break e,
        }
    };
    match err {
        RecError::PageFull { need, available } => assert!(need > available),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(page.n_recs(), id as usize);
    assert_dir_invariant(&page);
    assert!(validate(&page, &index));
}

#[test]
fn test_log_records_are_typed() {
    let index = index(RowFormat::Compact);
    let mut page = Page::create(vec![0u8; PS], true, &mut NoLog).unwrap();
    let mut log = MtrLog::new();
    insert_row(&mut page, &index, 5, b"x", &mut log).unwrap();
    assert!(log
        .records()
        .iter()
        .any(|r| matches!(r, LogRecord::Write2 { offset, .. } if *offset == PAGE_HEADER + PAGE_N_RECS)));
    assert!(log.records().iter().any(|r| matches!(r, LogRecord::Memcpy { .. })));
    let json = serde_json::to_string(log.records()).unwrap();
    assert!(json.contains("Write2"));
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

#[test]
fn test_validation_report_json() {
    let index = index(RowFormat::Compact);
    let mut page = Page::create(vec![0u8; PS], true, &mut NoLog).unwrap();
    let mut log = MtrLog::new();
    for id in 0..30 {
        insert_row(&mut page, &index, id, b"abc", &mut log).unwrap();
    }
    let ok = report(&page, &index);
    assert!(ok.is_valid());
    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["n_recs"], 30);
    assert_eq!(json["issues"].as_array().unwrap().len(), 0);

    BigEndian::write_u16(&mut page.as_bytes_mut()[PAGE_HEADER + PAGE_N_HEAP..], 0x8000 | 40);
    let bad = report(&page, &index);
    assert!(bad.has(PageCheck::HeapCount));
    let json = serde_json::to_value(&bad).unwrap();
    assert_eq!(json["issues"][0]["check"], "HeapCount");
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Insert(u16, usize),
    Delete(u16),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u16..500, 0usize..40).prop_map(|(k, n)| Op::Insert(k, n)),
        2 => (0u16..500).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_directory_invariant(ops in proptest::collection::vec(op(), 1..300), comp in any::<bool>()) {
        let format = if comp { RowFormat::Compact } else { RowFormat::Redundant };
        let index = index(format);
        let mut log = MtrLog::new();
        let mut page = Page::create(vec![0u8; PS], comp, &mut log).unwrap();
        let mut model = BTreeSet::new();
        let name = [b'q'; 40];

        for op in ops {
            match op {
                Op::Insert(k, n) => {
                    let k = u32::from(k);
                    if model.contains(&k) {
                        continue;
                    }
                    match insert_row(&mut page, &index, k, &name[..n], &mut log) {
                        Ok(_) => {
                            model.insert(k);
                        }
                        Err(RecError::PageFull { .. }) => {}
                        Err(e) => panic!("insert failed: {}", e),
                    }
                }
                Op::Delete(k) => {
                    let k = u32::from(k);
                    prop_assert_eq!(delete_row(&mut page, &index, k, &mut log), model.remove(&k));
                }
            }
            assert_dir_invariant(&page);
        }

        let keys: Vec<u32> = page.user_recs().map(|r| key_of(&page, r)).collect();
        prop_assert_eq!(keys, model.iter().copied().collect::<Vec<_>>());
        prop_assert!(validate(&page, &index));

        let mut replica = vec![0u8; PS];
        log.apply(&mut replica);
        prop_assert_eq!(&replica[..], page.as_bytes());
    }
}
