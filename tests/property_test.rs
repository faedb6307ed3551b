//! Property tests for the record codec, offsets engine and externalizer.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use innorec::innodb::big_rec::{externalize, restore};
use innorec::innodb::constants::*;
use innorec::innodb::convert::{build_node_ptr, convert_tuple_to_record, converted_size};
use innorec::innodb::data::Tuple;
use innorec::innodb::dict::{Index, IndexBuilder, RowFormat};
use innorec::innodb::dtype::DataType;
use innorec::innodb::offsets::Offsets;
use innorec::innodb::page::PageSize;
use innorec::innodb::record::{Rec, RecStatus};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Kind {
    Int,
    Char,
    Varchar,
    Blob,
}

#[derive(Debug, Clone)]
struct Col {
    kind: Kind,
    nullable: bool,
    decl_len: u32,
    null: bool,
    len: usize,
    ext: bool,
}

impl Col {
    fn dtype(&self) -> DataType {
        let nn = !self.nullable;
        match self.kind {
            Kind::Int => DataType::int(4, nn),
            Kind::Char => DataType::char(self.decl_len, nn),
            Kind::Varchar => DataType::varchar(self.decl_len, nn),
            Kind::Blob => DataType::blob(nn),
        }
    }

    fn value(&self, i: usize) -> Option<Vec<u8>> {
        if self.nullable && self.null {
            return None;
        }
        let len = match self.kind {
            Kind::Int => 4,
            Kind::Char => self.decl_len as usize,
            Kind::Varchar => self.len.min(self.decl_len as usize),
            Kind::Blob => self.len,
        };
        Some((0..len).map(|j| (i * 31 + j) as u8).collect())
    }
}

fn col() -> impl Strategy<Value = Col> {
    (
        prop_oneof![Just(Kind::Int), Just(Kind::Char), Just(Kind::Varchar), Just(Kind::Blob)],
        any::<bool>(),
        1u32..300,
        any::<bool>(),
        0usize..200,
        any::<bool>(),
    )
        .prop_map(|(kind, nullable, decl_len, null, len, ext)| {
            let decl_len = match kind {
                Kind::Char => decl_len.min(40),
                _ => decl_len,
            };
            Col { kind, nullable, decl_len, null, len, ext }
        })
}

fn format() -> impl Strategy<Value = RowFormat> {
    prop_oneof![Just(RowFormat::Redundant), Just(RowFormat::Compact), Just(RowFormat::Dynamic)]
}

fn build_index(format: RowFormat, cols: &[Col]) -> Index {
    let mut b = IndexBuilder::new("gen", 99, format);
    for (i, c) in cols.iter().enumerate() {
        b = b.column(&format!("c{}", i), c.dtype());
    }
    b.build().unwrap()
}

/// Up to three long BLOB values become external fields: the value is kept
/// as a prefix followed by a 20-byte reference.
fn build_tuple<'a>(index: &Index, cols: &[Col], values: &'a [Option<Vec<u8>>]) -> (Tuple<'a>, usize) {
    let mut t = Tuple::new(cols.len());
    let mut n_ext = 0;
    for (i, (c, v)) in cols.iter().zip(values).enumerate() {
        let field = t.field_mut(i);
        match v {
            Some(v) => {
                field.set_data(v);
                if c.ext && matches!(c.kind, Kind::Blob) && v.len() >= BTR_EXTERN_FIELD_REF_SIZE && n_ext < 3 {
                    field.set_ext();
                    n_ext += 1;
                }
            }
            None => field.set_null(),
        }
    }
    t.set_types_from_index(index);
    (t, n_ext)
}

fn pack(index: &Index, t: &Tuple<'_>, n_ext: usize) -> (Vec<u8>, usize) {
    let size = converted_size(index, t, n_ext);
    let mut buf = vec![0xA5u8; size + 16];
    let origin = convert_tuple_to_record(&mut buf, index, t, n_ext);
    assert!(buf[size..].iter().all(|&b| b == 0xA5), "record written past its size");
    buf.truncate(size);
    (buf, origin)
}

/// Derive the node pointer of a leaf record and check it packs and decodes
/// to the key prefix followed by the child page number.
fn check_node_ptr(index: &Index, buf: &[u8], origin: usize) -> Result<(), TestCaseError> {
    let mut leaf = Offsets::new();
    leaf.compute(buf, origin, index, index.n_core_fields(), usize::MAX);

    let node_ptr = build_node_ptr(index, buf, origin, 0xBEEF, 0);
    let n_key = index.n_unique_in_tree_nonleaf();
    prop_assert_eq!(node_ptr.n_fields(), n_key + 1);

    let (nbuf, norigin) = pack(index, &node_ptr, 0);
    if index.is_comp() {
        prop_assert_eq!(Rec::new(&nbuf, norigin).status(), Some(RecStatus::NodePtr));
    }
    let mut offsets = Offsets::new();
    offsets.compute(&nbuf, norigin, index, 0, usize::MAX);
    prop_assert_eq!(offsets.n_fields(), n_key + 1);
    prop_assert_eq!(norigin + offsets.data_size(), nbuf.len());
    for i in 0..n_key {
        prop_assert_eq!(offsets.nth_field(&nbuf, norigin, i), leaf.nth_field(buf, origin, i));
        prop_assert!(!offsets.nth_extern(i));
    }
    prop_assert_eq!(offsets.nth_field(&nbuf, norigin, n_key), Some(&0xBEEFu32.to_be_bytes()[..]));
    Ok(())
}

/// Clustered index with `keys` as the primary key, `core` as the columns
/// present at creation, then `added` instantly added columns and an
/// optional instant drop of one core column.
fn build_instant_index(
    format: RowFormat,
    keys: &[(bool, usize)],
    core: &[Col],
    added: &[(Col, bool)],
    drop: Option<usize>,
) -> Index {
    let mut b = IndexBuilder::new("PRIMARY", 3, format).clustered(keys.len());
    for (i, &(varchar, _)) in keys.iter().enumerate() {
        let dtype = if varchar { DataType::varchar(30, true) } else { DataType::int(4, true) };
        b = b.column(&format!("k{}", i), dtype);
    }
    b = b.system_columns();
    for (i, c) in core.iter().enumerate() {
        b = b.column(&format!("c{}", i), c.dtype());
    }
    let mut index = b.build().unwrap();
    for (i, (c, has_default)) in added.iter().enumerate() {
        let def_val = (*has_default || !c.nullable).then(|| default_of(c));
        index.add_instant_column(&format!("a{}", i), c.dtype(), def_val).unwrap();
    }
    if let Some(seed) = drop {
        if !core.is_empty() {
            let n = index.first_user_field() + seed % core.len();
            index.drop_instant_column(n).unwrap();
        }
    }
    index
}

fn default_of(c: &Col) -> Vec<u8> {
    let c = Col { null: false, ..c.clone() };
    c.value(999).unwrap_or_default()
}

fn key_value(i: usize, &(varchar, len): &(bool, usize)) -> Vec<u8> {
    if varchar {
        (0..len).map(|j| b'a' + ((i + j) % 26) as u8).collect()
    } else {
        vec![0x80, 0, 0, i as u8]
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_size_and_roundtrip(format in format(), cols in proptest::collection::vec(col(), 1..64)) {
        let index = build_index(format, &cols);
        let values: Vec<Option<Vec<u8>>> = cols.iter().enumerate().map(|(i, c)| c.value(i)).collect();
        let (t, n_ext) = build_tuple(&index, &cols, &values);

        let (buf, origin) = pack(&index, &t, n_ext);
        let size = buf.len();

        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        prop_assert_eq!(offsets.n_fields(), cols.len());
        prop_assert_eq!(origin + offsets.data_size(), size);
        prop_assert_eq!(offsets.extra_size(), origin);
        prop_assert_eq!(offsets.n_extern(), n_ext);
        prop_assert!(offsets.validate_record(&buf, origin, 65536));

        let mut prev_end = 0;
        for i in 0..cols.len() {
            prop_assert!(offsets.nth_end(i) >= prev_end);
            prev_end = offsets.nth_end(i);
            prop_assert!(!(offsets.nth_sql_null(i) && offsets.nth_extern(i)));
            prop_assert_eq!(offsets.nth_sql_null(i), values[i].is_none());
            prop_assert_eq!(offsets.nth_extern(i), t.field(i).is_ext());
            prop_assert_eq!(offsets.nth_field(&buf, origin, i), values[i].as_deref());
        }

        if n_ext == 0 {
            check_node_ptr(&index, &buf, origin)?;
        }
    }

    #[test]
    fn prop_instant_roundtrip(
        format in format(),
        keys in proptest::collection::vec((any::<bool>(), 0usize..30), 1..4),
        core in proptest::collection::vec(col(), 0..12),
        added in proptest::collection::vec((col(), any::<bool>()), 0..6),
        stored_seed in any::<usize>(),
        drop in proptest::option::of(any::<usize>()),
    ) {
        let index = build_instant_index(format, &keys, &core, &added, drop);
        let n_stored = stored_seed % (added.len() + 1);

        let mut values: Vec<Option<Vec<u8>>> = keys.iter().enumerate().map(|(i, k)| Some(key_value(i, k))).collect();
        values.push(Some(vec![0; 6]));
        values.push(Some(vec![0x80, 0, 0, 0, 0, 0, 0]));
        values.extend(core.iter().enumerate().map(|(i, c)| c.value(i)));
        values.extend(added[..n_stored].iter().enumerate().map(|(i, (c, _))| c.value(100 + i)));

        let mut t = Tuple::new(values.len());
        for (i, v) in values.iter().enumerate() {
            match v {
                Some(v) => t.field_mut(i).set_data(v),
                None => t.field_mut(i).set_null(),
            }
        }
        t.set_types_from_index(&index);

        let (buf, origin) = pack(&index, &t, 0);
        if index.is_comp() {
            let expected = if n_stored > 0 { RecStatus::Instant } else { RecStatus::Ordinary };
            prop_assert_eq!(Rec::new(&buf, origin).status(), Some(expected));
        } else {
            prop_assert_eq!(Rec::new(&buf, origin).n_fields_old(), values.len());
        }

        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        prop_assert_eq!(offsets.n_fields(), index.n_fields());
        prop_assert_eq!(origin + offsets.data_size(), buf.len());
        prop_assert!(offsets.validate_record(&buf, origin, 65536));
        prop_assert_eq!(offsets.any_default(), (0..index.n_fields()).any(|i| offsets.nth_default(i)));

        let mut prev_end = 0;
        for i in 0..index.n_fields() {
            prop_assert!(offsets.nth_end(i) >= prev_end);
            prev_end = offsets.nth_end(i);
            prop_assert!(!(offsets.nth_sql_null(i) && offsets.nth_extern(i)));
            let expected = if i < values.len() {
                prop_assert!(!offsets.nth_default(i));
                values[i].as_deref()
            } else {
                index.instant_field_value(i)
            };
            prop_assert_eq!(offsets.nth_field_or_default(&buf, origin, &index, i), expected);
        }

        check_node_ptr(&index, &buf, origin)?;
    }

    #[test]
    fn prop_externalize_restore(
        format in format(),
        lens in proptest::collection::vec(0usize..12_000, 1..6),
        small in 0usize..100,
    ) {
        let mut b = IndexBuilder::new("PRIMARY", 1, format)
            .clustered(1)
            .column("id", DataType::int(4, true))
            .system_columns()
            .column("title", DataType::varchar(100, false));
        for i in 0..lens.len() {
            b = b.column(&format!("b{}", i), DataType::blob(false));
        }
        let index = b.build().unwrap();

        let title = vec![b't'; small];
        let blobs: Vec<Vec<u8>> = lens.iter().enumerate().map(|(i, &n)| vec![i as u8 + 1; n]).collect();
        let mut t = Tuple::new(4 + blobs.len());
        t.field_mut(0).set_data(&[0x80, 0, 0, 1]);
        t.field_mut(1).set_data(&[0; 6]);
        t.field_mut(2).set_data(&[0x80, 0, 0, 0, 0, 0, 0]);
        t.field_mut(3).set_data(&title);
        for (i, v) in blobs.iter().enumerate() {
            t.field_mut(4 + i).set_data(v);
        }
        t.set_types_from_index(&index);
        let original = t.to_owned_tuple();
        let original_size = converted_size(&index, &t, 0);

        let max = PageSize::default().max_rec_size(index.is_comp());
        let big = externalize(&index, &mut t, max);
        prop_assume!(big.is_some());
        let big = big.unwrap();
        prop_assert!(converted_size(&index, &t, t.n_ext()) <= max);
        prop_assert_eq!(t.n_ext(), big.n_fields());
        prop_assert_eq!(big.is_empty(), original_size <= max);

        restore(&mut t, big);
        prop_assert_eq!(t.n_ext(), 0);
        for i in 0..t.n_fields() {
            prop_assert_eq!(t.field(i).bytes(), original.field(i).bytes());
        }
        prop_assert_eq!(converted_size(&index, &t, 0), original_size);
    }
}
