//! Field, tuple and record comparison.
//!
//! SQL NULL sorts below every value. Collations are not modelled: every
//! character type compares with binary PAD SPACE semantics, where the
//! shorter value is extended with spaces (0x20). Binary strings, integers
//! (stored big-endian with the sign bit flipped) and system columns compare
//! as bytes, then by length. Descending index fields invert the result.

use std::cmp::Ordering;

use byteorder::{ByteOrder, LittleEndian};

use crate::innodb::constants::REC_INFO_MIN_REC_FLAG;
use crate::innodb::data::Tuple;
use crate::innodb::dict::Index;
use crate::innodb::dtype::*;
use crate::innodb::offsets::Offsets;
use crate::innodb::record::Rec;

/// Compare textual DECIMAL values (optional leading spaces and sign,
/// leading zeros ignored).
fn cmp_decimal(mut a: &[u8], mut b: &[u8]) -> Ordering {
    while a.first() == Some(&b' ') {
        a = &a[1..];
    }
    while b.first() == Some(&b' ') {
        b = &b[1..];
    }

    let swap = if a.first() == Some(&b'-') {
        if b.first() != Some(&b'-') {
            return Ordering::Less;
        }
        a = &a[1..];
        b = &b[1..];
        true
    } else {
        if b.first() == Some(&b'-') {
            return Ordering::Greater;
        }
        false
    };

    while matches!(a.first(), Some(b'+') | Some(b'0')) {
        a = &a[1..];
    }
    while matches!(b.first(), Some(b'+') | Some(b'0')) {
        b = &b[1..];
    }

    let ord = a.len().cmp(&b.len()).then_with(|| a.cmp(b));
    if swap {
        ord.reverse()
    } else {
        ord
    }
}

/// Bytes, then trailing bytes against spaces.
fn cmp_pad_space(a: &[u8], b: &[u8]) -> Ordering {
    let common = a.len().min(b.len());
    a[..common].cmp(&b[..common]).then_with(|| {
        let (rest, sign) = if a.len() > common {
            (&a[common..], Ordering::Greater)
        } else {
            (&b[common..], Ordering::Less)
        };
        match rest.iter().find(|&&c| c != b' ') {
            Some(&c) if c > b' ' => sign,
            Some(_) => sign.reverse(),
            None => Ordering::Equal,
        }
    })
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Compare two minimum bounding rectangles (xmin, xmax, ymin, ymax as
/// little-endian doubles) by their lower corner, then their upper corner.
fn cmp_mbr(a: &[u8], b: &[u8]) -> Ordering {
    let x = |d: &[u8], i: usize| LittleEndian::read_f64(&d[i * 8..]);
    cmp_f64(x(a, 0), x(b, 0))
        .then_with(|| cmp_f64(x(a, 2), x(b, 2)))
        .then_with(|| cmp_f64(x(a, 1), x(b, 1)))
        .then_with(|| cmp_f64(x(a, 3), x(b, 3)))
}

/// Compare two values of type `dtype`. `None` is SQL NULL.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use innorec::innodb::cmp::cmp_data;
/// use innorec::innodb::dtype::DataType;
///
/// let t = DataType::varchar(10, false);
/// assert_eq!(cmp_data(&t, false, Some(b"ab"), Some(b"ab  ")), Ordering::Equal);
/// assert_eq!(cmp_data(&t, false, None, Some(b"")), Ordering::Less);
/// assert_eq!(cmp_data(&t, true, Some(b"a"), Some(b"b")), Ordering::Greater);
///
/// let b = DataType::binary(10, false);
/// assert_eq!(cmp_data(&b, false, Some(b"ab"), Some(b"ab  ")), Ordering::Less);
/// ```
pub fn cmp_data(dtype: &DataType, descending: bool, a: Option<&[u8]>, b: Option<&[u8]>) -> Ordering {
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp_values(dtype, a, b),
    };
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

fn cmp_values(dtype: &DataType, a: &[u8], b: &[u8]) -> Ordering {
    match dtype.mtype {
        DATA_DECIMAL => cmp_decimal(a, b),
        DATA_DOUBLE => cmp_f64(LittleEndian::read_f64(a), LittleEndian::read_f64(b)),
        DATA_FLOAT => {
            let (x, y) = (LittleEndian::read_f32(a), LittleEndian::read_f32(b));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        DATA_FIXBINARY | DATA_BINARY
            if dtype.charset_coll() != DATA_MYSQL_BINARY_CHARSET_COLL =>
        {
            cmp_pad_space(a, b)
        }
        DATA_GEOMETRY if dtype.prtype & DATA_GIS_MBR != 0 => cmp_mbr(a, b),
        DATA_BLOB if dtype.prtype & DATA_BINARY_TYPE == 0 => cmp_pad_space(a, b),
        DATA_VARMYSQL | DATA_MYSQL | DATA_VARCHAR | DATA_CHAR => cmp_pad_space(a, b),
        _ => a.cmp(b),
    }
}

/// Compare a tuple with a record, starting after `*matched_fields` fields
/// known to be equal. On return `*matched_fields` holds the number of
/// fields that compared equal. Only the first `n_fields_cmp` tuple fields
/// take part.
///
/// A record carrying the min-rec flag sorts before every tuple that does
/// not carry it.
pub fn cmp_dtuple_rec_with_match(
    tuple: &Tuple<'_>,
    buf: &[u8],
    origin: usize,
    index: &Index,
    offsets: &Offsets,
    matched_fields: &mut usize,
) -> Ordering {
    let n_cmp = tuple.n_fields_cmp();
    let mut cur = *matched_fields;
    debug_assert!(cur <= n_cmp);
    debug_assert!(n_cmp <= offsets.n_fields());

    if cur == 0 {
        let rec_info = Rec::new(buf, origin).info_bits(offsets.comp());
        let tup_info = tuple.info_bits();
        if rec_info & REC_INFO_MIN_REC_FLAG != 0 {
            return if tup_info & REC_INFO_MIN_REC_FLAG != 0 {
                Ordering::Equal
            } else {
                Ordering::Greater
            };
        } else if tup_info & REC_INFO_MIN_REC_FLAG != 0 {
            return Ordering::Less;
        }
    }

    let mut ret = Ordering::Equal;
    while cur < n_cmp {
        debug_assert!(!offsets.nth_extern(cur));
        debug_assert!(!offsets.nth_default(cur));
        let field = tuple.field(cur);
        debug_assert!(!field.is_ext());
        ret = cmp_data(
            &field.dtype,
            index.field(cur).descending,
            field.bytes(),
            offsets.nth_field(buf, origin, cur),
        );
        if ret != Ordering::Equal {
            break;
        }
        cur += 1;
    }
    *matched_fields = cur;
    ret
}

/// Compare a tuple with a record.
pub fn cmp_dtuple_rec(
    tuple: &Tuple<'_>,
    buf: &[u8],
    origin: usize,
    index: &Index,
    offsets: &Offsets,
) -> Ordering {
    let mut matched = 0;
    cmp_dtuple_rec_with_match(tuple, buf, origin, index, offsets, &mut matched)
}

/// Returns true if the fields of `tuple` equal the first fields of the record.
pub fn cmp_dtuple_is_prefix_of_rec(
    tuple: &Tuple<'_>,
    buf: &[u8],
    origin: usize,
    index: &Index,
    offsets: &Offsets,
) -> bool {
    let mut matched = 0;
    debug_assert!(tuple.n_fields() <= offsets.n_fields());
    cmp_dtuple_rec_with_match(tuple, buf, origin, index, offsets, &mut matched);
    matched == tuple.n_fields()
}

/// One side of a record comparison.
#[derive(Debug, Clone, Copy)]
pub struct RecRef<'a> {
    pub buf: &'a [u8],
    pub origin: usize,
    pub offsets: &'a Offsets,
}

/// Compare two records of `index` on their first common fields, up to the
/// fields that determine the position in the tree.
///
/// With `nulls_unequal`, two NULLs compare as less (statistics sampling).
/// `matched_fields`, when given, receives the number of equal fields.
pub fn cmp_rec_rec(
    rec1: RecRef<'_>,
    rec2: RecRef<'_>,
    index: &Index,
    nulls_unequal: bool,
    matched_fields: Option<&mut usize>,
) -> Ordering {
    let comp = rec1.offsets.comp();
    debug_assert_eq!(comp, rec2.offsets.comp());
    let info1 = Rec::new(rec1.buf, rec1.origin).info_bits(comp);
    let info2 = Rec::new(rec2.buf, rec2.origin).info_bits(comp);
    let mut cur = 0;

    let ret = if info1 & REC_INFO_MIN_REC_FLAG != 0 {
        if info2 & REC_INFO_MIN_REC_FLAG != 0 {
            Ordering::Equal
        } else {
            Ordering::Less
        }
    } else if info2 & REC_INFO_MIN_REC_FLAG != 0 {
        Ordering::Greater
    } else {
        let n_fields = rec1
            .offsets
            .n_fields()
            .min(rec2.offsets.n_fields())
            .min(index.n_unique_in_tree());
        let mut ret = Ordering::Equal;
        while cur < n_fields {
            let field = index.field(cur);
            let mut dtype = field.col.dtype;
            if index.is_spatial() && cur == 0 {
                dtype.prtype |= DATA_GIS_MBR;
            }
            debug_assert!(!rec1.offsets.nth_extern(cur) && !rec2.offsets.nth_extern(cur));
            let a = rec1.offsets.nth_field(rec1.buf, rec1.origin, cur);
            let b = rec2.offsets.nth_field(rec2.buf, rec2.origin, cur);
            if nulls_unequal && a.is_none() && b.is_none() {
                ret = Ordering::Less;
                break;
            }
            ret = cmp_data(&dtype, field.descending, a, b);
            if ret != Ordering::Equal {
                break;
            }
            cur += 1;
        }
        ret
    };

    if let Some(m) = matched_fields {
        *m = cur;
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::convert::{convert_tuple_to_record, converted_size};
    use crate::innodb::dict::{IndexBuilder, RowFormat};

    #[test]
    fn test_decimal() {
        assert_eq!(cmp_decimal(b"  12.5", b"12.5"), Ordering::Equal);
        assert_eq!(cmp_decimal(b"-3", b"2"), Ordering::Less);
        assert_eq!(cmp_decimal(b"-3", b"-2"), Ordering::Less);
        assert_eq!(cmp_decimal(b"-10", b"-9"), Ordering::Less);
        assert_eq!(cmp_decimal(b"-9", b"-10"), Ordering::Greater);
        assert_eq!(cmp_decimal(b"-0010", b"-10"), Ordering::Equal);
        assert_eq!(cmp_decimal(b"+007", b"7"), Ordering::Equal);
        assert_eq!(cmp_decimal(b"100", b"99"), Ordering::Greater);
    }

    #[test]
    fn test_pad_space() {
        assert_eq!(cmp_pad_space(b"a", b"a   "), Ordering::Equal);
        assert_eq!(cmp_pad_space(b"a", b"a  !"), Ordering::Less);
        assert_eq!(cmp_pad_space(b"a\x01", b"a"), Ordering::Less);
        assert_eq!(cmp_pad_space(b"b", b"abc"), Ordering::Greater);
    }

    #[test]
    fn test_numeric_types() {
        let d = DataType::new(DATA_DOUBLE, 0, 8);
        let a = 1.5f64.to_le_bytes();
        let b = (-2.0f64).to_le_bytes();
        assert_eq!(cmp_data(&d, false, Some(&a), Some(&b)), Ordering::Greater);
        let f = DataType::new(DATA_FLOAT, 0, 4);
        let a = 1.0f32.to_le_bytes();
        let b = 3.0f32.to_le_bytes();
        assert_eq!(cmp_data(&f, false, Some(&a), Some(&b)), Ordering::Less);
        let i = DataType::int(4, true);
        assert_eq!(
            cmp_data(&i, false, Some(&[0x7F, 0xFF, 0xFF, 0xFF]), Some(&[0x80, 0, 0, 0])),
            Ordering::Less
        );
    }

    #[test]
    fn test_binary_blob_compares_length() {
        let t = DataType::blob(false);
        assert_eq!(cmp_data(&t, false, Some(b"ab"), Some(b"ab ")), Ordering::Less);
        let text = DataType::text(false);
        assert_eq!(cmp_data(&text, false, Some(b"ab"), Some(b"ab ")), Ordering::Equal);
    }

    #[test]
    fn test_tuple_vs_record() {
        let index = IndexBuilder::new("k", 3, RowFormat::Compact)
            .column("a", DataType::varchar(10, false))
            .descending_column("b", DataType::int(4, true))
            .build()
            .unwrap();
        let mut t = Tuple::new(2);
        t.field_mut(0).set_data(b"m");
        t.field_mut(1).set_data(&[0x80, 0, 0, 5]);
        t.set_types_from_index(&index);
        let mut buf = vec![0u8; converted_size(&index, &t, 0)];
        let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);

        assert_eq!(cmp_dtuple_rec(&t, &buf, origin, &index, &offsets), Ordering::Equal);

        let mut search = Tuple::new(2);
        search.field_mut(0).set_data(b"m");
        search.field_mut(1).set_data(&[0x80, 0, 0, 9]);
        search.set_types_from_index(&index);
        let mut matched = 0;
        let ord = cmp_dtuple_rec_with_match(&search, &buf, origin, &index, &offsets, &mut matched);
        // descending second field: 9 sorts before 5
        assert_eq!(ord, Ordering::Less);
        assert_eq!(matched, 1);

        search.set_n_fields_cmp(1);
        assert!(!cmp_dtuple_is_prefix_of_rec(&search, &buf, origin, &index, &offsets));
        search.set_n_fields(1);
        assert!(cmp_dtuple_is_prefix_of_rec(&search, &buf, origin, &index, &offsets));

        let mut min = Tuple::new(1);
        min.field_mut(0).set_data(b"zzz");
        min.set_types_from_index(&index);
        min.set_info_bits(REC_INFO_MIN_REC_FLAG);
        assert_eq!(cmp_dtuple_rec(&min, &buf, origin, &index, &offsets), Ordering::Less);
    }

    #[test]
    fn test_rec_rec() {
        let index = IndexBuilder::new("k", 3, RowFormat::Redundant)
            .column("a", DataType::varchar(10, false))
            .build()
            .unwrap();
        let build = |v: Option<&[u8]>| {
            let mut t = Tuple::new(1);
            match v {
                Some(d) => t.field_mut(0).set_owned(d.to_vec()),
                None => t.field_mut(0).set_null(),
            }
            t.set_types_from_index(&index);
            let mut buf = vec![0u8; converted_size(&index, &t, 0)];
            let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
            let mut offsets = Offsets::new();
            offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
            (buf, origin, offsets)
        };
        let (b1, o1, f1) = build(Some(b"abc"));
        let (b2, o2, f2) = build(Some(b"abd"));
        let (b3, o3, f3) = build(None);
        let r1 = RecRef { buf: &b1, origin: o1, offsets: &f1 };
        let r2 = RecRef { buf: &b2, origin: o2, offsets: &f2 };
        let r3 = RecRef { buf: &b3, origin: o3, offsets: &f3 };
        let mut matched = 7;
        assert_eq!(cmp_rec_rec(r1, r2, &index, false, Some(&mut matched)), Ordering::Less);
        assert_eq!(matched, 0);
        assert_eq!(cmp_rec_rec(r3, r1, &index, false, None), Ordering::Less);
        assert_eq!(cmp_rec_rec(r3, r3, &index, false, None), Ordering::Equal);
        assert_eq!(cmp_rec_rec(r3, r3, &index, true, None), Ordering::Less);
    }
}
