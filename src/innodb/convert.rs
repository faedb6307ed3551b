//! Tuple to record conversion and back.
//!
//! The size computation and the writer share their per-field rules (null
//! bitmap, length bytes, fixed-length fields) through the index column
//! types, so [`converted_size`] always equals the number of bytes that
//! [`convert_tuple_to_record`] writes.
//!
//! COMPACT-family layout, low to high addresses:
//!
//! ```text
//! [lengths, last var field first][null bitmap][n_add 1-2B]?[5B header] origin [data]
//! ```
//!
//! REDUNDANT layout:
//!
//! ```text
//! [end offsets, last field first, 1 or 2 bytes each][6B header] origin [data]
//! ```

use crate::innodb::constants::*;
use crate::innodb::data::{Field, Tuple};
use crate::innodb::dict::{Index, DICT_INDEX_SPATIAL_NODEPTR_SIZE};
use crate::innodb::dtype::{DataType, DATA_MBR_LEN};
use crate::innodb::offsets::Offsets;
use crate::innodb::record::{Rec, RecMut, RecStatus};

/// Bytes taken by the added-field count of an INSTANT record.
fn n_add_field_len(n_add: usize) -> usize {
    if n_add < 0x80 {
        1
    } else {
        2
    }
}

fn field_len(field: &Field<'_>) -> Option<usize> {
    assert!(!field.is_default(), "default field in a tuple being converted");
    field.len()
}

/// Status to encode for a tuple: an ORDINARY tuple with more than the core
/// fields becomes INSTANT.
fn comp_status(index: &Index, tuple: &Tuple<'_>) -> RecStatus {
    match tuple.status() {
        REC_STATUS_ORDINARY => {
            debug_assert!(!tuple.is_metadata());
            if tuple.n_fields() > index.n_core_fields() {
                debug_assert!(index.is_instant());
                RecStatus::Instant
            } else {
                RecStatus::Ordinary
            }
        }
        REC_STATUS_INSTANT => RecStatus::Instant,
        REC_STATUS_NODE_PTR => RecStatus::NodePtr,
        s => panic!("cannot convert a tuple with record status {}", s),
    }
}

/// Extra (header) size and total size of a COMPACT-family record built
/// from `fields`.
fn comp_prefix_size<const MBLOB: bool, const REDUNDANT_TEMP: bool>(
    index: &Index,
    fields: &[Field<'_>],
    status: RecStatus,
    temp: bool,
) -> (usize, usize) {
    let n_fields = fields.len();
    debug_assert!(n_fields > 0);
    let n_core = index.n_core_fields();
    let mut extra = if temp { 0 } else { REC_N_NEW_EXTRA_BYTES };

    if MBLOB {
        debug_assert!(index.is_instant());
        debug_assert_eq!(status, RecStatus::Instant);
        debug_assert_eq!(n_fields, index.n_fields() + 1);
        extra += index.n_nullable().div_ceil(8) + n_add_field_len(n_fields - 1 - n_core);
    } else if status == RecStatus::Instant && (!temp || n_fields > n_core) {
        extra += index.get_n_nullable(n_fields).div_ceil(8) + n_add_field_len(n_fields - 1 - n_core);
    } else {
        debug_assert!(n_fields <= n_core || status == RecStatus::NodePtr);
        extra += if REDUNDANT_TEMP {
            index.n_nullable().div_ceil(8)
        } else {
            index.n_core_null_bytes()
        };
    }

    let temp = temp && !index.is_comp();
    let first_user_field = if MBLOB { index.first_user_field() } else { usize::MAX };
    let mut data = 0;
    let mut fields = fields.iter();
    let mut i = 0;

    while let Some(mut dfield) = fields.next() {
        if i == first_user_field {
            data += BTR_EXTERN_FIELD_REF_SIZE;
            match fields.next() {
                Some(next) => dfield = next,
                None => break,
            }
        }
        let ifield = index.field(i);
        i += 1;

        let Some(len) = field_len(dfield) else {
            debug_assert!(ifield.col.is_nullable());
            continue;
        };

        let mut fixed_len = ifield.fixed_len;
        if temp && fixed_len > 0 && ifield.col.dtype.fixed_size(true) == 0 {
            fixed_len = 0;
        }

        if fixed_len > 0 {
            debug_assert!(len <= fixed_len as usize);
        } else if dfield.is_ext() {
            debug_assert!(ifield.col.dtype.is_big_col());
            extra += 2;
        } else if len < 128 || !ifield.col.dtype.is_big_col() {
            extra += 1;
        } else {
            extra += 2;
        }
        data += len;
    }

    (extra, extra + data)
}

/// Header size of a REDUNDANT record.
fn old_extra_size(data_size: usize, n_fields: usize, n_ext: usize) -> usize {
    if n_ext == 0 && data_size <= REC_1BYTE_OFFS_LIMIT {
        REC_N_OLD_EXTRA_BYTES + n_fields
    } else {
        REC_N_OLD_EXTRA_BYTES + 2 * n_fields
    }
}

/// Extra size and total size of the record `convert_tuple_to_record` builds.
fn size_and_extra(index: &Index, tuple: &Tuple<'_>, n_ext: usize) -> (usize, usize) {
    debug_assert!(tuple.n_fields() > 0);
    if !index.is_comp() {
        let data_size = tuple.data_size(false);
        let extra = old_extra_size(data_size, tuple.n_fields(), n_ext);
        return (extra, extra + data_size);
    }

    let fields = tuple.fields();
    match comp_status(index, tuple) {
        RecStatus::NodePtr => {
            debug_assert_eq!(fields.len() - 1, index.n_unique_in_tree_nonleaf());
            debug_assert_eq!(fields[fields.len() - 1].len(), Some(REC_NODE_PTR_SIZE));
            let (extra, size) = comp_prefix_size::<false, false>(
                index,
                &fields[..fields.len() - 1],
                RecStatus::NodePtr,
                false,
            );
            (extra, size + REC_NODE_PTR_SIZE)
        }
        status if tuple.is_alter_metadata() => {
            comp_prefix_size::<true, false>(index, fields, status, false)
        }
        status => {
            debug_assert!(fields.len() <= index.n_fields());
            comp_prefix_size::<false, false>(index, fields, status, false)
        }
    }
}

/// Size in bytes of the record that `tuple` converts to, including the
/// header. `n_ext` is the number of externally stored fields; it selects
/// 2-byte end offsets in the REDUNDANT format.
///
/// # Examples
///
/// ```
/// use innorec::innodb::convert::converted_size;
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
///
/// let index = IndexBuilder::new("k", 2, RowFormat::Compact)
///     .column("a", DataType::int(4, true))
///     .column("b", DataType::varchar(20, false))
///     .build()
///     .unwrap();
/// let mut t = Tuple::new(2);
/// t.field_mut(0).set_data(&[0x80, 0, 0, 1]);
/// t.field_mut(1).set_data(b"hello");
/// t.set_types_from_index(&index);
///
/// // 5 header + 1 null bitmap + 1 length byte + 4 + 5 data
/// assert_eq!(converted_size(&index, &t, 0), 16);
/// ```
pub fn converted_size(index: &Index, tuple: &Tuple<'_>, n_ext: usize) -> usize {
    size_and_extra(index, tuple, n_ext).1
}

/// Header size of the record that `tuple` converts to.
pub fn converted_extra_size(index: &Index, tuple: &Tuple<'_>, n_ext: usize) -> usize {
    size_and_extra(index, tuple, n_ext).0
}

/// Write the added-field count below `*nulls_back` and move past it.
fn write_n_add_field(buf: &mut [u8], origin: usize, nulls_back: &mut usize, n_add: usize) {
    debug_assert!(n_add < REC_MAX_N_FIELDS);
    if n_add < 0x80 {
        buf[origin - *nulls_back] = n_add as u8;
        *nulls_back += 1;
    } else {
        buf[origin - *nulls_back] = n_add as u8 | 0x80;
        *nulls_back += 1;
        buf[origin - *nulls_back] = (n_add >> 7) as u8;
        *nulls_back += 1;
    }
}

/// Write a COMPACT-family record whose origin is at `origin`. The header
/// bytes below the origin must already be sized by `comp_prefix_size`.
fn convert_comp<const MBLOB: bool, const REDUNDANT_TEMP: bool>(
    buf: &mut [u8],
    origin: usize,
    index: &Index,
    fields: &[Field<'_>],
    status: RecStatus,
    mut temp: bool,
) {
    let n_fields = fields.len();
    debug_assert!(n_fields > 0);
    let n_core = index.n_core_fields();
    let mut nulls_back = if temp { 1 } else { REC_N_NEW_EXTRA_BYTES + 1 };
    let mut n_node_ptr_field = usize::MAX;
    let lens_start;

    if MBLOB {
        debug_assert!(!temp);
        debug_assert!(index.is_instant());
        debug_assert_eq!(n_fields, index.n_fields() + 1);
        write_n_add_field(buf, origin, &mut nulls_back, n_fields - 1 - n_core);
        let mut rec = RecMut::new(buf, origin);
        rec.set_heap_no(true, PAGE_HEAP_NO_USER_LOW);
        rec.set_status(RecStatus::Instant);
        lens_start = nulls_back + index.n_nullable().div_ceil(8);
    } else {
        match status {
            RecStatus::Instant | RecStatus::Ordinary => {
                if status == RecStatus::Instant {
                    debug_assert!(n_fields > n_core);
                    write_n_add_field(buf, origin, &mut nulls_back, n_fields - 1 - n_core);
                }
                debug_assert!(n_fields <= index.n_fields());
                if !temp {
                    let mut rec = RecMut::new(buf, origin);
                    rec.set_heap_no(true, PAGE_HEAP_NO_USER_LOW);
                    rec.set_status(if n_fields == n_core {
                        RecStatus::Ordinary
                    } else {
                        RecStatus::Instant
                    });
                }
                if index.is_comp() {
                    temp = false;
                }
                let null_bytes = if index.is_instant() {
                    index.get_n_nullable(n_fields).div_ceil(8)
                } else {
                    index.n_nullable().div_ceil(8)
                };
                lens_start = nulls_back + null_bytes;
            }
            RecStatus::NodePtr => {
                debug_assert!(!temp);
                let mut rec = RecMut::new(buf, origin);
                rec.set_heap_no(true, PAGE_HEAP_NO_USER_LOW);
                rec.set_status(RecStatus::NodePtr);
                debug_assert_eq!(n_fields - 1, index.n_unique_in_tree_nonleaf());
                n_node_ptr_field = n_fields - 1;
                lens_start = nulls_back + index.n_core_null_bytes();
            }
            RecStatus::Infimum | RecStatus::Supremum => {
                panic!("infimum and supremum are not converted from tuples")
            }
        }
    }

    // Clear the null bitmap.
    buf[origin + 1 - lens_start..origin + 1 - nulls_back].fill(0);

    let mut lens_back = lens_start;
    let mut null_mask: u32 = 1;
    let mut end = origin;
    let first_user_field = if MBLOB { index.first_user_field() } else { usize::MAX };
    let mut fields = fields.iter();
    let mut i = 0;

    while let Some(mut dfield) = fields.next() {
        if MBLOB {
            if i == first_user_field {
                let data = dfield.bytes().unwrap_or_default();
                debug_assert_eq!(data.len(), BTR_EXTERN_FIELD_REF_SIZE);
                debug_assert!(dfield.is_ext());
                buf[end..end + data.len()].copy_from_slice(data);
                end += data.len();
                match fields.next() {
                    Some(next) => dfield = next,
                    None => break,
                }
            }
        } else if i == n_node_ptr_field {
            let data = dfield.bytes().unwrap_or_default();
            debug_assert_eq!(data.len(), REC_NODE_PTR_SIZE);
            buf[end..end + REC_NODE_PTR_SIZE].copy_from_slice(&data[..REC_NODE_PTR_SIZE]);
            break;
        }

        let ifield = index.field(i);
        i += 1;
        let len = field_len(dfield);

        if ifield.col.is_nullable() {
            if null_mask & 0xFF == 0 {
                nulls_back += 1;
                null_mask = 1;
            }
            if len.is_none() {
                buf[origin - nulls_back] |= null_mask as u8;
                null_mask <<= 1;
                continue;
            }
            null_mask <<= 1;
        }
        let Some(len) = len else {
            panic!("SQL NULL in NOT NULL field {}", ifield.col.name);
        };

        let mut fixed_len = ifield.fixed_len;
        if temp && fixed_len > 0 && ifield.col.dtype.fixed_size(true) == 0 {
            fixed_len = 0;
        }

        if fixed_len > 0 {
            debug_assert!(len <= fixed_len as usize);
            debug_assert!(!dfield.is_ext());
        } else if dfield.is_ext() {
            debug_assert!(ifield.col.dtype.is_big_col());
            debug_assert!(len <= REC_ANTELOPE_MAX_INDEX_COL_LEN + BTR_EXTERN_FIELD_REF_SIZE);
            buf[origin - lens_back] = (len >> 8) as u8 | 0xC0;
            buf[origin - lens_back - 1] = len as u8;
            lens_back += 2;
        } else if len < 128 || !ifield.col.dtype.is_big_col() {
            buf[origin - lens_back] = len as u8;
            lens_back += 1;
        } else {
            debug_assert!(len < 16384);
            buf[origin - lens_back] = (len >> 8) as u8 | 0x80;
            buf[origin - lens_back - 1] = len as u8;
            lens_back += 2;
        }

        if let Some(data) = dfield.bytes() {
            buf[end..end + len].copy_from_slice(data);
        }
        end += len;
    }
}

/// Write a REDUNDANT record whose origin is at `origin`.
fn convert_old(buf: &mut [u8], origin: usize, tuple: &Tuple<'_>, one_byte_offs: bool) {
    let mut rec = RecMut::new(buf, origin);
    rec.set_n_fields_old(tuple.n_fields());
    rec.set_info_bits(false, tuple.info_bits());
    rec.set_heap_no(false, PAGE_HEAP_NO_USER_LOW);
    rec.set_one_byte_offs_flag(one_byte_offs);

    let mut end = 0;
    for (i, field) in tuple.fields().iter().enumerate() {
        let info = match field_len(field) {
            None => {
                let len = field.dtype.sql_null_size(false) as usize;
                buf[origin + end..origin + end + len].fill(0);
                end += len;
                if one_byte_offs {
                    end as u16 | REC_1BYTE_SQL_NULL_MASK
                } else {
                    end as u16 | REC_2BYTE_SQL_NULL_MASK
                }
            }
            Some(len) => {
                if let Some(data) = field.bytes() {
                    buf[origin + end..origin + end + len].copy_from_slice(data);
                }
                end += len;
                if !one_byte_offs && field.is_ext() {
                    end as u16 | REC_2BYTE_EXTERN_MASK
                } else {
                    end as u16
                }
            }
        };
        let mut rec = RecMut::new(buf, origin);
        if one_byte_offs {
            rec.set_field_end_info_1(i, info);
        } else {
            rec.set_field_end_info_2(i, info);
        }
    }
}

/// Build the record for `tuple` at the start of `buf` and return the
/// offset of its origin within `buf`.
///
/// `buf` must hold at least [`converted_size`] bytes. The record gets heap
/// number 2 and a zero next pointer; the page insert sets both.
///
/// # Examples
///
/// ```
/// use innorec::innodb::convert::{convert_tuple_to_record, converted_size};
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
/// use innorec::innodb::offsets::Offsets;
///
/// let index = IndexBuilder::new("k", 2, RowFormat::Redundant)
///     .column("a", DataType::int(4, true))
///     .column("b", DataType::varchar(20, false))
///     .build()
///     .unwrap();
/// let mut t = Tuple::new(2);
/// t.field_mut(0).set_data(&[0x80, 0, 0, 1]);
/// t.field_mut(1).set_data(b"hi");
/// t.set_types_from_index(&index);
///
/// let mut buf = vec![0u8; converted_size(&index, &t, 0)];
/// let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
/// assert_eq!(origin, 8);
///
/// let mut offsets = Offsets::new();
/// offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
/// assert_eq!(offsets.nth_field(&buf, origin, 1), Some(&b"hi"[..]));
/// ```
pub fn convert_tuple_to_record(
    buf: &mut [u8],
    index: &Index,
    tuple: &Tuple<'_>,
    n_ext: usize,
) -> usize {
    debug_assert!(tuple.validate());
    let (extra, size) = size_and_extra(index, tuple, n_ext);
    assert!(buf.len() >= size, "record buffer too small: {} < {}", buf.len(), size);
    buf[..size].fill(0);

    if !index.is_comp() {
        let one_byte_offs = extra == REC_N_OLD_EXTRA_BYTES + tuple.n_fields();
        convert_old(buf, extra, tuple, one_byte_offs);
        return extra;
    }

    debug_assert_eq!(
        tuple.info_bits() & !(REC_NEW_STATUS_MASK | REC_INFO_DELETED_FLAG | REC_INFO_MIN_REC_FLAG),
        0
    );
    let status = comp_status(index, tuple);
    if tuple.is_alter_metadata() {
        debug_assert_eq!(status, RecStatus::Instant);
        convert_comp::<true, false>(buf, extra, index, tuple.fields(), status, false);
    } else {
        convert_comp::<false, false>(buf, extra, index, tuple.fields(), status, false);
    }
    RecMut::new(buf, extra).set_info_bits(true, tuple.info_bits() & !REC_NEW_STATUS_MASK);
    extra
}

/// Header size and total size of `fields` in the temporary file format.
///
/// `status` is `Ordinary` or `Instant`. Tables in the REDUNDANT format use
/// a null bitmap covering every nullable field.
pub fn converted_size_temp(index: &Index, fields: &[Field<'_>], status: RecStatus) -> (usize, usize) {
    debug_assert!(matches!(status, RecStatus::Ordinary | RecStatus::Instant));
    if index.is_comp() {
        comp_prefix_size::<false, false>(index, fields, status, true)
    } else {
        comp_prefix_size::<false, true>(index, fields, status, true)
    }
}

/// Write `fields` in the temporary file format at the start of `buf` and
/// return the origin offset. Temporary records carry no 5-byte header;
/// read them back with [`Offsets::compute_temp`].
pub fn convert_tuple_to_temp(
    buf: &mut [u8],
    index: &Index,
    fields: &[Field<'_>],
    status: RecStatus,
) -> usize {
    let (extra, size) = converted_size_temp(index, fields, status);
    assert!(buf.len() >= size, "record buffer too small: {} < {}", buf.len(), size);
    buf[..size].fill(0);
    if index.is_comp() {
        convert_comp::<false, false>(buf, extra, index, fields, status, true);
    } else {
        convert_comp::<false, true>(buf, extra, index, fields, status, true);
    }
    extra
}

/// Copy the first `n_fields` fields of the record at `origin` into
/// `tuple` as owned data, so that the tuple outlives the page.
///
/// `n_core` is `index.n_core_fields()` for leaf records and 0 for node
/// pointers. The tuple's info bits are taken from the record.
pub fn copy_prefix_to_tuple(
    tuple: &mut Tuple<'_>,
    buf: &[u8],
    origin: usize,
    index: &Index,
    n_core: usize,
    n_fields: usize,
) {
    debug_assert!(n_core <= index.n_core_fields());
    debug_assert!(n_core > 0 || n_fields <= index.n_unique_in_tree_nonleaf() + 1);
    debug_assert!(tuple.n_fields() >= n_fields);

    let mut offsets = Offsets::with_capacity(n_fields);
    offsets.compute(buf, origin, index, n_core, n_fields);
    debug_assert!(!offsets.any_default());

    tuple.set_info_bits(Rec::new(buf, origin).info_bits(index.is_comp()));

    for i in 0..n_fields {
        let field = tuple.field_mut(i);
        match offsets.nth_field(buf, origin, i) {
            Some(data) => {
                debug_assert!(!offsets.nth_extern(i));
                field.set_owned(data.to_vec());
            }
            None => field.set_null(),
        }
    }
}

/// Build the node pointer tuple for the record at `origin`: its first
/// `n_unique_in_tree_nonleaf` fields followed by `page_no`.
///
/// `level` is the level of the record (0 = leaf). The page number field
/// is excluded from comparisons.
///
/// # Examples
///
/// ```
/// use innorec::innodb::constants::REC_STATUS_NODE_PTR;
/// use innorec::innodb::convert::{build_node_ptr, convert_tuple_to_record, converted_size};
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
///
/// let index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
///     .clustered(1)
///     .column("id", DataType::int(4, true))
///     .system_columns()
///     .build()
///     .unwrap();
/// let mut t = Tuple::new(3);
/// t.field_mut(0).set_data(&[0x80, 0, 0, 5]);
/// t.field_mut(1).set_data(&[0; 6]);
/// t.field_mut(2).set_data(&[0; 7]);
/// t.set_types_from_index(&index);
/// let mut buf = vec![0u8; converted_size(&index, &t, 0)];
/// let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
///
/// let node_ptr = build_node_ptr(&index, &buf, origin, 42, 0);
/// assert_eq!(node_ptr.n_fields(), 2);
/// assert_eq!(node_ptr.n_fields_cmp(), 1);
/// assert_eq!(node_ptr.status(), REC_STATUS_NODE_PTR);
/// assert_eq!(node_ptr.field(1).bytes(), Some(&[0u8, 0, 0, 42][..]));
/// ```
pub fn build_node_ptr(
    index: &Index,
    buf: &[u8],
    origin: usize,
    page_no: u32,
    level: usize,
) -> Tuple<'static> {
    let n_unique = index.n_unique_in_tree_nonleaf();
    let mut tuple = Tuple::new(n_unique + 1);
    for i in 0..n_unique {
        tuple.field_mut(i).dtype = index.field(i).col.dtype;
    }
    let child = tuple.field_mut(n_unique);
    child.set_owned(page_no.to_be_bytes().to_vec());
    child.dtype = DataType::sys_child();

    let n_core = if level == 0 { index.n_core_fields() } else { 0 };
    copy_prefix_to_tuple(&mut tuple, buf, origin, index, n_core, n_unique);
    tuple.set_n_fields_cmp(n_unique);
    tuple.set_info_bits(tuple.info_bits() | REC_STATUS_NODE_PTR);
    tuple
}

/// Copy the first `n_fields` fields of the record at `origin` into `out`
/// as a standalone record and return the origin of the copy in `out`.
///
/// The copy holds the header bytes that describe the prefix and the prefix
/// data. An INSTANT record is copied as an ORDINARY one: the added-field
/// count and the null flags of the added columns are left out. `out` is
/// cleared and reused.
pub fn copy_prefix_to_buf(
    buf: &[u8],
    origin: usize,
    index: &Index,
    n_fields: usize,
    out: &mut Vec<u8>,
) -> usize {
    debug_assert!(n_fields <= index.n_fields());
    let rec = Rec::new(buf, origin);
    out.clear();

    if !index.is_comp() {
        debug_assert!(crate::innodb::record::validate_old(rec, usize::MAX));
        let area_start = if rec.one_byte_offs_flag() {
            REC_N_OLD_EXTRA_BYTES + n_fields
        } else {
            REC_N_OLD_EXTRA_BYTES + 2 * n_fields
        };
        let area_end = rec.field_start_old(n_fields);
        out.extend_from_slice(&buf[origin - area_start..origin + area_end]);
        RecMut::new(out, area_start).set_n_fields_old(n_fields);
        return area_start;
    }

    let mut prefix_len = 0;
    let mut nulls_back = REC_N_NEW_EXTRA_BYTES + 1;
    let mut lens_back = nulls_back + index.n_core_null_bytes();
    let mut n_fields = n_fields;
    // Null flag bytes of an INSTANT record, and the header bytes it drops.
    let mut instant: Option<(usize, usize)> = None;

    match rec.status() {
        Some(RecStatus::Ordinary) => debug_assert!(n_fields <= index.n_core_fields()),
        Some(RecStatus::NodePtr) => {
            if index.is_spatial() {
                debug_assert_eq!(index.n_core_null_bytes(), 0);
                debug_assert_eq!(n_fields, DICT_INDEX_SPATIAL_NODEPTR_SIZE + 1);
                debug_assert_eq!(rec.byte_before(lens_back) as u32, DATA_MBR_LEN);
                lens_back += 1;
                prefix_len = DATA_MBR_LEN as usize + REC_NODE_PTR_SIZE;
                n_fields = 0;
            } else {
                debug_assert!(n_fields <= index.n_unique_in_tree_nonleaf());
            }
        }
        Some(RecStatus::Instant) => {
            debug_assert!(n_fields <= index.first_user_field());
            let mut back = REC_N_NEW_EXTRA_BYTES + 1;
            let mut n_add = rec.byte_before(back) as usize;
            if n_add >= 0x80 {
                back += 1;
                n_add = (n_add & 0x7F) | (rec.byte_before(back) as usize) << 7;
            }
            let n_rec = index.n_core_fields() + 1 + n_add
                - usize::from(rec.is_alter_metadata(true));
            let nullf_back = back;
            let nb = index.get_n_nullable(n_rec.min(index.n_fields())).div_ceil(8);
            let omit = (back - REC_N_NEW_EXTRA_BYTES) + nb - index.n_core_null_bytes();
            nulls_back = back + 1;
            lens_back = nulls_back + nb;
            instant = Some((nullf_back, omit));
        }
        _ => panic!("cannot copy the prefix of an infimum or supremum record"),
    }

    let lens_start = lens_back;
    let mut null_mask: u32 = 1;
    for field in &index.fields()[..n_fields] {
        let col = &field.col;
        if col.is_nullable() {
            if null_mask & 0xFF == 0 {
                nulls_back += 1;
                null_mask = 1;
            }
            let is_null = u32::from(rec.byte_before(nulls_back)) & null_mask != 0;
            null_mask <<= 1;
            if is_null {
                continue;
            }
        }
        if field.fixed_len > 0 {
            prefix_len += field.fixed_len as usize;
        } else {
            let mut len = rec.byte_before(lens_back) as usize;
            lens_back += 1;
            if col.dtype.is_big_col() && len & 0x80 != 0 {
                len = ((len & 0x3F) << 8) | rec.byte_before(lens_back) as usize;
                lens_back += 1;
            }
            prefix_len += len;
        }
    }

    // Lowest header byte that describes the prefix is lens_back - 1.
    match instant {
        None => {
            out.extend_from_slice(&buf[origin + 1 - lens_back..origin + prefix_len]);
            lens_back - 1
        }
        Some((nullf_back, omit)) => {
            let n_core_null = index.n_core_null_bytes();
            out.extend_from_slice(&buf[origin + 1 - lens_back..origin + 1 - lens_start]);
            out.extend_from_slice(&buf[origin - nullf_back - n_core_null..origin - nullf_back]);
            out.extend_from_slice(&buf[origin - REC_N_NEW_EXTRA_BYTES..origin + prefix_len]);
            let new_origin = out.len() - prefix_len;
            debug_assert_eq!(new_origin, lens_back - 1 - omit);
            RecMut::new(out, new_origin).set_status(RecStatus::Ordinary);
            new_origin
        }
    }
}
