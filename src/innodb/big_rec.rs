//! Moving long fields of a clustered index record off-page.
//!
//! When a row converts to a record larger than the page allows, the longest
//! eligible fields are cut down to a local prefix followed by a zeroed
//! 20-byte external reference. The removed tails are collected in a
//! [`BigRec`] for the caller to write to overflow pages; [`restore`] puts
//! them back.

use serde::Serialize;
use tracing::{debug, warn};

use crate::innodb::constants::*;
use crate::innodb::convert::converted_size;
use crate::innodb::data::Tuple;
use crate::innodb::dict::Index;

/// Tuples above this size are almost certainly garbage.
const ABSURD_TUPLE_SIZE: usize = 1_000_000_000;

/// One field moved off-page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BigRecField {
    /// Field number in the tuple.
    pub field_no: usize,
    /// Bytes moved off-page.
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Length of `data`.
    pub len: usize,
}

/// Fields moved off-page from one tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BigRec {
    pub fields: Vec<BigRecField>,
}

impl BigRec {
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Total bytes moved off-page.
    pub fn total_len(&self) -> usize {
        self.fields.iter().map(|f| f.len).sum()
    }
}

/// Bytes of a field kept in the record in front of the external reference.
pub fn local_prefix_len(index: &Index) -> usize {
    if index.row_format.has_atomic_blobs() {
        0
    } else {
        REC_ANTELOPE_MAX_INDEX_COL_LEN
    }
}

/// Move fields of `tuple` off-page until it converts to a record of at
/// most `max_size` bytes.
///
/// Each round picks the eligible field with the largest savings. Returns
/// `None` if `index` is not clustered or the record cannot be made small
/// enough; `tuple` may have been partly externalized in that case.
///
/// On the instant ALTER metadata tuple the metadata blob is never moved,
/// and the fields after it map to the index fields one position earlier.
///
/// # Examples
///
/// ```
/// use innorec::innodb::big_rec::{externalize, restore};
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
///
/// let index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
///     .clustered(1)
///     .column("id", DataType::int(4, true))
///     .column("doc", DataType::blob(false))
///     .build()
///     .unwrap();
/// let doc = vec![b'x'; 20_000];
/// let mut t = Tuple::new(2);
/// t.field_mut(0).set_data(&[0, 0, 0, 1]);
/// t.field_mut(1).set_data(&doc);
/// t.set_types_from_index(&index);
///
/// let big = externalize(&index, &mut t, 8126).unwrap();
/// assert_eq!(big.n_fields(), 1);
/// assert!(t.field(1).is_ext());
/// assert_eq!(t.field(1).len(), Some(20));
///
/// restore(&mut t, big);
/// assert_eq!(t.field(1).bytes(), Some(&doc[..]));
/// ```
pub fn externalize(index: &Index, tuple: &mut Tuple<'_>, max_size: usize) -> Option<BigRec> {
    if !index.is_primary() {
        return None;
    }
    let local_prefix = local_prefix_len(index);
    let local_len = local_prefix + BTR_EXTERN_FIELD_REF_SIZE;
    let atomic_blobs = index.row_format.has_atomic_blobs();
    let mblob = tuple.is_alter_metadata().then(|| index.first_user_field());

    let mut size = converted_size(index, tuple, tuple.n_ext());
    if size > ABSURD_TUPLE_SIZE {
        warn!(size, index = %index.name, "externalizing a tuple of absurd size");
    }

    let mut big = BigRec::default();
    while size > max_size {
        let mut longest = 0;
        let mut longest_i = None;
        for i in index.n_unique_in_tree()..tuple.n_fields() {
            // the alter-metadata blob sits before the first user field
            let ifield = match mblob {
                Some(pos) if i == pos => continue,
                Some(pos) if i > pos => index.field(i - 1),
                _ => index.field(i),
            };
            let field = tuple.field(i);
            if ifield.fixed_len != 0 || field.is_null() || field.is_ext() {
                continue;
            }
            let len = match field.len() {
                Some(len) => len,
                None => continue,
            };
            if len <= local_len || len <= BTR_EXTERN_LOCAL_STORED_MAX_SIZE {
                continue;
            }
            let savings = len - local_len;
            if longest >= savings {
                continue;
            }
            // short VARCHAR stays in the record on DYNAMIC and COMPRESSED
            if atomic_blobs && !ifield.col.dtype.is_big_col() {
                continue;
            }
            longest_i = Some(i);
            longest = savings;
        }
        let i = match longest_i {
            Some(i) => i,
            None => {
                debug!(size, max_size, "record cannot be shrunk further");
                return None;
            }
        };

        let field = tuple.field_mut(i);
        let bytes = field.bytes().unwrap_or_default();
        let moved = bytes[local_prefix..].to_vec();
        let mut local = Vec::with_capacity(local_len);
        local.extend_from_slice(&bytes[..local_prefix]);
        local.extend_from_slice(&[0u8; BTR_EXTERN_FIELD_REF_SIZE]);
        field.set_owned(local);
        field.set_ext();
        debug!(field = i, moved = moved.len(), "moved field off-page");
        big.fields.push(BigRecField {
            field_no: i,
            len: moved.len(),
            data: moved,
        });
        size = converted_size(index, tuple, tuple.n_ext());
    }
    Some(big)
}

/// Undo [`externalize`]: append each moved tail to its local prefix and
/// clear the external flag.
pub fn restore(tuple: &mut Tuple<'_>, big: BigRec) {
    for f in big.fields {
        let field = tuple.field_mut(f.field_no);
        debug_assert!(field.is_ext());
        let bytes = field.bytes().unwrap_or_default();
        let local = bytes.len() - BTR_EXTERN_FIELD_REF_SIZE;
        let mut data = Vec::with_capacity(local + f.len);
        data.extend_from_slice(&bytes[..local]);
        data.extend_from_slice(&f.data);
        field.set_owned(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::dict::{IndexBuilder, RowFormat};
    use crate::innodb::dtype::DataType;

    fn index(format: RowFormat) -> Index {
        IndexBuilder::new("PRIMARY", 1, format)
            .clustered(1)
            .column("id", DataType::int(4, true))
            .column("title", DataType::varchar(200, false))
            .column("a", DataType::blob(false))
            .column("b", DataType::text(false))
            .build()
            .unwrap()
    }

    fn tuple<'a>(index: &Index, title: &'a [u8], a: &'a [u8], b: &'a [u8]) -> Tuple<'a> {
        let mut t = Tuple::new(4);
        t.field_mut(0).set_data(&[0, 0, 0, 7]);
        t.field_mut(1).set_data(title);
        t.field_mut(2).set_data(a);
        t.field_mut(3).set_data(b);
        t.set_types_from_index(index);
        t
    }

    #[test]
    fn test_largest_first_with_prefix() {
        let index = index(RowFormat::Compact);
        let a = vec![1u8; 9000];
        let b = vec![2u8; 5000];
        let mut t = tuple(&index, b"t", &a, &b);
        let big = externalize(&index, &mut t, 3000).unwrap();
        assert_eq!(big.n_fields(), 2);
        assert_eq!(big.fields[0].field_no, 2);
        assert_eq!(big.fields[0].len, 9000 - 768);
        assert_eq!(big.fields[1].field_no, 3);
        assert_eq!(t.n_ext(), 2);
        let local = t.field(2).bytes().unwrap();
        assert_eq!(local.len(), 768 + 20);
        assert!(local[..768].iter().all(|&x| x == 1));
        assert!(local[768..].iter().all(|&x| x == 0));
        assert!(converted_size(&index, &t, t.n_ext()) <= 3000);

        restore(&mut t, big);
        assert_eq!(t.n_ext(), 0);
        assert_eq!(t.field(2).bytes(), Some(&a[..]));
        assert_eq!(t.field(3).bytes(), Some(&b[..]));
    }

    #[test]
    fn test_stops_when_small_enough() {
        let index = index(RowFormat::Dynamic);
        let a = vec![1u8; 9000];
        let b = vec![2u8; 5000];
        let mut t = tuple(&index, b"t", &a, &b);
        let big = externalize(&index, &mut t, 8000).unwrap();
        assert_eq!(big.n_fields(), 1);
        assert_eq!(big.fields[0].len, 9000);
        assert_eq!(t.field(2).len(), Some(20));
        assert!(!t.field(3).is_ext());
    }

    #[test]
    fn test_short_varchar_kept_on_dynamic() {
        let index = index(RowFormat::Dynamic);
        let title = vec![b'v'; 200];
        let mut t = tuple(&index, &title, b"", b"");
        assert!(externalize(&index, &mut t, 100).is_none());
        assert!(!t.field(1).is_ext());

        let index = self::index(RowFormat::Redundant);
        let mut t = tuple(&index, &title, b"", b"");
        // 200 bytes is below the 768-byte local prefix
        assert!(externalize(&index, &mut t, 100).is_none());
    }

    #[test]
    fn test_secondary_rejected() {
        let index = IndexBuilder::new("k", 2, RowFormat::Dynamic)
            .column("b", DataType::blob(false))
            .build()
            .unwrap();
        let data = vec![0u8; 10_000];
        let mut t = Tuple::new(1);
        t.field_mut(0).set_data(&data);
        t.set_types_from_index(&index);
        assert!(externalize(&index, &mut t, 1000).is_none());
    }

    #[test]
    fn test_local_length_boundaries() {
        let index = index(RowFormat::Compact);
        // exactly the local prefix plus the reference saves nothing
        let a = vec![1u8; 768 + 20];
        let mut t = tuple(&index, b"t", &a, b"");
        assert!(externalize(&index, &mut t, 100).is_none());
        assert!(!t.field(2).is_ext());

        let a = vec![1u8; 768 + 21];
        let mut t = tuple(&index, b"t", &a, b"");
        // 804 bytes, 803 once the field is external
        assert_eq!(converted_size(&index, &t, 0), 804);
        let big = externalize(&index, &mut t, 803).unwrap();
        assert_eq!(big.n_fields(), 1);
        assert_eq!(big.fields[0].len, 21);

        // on DYNAMIC only fields above the local stored maximum move
        let index = self::index(RowFormat::Dynamic);
        let a = vec![1u8; BTR_EXTERN_LOCAL_STORED_MAX_SIZE];
        let mut t = tuple(&index, b"t", &a, b"");
        assert!(externalize(&index, &mut t, 10).is_none());
        let a = vec![1u8; BTR_EXTERN_LOCAL_STORED_MAX_SIZE + 1];
        let mut t = tuple(&index, b"t", &a, b"");
        let big = externalize(&index, &mut t, 40).unwrap();
        assert_eq!(big.fields[0].len, BTR_EXTERN_LOCAL_STORED_MAX_SIZE + 1);
    }

    #[test]
    fn test_still_too_large_leaves_partial_result() {
        let index = index(RowFormat::Compact);
        let title = vec![b'v'; 150];
        let a = vec![1u8; 9000];
        let mut t = tuple(&index, &title, &a, b"");
        assert!(externalize(&index, &mut t, 500).is_none());
        // the blob was cut down before the title turned out to be too short
        assert!(t.field(2).is_ext());
        assert_eq!(t.field(2).len(), Some(768 + 20));
        assert!(!t.field(1).is_ext());
        assert!(converted_size(&index, &t, t.n_ext()) > 500);
    }

    #[test]
    fn test_alter_metadata_skips_blob() {
        let mut index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
            .clustered(1)
            .column("id", DataType::int(4, true))
            .system_columns()
            .column("gone", DataType::varchar(20, false))
            .column("body", DataType::blob(false))
            .build()
            .unwrap();
        index.drop_instant_column(3).unwrap();

        let blob_ref = [0xEEu8; BTR_EXTERN_FIELD_REF_SIZE];
        let body = vec![3u8; 9000];
        let mut t = Tuple::new(6);
        t.set_info_bits(REC_INFO_METADATA_ALTER);
        t.field_mut(0).set_data(&[0x80, 0, 0, 0]);
        t.field_mut(1).set_data(&[0; 6]);
        t.field_mut(2).set_data(&[0; 7]);
        t.field_mut(3).set_data(&blob_ref);
        t.field_mut(3).set_ext();
        t.field_mut(4).set_null();
        t.field_mut(5).set_data(&body);
        t.set_types_from_index(&index);

        let big = externalize(&index, &mut t, 8000).unwrap();
        assert_eq!(big.n_fields(), 1);
        assert_eq!(big.fields[0].field_no, 5);
        assert_eq!(t.field(5).len(), Some(20));
        assert_eq!(t.field(3).bytes(), Some(&blob_ref[..]));
        assert_eq!(t.n_ext(), 2);

        restore(&mut t, big);
        assert_eq!(t.field(5).bytes(), Some(&body[..]));
        assert!(t.field(3).is_ext());
    }

    #[test]
    fn test_fits_already() {
        let index = index(RowFormat::Dynamic);
        let mut t = tuple(&index, b"t", b"a", b"b");
        let big = externalize(&index, &mut t, 8000).unwrap();
        assert!(big.is_empty());
        assert_eq!(big.total_len(), 0);
    }
}
