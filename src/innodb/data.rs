//! Fields and tuples.
//!
//! A [`Tuple`] is a logical row or index key: an ordered sequence of
//! [`Field`]s in index key order, a comparison prefix length, and the info
//! bits that end up in the record header. Field data is a [`Cow`] so that a
//! tuple can borrow bytes straight out of a page buffer or own a private copy
//! ([`Tuple::to_owned_tuple`]).

use std::borrow::Cow;

use serde::Serialize;

use crate::innodb::constants::*;
use crate::innodb::dict::Index;
use crate::innodb::dtype::DataType;

/// Value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldData<'a> {
    /// Not yet assigned; reading it is a programming error.
    #[default]
    Unset,
    /// SQL NULL.
    Null,
    /// Use the instantly added column's default value.
    Default,
    /// Stored bytes.
    Bytes(Cow<'a, [u8]>),
}

/// Spatial status of a field recovered from an undo log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SpatialStatus {
    #[default]
    Unknown = 0,
    /// Not part of any spatial index.
    None = 1,
    /// Part of both spatial and non-spatial indexes.
    Mixed = 2,
    /// Only part of spatial indexes.
    Only = 3,
}

/// One typed value of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field<'a> {
    data: FieldData<'a>,
    ext: bool,
    spatial_status: SpatialStatus,
    /// Logical type of the value.
    pub dtype: DataType,
}

impl<'a> Field<'a> {
    /// Field with borrowed bytes.
    pub fn from_bytes(data: &'a [u8]) -> Self {
        Field {
            data: FieldData::Bytes(Cow::Borrowed(data)),
            ..Field::default()
        }
    }

    /// SQL NULL field.
    pub fn null() -> Self {
        Field {
            data: FieldData::Null,
            ..Field::default()
        }
    }

    /// The field value.
    pub fn data(&self) -> &FieldData<'a> {
        &self.data
    }

    /// Stored bytes, or `None` for NULL and default fields.
    ///
    /// Panics if the field was never assigned.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            FieldData::Bytes(b) => Some(b),
            FieldData::Null | FieldData::Default => None,
            FieldData::Unset => panic!("read of an unassigned field"),
        }
    }

    /// Byte length, or `None` for SQL NULL / default.
    pub fn len(&self) -> Option<usize> {
        self.bytes().map(<[u8]>::len)
    }

    /// Length as the InnoDB `len` word, with the NULL and default sentinels.
    pub fn raw_len(&self) -> usize {
        match &self.data {
            FieldData::Bytes(b) => b.len(),
            FieldData::Null => UNIV_SQL_NULL,
            FieldData::Default => UNIV_SQL_DEFAULT,
            FieldData::Unset => panic!("read of an unassigned field"),
        }
    }

    /// Returns true if the field holds zero stored bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Returns true if the field is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self.data, FieldData::Null)
    }

    /// Returns true if the field refers to the instant default value.
    pub fn is_default(&self) -> bool {
        matches!(self.data, FieldData::Default)
    }

    /// Returns true if the field has been assigned.
    pub fn is_set(&self) -> bool {
        !matches!(self.data, FieldData::Unset)
    }

    /// Returns true if the field is stored off-page (local prefix + reference).
    pub fn is_ext(&self) -> bool {
        self.ext
    }

    /// Spatial status of the field.
    pub fn spatial_status(&self) -> SpatialStatus {
        self.spatial_status
    }

    /// Set the spatial status.
    pub fn set_spatial_status(&mut self, status: SpatialStatus) {
        self.spatial_status = status;
    }

    /// Point the field at borrowed bytes. Clears the external flag.
    pub fn set_data(&mut self, data: &'a [u8]) {
        self.data = FieldData::Bytes(Cow::Borrowed(data));
        self.ext = false;
    }

    /// Give the field its own bytes. Clears the external flag.
    pub fn set_owned(&mut self, data: Vec<u8>) {
        self.data = FieldData::Bytes(Cow::Owned(data));
        self.ext = false;
    }

    /// Set the field to SQL NULL.
    pub fn set_null(&mut self) {
        self.data = FieldData::Null;
        self.ext = false;
    }

    /// Mark the field as taking the instant default value.
    pub fn set_default(&mut self) {
        self.data = FieldData::Default;
        self.ext = false;
    }

    /// Flag the field as stored off-page. The data must end with a
    /// 20-byte external reference.
    pub fn set_ext(&mut self) {
        assert!(
            self.len().is_some_and(|l| l >= BTR_EXTERN_FIELD_REF_SIZE),
            "external field shorter than a field reference"
        );
        self.ext = true;
    }

    /// Returns true if the field equals `data` (`None` = SQL NULL) byte for byte.
    pub fn data_is_binary_equal(&self, data: Option<&[u8]>) -> bool {
        match (&self.data, data) {
            (FieldData::Null, None) => true,
            (FieldData::Bytes(b), Some(d)) => b.as_ref() == d,
            _ => false,
        }
    }

    /// Compare two fields for binary equality, looking at most at the first
    /// `prefix_len` bytes (0 = whole field).
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::data::Field;
    ///
    /// let a = Field::from_bytes(b"abcdef");
    /// let b = Field::from_bytes(b"abcxyz");
    /// assert!(!a.datas_are_binary_equal(&b, 0));
    /// assert!(a.datas_are_binary_equal(&b, 3));
    /// assert!(Field::null().datas_are_binary_equal(&Field::null(), 0));
    /// ```
    pub fn datas_are_binary_equal(&self, other: &Field<'_>, prefix_len: usize) -> bool {
        let (a, b) = match (&self.data, &other.data) {
            (FieldData::Null, FieldData::Null) => return true,
            (FieldData::Bytes(a), FieldData::Bytes(b)) => (a.as_ref(), b.as_ref()),
            _ => return false,
        };
        if prefix_len > 0 {
            let la = a.len().min(prefix_len);
            let lb = b.len().min(prefix_len);
            la == lb && a[..la] == b[..lb]
        } else {
            a == b
        }
    }

    /// Deep copy whose data outlives the source buffer.
    pub fn to_owned_field(&self) -> Field<'static> {
        let data = match &self.data {
            FieldData::Unset => FieldData::Unset,
            FieldData::Null => FieldData::Null,
            FieldData::Default => FieldData::Default,
            FieldData::Bytes(b) => FieldData::Bytes(Cow::Owned(b.to_vec())),
        };
        Field {
            data,
            ext: self.ext,
            spatial_status: self.spatial_status,
            dtype: self.dtype,
        }
    }
}

/// A logical row or index key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple<'a> {
    info_bits: u8,
    n_fields_cmp: usize,
    fields: Vec<Field<'a>>,
    v_fields: Vec<Field<'a>>,
}

impl<'a> Tuple<'a> {
    /// Tuple of `n_fields` unassigned fields, all taking part in comparisons.
    pub fn new(n_fields: usize) -> Self {
        Self::with_virtual(n_fields, 0)
    }

    /// Tuple with `n_v_fields` virtual column slots.
    pub fn with_virtual(n_fields: usize, n_v_fields: usize) -> Self {
        Tuple {
            info_bits: 0,
            n_fields_cmp: n_fields,
            fields: vec![Field::default(); n_fields],
            v_fields: vec![Field::default(); n_v_fields],
        }
    }

    /// Number of stored fields.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Truncate or extend the field list. Resets the comparison prefix to
    /// the new field count.
    pub fn set_n_fields(&mut self, n_fields: usize) {
        self.fields.resize(n_fields, Field::default());
        self.n_fields_cmp = n_fields;
    }

    /// Number of leading fields used by comparisons.
    pub fn n_fields_cmp(&self) -> usize {
        self.n_fields_cmp
    }

    /// Set the comparison prefix length.
    pub fn set_n_fields_cmp(&mut self, n: usize) {
        assert!(n <= self.fields.len());
        self.n_fields_cmp = n;
    }

    /// Info bits (delete mark, min-rec flag, record status).
    pub fn info_bits(&self) -> u8 {
        self.info_bits
    }

    /// Set the info bits.
    pub fn set_info_bits(&mut self, info_bits: u8) {
        self.info_bits = info_bits;
    }

    /// Record status encoded in the low info bits.
    pub fn status(&self) -> u8 {
        self.info_bits & REC_NEW_STATUS_MASK
    }

    /// Returns true for either kind of instant ALTER metadata record.
    pub fn is_metadata(&self) -> bool {
        (self.info_bits & !REC_INFO_DELETED_FLAG) == REC_INFO_METADATA_ADD
    }

    /// Returns true for the metadata record of instant DROP/reorder COLUMN.
    pub fn is_alter_metadata(&self) -> bool {
        self.info_bits == REC_INFO_METADATA_ALTER
    }

    /// The n-th field.
    pub fn field(&self, n: usize) -> &Field<'a> {
        &self.fields[n]
    }

    /// The n-th field, mutably.
    pub fn field_mut(&mut self, n: usize) -> &mut Field<'a> {
        &mut self.fields[n]
    }

    /// All fields.
    pub fn fields(&self) -> &[Field<'a>] {
        &self.fields
    }

    /// Number of virtual fields.
    pub fn n_v_fields(&self) -> usize {
        self.v_fields.len()
    }

    /// The n-th virtual field.
    pub fn v_field(&self, n: usize) -> &Field<'a> {
        &self.v_fields[n]
    }

    /// The n-th virtual field, mutably.
    pub fn v_field_mut(&mut self, n: usize) -> &mut Field<'a> {
        &mut self.v_fields[n]
    }

    /// Copy the column types of `index` into the fields. A node pointer
    /// tuple gets the child page number type for its last field.
    pub fn set_types_from_index(&mut self, index: &Index) {
        let node_ptr = self.status() == REC_STATUS_NODE_PTR;
        let n = self.fields.len();
        let alter = self.is_alter_metadata();
        let mut col = 0;
        for i in 0..n {
            if alter && i == index.first_user_field() {
                self.fields[i].dtype = DataType::blob(true);
                continue;
            }
            self.fields[i].dtype = if node_ptr && i == n - 1 {
                DataType::sys_child()
            } else {
                index.field(col).col.dtype
            };
            col += 1;
        }
    }

    /// Give the first `n` fields a plain binary type.
    pub fn set_types_binary(&mut self, n: usize) {
        for f in self.fields.iter_mut().take(n) {
            f.dtype = DataType::binary_unbounded();
        }
    }

    /// Sum of field lengths. In REDUNDANT format a NULL field still occupies
    /// its fixed size.
    pub fn data_size(&self, comp: bool) -> usize {
        self.fields
            .iter()
            .map(|f| match f.len() {
                Some(len) => len,
                None if comp => 0,
                None => f.dtype.sql_null_size(comp) as usize,
            })
            .sum()
    }

    /// Number of externally stored fields.
    pub fn n_ext(&self) -> usize {
        self.fields.iter().filter(|f| f.is_ext()).count()
    }

    /// Returns true if any field is SQL NULL.
    pub fn contains_null(&self) -> bool {
        self.fields.iter().any(Field::is_null)
    }

    /// Check that every field is assigned and every length is plausible.
    pub fn validate(&self) -> bool {
        self.n_fields_cmp <= self.fields.len()
            && self.fields.iter().all(|f| match &f.data {
                FieldData::Unset => false,
                FieldData::Bytes(b) => b.len() < UNIV_SQL_DEFAULT,
                _ => true,
            })
    }

    /// Deep copy of the tuple.
    pub fn to_owned_tuple(&self) -> Tuple<'static> {
        Tuple {
            info_bits: self.info_bits,
            n_fields_cmp: self.n_fields_cmp,
            fields: self.fields.iter().map(Field::to_owned_field).collect(),
            v_fields: self.v_fields.iter().map(Field::to_owned_field).collect(),
        }
    }

    /// Drop trailing instantly added fields whose value equals the column
    /// default, so the record is stored with fewer fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::data::Tuple;
    /// use innorec::innodb::dict::{IndexBuilder, RowFormat};
    /// use innorec::innodb::dtype::DataType;
    ///
    /// let mut index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
    ///     .clustered(1)
    ///     .column("id", DataType::int(4, true))
    ///     .build()
    ///     .unwrap();
    /// index.add_instant_column("c", DataType::int(4, true), Some(vec![0x80, 0, 0, 7])).unwrap();
    ///
    /// let mut t = Tuple::new(2);
    /// t.field_mut(0).set_data(&[0x80, 0, 0, 1]);
    /// t.field_mut(1).set_data(&[0x80, 0, 0, 7]);
    /// t.trim(&index);
    /// assert_eq!(t.n_fields(), 1);
    /// ```
    pub fn trim(&mut self, index: &Index) {
        debug_assert!(self.fields.len() >= index.n_core_fields());
        debug_assert!(self.fields.len() <= index.n_fields());
        let mut i = self.fields.len();
        while i > index.n_core_fields() {
            let col = &index.field(i - 1).col;
            if !col.is_dropped() && !self.fields[i - 1].data_is_binary_equal(col.instant_value())
            {
                break;
            }
            i -= 1;
        }
        self.fields.truncate(i);
        self.n_fields_cmp = self.n_fields_cmp.min(i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::dict::{IndexBuilder, RowFormat};

    #[test]
    fn test_field_states() {
        let mut f = Field::default();
        assert!(!f.is_set());
        f.set_null();
        assert!(f.is_null());
        assert_eq!(f.len(), None);
        assert_eq!(f.raw_len(), UNIV_SQL_NULL);
        f.set_default();
        assert!(f.is_default());
        assert_eq!(f.raw_len(), UNIV_SQL_DEFAULT);
        f.set_owned(vec![1, 2, 3]);
        assert_eq!(f.bytes(), Some(&[1u8, 2, 3][..]));
        assert!(!f.is_empty());
    }

    #[test]
    #[should_panic(expected = "unassigned")]
    fn test_reading_unset_field_panics() {
        let f = Field::default();
        let _ = f.len();
    }

    #[test]
    fn test_set_ext_requires_reference() {
        let mut f = Field::default();
        f.set_owned(vec![0; BTR_EXTERN_FIELD_REF_SIZE]);
        f.set_ext();
        assert!(f.is_ext());
        f.set_owned(vec![1]);
        assert!(!f.is_ext());
    }

    #[test]
    #[should_panic(expected = "field reference")]
    fn test_set_ext_on_short_field_panics() {
        let mut f = Field::default();
        f.set_owned(vec![0; 4]);
        f.set_ext();
    }

    #[test]
    fn test_binary_equality() {
        let a = Field::from_bytes(b"abc");
        assert!(a.data_is_binary_equal(Some(b"abc")));
        assert!(!a.data_is_binary_equal(None));
        assert!(Field::null().data_is_binary_equal(None));
        let b = Field::from_bytes(b"ab");
        assert!(!a.datas_are_binary_equal(&b, 3));
        assert!(a.datas_are_binary_equal(&b, 2));
        assert!(!a.datas_are_binary_equal(&Field::null(), 0));
    }

    #[test]
    fn test_tuple_info_bits() {
        let mut t = Tuple::new(3);
        assert_eq!(t.n_fields_cmp(), 3);
        t.set_info_bits(REC_INFO_METADATA_ADD);
        assert!(t.is_metadata());
        assert!(!t.is_alter_metadata());
        assert_eq!(t.status(), REC_STATUS_INSTANT);
        t.set_info_bits(REC_INFO_METADATA_ALTER);
        assert!(t.is_metadata());
        assert!(t.is_alter_metadata());
        t.set_info_bits(REC_INFO_DELETED_FLAG);
        assert!(!t.is_metadata());
    }

    #[test]
    fn test_set_n_fields_resets_cmp() {
        let mut t = Tuple::new(4);
        t.set_n_fields_cmp(2);
        t.set_n_fields(3);
        assert_eq!(t.n_fields(), 3);
        assert_eq!(t.n_fields_cmp(), 3);
    }

    #[test]
    fn test_data_size_redundant_counts_null_fixed() {
        let mut t = Tuple::new(2);
        t.field_mut(0).set_null();
        t.field_mut(0).dtype = DataType::int(4, false);
        t.field_mut(1).set_data(b"xyz");
        assert_eq!(t.data_size(true), 3);
        assert_eq!(t.data_size(false), 7);
        assert!(t.contains_null());
        assert!(t.validate());
    }

    #[test]
    fn test_to_owned_tuple_detaches() {
        let buf = vec![9u8, 8, 7];
        let owned = {
            let mut t = Tuple::with_virtual(1, 1);
            t.field_mut(0).set_data(&buf);
            t.v_field_mut(0).set_null();
            t.to_owned_tuple()
        };
        drop(buf);
        assert_eq!(owned.field(0).bytes(), Some(&[9u8, 8, 7][..]));
        assert!(owned.v_field(0).is_null());
    }

    #[test]
    fn test_trim_stops_at_non_default() {
        let mut index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
            .clustered(1)
            .column("id", DataType::int(4, true))
            .build()
            .unwrap();
        index.add_instant_column("a", DataType::varchar(4, false), None).unwrap();
        index
            .add_instant_column("b", DataType::int(4, true), Some(vec![0x80, 0, 0, 0]))
            .unwrap();

        let mut t = Tuple::new(3);
        t.field_mut(0).set_data(&[0x80, 0, 0, 1]);
        t.field_mut(1).set_data(b"x");
        t.field_mut(2).set_data(&[0x80, 0, 0, 0]);
        t.trim(&index);
        assert_eq!(t.n_fields(), 2);

        t.field_mut(1).set_null();
        t.trim(&index);
        assert_eq!(t.n_fields(), 1);
    }
}
