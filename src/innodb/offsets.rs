//! Record offsets engine.
//!
//! [`Offsets`] records, for every field of a packed record, where the field
//! ends (relative to the record origin) and how it is stored: in the record,
//! off-page behind a 20-byte reference, as SQL NULL, or as the default value
//! of an instantly added column. It is computed by walking the record header
//! backwards from the origin exactly once.
//!
//! An `Offsets` is scratch storage owned by the caller: [`Offsets::compute`]
//! reuses its allocation, and the result is only meaningful for the record
//! and index it was last computed against. Debug builds remember both and
//! assert on mismatched use.
//!
//! Each entry packs a 14-bit end offset with a 2-bit [`FieldKind`]; the
//! header word packs the extra (header) size with the COMPACT, EXTERNAL and
//! DEFAULT flags.

use crate::innodb::constants::*;
use crate::innodb::dict::Index;
use crate::innodb::record::{Rec, RecStatus};

/// How a field is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Stored in the record.
    Stored,
    /// Local prefix plus a 20-byte reference to overflow pages.
    External,
    /// SQL NULL.
    Null,
    /// Not stored; the instantly added column's default applies.
    Default,
}

impl FieldKind {
    fn from_bits(entry: u16) -> Self {
        match entry & REC_OFFS_TYPE_MASK {
            0 => FieldKind::Stored,
            REC_OFFS_STORED_OFFPAGE => FieldKind::External,
            REC_OFFS_SQL_NULL => FieldKind::Null,
            _ => FieldKind::Default,
        }
    }
}

#[inline]
fn value(entry: u16) -> usize {
    (entry & REC_OFFS_VALUE_MASK) as usize
}

#[inline]
fn combine(offs: usize, ty: u16) -> u16 {
    (offs as u16 & REC_OFFS_VALUE_MASK) | ty
}

/// Layout of a leaf record in the COMPACT family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafFormat {
    /// Temporary file record.
    Temp,
    /// Temporary file record with added columns.
    TempInstant,
    /// REC_STATUS_ORDINARY.
    Ordinary,
    /// REC_STATUS_INSTANT.
    Instant,
}

/// Read the added-field count stored below `*back` and move `*back` past it.
fn read_n_add_field(rec: &Rec<'_>, back: &mut usize) -> usize {
    *back += 1;
    let mut n = rec.byte_before(*back) as usize;
    if n >= 0x80 {
        n &= 0x7F;
        *back += 1;
        n |= (rec.byte_before(*back) as usize) << 7;
    }
    debug_assert!(n < REC_MAX_N_FIELDS);
    n
}

/// Offsets of the fields of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offsets {
    header: u16,
    ends: Vec<u16>,
    #[cfg(debug_assertions)]
    origin: usize,
    #[cfg(debug_assertions)]
    index_id: u64,
}

impl Offsets {
    /// Empty offsets; the first `compute` allocates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offsets with room for `n_fields` entries.
    pub fn with_capacity(n_fields: usize) -> Self {
        Offsets {
            ends: Vec::with_capacity(n_fields),
            ..Self::default()
        }
    }

    #[cfg(debug_assertions)]
    fn remember(&mut self, origin: usize, index: &Index) {
        self.origin = origin;
        self.index_id = index.id;
    }

    #[cfg(not(debug_assertions))]
    fn remember(&mut self, _origin: usize, _index: &Index) {}

    #[cfg(debug_assertions)]
    fn check_origin(&self, origin: usize) {
        debug_assert_eq!(self.origin, origin, "offsets used with a different record");
    }

    #[cfg(not(debug_assertions))]
    fn check_origin(&self, _origin: usize) {}

    /// Assert that the offsets were computed for this record and index.
    pub fn debug_validate(&self, origin: usize, index: &Index) {
        self.check_origin(origin);
        #[cfg(debug_assertions)]
        debug_assert_eq!(self.index_id, index.id, "offsets used with a different index");
        #[cfg(not(debug_assertions))]
        let _ = index;
        debug_assert!(self
            .ends
            .windows(2)
            .all(|w| value(w[0]) <= value(w[1])));
    }

    /// Compute the offsets of the record at `origin` in `buf`.
    ///
    /// `n_core` is 0 for node pointer records and `index.n_core_fields()`
    /// for leaf records. At most `max_fields` fields are computed.
    ///
    /// Malformed records are a caller bug: this panics rather than return
    /// an error (a read below the buffer start is a bounds-check panic).
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::convert::convert_tuple_to_record;
    /// use innorec::innodb::convert::converted_size;
    /// use innorec::innodb::data::Tuple;
    /// use innorec::innodb::dict::{IndexBuilder, RowFormat};
    /// use innorec::innodb::dtype::DataType;
    /// use innorec::innodb::offsets::{FieldKind, Offsets};
    ///
    /// let index = IndexBuilder::new("k", 9, RowFormat::Compact)
    ///     .column("a", DataType::varchar(10, false))
    ///     .column("b", DataType::int(4, true))
    ///     .build()
    ///     .unwrap();
    /// let mut t = Tuple::new(2);
    /// t.field_mut(0).set_null();
    /// t.field_mut(1).set_data(&[0x80, 0, 0, 9]);
    /// t.set_types_from_index(&index);
    ///
    /// let mut buf = vec![0u8; converted_size(&index, &t, 0)];
    /// let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
    ///
    /// let mut offsets = Offsets::new();
    /// offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
    /// assert_eq!(offsets.nth_kind(0), FieldKind::Null);
    /// assert_eq!(offsets.nth_len(1), Some(4));
    /// assert_eq!(offsets.data_size(), 4);
    /// ```
    pub fn compute(
        &mut self,
        buf: &[u8],
        origin: usize,
        index: &Index,
        n_core: usize,
        max_fields: usize,
    ) {
        debug_assert!(n_core <= index.n_core_fields());
        let rec = Rec::new(buf, origin);
        let comp = index.is_comp();
        let mut alter_metadata = false;

        let n = if comp {
            match rec.status() {
                Some(RecStatus::Instant) => {
                    alter_metadata = rec.is_alter_metadata(true);
                    debug_assert!(n_core > 0);
                    index.n_fields() + usize::from(alter_metadata)
                }
                Some(RecStatus::Ordinary) => {
                    debug_assert!(n_core > 0);
                    index.n_fields()
                }
                Some(RecStatus::NodePtr) => {
                    debug_assert_eq!(n_core, 0);
                    index.n_unique_in_tree_nonleaf() + 1
                }
                Some(RecStatus::Infimum) | Some(RecStatus::Supremum) => 1,
                None => panic!("record at {} has an invalid status", origin),
            }
        } else {
            let n = rec.n_fields_old();
            let is_user_rec = rec.heap_no(false) >= PAGE_HEAP_NO_USER_LOW;
            debug_assert!(is_user_rec || n == 1);
            if is_user_rec && n_core > 0 && n < index.n_fields() {
                index.n_fields()
            } else {
                n
            }
        };
        let n = n.min(max_fields);

        self.ends.clear();
        self.ends.resize(n, 0);

        if alter_metadata {
            self.init_comp_ordinary::<true, false>(
                &rec,
                index,
                index.n_core_fields(),
                LeafFormat::Instant,
            );
        } else {
            self.init(&rec, index, n_core);
        }
        self.remember(origin, index);
    }

    fn init(&mut self, rec: &Rec<'_>, index: &Index, n_core: usize) {
        if index.is_comp() {
            let n_node_ptr_field = match rec.status() {
                Some(RecStatus::Infimum) | Some(RecStatus::Supremum) => {
                    self.header = REC_N_NEW_EXTRA_BYTES as u16 | REC_OFFS_COMPACT;
                    self.ends[0] = 8;
                    return;
                }
                Some(RecStatus::Instant) => {
                    debug_assert!(index.is_instant());
                    self.init_comp_ordinary::<false, false>(rec, index, n_core, LeafFormat::Instant);
                    return;
                }
                Some(RecStatus::Ordinary) => {
                    self.init_comp_ordinary::<false, false>(
                        rec,
                        index,
                        n_core,
                        LeafFormat::Ordinary,
                    );
                    return;
                }
                Some(RecStatus::NodePtr) => index.n_unique_in_tree_nonleaf(),
                None => panic!("record at {} has an invalid status", rec.origin()),
            };
            self.init_node_ptr(rec, index, n_node_ptr_field);
        } else {
            self.init_old(rec, index);
        }
    }

    /// Node pointer records: the key fields with a null bitmap sized for the
    /// core fields, then the 4-byte child page number.
    fn init_node_ptr(&mut self, rec: &Rec<'_>, index: &Index, n_node_ptr_field: usize) {
        let mut nulls_back = REC_N_NEW_EXTRA_BYTES + 1;
        let mut lens_back = nulls_back + index.n_core_null_bytes();
        let mut offs = 0usize;
        let mut null_mask: u32 = 1;

        for i in 0..self.ends.len() {
            if i == n_node_ptr_field {
                offs += REC_NODE_PTR_SIZE;
                self.ends[i] = combine(offs, 0);
                continue;
            }
            let field = index.field(i);
            if field.col.is_nullable() {
                if null_mask & 0xFF == 0 {
                    nulls_back += 1;
                    null_mask = 1;
                }
                let is_null = u32::from(rec.byte_before(nulls_back)) & null_mask != 0;
                null_mask <<= 1;
                if is_null {
                    self.ends[i] = combine(offs, REC_OFFS_SQL_NULL);
                    continue;
                }
            }
            if field.fixed_len == 0 {
                let mut len = rec.byte_before(lens_back) as usize;
                lens_back += 1;
                if field.col.dtype.is_big_col() && len & 0x80 != 0 {
                    len = (len << 8) | rec.byte_before(lens_back) as usize;
                    lens_back += 1;
                    debug_assert!(len & 0x4000 == 0, "node pointer with an external field");
                    offs += len & REC_OFFS_VALUE_MASK as usize;
                } else {
                    offs += len;
                }
            } else {
                offs += field.fixed_len as usize;
            }
            self.ends[i] = combine(offs, 0);
        }

        self.header = (lens_back - 1) as u16 | REC_OFFS_COMPACT;
    }

    /// Leaf records of the COMPACT family, including temporary file records.
    ///
    /// `MBLOB` handles the ALTER metadata record, whose first user field is
    /// a metadata BLOB reference that has no index field. `REDUNDANT_TEMP`
    /// handles temporary file records of a REDUNDANT table, which reuse the
    /// COMPACT header but size the null bitmap for every nullable field.
    fn init_comp_ordinary<const MBLOB: bool, const REDUNDANT_TEMP: bool>(
        &mut self,
        rec: &Rec<'_>,
        index: &Index,
        n_core: usize,
        mut format: LeafFormat,
    ) {
        debug_assert!(n_core > 0);
        debug_assert!(index.n_core_fields() >= n_core);
        let mut offs = 0usize;
        let mut any = 0u16;
        let mut nulls_back = 0usize;
        let lens_back;
        let mut n_fields = n_core;
        let mut null_mask: u32 = 1;

        let n_core_null_bytes = if index.n_core_fields() != n_core {
            index.get_n_nullable(n_core).div_ceil(8)
        } else if REDUNDANT_TEMP {
            index.n_nullable().div_ceil(8)
        } else {
            index.n_core_null_bytes()
        };

        if MBLOB {
            debug_assert!(index.is_instant());
            debug_assert_eq!(format, LeafFormat::Instant);
            nulls_back += REC_N_NEW_EXTRA_BYTES;
            n_fields = n_core + 1 + read_n_add_field(rec, &mut nulls_back);
            debug_assert!(n_fields <= index.n_fields() + 1);
            let n_null_bytes = index.get_n_nullable(n_fields - 1).div_ceil(8);
            nulls_back += 1;
            lens_back = nulls_back + n_null_bytes;
        } else {
            match format {
                LeafFormat::Temp | LeafFormat::Ordinary => {
                    if format == LeafFormat::Ordinary {
                        nulls_back += REC_N_NEW_EXTRA_BYTES;
                    } else if index.is_comp() {
                        // Only REDUNDANT tables need the fixed_len adjustment.
                        format = LeafFormat::Ordinary;
                    }
                    nulls_back += 1;
                    lens_back = nulls_back + n_core_null_bytes;
                }
                LeafFormat::Instant | LeafFormat::TempInstant => {
                    if format == LeafFormat::Instant {
                        nulls_back += REC_N_NEW_EXTRA_BYTES;
                    }
                    n_fields = n_core + read_n_add_field(rec, &mut nulls_back) + 1;
                    debug_assert!(n_fields <= index.n_fields());
                    let n_null_bytes = index.get_n_nullable(n_fields).div_ceil(8);
                    nulls_back += 1;
                    lens_back = nulls_back + n_null_bytes;
                }
            }
        }

        let mut lens_back = lens_back;
        let mut fi = 0usize;
        let first_user_field = if MBLOB { index.first_user_field() } else { usize::MAX };

        for i in 0..self.ends.len() {
            if MBLOB {
                if i == first_user_field {
                    offs += BTR_EXTERN_FIELD_REF_SIZE;
                    any |= REC_OFFS_EXTERNAL;
                    self.ends[i] = combine(offs, REC_OFFS_STORED_OFFPAGE);
                    continue;
                } else if i >= n_fields {
                    any |= REC_OFFS_ANY_DEFAULT;
                    self.ends[i] = combine(offs, REC_OFFS_DEFAULT);
                    fi += 1;
                    continue;
                }
            } else if i >= n_fields {
                self.ends[i] = if index.instant_field_value(i).is_none() {
                    combine(offs, REC_OFFS_SQL_NULL)
                } else {
                    any |= REC_OFFS_ANY_DEFAULT;
                    combine(offs, REC_OFFS_DEFAULT)
                };
                fi += 1;
                continue;
            }

            let field = index.field(fi);
            fi += 1;
            let col = &field.col;

            if col.is_nullable() {
                if null_mask & 0xFF == 0 {
                    nulls_back += 1;
                    null_mask = 1;
                }
                let is_null = u32::from(rec.byte_before(nulls_back)) & null_mask != 0;
                null_mask <<= 1;
                if is_null {
                    self.ends[i] = combine(offs, REC_OFFS_SQL_NULL);
                    continue;
                }
            }

            if field.fixed_len == 0
                || (format == LeafFormat::Temp && col.dtype.fixed_size(true) == 0)
            {
                let mut len = rec.byte_before(lens_back) as usize;
                lens_back += 1;
                if len & 0x80 != 0 && col.dtype.is_big_col() {
                    len = (len << 8) | rec.byte_before(lens_back) as usize;
                    lens_back += 1;
                    offs += len & REC_OFFS_VALUE_MASK as usize;
                    self.ends[i] = if len & 0x4000 != 0 {
                        any |= REC_OFFS_EXTERNAL;
                        combine(offs, REC_OFFS_STORED_OFFPAGE)
                    } else {
                        combine(offs, 0)
                    };
                    continue;
                }
                offs += len;
            } else {
                offs += field.fixed_len as usize;
            }
            self.ends[i] = combine(offs, 0);
        }

        self.header = (lens_back - 1) as u16 | REC_OFFS_COMPACT | any;
    }

    /// REDUNDANT records: end offsets are stored explicitly. Fields missing
    /// from a record older than an instant ADD COLUMN take their defaults.
    fn init_old(&mut self, rec: &Rec<'_>, index: &Index) {
        let n_fields = rec.n_fields_old();
        let n = n_fields.min(self.ends.len());
        let mut any;

        if rec.one_byte_offs_flag() {
            any = (REC_N_OLD_EXTRA_BYTES + n_fields) as u16;
            for i in 0..n {
                let info = rec.field_end_info_1(i);
                self.ends[i] = if info & REC_1BYTE_SQL_NULL_MASK != 0 {
                    combine((info & !REC_1BYTE_SQL_NULL_MASK) as usize, REC_OFFS_SQL_NULL)
                } else {
                    info
                };
            }
        } else {
            any = (REC_N_OLD_EXTRA_BYTES + 2 * n_fields) as u16;
            for i in 0..n {
                let mut info = rec.field_end_info_2(i);
                let mut ty = 0;
                if info & REC_2BYTE_SQL_NULL_MASK != 0 {
                    info &= !REC_2BYTE_SQL_NULL_MASK;
                    ty = REC_OFFS_SQL_NULL;
                }
                if info & REC_2BYTE_EXTERN_MASK != 0 {
                    info &= !REC_2BYTE_EXTERN_MASK;
                    ty = REC_OFFS_STORED_OFFPAGE;
                    any |= REC_OFFS_EXTERNAL;
                }
                self.ends[i] = combine(info as usize, ty);
            }
        }

        if n < self.ends.len() {
            debug_assert!(n > 0);
            debug_assert!(index.is_instant());
            let offs = combine(value(self.ends[n - 1]), REC_OFFS_DEFAULT);
            for end in &mut self.ends[n..] {
                *end = offs;
            }
            any |= REC_OFFS_ANY_DEFAULT;
        }

        self.header = any;
    }

    /// Compute offsets of a temporary file record (no 5-byte fixed header).
    ///
    /// `instant` selects the format with an added-field count; such records
    /// always get `index.n_fields()` offsets.
    pub fn compute_temp(
        &mut self,
        buf: &[u8],
        origin: usize,
        index: &Index,
        n_core: usize,
        n_fields: usize,
        instant: bool,
    ) {
        debug_assert!(index.n_core_fields() == n_core || !index.is_instant());
        let rec = Rec::new(buf, origin);
        let n = if instant { index.n_fields() } else { n_fields };
        self.ends.clear();
        self.ends.resize(n, 0);
        let format = if instant {
            LeafFormat::TempInstant
        } else {
            LeafFormat::Temp
        };
        if index.is_comp() {
            self.init_comp_ordinary::<false, false>(&rec, index, n_core, format);
        } else {
            self.init_comp_ordinary::<false, true>(&rec, index, n_core, format);
        }
        self.remember(origin, index);
    }

    /// Number of fields covered.
    pub fn n_fields(&self) -> usize {
        self.ends.len()
    }

    /// Returns true if the record is in the new-style format.
    pub fn comp(&self) -> bool {
        self.header & REC_OFFS_COMPACT != 0
    }

    /// Returns true if some field is stored off-page.
    pub fn any_extern(&self) -> bool {
        self.header & REC_OFFS_EXTERNAL != 0
    }

    /// Returns true if some field takes an instant default.
    pub fn any_default(&self) -> bool {
        self.header & REC_OFFS_ANY_DEFAULT != 0
    }

    /// Size of the record header (bytes before the origin).
    pub fn extra_size(&self) -> usize {
        (self.header & REC_OFFS_MASK) as usize
    }

    /// Size of the field data (bytes from the origin).
    pub fn data_size(&self) -> usize {
        self.ends.last().map_or(0, |&e| value(e))
    }

    /// Total record size.
    pub fn size(&self) -> usize {
        self.extra_size() + self.data_size()
    }

    /// Storage kind of field `n`.
    pub fn nth_kind(&self, n: usize) -> FieldKind {
        FieldKind::from_bits(self.ends[n])
    }

    /// Returns true if field `n` is SQL NULL.
    pub fn nth_sql_null(&self, n: usize) -> bool {
        self.nth_kind(n) == FieldKind::Null
    }

    /// Returns true if field `n` is stored off-page.
    pub fn nth_extern(&self, n: usize) -> bool {
        self.nth_kind(n) == FieldKind::External
    }

    /// Returns true if field `n` takes the instant default.
    pub fn nth_default(&self, n: usize) -> bool {
        self.nth_kind(n) == FieldKind::Default
    }

    /// Start of field `n`, relative to the origin.
    pub fn nth_start(&self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            value(self.ends[n - 1])
        }
    }

    /// End of field `n`, relative to the origin.
    pub fn nth_end(&self, n: usize) -> usize {
        value(self.ends[n])
    }

    /// Bytes occupied by field `n` in the record (a REDUNDANT NULL field may
    /// occupy its fixed size).
    pub fn nth_size(&self, n: usize) -> usize {
        self.nth_end(n) - self.nth_start(n)
    }

    /// Length of field `n`, `None` for SQL NULL or default fields. An
    /// external field's length includes the 20-byte reference.
    pub fn nth_len(&self, n: usize) -> Option<usize> {
        match self.nth_kind(n) {
            FieldKind::Null | FieldKind::Default => None,
            FieldKind::Stored | FieldKind::External => Some(self.nth_size(n)),
        }
    }

    /// Bytes of field `n` of the record at `origin`, `None` for SQL NULL or
    /// default fields.
    pub fn nth_field<'b>(&self, buf: &'b [u8], origin: usize, n: usize) -> Option<&'b [u8]> {
        self.check_origin(origin);
        self.nth_len(n)
            .map(|len| &buf[origin + self.nth_start(n)..origin + self.nth_start(n) + len])
    }

    /// Like [`nth_field`](Self::nth_field), but substitutes the column
    /// default for instantly added fields.
    pub fn nth_field_or_default<'b>(
        &self,
        buf: &'b [u8],
        origin: usize,
        index: &'b Index,
        n: usize,
    ) -> Option<&'b [u8]> {
        if self.nth_default(n) {
            index.instant_field_value(n)
        } else {
            self.nth_field(buf, origin, n)
        }
    }

    /// Number of externally stored fields.
    pub fn n_extern(&self) -> usize {
        if !self.any_extern() {
            return 0;
        }
        (0..self.ends.len()).filter(|&i| self.nth_extern(i)).count()
    }

    /// Mark field `n` as externally stored.
    pub fn make_nth_extern(&mut self, n: usize) {
        debug_assert!(!self.nth_sql_null(n));
        self.ends[n] = combine(value(self.ends[n]), REC_OFFS_STORED_OFFPAGE);
        self.header |= REC_OFFS_EXTERNAL;
    }

    /// Validate the record against its offsets: a sane field count, every
    /// field shorter than the page, stored lengths adding up to the data size.
    pub fn validate_record(&self, buf: &[u8], origin: usize, page_size: usize) -> bool {
        let n_fields = self.ends.len();
        if n_fields == 0 || n_fields > REC_MAX_N_FIELDS {
            tracing::error!(offset = origin, n_fields, "record has an invalid field count");
            return false;
        }
        let rec = Rec::new(buf, origin);
        let mut len_sum = 0;
        for i in 0..n_fields {
            match self.nth_kind(i) {
                FieldKind::Default => {}
                FieldKind::Null => {
                    if !self.comp() {
                        len_sum += self.nth_size(i);
                    }
                }
                FieldKind::Stored | FieldKind::External => {
                    let len = self.nth_size(i);
                    if len >= page_size {
                        tracing::error!(offset = origin, field = i, len, "record field too long");
                        return false;
                    }
                    len_sum += len;
                }
            }
        }
        if len_sum != self.data_size() {
            tracing::error!(
                offset = origin,
                expected = len_sum,
                actual = self.data_size(),
                "record data size mismatch"
            );
            return false;
        }
        if !self.comp() {
            return crate::innodb::record::validate_old(rec, page_size);
        }
        true
    }
}

/// Offsets of a temporary file record; see [`Offsets::compute_temp`].
pub fn init_offsets_temp(
    buf: &[u8],
    origin: usize,
    index: &Index,
    n_core: usize,
    n_fields: usize,
    instant: bool,
) -> Offsets {
    let mut offsets = Offsets::with_capacity(n_fields);
    offsets.compute_temp(buf, origin, index, n_core, n_fields, instant);
    offsets
}

/// Count the externally stored fields among the first `n` fields of a
/// non-instant COMPACT leaf record, without computing full offsets.
pub fn n_extern_new(buf: &[u8], origin: usize, index: &Index, n: usize) -> usize {
    debug_assert!(index.is_comp());
    debug_assert!(!index.is_instant());
    let rec = Rec::new(buf, origin);
    let n = n.min(index.n_fields());
    let mut nulls_back = REC_N_NEW_EXTRA_BYTES + 1;
    let mut lens_back = nulls_back + index.n_nullable().div_ceil(8);
    let mut null_mask: u32 = 1;
    let mut n_extern = 0;

    for field in &index.fields()[..n] {
        if field.col.is_nullable() {
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
        if field.fixed_len == 0 {
            let len = rec.byte_before(lens_back);
            lens_back += 1;
            if field.col.dtype.is_big_col() && len & 0x80 != 0 {
                if len & 0x40 != 0 {
                    n_extern += 1;
                }
                lens_back += 1;
            }
        }
    }
    n_extern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::dict::{IndexBuilder, RowFormat};
    use crate::innodb::dtype::DataType;

    fn index(format: RowFormat) -> Index {
        IndexBuilder::new("k", 3, format)
            .column("a", DataType::int(4, true))
            .column("b", DataType::varchar(20, false))
            .column("c", DataType::blob(false))
            .build()
            .unwrap()
    }

    /// Hand-built COMPACT record: a=1, b="xy", c=200 bytes.
    fn compact_record() -> (Vec<u8>, usize) {
        // lens (reverse): c 2 bytes, b 1 byte; null bitmap 1 byte; 5 header bytes
        let mut buf = vec![0u8; 9 + 4 + 2 + 200];
        let origin = 9;
        buf[0] = 200; // low byte of c length
        buf[1] = 0x80; // 2-byte form, high bits 0
        buf[2] = 2; // b length
        buf[3] = 0; // null bitmap
        buf[6] = 2 << 3; // heap_no 2, ordinary
        buf[origin..origin + 4].copy_from_slice(&[0x80, 0, 0, 1]);
        buf[origin + 4..origin + 6].copy_from_slice(b"xy");
        (buf, origin)
    }

    #[test]
    fn test_compact_offsets() {
        let index = index(RowFormat::Compact);
        let (buf, origin) = compact_record();
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        assert!(offsets.comp());
        assert_eq!(offsets.n_fields(), 3);
        assert_eq!(offsets.extra_size(), 9);
        assert_eq!(offsets.nth_end(0), 4);
        assert_eq!(offsets.nth_field(&buf, origin, 1), Some(&b"xy"[..]));
        assert_eq!(offsets.nth_len(2), Some(200));
        assert_eq!(offsets.data_size(), 206);
        assert!(!offsets.any_extern());
        assert!(offsets.validate_record(&buf, origin, 16384));
        assert_eq!(n_extern_new(&buf, origin, &index, 3), 0);
    }

    #[test]
    fn test_max_fields_limits_entries() {
        let index = index(RowFormat::Compact);
        let (buf, origin) = compact_record();
        let mut offsets = Offsets::with_capacity(8);
        offsets.compute(&buf, origin, &index, index.n_core_fields(), 2);
        assert_eq!(offsets.n_fields(), 2);
        assert_eq!(offsets.data_size(), 6);
    }

    #[test]
    fn test_external_flag() {
        let index = index(RowFormat::Compact);
        let (mut buf, origin) = compact_record();
        buf[1] = 0xC0;
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        assert_eq!(offsets.nth_kind(2), FieldKind::External);
        assert!(offsets.any_extern());
        assert_eq!(offsets.n_extern(), 1);
        assert_eq!(n_extern_new(&buf, origin, &index, 3), 1);
        assert_eq!(n_extern_new(&buf, origin, &index, 2), 0);
    }

    #[test]
    fn test_infimum_supremum() {
        let index = index(RowFormat::Compact);
        let mut buf = vec![0u8; 16];
        buf[7] = REC_STATUS_SUPREMUM;
        let mut offsets = Offsets::new();
        offsets.compute(&buf, 10, &index, index.n_core_fields(), usize::MAX);
        assert_eq!(offsets.n_fields(), 1);
        assert_eq!(offsets.nth_len(0), Some(8));
        assert_eq!(offsets.extra_size(), 5);
    }

    #[test]
    fn test_redundant_offsets_with_null() {
        use crate::innodb::record::RecMut;

        let index = index(RowFormat::Redundant);
        // a = 4 bytes, b NULL, c = 3 bytes; 1-byte end offsets
        let mut buf = vec![0u8; 9 + 7];
        let origin = 9;
        {
            let mut rec = RecMut::new(&mut buf, origin);
            rec.set_n_fields_old(3);
            rec.set_one_byte_offs_flag(true);
            rec.set_heap_no(false, 2);
            rec.set_field_end_info_1(0, 4);
            rec.set_field_end_info_1(1, 4 | REC_1BYTE_SQL_NULL_MASK);
            rec.set_field_end_info_1(2, 7);
        }
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        assert!(!offsets.comp());
        assert_eq!(offsets.extra_size(), 9);
        assert_eq!(offsets.nth_kind(1), FieldKind::Null);
        assert_eq!(offsets.nth_len(1), None);
        assert_eq!(offsets.nth_len(2), Some(3));
        assert_eq!(offsets.data_size(), 7);
        assert!(offsets.validate_record(&buf, origin, 16384));
    }

    #[test]
    fn test_make_nth_extern() {
        let index = index(RowFormat::Compact);
        let (buf, origin) = compact_record();
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
        offsets.make_nth_extern(2);
        assert!(offsets.nth_extern(2));
        assert!(offsets.any_extern());
        assert_eq!(offsets.nth_end(2), 206);
    }
}
