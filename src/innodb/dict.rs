//! Index and column descriptors.
//!
//! An [`Index`] describes how tuples of one B-tree are laid out: its ordered
//! [`IndexField`]s (each referring to a [`Column`] and an optional column
//! prefix), the number of fields that determine uniqueness, the row format,
//! and the instant ADD/DROP COLUMN state (core field count and per-column
//! defaults). Build one with [`IndexBuilder`].

use serde::Serialize;

use crate::innodb::constants::{DICT_MAX_FIXED_COL_LEN, REC_MAX_N_FIELDS};
use crate::innodb::dtype::{
    DataType, DATA_BINARY, DATA_BINARY_TYPE, DATA_FIXBINARY, DATA_NOT_NULL, DATA_ROLL_PTR_LEN,
    DATA_TRX_ID_LEN,
};
use crate::RecError;

/// Number of fields in an R-tree node pointer key (the MBR).
pub const DICT_INDEX_SPATIAL_NODEPTR_SIZE: usize = 1;

/// Physical row format of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowFormat {
    /// Old-style records with per-field end offsets.
    Redundant,
    /// New-style records with null bitmap and length bytes; 768-byte local BLOB prefix.
    Compact,
    /// COMPACT records with fully off-page BLOBs.
    Dynamic,
    /// DYNAMIC records on compressed pages.
    Compressed,
}

impl RowFormat {
    /// Returns true for the new-style (COMPACT family) record format.
    pub fn is_comp(&self) -> bool {
        !matches!(self, RowFormat::Redundant)
    }

    /// Returns true if long columns are stored entirely off-page.
    pub fn has_atomic_blobs(&self) -> bool {
        matches!(self, RowFormat::Dynamic | RowFormat::Compressed)
    }

    /// Returns the SQL name of the row format.
    pub fn name(&self) -> &'static str {
        match self {
            RowFormat::Redundant => "REDUNDANT",
            RowFormat::Compact => "COMPACT",
            RowFormat::Dynamic => "DYNAMIC",
            RowFormat::Compressed => "COMPRESSED",
        }
    }
}

/// A table column as seen by one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type.
    pub dtype: DataType,
    /// Default value for an instantly added column (`None` = SQL NULL).
    pub def_val: Option<Vec<u8>>,
    /// Column was dropped by instant DROP COLUMN.
    pub dropped: bool,
}

impl Column {
    /// Create a regular (non-instant) column.
    pub fn new(name: &str, dtype: DataType) -> Self {
        Column {
            name: name.to_string(),
            dtype,
            def_val: None,
            dropped: false,
        }
    }

    /// Returns true if the column accepts SQL NULL.
    pub fn is_nullable(&self) -> bool {
        self.dtype.is_nullable()
    }

    /// Returns true if the column was instantly dropped.
    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Value substituted for the column in records that predate it.
    pub fn instant_value(&self) -> Option<&[u8]> {
        self.def_val.as_deref()
    }

    /// Rewrite the column type the way an instantly dropped column is kept:
    /// a binary column of the same storage class and nullability.
    fn set_dropped(&mut self, fixed_len: u32) {
        let not_null = if self.dtype.is_not_null() { DATA_NOT_NULL } else { 0 };
        let prtype = not_null | DATA_BINARY_TYPE;
        self.dtype = if fixed_len > 0 {
            DataType::new(DATA_FIXBINARY, prtype, fixed_len)
        } else if self.dtype.is_big_col() {
            DataType::new(DATA_BINARY, prtype, 65535)
        } else {
            DataType::new(DATA_BINARY, prtype, 255)
        };
        self.dropped = true;
    }
}

/// One field of an index: a column, possibly a prefix of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexField {
    /// The indexed column.
    pub col: Column,
    /// Column prefix length in bytes (0 = whole column).
    pub prefix_len: u32,
    /// Fixed storage length in this index's row format (0 = variable).
    pub fixed_len: u32,
    /// Field sorts in descending order.
    pub descending: bool,
}

impl IndexField {
    fn new(col: Column, prefix_len: u32, descending: bool, comp: bool) -> Self {
        let mut fixed_len = col.dtype.fixed_size(comp);
        if prefix_len > 0 && fixed_len > prefix_len {
            fixed_len = prefix_len;
        }
        if fixed_len > DICT_MAX_FIXED_COL_LEN {
            fixed_len = 0;
        }
        IndexField {
            col,
            prefix_len,
            fixed_len,
            descending,
        }
    }
}

/// B-tree index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Index id, as stored in PAGE_INDEX_ID.
    pub id: u64,
    /// Row format of the owning table.
    pub row_format: RowFormat,
    clustered: bool,
    spatial: bool,
    n_uniq: usize,
    fields: Vec<IndexField>,
    n_core_fields: usize,
    n_nullable: usize,
    n_core_null_bytes: usize,
    instant_alter: bool,
}

impl Index {
    /// Returns true if records use the new-style (COMPACT family) format.
    pub fn is_comp(&self) -> bool {
        self.row_format.is_comp()
    }

    /// Returns true for the clustered (primary key) index.
    pub fn is_primary(&self) -> bool {
        self.clustered
    }

    /// Returns true for an R-tree index.
    pub fn is_spatial(&self) -> bool {
        self.spatial
    }

    /// Number of fields in the index.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Number of fields present when the table was created, before any
    /// instant ADD COLUMN.
    pub fn n_core_fields(&self) -> usize {
        self.n_core_fields
    }

    /// Number of nullable fields.
    pub fn n_nullable(&self) -> usize {
        self.n_nullable
    }

    /// Size of the null bitmap of a record carrying only the core fields.
    pub fn n_core_null_bytes(&self) -> usize {
        self.n_core_null_bytes
    }

    /// Number of fields that determine uniqueness.
    pub fn n_uniq(&self) -> usize {
        self.n_uniq
    }

    /// The n-th field.
    pub fn field(&self, n: usize) -> &IndexField {
        &self.fields[n]
    }

    /// All fields.
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    /// Position of `DB_TRX_ID` in a clustered index.
    pub fn db_trx_id(&self) -> usize {
        debug_assert!(self.clustered);
        self.n_uniq
    }

    /// Position of the first non-key, non-system field in a clustered index.
    pub fn first_user_field(&self) -> usize {
        self.db_trx_id() + 2
    }

    /// Number of fields that determine the position of a record in the tree.
    pub fn n_unique_in_tree(&self) -> usize {
        if self.clustered {
            self.n_uniq
        } else {
            self.fields.len()
        }
    }

    /// Number of key fields in a node pointer record.
    pub fn n_unique_in_tree_nonleaf(&self) -> usize {
        if self.spatial {
            DICT_INDEX_SPATIAL_NODEPTR_SIZE
        } else {
            self.n_unique_in_tree()
        }
    }

    /// Number of nullable fields among the first `n_prefix` fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::dict::{IndexBuilder, RowFormat};
    /// use innorec::innodb::dtype::DataType;
    ///
    /// let index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
    ///     .clustered(1)
    ///     .column("a", DataType::int(4, true))
    ///     .column("b", DataType::int(4, false))
    ///     .column("c", DataType::varchar(8, false))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(index.n_nullable(), 2);
    /// assert_eq!(index.get_n_nullable(2), 1);
    /// assert_eq!(index.get_n_nullable(3), 2);
    /// ```
    pub fn get_n_nullable(&self, n_prefix: usize) -> usize {
        debug_assert!(n_prefix <= self.fields.len());
        let n_prefix = n_prefix.min(self.fields.len());
        self.n_nullable
            - self.fields[n_prefix..]
                .iter()
                .filter(|f| f.col.is_nullable())
                .count()
    }

    /// Returns true if records may carry fewer fields than the index
    /// (instant ADD COLUMN) or the table was altered instantly.
    pub fn is_instant(&self) -> bool {
        self.n_core_fields != self.fields.len() || self.instant_alter
    }

    /// Returns true if the clustered index has an ALTER metadata record
    /// (instant DROP or reorder).
    pub fn has_instant_alter(&self) -> bool {
        self.instant_alter
    }

    /// Default value of an instantly added field (`None` = SQL NULL).
    pub fn instant_field_value(&self, n: usize) -> Option<&[u8]> {
        debug_assert!(self.is_instant());
        debug_assert!(n >= self.n_core_fields && n < self.fields.len());
        self.fields[n].col.instant_value()
    }

    /// Instant ADD COLUMN: append a column with the given default value.
    pub fn add_instant_column(
        &mut self,
        name: &str,
        dtype: DataType,
        def_val: Option<Vec<u8>>,
    ) -> Result<(), RecError> {
        if !self.clustered {
            return Err(RecError::Argument(format!(
                "cannot add instant column to secondary index {}",
                self.name
            )));
        }
        if self.fields.len() >= REC_MAX_N_FIELDS {
            return Err(RecError::Argument(format!(
                "index {} already has {} fields",
                self.name,
                self.fields.len()
            )));
        }
        if def_val.is_none() && dtype.is_not_null() {
            return Err(RecError::Argument(format!(
                "NOT NULL column {} needs a default value",
                name
            )));
        }
        let mut col = Column::new(name, dtype);
        col.def_val = def_val;
        if col.is_nullable() {
            self.n_nullable += 1;
        }
        let comp = self.is_comp();
        self.fields.push(IndexField::new(col, 0, false, comp));
        Ok(())
    }

    /// Instant DROP COLUMN: keep the field but mark its column dropped.
    pub fn drop_instant_column(&mut self, n: usize) -> Result<(), RecError> {
        if !self.clustered || n < self.first_user_field() || n >= self.fields.len() {
            return Err(RecError::Argument(format!(
                "field {} of index {} cannot be dropped instantly",
                n, self.name
            )));
        }
        let fixed_len = self.fields[n].fixed_len;
        self.fields[n].col.set_dropped(fixed_len);
        self.instant_alter = true;
        Ok(())
    }

    /// Forget the instant ADD COLUMN history: every field becomes core.
    /// Used when the table is emptied or rebuilt.
    pub fn clear_instant(&mut self) {
        self.n_core_fields = self.fields.len();
        self.n_core_null_bytes = self.n_nullable.div_ceil(8);
        self.instant_alter = false;
    }
}

/// Builder for [`Index`] descriptors.
///
/// # Examples
///
/// ```
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
///
/// let index = IndexBuilder::new("PRIMARY", 42, RowFormat::Dynamic)
///     .clustered(1)
///     .column("id", DataType::int(8, true))
///     .system_columns()
///     .column("payload", DataType::blob(false))
///     .build()
///     .unwrap();
///
/// assert_eq!(index.n_fields(), 4);
/// assert_eq!(index.first_user_field(), 3);
/// assert_eq!(index.field(1).col.name, "DB_TRX_ID");
/// assert!(!index.is_instant());
/// ```
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    name: String,
    id: u64,
    row_format: RowFormat,
    clustered: bool,
    spatial: bool,
    n_uniq: Option<usize>,
    fields: Vec<(Column, u32, bool)>,
}

impl IndexBuilder {
    /// Start describing a secondary, non-unique index.
    pub fn new(name: &str, id: u64, row_format: RowFormat) -> Self {
        IndexBuilder {
            name: name.to_string(),
            id,
            row_format,
            clustered: false,
            spatial: false,
            n_uniq: None,
            fields: Vec::new(),
        }
    }

    /// Make this the clustered index with `n_uniq` primary key fields.
    pub fn clustered(mut self, n_uniq: usize) -> Self {
        self.clustered = true;
        self.n_uniq = Some(n_uniq);
        self
    }

    /// Secondary index whose first `n_uniq` fields are unique.
    pub fn unique(mut self, n_uniq: usize) -> Self {
        self.n_uniq = Some(n_uniq);
        self
    }

    /// R-tree index.
    pub fn spatial(mut self) -> Self {
        self.spatial = true;
        self
    }

    /// Append a whole-column field.
    pub fn column(mut self, name: &str, dtype: DataType) -> Self {
        self.fields.push((Column::new(name, dtype), 0, false));
        self
    }

    /// Append a column prefix field.
    pub fn prefix_column(mut self, name: &str, dtype: DataType, prefix_len: u32) -> Self {
        self.fields.push((Column::new(name, dtype), prefix_len, false));
        self
    }

    /// Append a descending field.
    pub fn descending_column(mut self, name: &str, dtype: DataType) -> Self {
        self.fields.push((Column::new(name, dtype), 0, true));
        self
    }

    /// Append the hidden `DB_TRX_ID` and `DB_ROLL_PTR` columns of a clustered index.
    pub fn system_columns(self) -> Self {
        self.column("DB_TRX_ID", DataType::sys(DATA_TRX_ID_LEN, true))
            .column("DB_ROLL_PTR", DataType::sys(DATA_ROLL_PTR_LEN, true))
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<Index, RecError> {
        let n_fields = self.fields.len();
        if n_fields == 0 || n_fields > REC_MAX_N_FIELDS {
            return Err(RecError::Argument(format!(
                "index {} has {} fields, expected 1..={}",
                self.name, n_fields, REC_MAX_N_FIELDS
            )));
        }
        let n_uniq = self.n_uniq.unwrap_or(n_fields);
        if n_uniq == 0 || n_uniq > n_fields {
            return Err(RecError::Argument(format!(
                "index {} has n_uniq {} with {} fields",
                self.name, n_uniq, n_fields
            )));
        }
        if self.clustered && self.spatial {
            return Err(RecError::Argument(format!(
                "index {} cannot be both clustered and spatial",
                self.name
            )));
        }

        let comp = self.row_format.is_comp();
        let fields: Vec<IndexField> = self
            .fields
            .into_iter()
            .map(|(col, prefix_len, desc)| IndexField::new(col, prefix_len, desc, comp))
            .collect();
        let n_nullable = fields.iter().filter(|f| f.col.is_nullable()).count();

        Ok(Index {
            name: self.name,
            id: self.id,
            row_format: self.row_format,
            clustered: self.clustered,
            spatial: self.spatial,
            n_uniq,
            n_core_fields: n_fields,
            n_nullable,
            n_core_null_bytes: n_nullable.div_ceil(8),
            instant_alter: false,
            fields,
        })
    }
}
