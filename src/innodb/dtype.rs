//! Logical column data types.
//!
//! Every column and every tuple field carries a [`DataType`]: the InnoDB main
//! type (`mtype`), the precise type flags (`prtype`: NOT NULL, UNSIGNED,
//! binary, charset-collation in the upper 16 bits), the declared maximum
//! length, and the minimum/maximum bytes per character of its charset.
//!
//! The storage rules that the record codec depends on live here:
//! [`DataType::fixed_size`] decides whether a field needs a length byte,
//! and [`DataType::is_big_col`] decides whether a length may take two bytes.

use serde::Serialize;

// Main types (data0type.h)
pub const DATA_VARCHAR: u8 = 1;
pub const DATA_CHAR: u8 = 2;
pub const DATA_FIXBINARY: u8 = 3;
pub const DATA_BINARY: u8 = 4;
pub const DATA_BLOB: u8 = 5;
pub const DATA_INT: u8 = 6;
pub const DATA_SYS_CHILD: u8 = 7;
pub const DATA_SYS: u8 = 8;
pub const DATA_FLOAT: u8 = 9;
pub const DATA_DOUBLE: u8 = 10;
pub const DATA_DECIMAL: u8 = 11;
pub const DATA_VARMYSQL: u8 = 12;
pub const DATA_MYSQL: u8 = 13;
pub const DATA_GEOMETRY: u8 = 14;

// Precise type flags
pub const DATA_NOT_NULL: u32 = 256;
pub const DATA_UNSIGNED: u32 = 512;
pub const DATA_BINARY_TYPE: u32 = 1024;
pub const DATA_GIS_MBR: u32 = 2048;
pub const DATA_LONG_TRUE_VARCHAR: u32 = 4096;
pub const DATA_VIRTUAL: u32 = 8192;

/// Charset-collation id of the `binary` charset.
pub const DATA_MYSQL_BINARY_CHARSET_COLL: u32 = 63;
/// Charset-collation id of `latin1_swedish_ci`.
pub const DATA_LATIN1_SWEDISH_CI: u32 = 8;

// System column lengths
pub const DATA_TRX_ID_LEN: u32 = 6;
pub const DATA_ROLL_PTR_LEN: u32 = 7;
pub const DATA_ROW_ID_LEN: u32 = 6;
pub const DATA_MBR_LEN: u32 = 32;

/// Logical type of a column or tuple field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DataType {
    /// Main type (`DATA_*`).
    pub mtype: u8,
    /// Precise type: flags in the low 16 bits, charset-collation in the high 16.
    pub prtype: u32,
    /// Declared maximum length in bytes.
    pub len: u32,
    /// Minimum bytes per character.
    pub mbminlen: u8,
    /// Maximum bytes per character.
    pub mbmaxlen: u8,
}

impl DataType {
    /// Build a type with a single-byte (or binary) charset.
    pub fn new(mtype: u8, prtype: u32, len: u32) -> Self {
        DataType {
            mtype,
            prtype,
            len,
            mbminlen: 1,
            mbmaxlen: 1,
        }
    }

    /// Set the charset width in bytes per character.
    pub fn with_charset(mut self, coll: u32, mbminlen: u8, mbmaxlen: u8) -> Self {
        self.prtype = (self.prtype & 0xFFFF) | (coll << 16);
        self.mbminlen = mbminlen;
        self.mbmaxlen = mbmaxlen;
        self
    }

    fn null_flag(not_null: bool) -> u32 {
        if not_null {
            DATA_NOT_NULL
        } else {
            0
        }
    }

    /// Integer column of `len` bytes (stored big-endian, sign bit flipped).
    pub fn int(len: u32, not_null: bool) -> Self {
        Self::new(DATA_INT, Self::null_flag(not_null), len)
    }

    /// Fixed-length latin1 `CHAR(len)`.
    pub fn char(len: u32, not_null: bool) -> Self {
        Self::new(DATA_CHAR, Self::null_flag(not_null), len)
            .with_charset(DATA_LATIN1_SWEDISH_CI, 1, 1)
    }

    /// Variable-length latin1 `VARCHAR(len)`.
    pub fn varchar(len: u32, not_null: bool) -> Self {
        let mut prtype = Self::null_flag(not_null);
        if len > 255 {
            prtype |= DATA_LONG_TRUE_VARCHAR;
        }
        Self::new(DATA_VARCHAR, prtype, len).with_charset(DATA_LATIN1_SWEDISH_CI, 1, 1)
    }

    /// `CHAR(n)` in a multi-byte charset (`DATA_MYSQL`), `len = n * mbmaxlen`.
    pub fn mysql_char(len: u32, coll: u32, mbminlen: u8, mbmaxlen: u8, not_null: bool) -> Self {
        Self::new(DATA_MYSQL, Self::null_flag(not_null), len).with_charset(coll, mbminlen, mbmaxlen)
    }

    /// `VARCHAR(n)` in a multi-byte charset (`DATA_VARMYSQL`).
    pub fn mysql_varchar(len: u32, coll: u32, mbminlen: u8, mbmaxlen: u8, not_null: bool) -> Self {
        Self::new(DATA_VARMYSQL, Self::null_flag(not_null), len)
            .with_charset(coll, mbminlen, mbmaxlen)
    }

    /// `BINARY(len)`.
    pub fn fixbinary(len: u32, not_null: bool) -> Self {
        Self::new(DATA_FIXBINARY, Self::null_flag(not_null) | DATA_BINARY_TYPE, len)
            .with_charset(DATA_MYSQL_BINARY_CHARSET_COLL, 0, 0)
    }

    /// `VARBINARY(len)`.
    pub fn binary(len: u32, not_null: bool) -> Self {
        Self::new(DATA_BINARY, Self::null_flag(not_null) | DATA_BINARY_TYPE, len)
            .with_charset(DATA_MYSQL_BINARY_CHARSET_COLL, 0, 0)
    }

    /// Binary `BLOB`.
    pub fn blob(not_null: bool) -> Self {
        Self::new(DATA_BLOB, Self::null_flag(not_null) | DATA_BINARY_TYPE, 65535)
            .with_charset(DATA_MYSQL_BINARY_CHARSET_COLL, 0, 0)
    }

    /// `TEXT` in latin1.
    pub fn text(not_null: bool) -> Self {
        Self::new(DATA_BLOB, Self::null_flag(not_null), 65535)
            .with_charset(DATA_LATIN1_SWEDISH_CI, 1, 1)
    }

    /// Internal system column (`DB_TRX_ID`, `DB_ROLL_PTR`, `DB_ROW_ID`).
    pub fn sys(len: u32, not_null: bool) -> Self {
        Self::new(DATA_SYS, Self::null_flag(not_null) | DATA_BINARY_TYPE, len)
    }

    /// Child page number field of a node pointer record.
    pub fn sys_child() -> Self {
        Self::new(DATA_SYS_CHILD, DATA_NOT_NULL, 4)
    }

    /// Raw binary type with no declared maximum, used by `set_types_binary`.
    pub fn binary_unbounded() -> Self {
        Self::new(DATA_BINARY, DATA_BINARY_TYPE, 0)
    }

    /// Charset-collation id.
    pub fn charset_coll(&self) -> u32 {
        self.prtype >> 16
    }

    /// Returns true if the column is declared `NOT NULL`.
    pub fn is_not_null(&self) -> bool {
        self.prtype & DATA_NOT_NULL != 0
    }

    /// Returns true if the column accepts SQL NULL.
    pub fn is_nullable(&self) -> bool {
        !self.is_not_null()
    }

    /// Returns true if the column is a virtual (generated, not stored) column.
    pub fn is_virtual(&self) -> bool {
        self.prtype & DATA_VIRTUAL != 0
    }

    /// Returns true for BLOB-like main types (BLOB, GEOMETRY).
    pub fn is_large_mtype(&self) -> bool {
        matches!(self.mtype, DATA_BLOB | DATA_GEOMETRY)
    }

    /// Returns true if a variable length of 128 bytes or more is stored in
    /// two bytes (`DATA_BIG_COL`).
    pub fn is_big_col(&self) -> bool {
        self.len > 255 || self.is_large_mtype()
    }

    /// Returns true if the column compares with binary semantics.
    pub fn is_binary_string(&self) -> bool {
        match self.mtype {
            DATA_FIXBINARY | DATA_BINARY => true,
            DATA_BLOB => self.prtype & DATA_BINARY_TYPE != 0,
            _ => false,
        }
    }

    /// Returns true if values are stored in a charset with variable character width.
    fn is_multibyte_variable(&self) -> bool {
        self.mbminlen != self.mbmaxlen
    }

    /// Fixed storage size of the type, or 0 if the type is variable-length.
    ///
    /// `comp` selects the ROW_FORMAT=COMPACT rule, where a `CHAR(n)` in a
    /// variable-width charset is stored as a variable-length field.
    ///
    /// # Examples
    ///
    /// ```
    /// use innorec::innodb::dtype::DataType;
    ///
    /// assert_eq!(DataType::int(4, true).fixed_size(true), 4);
    /// assert_eq!(DataType::varchar(20, false).fixed_size(true), 0);
    ///
    /// // utf8mb4 CHAR(10): fixed in REDUNDANT, variable in COMPACT
    /// let c = DataType::mysql_char(40, 45, 1, 4, false);
    /// assert_eq!(c.fixed_size(false), 40);
    /// assert_eq!(c.fixed_size(true), 0);
    /// ```
    pub fn fixed_size(&self, comp: bool) -> u32 {
        match self.mtype {
            DATA_SYS | DATA_CHAR | DATA_FIXBINARY | DATA_INT | DATA_FLOAT | DATA_DOUBLE
            | DATA_SYS_CHILD => self.len,
            DATA_MYSQL => {
                if self.prtype & DATA_BINARY_TYPE != 0 || !comp || !self.is_multibyte_variable() {
                    self.len
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Minimum storage size of the type.
    pub fn min_size(&self) -> u32 {
        match self.mtype {
            DATA_MYSQL if self.is_multibyte_variable() && self.mbmaxlen > 0 => {
                self.len * u32::from(self.mbminlen) / u32::from(self.mbmaxlen)
            }
            _ => self.fixed_size(false),
        }
    }

    /// Bytes written for SQL NULL in a REDUNDANT record (the fixed size, or 0).
    pub fn sql_null_size(&self, comp: bool) -> u32 {
        self.fixed_size(comp)
    }

    /// Main type name in the InnoDB source style (e.g. `"DATA_VARCHAR"`).
    pub fn mtype_name(&self) -> &'static str {
        match self.mtype {
            DATA_VARCHAR => "DATA_VARCHAR",
            DATA_CHAR => "DATA_CHAR",
            DATA_FIXBINARY => "DATA_FIXBINARY",
            DATA_BINARY => "DATA_BINARY",
            DATA_BLOB => "DATA_BLOB",
            DATA_INT => "DATA_INT",
            DATA_SYS_CHILD => "DATA_SYS_CHILD",
            DATA_SYS => "DATA_SYS",
            DATA_FLOAT => "DATA_FLOAT",
            DATA_DOUBLE => "DATA_DOUBLE",
            DATA_DECIMAL => "DATA_DECIMAL",
            DATA_VARMYSQL => "DATA_VARMYSQL",
            DATA_MYSQL => "DATA_MYSQL",
            DATA_GEOMETRY => "DATA_GEOMETRY",
            _ => "UNKNOWN",
        }
    }
}
