//! InnoDB record and index page storage core.
//!
//! The `innodb-rec` crate (library name `innorec`) implements the physical
//! record formats of InnoDB (REDUNDANT, COMPACT/DYNAMIC and the temporary-file
//! variant used by online index builds), the record offsets computation that
//! locates every field inside a packed record, and the slotted index page that
//! holds those records.
//!
//! # Library API
//!
//! ```toml
//! [dependencies]
//! innorec = { package = "innodb-rec", version = "0.1" }
//! ```
//!
//! ## Quick example
//!
//! ```
//! use innorec::innodb::dict::{IndexBuilder, RowFormat};
//! use innorec::innodb::dtype::DataType;
//! use innorec::innodb::data::Tuple;
//! use innorec::innodb::convert::{converted_size, convert_tuple_to_record};
//! use innorec::innodb::offsets::Offsets;
//!
//! let index = IndexBuilder::new("PRIMARY", 1, RowFormat::Dynamic)
//!     .clustered(1)
//!     .column("id", DataType::int(4, true))
//!     .system_columns()
//!     .column("name", DataType::varchar(20, false))
//!     .build()
//!     .unwrap();
//!
//! let mut tuple = Tuple::new(4);
//! tuple.field_mut(0).set_data(&[0x80, 0, 0, 1]);
//! tuple.field_mut(1).set_data(&[0; 6]);
//! tuple.field_mut(2).set_data(&[0x80, 0, 0, 0, 0, 0, 0]);
//! tuple.field_mut(3).set_data(b"alice");
//! tuple.set_types_from_index(&index);
//!
//! let size = converted_size(&index, &tuple, 0);
//! let mut buf = vec![0u8; size];
//! let origin = convert_tuple_to_record(&mut buf, &index, &tuple, 0);
//!
//! let mut offsets = Offsets::new();
//! offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
//! assert_eq!(offsets.nth_field(&buf, origin, 3), Some(&b"alice"[..]));
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`innodb::dtype`] | Column data types and their storage rules |
//! | [`innodb::dict`] | Index and column descriptors, instant ADD/DROP metadata |
//! | [`innodb::data`] | Fields and tuples (logical rows and keys) |
//! | [`innodb::record`] | Packed record views and header accessors |
//! | [`innodb::offsets`] | Record offsets engine |
//! | [`innodb::convert`] | Tuple to record conversion and back |
//! | [`innodb::cmp`] | Field and record comparison |
//! | [`innodb::extern_ref`] | Off-page field references |
//! | [`innodb::page`] | Slotted index page layout |
//! | [`innodb::page_cur`] | Page search, insert and delete |
//! | [`innodb::validate`] | Read-only page consistency checks |
//! | [`innodb::big_rec`] | Moving long fields off-page and restoring them |
//! | [`innodb::print`] | Human-readable record dumps |
//! | [`innodb::constants`] | InnoDB page/record structure constants |

pub mod innodb;
pub mod util;

use thiserror::Error;

/// Errors returned by `innorec` operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecError {
    /// A parse error occurred (malformed page bytes or unexpected values).
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid argument was supplied (unsupported page size, bad descriptor, etc.).
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The page structure is inconsistent.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// The record does not fit into the free space of the page.
    #[error("Page full: need {need} bytes, {available} available")]
    PageFull { need: usize, available: usize },

    /// The record exceeds the maximum record size even after externalization.
    #[error("Row size too large: {size} bytes, maximum is {max}")]
    RowTooLarge { size: usize, max: usize },
}
