//! InnoDB record and index page structures.
//!
//! The modules are layered leaf-first: column types ([`dtype`]) and index
//! descriptors ([`dict`]) describe the schema, [`data`] holds logical tuples,
//! [`convert`] and [`offsets`] translate between tuples and packed records,
//! and [`page`] / [`page_cur`] manage records inside a fixed-size index page.
//!
//! Start with [`dict::IndexBuilder`] to describe an index, build a
//! [`data::Tuple`], then pack it with [`convert::convert_tuple_to_record`].

pub mod big_rec;
pub mod cmp;
pub mod constants;
pub mod convert;
pub mod data;
pub mod dict;
pub mod dtype;
pub mod extern_ref;
pub mod offsets;
pub mod page;
pub mod page_cur;
pub mod print;
pub mod record;
pub mod validate;
