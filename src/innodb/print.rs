//! Human-readable record dumps.

use std::fmt::Write;

use crate::innodb::offsets::{FieldKind, Offsets};
use crate::innodb::record::Rec;
use crate::util::hex::{format_ascii, format_bytes, format_offset, hex_dump};

/// Field bytes shown before the dump is cut short.
const MAX_PRINTED_LEN: usize = 30;

fn print_field(out: &mut String, i: usize, kind: FieldKind, data: Option<&[u8]>) {
    let _ = write!(out, " {}:", i);
    match (kind, data) {
        (FieldKind::Default, _) => out.push_str(" DEFAULT"),
        (_, None) => out.push_str(" SQL NULL"),
        (_, Some(data)) => {
            let shown = &data[..data.len().min(MAX_PRINTED_LEN)];
            let _ = write!(
                out,
                " len {}; hex {}; asc {}",
                data.len(),
                format_bytes(shown),
                format_ascii(shown)
            );
            if data.len() > MAX_PRINTED_LEN {
                out.push_str("...(truncated)");
            }
            if kind == FieldKind::External {
                out.push_str(" (external)");
            }
        }
    }
    out.push_str(";\n");
}

/// Dump a record whose offsets are known.
///
/// One header line followed by one line per field.
///
/// # Examples
///
/// ```
/// use innorec::innodb::convert::{convert_tuple_to_record, converted_size};
/// use innorec::innodb::data::Tuple;
/// use innorec::innodb::dict::{IndexBuilder, RowFormat};
/// use innorec::innodb::dtype::DataType;
/// use innorec::innodb::offsets::Offsets;
/// use innorec::innodb::print::rec_print;
///
/// let index = IndexBuilder::new("k", 1, RowFormat::Compact)
///     .column("a", DataType::varchar(10, false))
///     .build()
///     .unwrap();
/// let mut t = Tuple::new(1);
/// t.field_mut(0).set_null();
/// t.set_types_from_index(&index);
/// let mut buf = vec![0u8; converted_size(&index, &t, 0)];
/// let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
/// let mut offsets = Offsets::new();
/// offsets.compute(&buf, origin, &index, index.n_core_fields(), usize::MAX);
///
/// let text = rec_print(&buf, origin, &offsets);
/// assert!(text.starts_with("PHYSICAL RECORD: n_fields 1; compact format; info bits 0\n"));
/// assert!(text.contains(" 0: SQL NULL;"));
/// ```
pub fn rec_print(buf: &[u8], origin: usize, offsets: &Offsets) -> String {
    let rec = Rec::new(buf, origin);
    let comp = offsets.comp();
    let mut out = String::new();
    if comp {
        let _ = writeln!(
            out,
            "PHYSICAL RECORD: n_fields {}; compact format; info bits {}",
            offsets.n_fields(),
            rec.info_bits(true)
        );
    } else {
        let _ = writeln!(
            out,
            "PHYSICAL RECORD: n_fields {}; {}-byte offsets; info bits {}",
            offsets.n_fields(),
            if rec.one_byte_offs_flag() { 1 } else { 2 },
            rec.info_bits(false)
        );
    }
    for i in 0..offsets.n_fields() {
        let kind = offsets.nth_kind(i);
        print_field(&mut out, i, kind, offsets.nth_field(buf, origin, i));
    }
    out
}

/// Dump a REDUNDANT record using only its own header.
pub fn rec_print_old(buf: &[u8], origin: usize) -> String {
    let rec = Rec::new(buf, origin);
    let n = rec.n_fields_old();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "PHYSICAL RECORD: n_fields {}; {}-byte offsets; info bits {}",
        n,
        if rec.one_byte_offs_flag() { 1 } else { 2 },
        rec.info_bits(false)
    );
    for i in 0..n {
        let data = rec
            .field_len_old(i)
            .map(|len| rec.data(rec.field_start_old(i), len));
        print_field(&mut out, i, FieldKind::Stored, data);
    }
    out
}

/// Raw hex dump of the whole record, header included.
pub fn rec_hex_dump(buf: &[u8], origin: usize, offsets: &Offsets) -> String {
    let start = origin - offsets.extra_size();
    format!(
        "record at {}\n{}",
        format_offset(origin),
        hex_dump(&buf[start..start + offsets.size()], start)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innodb::convert::{convert_tuple_to_record, converted_size};
    use crate::innodb::data::Tuple;
    use crate::innodb::dict::{Index, IndexBuilder, RowFormat};
    use crate::innodb::dtype::DataType;

    fn record(format: RowFormat, long: &[u8]) -> (Index, Vec<u8>, usize) {
        let index = IndexBuilder::new("k", 1, format)
            .column("id", DataType::int(4, true))
            .column("v", DataType::varchar(100, false))
            .build()
            .unwrap();
        let mut t = Tuple::new(2);
        t.field_mut(0).set_data(b"ABCD");
        t.field_mut(1).set_data(long);
        t.set_types_from_index(&index);
        let mut buf = vec![0u8; converted_size(&index, &t, 0)];
        let origin = convert_tuple_to_record(&mut buf, &index, &t, 0);
        (index, buf, origin)
    }

    #[test]
    fn test_print_compact() {
        let (index, buf, origin) = record(RowFormat::Compact, &[b'z'; 40]);
        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, 2, usize::MAX);
        let text = rec_print(&buf, origin, &offsets);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], " 0: len 4; hex 41424344; asc ABCD;");
        assert!(lines[2].starts_with(" 1: len 40; hex 7a7a"));
        assert!(lines[2].contains("...(truncated)"));
    }

    #[test]
    fn test_print_old() {
        let (index, buf, origin) = record(RowFormat::Redundant, b"hi");
        let text = rec_print_old(&buf, origin);
        assert!(text.starts_with("PHYSICAL RECORD: n_fields 2; 1-byte offsets; info bits 0\n"));
        assert!(text.contains(" 1: len 2; hex 6869; asc hi;"));

        let mut offsets = Offsets::new();
        offsets.compute(&buf, origin, &index, 2, usize::MAX);
        assert_eq!(rec_print(&buf, origin, &offsets), text);
        assert!(rec_hex_dump(&buf, origin, &offsets).contains("|"));
    }
}
