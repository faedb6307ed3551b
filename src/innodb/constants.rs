/// InnoDB page and record structure constants.
///
/// These values are derived from the InnoDB source code headers:
/// - fil0fil.h (FIL header/trailer)
/// - page0page.h (index page header and directory)
/// - rem0rec.h (physical record header)
/// - data0type.h (column main types and precise type flags)
// Page sizes
pub const SIZE_PAGE_DEFAULT: u32 = 16384;
pub const SIZE_PAGE_MIN: u32 = 4096;
pub const SIZE_PAGE_MAX: u32 = 65536;

// FIL Header (38 bytes total)
pub const FIL_PAGE_OFFSET: usize = 4; // 4 bytes - page number
pub const FIL_PAGE_PREV: usize = 8; // 4 bytes - previous page
pub const FIL_PAGE_NEXT: usize = 12; // 4 bytes - next page
pub const FIL_PAGE_TYPE: usize = 24; // 2 bytes - page type

// Start of page data (immediately after FIL header)
pub const FIL_PAGE_DATA: usize = 38;
// Size of the FIL trailer at the end of the page
pub const FIL_PAGE_DATA_END: usize = 8;

// Page types this crate writes
pub const FIL_PAGE_INDEX: u16 = 17855;
pub const FIL_PAGE_RTREE: u16 = 17854;
pub const FIL_PAGE_TYPE_INSTANT: u16 = 18;

// Special page number values
pub const FIL_NULL: u32 = 0xFFFFFFFF; // "null" page reference (4294967295)

// Page Header (INDEX page specific, starts at PAGE_HEADER = FIL_PAGE_DATA)
pub const PAGE_HEADER: usize = FIL_PAGE_DATA;
pub const PAGE_N_DIR_SLOTS: usize = 0; // 2 bytes - number of directory slots
pub const PAGE_HEAP_TOP: usize = 2; // 2 bytes - pointer to record heap top
pub const PAGE_N_HEAP: usize = 4; // 2 bytes - records in heap (bit 15 = compact flag)
pub const PAGE_FREE: usize = 6; // 2 bytes - pointer to start of free record list
pub const PAGE_GARBAGE: usize = 8; // 2 bytes - bytes in deleted records
pub const PAGE_LAST_INSERT: usize = 10; // 2 bytes - pointer to last inserted record
pub const PAGE_INSTANT: usize = 12; // 13 high bits - instant ADD COLUMN core field count
pub const PAGE_DIRECTION_B: usize = 13; // 3 low bits - last insert direction
pub const PAGE_N_DIRECTION: usize = 14; // 2 bytes - consecutive inserts in same direction
pub const PAGE_N_RECS: usize = 16; // 2 bytes - number of user records
pub const PAGE_MAX_TRX_ID: usize = 18; // 8 bytes - max trx id (secondary index leaf pages)
pub const PAGE_ROOT_AUTO_INC: usize = PAGE_MAX_TRX_ID; // 8 bytes - AUTO_INCREMENT (clustered root)
pub const PAGE_HEADER_PRIV_END: usize = 26; // end of the fields reset by page creation
pub const PAGE_LEVEL: usize = 26; // 2 bytes - level in B+tree (0 = leaf)
pub const PAGE_INDEX_ID: usize = 28; // 8 bytes - index id
pub const PAGE_BTR_SEG_LEAF: usize = 36; // 10 bytes - leaf segment header
pub const PAGE_BTR_SEG_TOP: usize = 46; // 10 bytes - non-leaf segment header

// FSEG Header size
pub const FSEG_HEADER_SIZE: usize = 10;

// Start of the record area: PAGE_HEADER + 36 + 2 * FSEG_HEADER_SIZE
pub const PAGE_DATA: usize = PAGE_HEADER + 36 + 2 * FSEG_HEADER_SIZE; // 94

// Record extra bytes
pub const REC_N_OLD_EXTRA_BYTES: usize = 6;
pub const REC_N_NEW_EXTRA_BYTES: usize = 5;

// System record offsets
pub const PAGE_OLD_INFIMUM: usize = PAGE_DATA + 1 + REC_N_OLD_EXTRA_BYTES; // 101
pub const PAGE_OLD_SUPREMUM: usize = PAGE_DATA + 2 + 2 * REC_N_OLD_EXTRA_BYTES + 8; // 116
pub const PAGE_OLD_SUPREMUM_END: usize = PAGE_OLD_SUPREMUM + 9; // 125
pub const PAGE_NEW_INFIMUM: usize = PAGE_DATA + REC_N_NEW_EXTRA_BYTES; // 99
pub const PAGE_NEW_SUPREMUM: usize = PAGE_DATA + 2 * REC_N_NEW_EXTRA_BYTES + 8; // 112
pub const PAGE_NEW_SUPREMUM_END: usize = PAGE_NEW_SUPREMUM + 8; // 120

// Heap numbers of the system records
pub const PAGE_HEAP_NO_INFIMUM: usize = 0;
pub const PAGE_HEAP_NO_SUPREMUM: usize = 1;
pub const PAGE_HEAP_NO_USER_LOW: usize = 2;

// Page directory
pub const PAGE_DIR: usize = FIL_PAGE_DATA_END;
pub const PAGE_DIR_SLOT_SIZE: usize = 2;
pub const PAGE_DIR_SLOT_MIN_N_OWNED: usize = 4;
pub const PAGE_DIR_SLOT_MAX_N_OWNED: usize = 8;

// Insert direction values
pub const PAGE_LEFT: u8 = 1;
pub const PAGE_RIGHT: u8 = 2;
pub const PAGE_SAME_REC: u8 = 3;
pub const PAGE_SAME_PAGE: u8 = 4;
pub const PAGE_NO_DIRECTION: u8 = 5;

// Record header bit fields, as (offset back from origin, mask, shift)
pub const REC_NEXT: usize = 2; // 2 bytes - next record pointer
pub const REC_NEW_INFO_BITS: usize = 5; // upper nibble of the byte
pub const REC_NEW_N_OWNED: usize = 5; // lower nibble of the byte
pub const REC_NEW_HEAP_NO: usize = 4; // 13 bits of a 2-byte field
pub const REC_NEW_STATUS: usize = 3; // 3 low bits
pub const REC_OLD_INFO_BITS: usize = 6;
pub const REC_OLD_N_OWNED: usize = 6;
pub const REC_OLD_HEAP_NO: usize = 5;
pub const REC_OLD_N_FIELDS: usize = 4; // 10 bits of a 2-byte field
pub const REC_OLD_SHORT: usize = 3; // 1 bit: 1-byte field offsets

pub const REC_INFO_BITS_MASK: u8 = 0xF0;
pub const REC_INFO_BITS_SHIFT: u32 = 0;
pub const REC_N_OWNED_MASK: u8 = 0x0F;
pub const REC_HEAP_NO_MASK: u16 = 0xFFF8;
pub const REC_HEAP_NO_SHIFT: u32 = 3;
pub const REC_NEW_STATUS_MASK: u8 = 0x07;
pub const REC_OLD_N_FIELDS_MASK: u16 = 0x7FE;
pub const REC_OLD_N_FIELDS_SHIFT: u32 = 1;
pub const REC_OLD_SHORT_MASK: u8 = 0x01;

// Info bits
pub const REC_INFO_MIN_REC_FLAG: u8 = 0x10;
pub const REC_INFO_DELETED_FLAG: u8 = 0x20;

// Record status values (3 low bits of the compact header, also carried in tuple info bits)
pub const REC_STATUS_ORDINARY: u8 = 0;
pub const REC_STATUS_NODE_PTR: u8 = 1;
pub const REC_STATUS_INFIMUM: u8 = 2;
pub const REC_STATUS_SUPREMUM: u8 = 3;
pub const REC_STATUS_INSTANT: u8 = 4;

// Tuple info bits of the instant ALTER metadata pseudo-records
pub const REC_INFO_METADATA_ADD: u8 = REC_INFO_MIN_REC_FLAG | REC_STATUS_INSTANT;
pub const REC_INFO_METADATA_ALTER: u8 = REC_INFO_METADATA_ADD | REC_INFO_DELETED_FLAG;

// REDUNDANT field end-info flags
pub const REC_1BYTE_SQL_NULL_MASK: u16 = 0x80;
pub const REC_2BYTE_SQL_NULL_MASK: u16 = 0x8000;
pub const REC_2BYTE_EXTERN_MASK: u16 = 0x4000;
pub const REC_1BYTE_OFFS_LIMIT: usize = 0x7F;
pub const REC_2BYTE_OFFS_LIMIT: usize = 0x7FFF;

// Limits
pub const REC_MAX_N_FIELDS: usize = 1024 - 1;
pub const REC_MAX_N_OWNED: usize = 16 - 1;
pub const REC_NODE_PTR_SIZE: usize = 4;
pub const REDUNDANT_REC_MAX_DATA_SIZE: usize = 16383;
pub const COMPRESSED_REC_MAX_DATA_SIZE: usize = 16384;
pub const REC_ANTELOPE_MAX_INDEX_COL_LEN: usize = 768;
pub const DICT_MAX_FIXED_COL_LEN: u32 = REC_ANTELOPE_MAX_INDEX_COL_LEN as u32;

// External (off-page) field reference
pub const BTR_EXTERN_FIELD_REF_SIZE: usize = 20;
pub const BTR_EXTERN_SPACE_ID: usize = 0; // 4 bytes - space id of the first overflow page
pub const BTR_EXTERN_PAGE_NO: usize = 4; // 4 bytes - page number of the first overflow page
pub const BTR_EXTERN_OFFSET: usize = 8; // 4 bytes - byte offset of the BLOB header on that page
pub const BTR_EXTERN_LEN: usize = 12; // 8 bytes - length (4 high bytes hold flags)
pub const BTR_EXTERN_OWNER_FLAG: u8 = 0x80;
pub const BTR_EXTERN_INHERITED_FLAG: u8 = 0x40;
pub const BTR_EXTERN_LOCAL_STORED_MAX_SIZE: usize = BTR_EXTERN_FIELD_REF_SIZE * 2;

// Offsets array entry encoding (2 type bits + 14 value bits)
pub const REC_OFFS_VALUE_MASK: u16 = 0x3FFF;
pub const REC_OFFS_TYPE_MASK: u16 = 0xC000;
pub const REC_OFFS_STORED_OFFPAGE: u16 = 1 << 14;
pub const REC_OFFS_SQL_NULL: u16 = 2 << 14;
pub const REC_OFFS_DEFAULT: u16 = 3 << 14;
// Offsets header flags
pub const REC_OFFS_COMPACT: u16 = 0x8000;
pub const REC_OFFS_EXTERNAL: u16 = 0x4000;
pub const REC_OFFS_ANY_DEFAULT: u16 = 0x2000;
pub const REC_OFFS_MASK: u16 = REC_OFFS_ANY_DEFAULT - 1;

// Field length sentinels for callers working with plain lengths
pub const UNIV_SQL_NULL: usize = u32::MAX as usize;
pub const UNIV_SQL_DEFAULT: usize = UNIV_SQL_NULL - 1;
