//! Access mask bits for directory objects (MS-ADTS 5.1.3.2, MS-DTYP 2.4.3).

// Standard rights
pub const DELETE: u32 = 0x0001_0000;
pub const READ_CONTROL: u32 = 0x0002_0000;
pub const WRITE_DACL: u32 = 0x0004_0000;
pub const WRITE_OWNER: u32 = 0x0008_0000;
pub const SYNCHRONIZE: u32 = 0x0010_0000;
pub const ACCESS_SYSTEM_SECURITY: u32 = 0x0100_0000;

// Directory service specific rights
pub const DS_CREATE_CHILD: u32 = 0x0000_0001;
pub const DS_DELETE_CHILD: u32 = 0x0000_0002;
pub const DS_LIST_CONTENTS: u32 = 0x0000_0004;
pub const DS_WRITE_PROPERTY_EXTENDED: u32 = 0x0000_0008;
pub const DS_READ_PROPERTY: u32 = 0x0000_0010;
pub const DS_WRITE_PROPERTY: u32 = 0x0000_0020;
pub const DS_DELETE_TREE: u32 = 0x0000_0040;
pub const DS_LIST_OBJECT: u32 = 0x0000_0080;
pub const DS_CONTROL_ACCESS: u32 = 0x0000_0100;

/// Undocumented bit seen in directory ACEs. Evaluated as an ordinary opaque
/// bit: it grants nothing beyond itself.
pub const VOODOO_BIT: u32 = 0x0000_1000;

// Generic rights as stored in ACE masks
pub const GENERIC_ALL_BIT: u32 = 0x1000_0000;
pub const GENERIC_EXECUTE_BIT: u32 = 0x2000_0000;
pub const GENERIC_WRITE_BIT: u32 = 0x4000_0000;
pub const GENERIC_READ_BIT: u32 = 0x8000_0000;
const GENERIC_BITS: u32 = GENERIC_ALL_BIT | GENERIC_EXECUTE_BIT | GENERIC_WRITE_BIT | GENERIC_READ_BIT;

// Generic rights expanded to directory rights
pub const GENERIC_READ: u32 = READ_CONTROL | DS_LIST_CONTENTS | DS_READ_PROPERTY | DS_LIST_OBJECT;
pub const GENERIC_WRITE: u32 = READ_CONTROL | DS_WRITE_PROPERTY | DS_WRITE_PROPERTY_EXTENDED;
pub const GENERIC_EXECUTE: u32 = READ_CONTROL | DS_LIST_CONTENTS;
pub const GENERIC_ALL: u32 = DS_CREATE_CHILD
    | DS_DELETE_CHILD
    | DS_LIST_CONTENTS
    | DS_WRITE_PROPERTY_EXTENDED
    | DS_READ_PROPERTY
    | DS_WRITE_PROPERTY
    | DS_DELETE_TREE
    | DS_LIST_OBJECT
    | DS_CONTROL_ACCESS
    | DELETE
    | READ_CONTROL
    | WRITE_DACL
    | WRITE_OWNER;

/// Replace stored generic bits by the directory rights they stand for.
#[must_use]
pub const fn expand_generic(mask: u32) -> u32 {
    let mut expanded = mask & !GENERIC_BITS;
    if mask & GENERIC_ALL_BIT != 0 {
        expanded |= GENERIC_ALL;
    }
    if mask & GENERIC_EXECUTE_BIT != 0 {
        expanded |= GENERIC_EXECUTE;
    }
    if mask & GENERIC_WRITE_BIT != 0 {
        expanded |= GENERIC_WRITE;
    }
    if mask & GENERIC_READ_BIT != 0 {
        expanded |= GENERIC_READ;
    }
    expanded
}
