//! `__debug_abbrev` parsing.
//!
//! The abbreviation section is the schema for `__debug_info`: each
//! compilation unit names the table it was encoded against by the table's
//! byte offset within this section. The walker only needs each
//! abbreviation's attribute forms, so tags and attribute names are kept
//! opaque.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::reader::ByteReader;

/// One `(name, form)` attribute specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// DW_AT attribute name code.
    pub name: u64,
    /// DW_FORM encoding of the attribute value.
    pub form: u64,
}

/// One abbreviation declaration.
#[derive(Debug, Clone)]
pub struct Abbreviation {
    /// Code that debugging entries use to select this abbreviation.
    pub code: u64,
    /// DW_TAG of the described entry.
    pub tag: u64,
    /// Whether entries of this shape own children.
    pub has_children: bool,
    /// Attribute specifications in encoding order.
    pub attributes: Vec<Attribute>,
}

/// Abbreviations of one table, keyed by code.
pub type AbbreviationTable = BTreeMap<u64, Abbreviation>;

/// Parses every abbreviation table in the section, keyed by table offset.
pub fn parse_abbrev_tables(data: &[u8]) -> Result<BTreeMap<u64, AbbreviationTable>> {
    let mut reader = ByteReader::new(data, false);
    let mut tables: BTreeMap<u64, AbbreviationTable> = BTreeMap::new();
    let mut current_table_offset = 0u64;

    while reader.remaining() > 0 {
        let code = reader.read_uleb128()?;
        if code == 0 {
            // End of table; the next one starts at the cursor.
            current_table_offset = reader.position() as u64;
            continue;
        }

        let tag = reader.read_uleb128()?;
        let has_children = reader.read_u8()? != 0;

        let mut attributes = Vec::new();
        loop {
            let name = reader.read_uleb128()?;
            let form = reader.read_uleb128()?;
            if name == 0 && form == 0 {
                break;
            }
            attributes.push(Attribute { name, form });
        }

        let table = tables.entry(current_table_offset).or_default();
        if table.contains_key(&code) {
            return Err(Error::invalid(format!(
                "duplicate abbreviation code {code} in table at offset {current_table_offset}"
            )));
        }
        table.insert(
            code,
            Abbreviation {
                code,
                tag,
                has_children,
                attributes,
            },
        );
    }

    Ok(tables)
}
