use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::NsError;
use crate::types::SubroutineKind;

pub const MODULE_MAGIC: [u8; 4] = *b"NSX\x01";
pub const HEADER_SIZE: usize = 16;
pub const TABLE_HEADER_SIZE: u16 = 8;
pub const SUBROUTINE_TABLE_MARKER: [u8; 4] = *b"SUBR";
pub const RTI_TABLE_MARKER: [u8; 4] = *b"RTI_";
pub const IMPORT_TABLE_MARKER: [u8; 4] = *b"IMPT";
pub const STRING_TABLE_MARKER: [u8; 4] = *b"STRT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueBlockDef {
    pub name: String,
    pub offset: u16,
}

/// Everything the writer needs to lay out one subroutine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineDef {
    pub kind: SubroutineKind,
    pub name: String,
    pub parameters: Vec<String>,
    pub dialogue_blocks: Vec<DialogueBlockDef>,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct StringHeap {
    strings: Vec<String>,
    index: HashMap<String, u16>,
}

impl StringHeap {
    pub fn intern(&mut self, value: &str) -> Result<u16, NsError> {
        if let Some(token) = self.index.get(value) {
            return Ok(*token);
        }
        let token = u16::try_from(self.strings.len()).map_err(|_| {
            NsError::new(
                "MODULE_STRING_HEAP_FULL",
                "String heap cannot hold more than 65535 entries.",
            )
        })?;
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), token);
        Ok(token)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    subroutines: Vec<SubroutineDef>,
    imports: Vec<String>,
    strings: StringHeap,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_string(&mut self, value: &str) -> Result<u16, NsError> {
        self.strings.intern(value)
    }

    pub fn add_import(&mut self, module_name: &str) -> Result<u16, NsError> {
        if let Some(index) = self.imports.iter().position(|name| name == module_name) {
            return Ok(index as u16);
        }
        let index = u16::try_from(self.imports.len()).map_err(|_| {
            NsError::new("MODULE_IMPORT_TABLE_FULL", "Too many imported modules.")
        })?;
        self.imports.push(module_name.to_string());
        Ok(index)
    }

    pub fn push_subroutine(&mut self, def: SubroutineDef) -> Result<u16, NsError> {
        let index = u16::try_from(self.subroutines.len()).map_err(|_| {
            NsError::new("MODULE_SUBROUTINE_TABLE_FULL", "Too many subroutines.")
        })?;
        self.subroutines.push(def);
        Ok(index)
    }

    pub fn subroutines(&self) -> &[SubroutineDef] {
        &self.subroutines
    }

    pub fn write(&self) -> Result<Vec<u8>, NsError> {
        let mut out = Vec::new();
        out.extend_from_slice(&MODULE_MAGIC);
        out.extend_from_slice(&[0u8; 12]);

        let subroutine_count = self.subroutines.len() as u16;
        write_table_header(&mut out, SUBROUTINE_TABLE_MARKER, subroutine_count);
        let subroutine_offsets_at = out.len();
        out.extend(std::iter::repeat(0u8).take(self.subroutines.len() * 4));

        let rti_offset = out.len();
        let mut entries = Vec::new();
        let mut entry_offsets = Vec::with_capacity(self.subroutines.len() + 1);
        for def in &self.subroutines {
            entry_offsets.push(checked_u16(entries.len(), "RTI table")?);
            entries.push(def.kind.to_byte());
            write_name(&mut entries, &def.name)?;
            entries.write_u16::<LittleEndian>(checked_u16(def.dialogue_blocks.len(), "dialogue blocks")?)
                .map_err(write_error)?;
            for block in &def.dialogue_blocks {
                write_name(&mut entries, &block.name)?;
            }
            entries
                .write_u16::<LittleEndian>(checked_u16(def.parameters.len(), "parameters")?)
                .map_err(write_error)?;
            for parameter in &def.parameters {
                write_name(&mut entries, parameter)?;
            }
        }
        entry_offsets.push(checked_u16(entries.len(), "RTI table")?);
        write_table_header(&mut out, RTI_TABLE_MARKER, subroutine_count);
        for offset in entry_offsets {
            out.write_u16::<LittleEndian>(offset).map_err(write_error)?;
        }
        out.extend_from_slice(&entries);

        write_table_header(&mut out, IMPORT_TABLE_MARKER, self.imports.len() as u16);
        for import in &self.imports {
            write_name(&mut out, import)?;
        }

        let string_table_offset = out.len();
        let strings = self.strings.strings();
        write_table_header(&mut out, STRING_TABLE_MARKER, strings.len() as u16);
        let string_offsets_at = out.len();
        out.extend(std::iter::repeat(0u8).take(strings.len() * 4));
        for (index, value) in strings.iter().enumerate() {
            let at = checked_u32(out.len())?;
            patch_u32(&mut out, string_offsets_at + index * 4, at);
            write_name(&mut out, value)?;
        }

        let code_offset = out.len();
        for (index, def) in self.subroutines.iter().enumerate() {
            let at = checked_u32(out.len())?;
            patch_u32(&mut out, subroutine_offsets_at + index * 4, at);
            out.write_u16::<LittleEndian>(checked_u16(def.dialogue_blocks.len(), "dialogue blocks")?)
                .map_err(write_error)?;
            for block in &def.dialogue_blocks {
                out.write_u16::<LittleEndian>(block.offset).map_err(write_error)?;
            }
            out.extend_from_slice(&def.code);
        }

        patch_u32(&mut out, 4, checked_u32(rti_offset)?);
        patch_u32(&mut out, 8, checked_u32(string_table_offset)?);
        patch_u32(&mut out, 12, checked_u32(code_offset)?);
        Ok(out)
    }
}

fn write_table_header(out: &mut Vec<u8>, marker: [u8; 4], count: u16) {
    out.extend_from_slice(&marker);
    out.extend_from_slice(&TABLE_HEADER_SIZE.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
}

fn write_name(out: &mut Vec<u8>, value: &str) -> Result<(), NsError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        NsError::new(
            "MODULE_STRING_TOO_LONG",
            format!("String of {} bytes exceeds 65535 bytes.", value.len()),
        )
    })?;
    out.write_u16::<LittleEndian>(len).map_err(write_error)?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn patch_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn checked_u16(value: usize, what: &str) -> Result<u16, NsError> {
    u16::try_from(value).map_err(|_| {
        NsError::new(
            "MODULE_TABLE_OVERFLOW",
            format!("{} exceeds the 16-bit limit ({}).", what, value),
        )
    })
}

fn checked_u32(value: usize) -> Result<u32, NsError> {
    u32::try_from(value)
        .map_err(|_| NsError::new("MODULE_TOO_LARGE", "Module exceeds 4 GiB."))
}

fn write_error(error: std::io::Error) -> NsError {
    NsError::new("MODULE_WRITE", error.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subroutine {
    pub dialogue_block_offsets: Vec<u16>,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtiEntry {
    pub kind: SubroutineKind,
    pub name: String,
    pub dialogue_blocks: Vec<String>,
    parameters_at: usize,
}

/// A loaded NSX module. Tables are read up front; subroutine bodies, strings
/// and parameter lists are decoded on first access and cached.
#[derive(Debug)]
pub struct NsxModule {
    name: String,
    data: Box<[u8]>,
    subroutine_offsets: Vec<u32>,
    code_end: usize,
    rti: Vec<RtiEntry>,
    imports: Vec<String>,
    string_offsets: Vec<u32>,
    by_name: HashMap<String, u16>,
    subroutines: Vec<OnceLock<Subroutine>>,
    strings: Vec<OnceLock<String>>,
    parameters: Vec<OnceLock<Vec<String>>>,
    decode_reads: AtomicUsize,
}

impl NsxModule {
    pub fn open(path: &Path, name: impl Into<String>) -> Result<Self, NsError> {
        let data = fs::read(path).map_err(|error| {
            NsError::new(
                "MODULE_READ",
                format!("Failed to read module {}: {}", path.display(), error),
            )
        })?;
        Self::from_bytes(name, data)
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, NsError> {
        let name = name.into();
        let data = data.into_boxed_slice();
        let mut cursor = Cursor::new(&data[..]);

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).map_err(truncated)?;
        if magic != MODULE_MAGIC {
            return Err(NsError::new(
                "MODULE_BAD_MAGIC",
                format!("Module \"{}\" does not start with the NSX marker.", name),
            ));
        }
        let rti_offset = read_u32(&mut cursor)? as u64;
        let string_table_offset = read_u32(&mut cursor)? as u64;
        let code_offset = read_u32(&mut cursor)? as usize;
        if code_offset > data.len() {
            return Err(bad_offset("code region", code_offset));
        }

        let subroutine_count = read_table_header(&mut cursor, SUBROUTINE_TABLE_MARKER)?;
        let mut subroutine_offsets = Vec::with_capacity(subroutine_count as usize);
        for _ in 0..subroutine_count {
            let offset = read_u32(&mut cursor)?;
            if (offset as usize) < code_offset || offset as usize > data.len() {
                return Err(bad_offset("subroutine", offset as usize));
            }
            subroutine_offsets.push(offset);
        }

        cursor.set_position(rti_offset);
        let rti_count = read_table_header(&mut cursor, RTI_TABLE_MARKER)?;
        if rti_count != subroutine_count {
            return Err(NsError::new(
                "MODULE_CORRUPT",
                format!(
                    "RTI table lists {} entries for {} subroutines.",
                    rti_count, subroutine_count
                ),
            ));
        }
        let mut entry_offsets = Vec::with_capacity(rti_count as usize + 1);
        for _ in 0..=rti_count {
            entry_offsets.push(read_u16(&mut cursor)? as u64);
        }
        let entries_start = cursor.position();
        let mut rti = Vec::with_capacity(rti_count as usize);
        for offset in entry_offsets.iter().take(rti_count as usize) {
            cursor.set_position(entries_start + offset);
            let kind_byte = read_u8(&mut cursor)?;
            let kind = SubroutineKind::from_byte(kind_byte).ok_or_else(|| {
                NsError::new(
                    "MODULE_CORRUPT",
                    format!("Unknown subroutine kind {}.", kind_byte),
                )
            })?;
            let entry_name = read_name(&mut cursor)?;
            let block_count = read_u16(&mut cursor)?;
            let mut dialogue_blocks = Vec::with_capacity(block_count as usize);
            for _ in 0..block_count {
                dialogue_blocks.push(read_name(&mut cursor)?);
            }
            rti.push(RtiEntry {
                kind,
                name: entry_name,
                dialogue_blocks,
                parameters_at: cursor.position() as usize,
            });
        }
        let rti_end = entries_start + entry_offsets.last().copied().unwrap_or(0);
        cursor.set_position(rti_end);

        let import_count = read_table_header(&mut cursor, IMPORT_TABLE_MARKER)?;
        let mut imports = Vec::with_capacity(import_count as usize);
        for _ in 0..import_count {
            imports.push(read_name(&mut cursor)?);
        }

        cursor.set_position(string_table_offset);
        let string_count = read_table_header(&mut cursor, STRING_TABLE_MARKER)?;
        let mut string_offsets = Vec::with_capacity(string_count as usize);
        for _ in 0..string_count {
            let offset = read_u32(&mut cursor)?;
            if offset as usize >= data.len() {
                return Err(bad_offset("string", offset as usize));
            }
            string_offsets.push(offset);
        }

        let mut by_name = HashMap::new();
        for (index, entry) in rti.iter().enumerate() {
            by_name.entry(entry.name.clone()).or_insert(index as u16);
        }

        debug!(
            module = %name,
            subroutines = subroutine_offsets.len(),
            strings = string_offsets.len(),
            imports = imports.len(),
            "module loaded"
        );

        let code_end = data.len();
        Ok(Self {
            name,
            subroutines: (0..subroutine_offsets.len()).map(|_| OnceLock::new()).collect(),
            strings: (0..string_offsets.len()).map(|_| OnceLock::new()).collect(),
            parameters: (0..rti.len()).map(|_| OnceLock::new()).collect(),
            data,
            subroutine_offsets,
            code_end,
            rti,
            imports,
            string_offsets,
            by_name,
            decode_reads: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subroutine_count(&self) -> usize {
        self.subroutine_offsets.len()
    }

    pub fn string_count(&self) -> usize {
        self.string_offsets.len()
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn import(&self, index: u16) -> Result<&str, NsError> {
        self.imports
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| out_of_range("import", index as usize))
    }

    pub fn rti(&self, index: u16) -> Result<&RtiEntry, NsError> {
        self.rti
            .get(index as usize)
            .ok_or_else(|| out_of_range("subroutine", index as usize))
    }

    pub fn find_subroutine(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    /// Number of lazy decodes performed so far; each cache slot is filled once.
    pub fn decode_reads(&self) -> usize {
        self.decode_reads.load(Ordering::Relaxed)
    }

    pub fn subroutine(&self, index: u16) -> Result<&Subroutine, NsError> {
        let slot = self
            .subroutines
            .get(index as usize)
            .ok_or_else(|| out_of_range("subroutine", index as usize))?;
        if let Some(subroutine) = slot.get() {
            return Ok(subroutine);
        }
        let decoded = self.decode_subroutine(index as usize)?;
        Ok(slot.get_or_init(|| decoded))
    }

    pub fn string(&self, token: u16) -> Result<&str, NsError> {
        let slot = self
            .strings
            .get(token as usize)
            .ok_or_else(|| out_of_range("string", token as usize))?;
        if let Some(value) = slot.get() {
            return Ok(value.as_str());
        }
        let decoded = self.decode_string(token as usize)?;
        Ok(slot.get_or_init(|| decoded).as_str())
    }

    pub fn parameter_names(&self, index: u16) -> Result<&[String], NsError> {
        let slot = self
            .parameters
            .get(index as usize)
            .ok_or_else(|| out_of_range("subroutine", index as usize))?;
        if let Some(names) = slot.get() {
            return Ok(names.as_slice());
        }
        let decoded = self.decode_parameters(index as usize)?;
        Ok(slot.get_or_init(|| decoded).as_slice())
    }

    fn decode_subroutine(&self, index: usize) -> Result<Subroutine, NsError> {
        self.decode_reads.fetch_add(1, Ordering::Relaxed);
        let start = self.subroutine_offsets[index] as usize;
        let end = self
            .subroutine_offsets
            .get(index + 1)
            .map(|offset| *offset as usize)
            .unwrap_or(self.code_end);
        if end < start {
            return Err(bad_offset("subroutine", start));
        }
        let body = &self.data[start..end];
        let mut cursor = Cursor::new(body);
        let block_count = read_u16(&mut cursor)?;
        let mut dialogue_block_offsets = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            dialogue_block_offsets.push(read_u16(&mut cursor)?);
        }
        let code = body[cursor.position() as usize..].to_vec();
        if let Some(offset) = dialogue_block_offsets
            .iter()
            .find(|offset| **offset as usize > code.len())
        {
            return Err(bad_offset("dialogue block", *offset as usize));
        }
        Ok(Subroutine {
            dialogue_block_offsets,
            code,
        })
    }

    fn decode_string(&self, token: usize) -> Result<String, NsError> {
        self.decode_reads.fetch_add(1, Ordering::Relaxed);
        let mut cursor = Cursor::new(&self.data[..]);
        cursor.set_position(self.string_offsets[token] as u64);
        read_name(&mut cursor)
    }

    fn decode_parameters(&self, index: usize) -> Result<Vec<String>, NsError> {
        self.decode_reads.fetch_add(1, Ordering::Relaxed);
        let mut cursor = Cursor::new(&self.data[..]);
        cursor.set_position(self.rti[index].parameters_at as u64);
        let count = read_u16(&mut cursor)?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(read_name(&mut cursor)?);
        }
        Ok(names)
    }
}

fn read_table_header(cursor: &mut Cursor<&[u8]>, expected: [u8; 4]) -> Result<u16, NsError> {
    let mut marker = [0u8; 4];
    cursor.read_exact(&mut marker).map_err(truncated)?;
    if marker != expected {
        return Err(NsError::new(
            "MODULE_TABLE_MARKER",
            format!(
                "Expected table marker {:?}, found {:?}.",
                String::from_utf8_lossy(&expected),
                String::from_utf8_lossy(&marker)
            ),
        ));
    }
    let declared = read_u16(cursor)?;
    if declared != TABLE_HEADER_SIZE {
        return Err(NsError::new(
            "MODULE_TABLE_SIZE",
            format!(
                "Table {:?} declares header size {}, expected {}.",
                String::from_utf8_lossy(&expected),
                declared,
                TABLE_HEADER_SIZE
            ),
        ));
    }
    read_u16(cursor)
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, NsError> {
    cursor.read_u8().map_err(truncated)
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, NsError> {
    cursor.read_u16::<LittleEndian>().map_err(truncated)
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, NsError> {
    cursor.read_u32::<LittleEndian>().map_err(truncated)
}

fn read_name(cursor: &mut Cursor<&[u8]>) -> Result<String, NsError> {
    let len = read_u16(cursor)? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes).map_err(truncated)?;
    String::from_utf8(bytes)
        .map_err(|error| NsError::new("MODULE_INVALID_UTF8", error.to_string()))
}

fn truncated(error: std::io::Error) -> NsError {
    NsError::new("MODULE_TRUNCATED", format!("Module data ends early: {}", error))
}

fn bad_offset(what: &str, offset: usize) -> NsError {
    NsError::new(
        "MODULE_BAD_OFFSET",
        format!("{} offset {} lies outside the module.", what, offset),
    )
}

fn out_of_range(what: &str, index: usize) -> NsError {
    NsError::new(
        "MODULE_INDEX_OUT_OF_RANGE",
        format!("{} index {} is out of range.", what, index),
    )
}

#[cfg(test)]
mod module_tests {
    use super::*;

    fn sample_module() -> Vec<u8> {
        let mut builder = ModuleBuilder::new();
        let hello = builder.intern_string("hello").expect("intern");
        assert_eq!(builder.intern_string("hello").expect("intern again"), hello);
        builder.intern_string("world").expect("intern");
        builder.add_import("nss/common.nss").expect("import");
        builder
            .push_subroutine(SubroutineDef {
                kind: SubroutineKind::Chapter,
                name: "main".to_string(),
                parameters: Vec::new(),
                dialogue_blocks: vec![DialogueBlockDef {
                    name: "text001".to_string(),
                    offset: 1,
                }],
                code: vec![0x13, 0x16],
            })
            .expect("push");
        builder
            .push_subroutine(SubroutineDef {
                kind: SubroutineKind::Function,
                name: "Test".to_string(),
                parameters: vec!["$a".to_string(), "#b".to_string()],
                dialogue_blocks: Vec::new(),
                code: vec![0x16],
            })
            .expect("push");
        builder.write().expect("write should pass")
    }

    #[test]
    fn written_module_loads_back() {
        let module = NsxModule::from_bytes("main", sample_module()).expect("load should pass");
        assert_eq!(module.subroutine_count(), 2);
        assert_eq!(module.imports(), &["nss/common.nss".to_string()]);
        assert_eq!(module.find_subroutine("Test"), Some(1));

        let main = module.rti(0).expect("rti");
        assert_eq!(main.kind, SubroutineKind::Chapter);
        assert_eq!(main.dialogue_blocks, vec!["text001".to_string()]);

        let body = module.subroutine(0).expect("subroutine");
        assert_eq!(body.code, vec![0x13, 0x16]);
        assert_eq!(body.dialogue_block_offsets, vec![1]);
        assert_eq!(module.subroutine(1).expect("subroutine").code, vec![0x16]);

        assert_eq!(
            module.parameter_names(1).expect("params"),
            &["$a".to_string(), "#b".to_string()]
        );
        assert!(module.parameter_names(0).expect("params").is_empty());
    }

    #[test]
    fn string_decode_is_memoized() {
        let module = NsxModule::from_bytes("main", sample_module()).expect("load should pass");
        assert_eq!(module.decode_reads(), 0);
        assert_eq!(module.string(1).expect("string"), "world");
        assert_eq!(module.string(1).expect("string"), "world");
        assert_eq!(module.decode_reads(), 1);
        module.subroutine(0).expect("subroutine");
        module.subroutine(0).expect("subroutine");
        assert_eq!(module.decode_reads(), 2);
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = sample_module();
        bytes[0] = b'X';
        let error = NsxModule::from_bytes("main", bytes).expect_err("bad magic");
        assert_eq!(error.code, "MODULE_BAD_MAGIC");
    }

    #[test]
    fn table_marker_mismatch_is_fatal() {
        let mut bytes = sample_module();
        bytes[HEADER_SIZE] = b'X';
        let error = NsxModule::from_bytes("main", bytes).expect_err("bad marker");
        assert_eq!(error.code, "MODULE_TABLE_MARKER");
    }

    #[test]
    fn declared_table_size_mismatch_is_fatal() {
        let mut bytes = sample_module();
        bytes[HEADER_SIZE + 4] = 9;
        let error = NsxModule::from_bytes("main", bytes).expect_err("bad size");
        assert_eq!(error.code, "MODULE_TABLE_SIZE");
    }

    #[test]
    fn truncated_module_is_fatal() {
        let bytes = sample_module();
        let error = NsxModule::from_bytes("main", bytes[..20].to_vec()).expect_err("truncated");
        assert!(
            error.code == "MODULE_TRUNCATED" || error.code == "MODULE_BAD_OFFSET",
            "unexpected code {}",
            error.code
        );
    }

    #[test]
    fn out_of_range_access_is_reported() {
        let module = NsxModule::from_bytes("main", sample_module()).expect("load should pass");
        assert_eq!(
            module.string(99).expect_err("missing").code,
            "MODULE_INDEX_OUT_OF_RANGE"
        );
        assert_eq!(
            module.subroutine(7).expect_err("missing").code,
            "MODULE_INDEX_OUT_OF_RANGE"
        );
    }

    #[test]
    fn module_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NsxModule>();
    }
}
