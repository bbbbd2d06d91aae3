//! Synthesises small statically-linked ELF executables for loader tests.

use std::{string::String, vec::Vec};

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const STT_FUNC: u8 = 2;
const STB_GLOBAL: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    pub fn header_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    pub fn ph_entry_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    fn sh_entry_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    fn sym_size(self) -> usize {
        match self {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }
}

#[derive(Debug, Clone)]
struct ProgramSpec {
    kind: u32,
    vaddr: u64,
    flags: u32,
    data: Vec<u8>,
    mem_size: u64,
}

#[derive(Debug, Clone)]
struct SymbolSpec {
    name: String,
    value: u64,
    size: u64,
}

#[derive(Debug, Clone)]
pub struct ElfBuilder {
    class: ElfClass,
    elf_type: u16,
    entry: u64,
    programs: Vec<ProgramSpec>,
    symbols: Option<Vec<SymbolSpec>>,
}

impl ElfBuilder {
    pub fn new(class: ElfClass) -> Self {
        Self {
            class,
            elf_type: ET_EXEC,
            entry: 0,
            programs: Vec::new(),
            symbols: None,
        }
    }

    pub fn new64() -> Self {
        Self::new(ElfClass::Elf64)
    }

    pub fn new32() -> Self {
        Self::new(ElfClass::Elf32)
    }

    pub fn class(&self) -> ElfClass {
        self.class
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    pub fn elf_type(mut self, elf_type: u16) -> Self {
        self.elf_type = elf_type;
        self
    }

    /// Adds a `PT_LOAD` header whose file contents are `data`.
    pub fn segment(mut self, vaddr: u64, flags: u32, data: &[u8], mem_size: u64) -> Self {
        self.programs.push(ProgramSpec {
            kind: PT_LOAD,
            vaddr,
            flags,
            data: data.to_vec(),
            mem_size,
        });
        self
    }

    /// Adds a non-loadable header the loader must skip.
    pub fn note(mut self, data: &[u8]) -> Self {
        self.programs.push(ProgramSpec {
            kind: PT_NOTE,
            vaddr: 0,
            flags: PF_R,
            data: data.to_vec(),
            mem_size: data.len() as u64,
        });
        self
    }

    /// Emits `.symtab`/`.strtab` sections containing a function symbol.
    pub fn symbol(mut self, name: &str, value: u64, size: u64) -> Self {
        self.symbols.get_or_insert_with(Vec::new).push(SymbolSpec {
            name: String::from(name),
            value,
            size,
        });
        self
    }

    /// File offset of the `index`th program header in the built image.
    pub fn ph_offset_of(&self, index: usize) -> usize {
        self.class.header_size() + index * self.class.ph_entry_size()
    }

    pub fn build(&self) -> Vec<u8> {
        let class = self.class;
        let mut out = Writer::new(class);

        // header placeholder, patched once offsets are known
        out.bytes.resize(class.header_size(), 0);

        let ph_offset = out.len();
        out.bytes
            .resize(ph_offset + self.programs.len() * class.ph_entry_size(), 0);

        let mut data_offsets = Vec::new();
        for program in self.programs.iter() {
            out.align(8);
            data_offsets.push(out.len());
            out.bytes.extend_from_slice(&program.data);
        }

        let mut sh_offset = 0;
        let mut sh_count = 0;
        let mut sh_str_index = 0;

        if let Some(symbols) = self.symbols.as_ref() {
            // .strtab
            let mut strtab = vec![0u8];
            let mut name_offsets = Vec::new();
            for sym in symbols {
                name_offsets.push(strtab.len());
                strtab.extend_from_slice(sym.name.as_bytes());
                strtab.push(0);
            }

            out.align(8);
            let strtab_offset = out.len();
            out.bytes.extend_from_slice(&strtab);

            // .symtab, entry 0 is the null symbol
            out.align(8);
            let symtab_offset = out.len();
            out.bytes.resize(out.len() + class.sym_size(), 0);
            for (sym, name) in symbols.iter().zip(name_offsets) {
                out.symbol(name as u32, sym.value, sym.size);
            }
            let symtab_size = out.len() - symtab_offset;

            // .shstrtab
            let shstrtab = b"\0.symtab\0.strtab\0.shstrtab\0";
            let shstrtab_offset = out.len();
            out.bytes.extend_from_slice(shstrtab);

            out.align(8);
            sh_offset = out.len();
            sh_count = 4;
            sh_str_index = 3;

            out.bytes.resize(out.len() + class.sh_entry_size(), 0);
            out.section(
                1,
                SHT_SYMTAB,
                symtab_offset,
                symtab_size,
                2,
                class.sym_size(),
            );
            out.section(9, SHT_STRTAB, strtab_offset, strtab.len(), 0, 0);
            out.section(17, SHT_STRTAB, shstrtab_offset, shstrtab.len(), 0, 0);
        }

        let mut header = Writer::new(class);
        header.bytes.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        header.bytes.push(match class {
            ElfClass::Elf32 => 1,
            ElfClass::Elf64 => 2,
        });
        header.bytes.extend_from_slice(&[1, 1, 0]);
        header.bytes.resize(16, 0);
        header.u16(self.elf_type);
        header.u16(0xf3); // RISC-V
        header.u32(1);
        header.word(self.entry);
        header.word(if self.programs.is_empty() { 0 } else { ph_offset as u64 });
        header.word(sh_offset as u64);
        header.u32(0);
        header.u16(class.header_size() as u16);
        header.u16(class.ph_entry_size() as u16);
        header.u16(self.programs.len() as u16);
        header.u16(class.sh_entry_size() as u16);
        header.u16(sh_count);
        header.u16(sh_str_index);
        debug_assert_eq!(header.len(), class.header_size());
        out.bytes[..header.len()].copy_from_slice(&header.bytes);

        for (index, (program, offset)) in self.programs.iter().zip(data_offsets).enumerate() {
            let mut ph = Writer::new(class);
            let file_size = program.data.len() as u64;

            match class {
                ElfClass::Elf64 => {
                    ph.u32(program.kind);
                    ph.u32(program.flags);
                    ph.u64(offset as u64);
                    ph.u64(program.vaddr);
                    ph.u64(program.vaddr);
                    ph.u64(file_size);
                    ph.u64(program.mem_size);
                    ph.u64(0x1000);
                }
                ElfClass::Elf32 => {
                    ph.u32(program.kind);
                    ph.u32(offset as u32);
                    ph.u32(program.vaddr as u32);
                    ph.u32(program.vaddr as u32);
                    ph.u32(file_size as u32);
                    ph.u32(program.mem_size as u32);
                    ph.u32(program.flags);
                    ph.u32(0x1000);
                }
            }

            let at = self.ph_offset_of(index);
            out.bytes[at..at + ph.len()].copy_from_slice(&ph.bytes);
        }

        out.bytes
    }
}

/// Overwrites the `offset` field of the `index`th program header of a built 64-bit image.
pub fn patch_offset64(image: &mut [u8], index: usize, offset: u64) {
    let at = ElfClass::Elf64.header_size() + index * ElfClass::Elf64.ph_entry_size() + 8;
    image[at..at + 8].copy_from_slice(&offset.to_le_bytes());
}

struct Writer {
    class: ElfClass,
    bytes: Vec<u8>,
}

impl Writer {
    fn new(class: ElfClass) -> Self {
        Self {
            class,
            bytes: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn align(&mut self, align: usize) {
        let len = self.bytes.len().next_multiple_of(align);
        self.bytes.resize(len, 0);
    }

    fn u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    // native word of the target class
    fn word(&mut self, v: u64) {
        match self.class {
            ElfClass::Elf32 => self.u32(v as u32),
            ElfClass::Elf64 => self.u64(v),
        }
    }

    fn symbol(&mut self, name: u32, value: u64, size: u64) {
        let info = (STB_GLOBAL << 4) | STT_FUNC;

        match self.class {
            ElfClass::Elf64 => {
                self.u32(name);
                self.bytes.push(info);
                self.bytes.push(0);
                self.u16(1);
                self.u64(value);
                self.u64(size);
            }
            ElfClass::Elf32 => {
                self.u32(name);
                self.u32(value as u32);
                self.u32(size as u32);
                self.bytes.push(info);
                self.bytes.push(0);
                self.u16(1);
            }
        }
    }

    fn section(
        &mut self,
        name: u32,
        kind: u32,
        offset: usize,
        size: usize,
        link: u32,
        entry_size: usize,
    ) {
        self.u32(name);
        self.u32(kind);
        self.word(0); // flags
        self.word(0); // addr
        self.word(offset as u64);
        self.word(size as u64);
        self.u32(link);
        self.u32(0);
        self.word(8);
        self.word(entry_size as u64);
    }
}
