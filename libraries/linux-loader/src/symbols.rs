use address::VirtualAddress;
use alloc::vec::Vec;
use log::{debug, warn};
use xmas_elf::ElfFile;

use crate::{elf::check_table, ElfWordSize};

const SHN_LORESERVE: usize = 0xff00;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

/// Owned copies of an image's `.symtab` and `.strtab`, kept for diagnostics.
pub struct DebugSymbols {
    word_size: ElfWordSize,
    symtab: Vec<u8>,
    strtab: Vec<u8>,
}

struct RawSymbol {
    name: usize,
    info: u8,
    value: usize,
    size: usize,
}

impl DebugSymbols {
    /// Duplicates the symbol tables of `elf`. Any problem yields `None`, never a load failure.
    pub(crate) fn locate(elf: &ElfFile, word_size: ElfWordSize) -> Option<Self> {
        let pt2 = &elf.header.pt2;
        let count = pt2.sh_count() as usize;

        if count == 0 {
            debug!("No section headers, debug symbols unavailable");
            return None;
        }

        let in_bounds = count < SHN_LORESERVE
            && (pt2.sh_str_index() as usize) < count
            && check_table(
                elf.input.len(),
                pt2.sh_offset(),
                count,
                pt2.sh_entry_size() as usize,
                word_size.sh_entry_size(),
                word_size.table_alignment(),
            )
            .is_some();

        if !in_bounds {
            warn!("Malformed section header table, debug symbols unavailable");
            return None;
        }

        let names = elf
            .section_header(pt2.sh_str_index())
            .ok()
            .and_then(|sh| slice_of(elf.input, sh.offset(), sh.size()))?;

        let mut symtab = None;
        let mut strtab = None;

        for index in 0..count as u16 {
            let Ok(sh) = elf.section_header(index) else {
                continue;
            };

            let slot = match c_str_at(names, sh.name() as usize) {
                Some(b".symtab") => &mut symtab,
                Some(b".strtab") => &mut strtab,
                _ => continue,
            };

            *slot = slice_of(elf.input, sh.offset(), sh.size());
        }

        let (Some(symtab), Some(strtab)) = (symtab, strtab) else {
            debug!("No .symtab/.strtab sections, debug symbols unavailable");
            return None;
        };

        let (Some(symtab), Some(strtab)) = (duplicate(symtab), duplicate(strtab)) else {
            warn!("Out of memory while duplicating debug symbols");
            return None;
        };

        Some(Self {
            word_size,
            symtab,
            strtab,
        })
    }

    fn entry_size(&self) -> usize {
        match self.word_size {
            ElfWordSize::Elf32 => 16,
            ElfWordSize::Elf64 => 24,
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.symtab.len() / self.entry_size()
    }

    fn symbol(&self, index: usize) -> Option<RawSymbol> {
        let size = self.entry_size();
        let raw = self.symtab.get(index * size..(index + 1) * size)?;

        let u32_at = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let u64_at = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw[at..at + 8]);
            u64::from_le_bytes(bytes)
        };

        Some(match self.word_size {
            ElfWordSize::Elf32 => RawSymbol {
                name: u32_at(0) as usize,
                value: u32_at(4) as usize,
                size: u32_at(8) as usize,
                info: raw[12],
            },
            ElfWordSize::Elf64 => RawSymbol {
                name: u32_at(0) as usize,
                info: raw[4],
                value: u64_at(8) as usize,
                size: u64_at(16) as usize,
            },
        })
    }

    /// Finds the function or object symbol covering `addr`, with the offset into it.
    pub fn symbolize(&self, addr: VirtualAddress) -> Option<(&str, usize)> {
        let addr = addr.as_usize();

        (1..self.symbol_count())
            .filter_map(|index| self.symbol(index))
            .filter(|sym| matches!(sym.info & 0xf, STT_OBJECT | STT_FUNC))
            .find(|sym| match sym.size {
                0 => sym.value == addr,
                size => sym.value <= addr && addr - sym.value < size,
            })
            .and_then(|sym| {
                let name = c_str_at(&self.strtab, sym.name)?;
                let name = core::str::from_utf8(name).ok()?;

                Some((name, addr - sym.value))
            })
    }
}

fn slice_of(image: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;

    image.get(start..end)
}

fn c_str_at(table: &[u8], offset: usize) -> Option<&[u8]> {
    let tail = table.get(offset..)?;
    let len = tail.iter().position(|b| *b == 0)?;

    Some(&tail[..len])
}

fn duplicate(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(bytes.len()).ok()?;
    copy.extend_from_slice(bytes);

    Some(copy)
}
