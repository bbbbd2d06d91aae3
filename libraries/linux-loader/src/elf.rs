use address::{VirtualAddress, VirtualAddressRange};
use alloc::vec::Vec;
use log::{debug, trace, warn};
use memory_space::{Segment, SegmentError, SegmentKind, SegmentList, SegmentMapError};
use mmu_abstractions::{GenericMappingFlags, MMUError, IMMU};
use xmas_elf::{
    program::{self, ProgramHeader},
    ElfFile,
};

use crate::{stack_region, DebugSymbols, LoadError, LoadedElf};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EI_NIDENT: usize = 16;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_EXEC: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfWordSize {
    Elf32,
    Elf64,
}

impl ElfWordSize {
    pub(crate) fn header_size(self) -> usize {
        match self {
            ElfWordSize::Elf32 => 52,
            ElfWordSize::Elf64 => 64,
        }
    }

    pub(crate) fn table_alignment(self) -> usize {
        match self {
            ElfWordSize::Elf32 => 4,
            ElfWordSize::Elf64 => 8,
        }
    }

    fn ph_entry_size(self) -> usize {
        match self {
            ElfWordSize::Elf32 => 32,
            ElfWordSize::Elf64 => 56,
        }
    }

    pub(crate) fn sh_entry_size(self) -> usize {
        match self {
            ElfWordSize::Elf32 => 40,
            ElfWordSize::Elf64 => 64,
        }
    }
}

/// One `PT_LOAD` header, validated against the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRegion {
    pub vaddr: VirtualAddress,
    pub file_offset: usize,
    pub file_size: usize,
    pub mem_size: usize,
    /// `[vaddr, vaddr + mem_size)` widened to whole pages.
    pub pages: VirtualAddressRange,
    pub kind: SegmentKind,
    pub permissions: GenericMappingFlags,
}

impl LoadRegion {
    fn from_header(ph: &ProgramHeader, image_len: usize) -> Result<Option<Self>, LoadError> {
        let file_offset = usize::try_from(ph.offset()).map_err(|_| LoadError::TooLarge)?;
        let file_size = usize::try_from(ph.file_size()).map_err(|_| LoadError::TooLarge)?;
        let mem_size = usize::try_from(ph.mem_size()).map_err(|_| LoadError::TooLarge)?;

        match file_offset.checked_add(file_size) {
            Some(end) if end <= image_len => (),
            _ => return Err(LoadError::IncompleteExecutable),
        }

        if file_size > mem_size {
            return Err(LoadError::InvalidSegment);
        }

        if mem_size == 0 {
            return Ok(None);
        }

        let vaddr = usize::try_from(ph.virtual_addr())
            .map(VirtualAddress::from_usize)
            .map_err(|_| LoadError::TooLarge)?;

        let pages = VirtualAddressRange::checked_from_start_len(vaddr, mem_size)
            .and_then(|range| range.page_aligned())
            .ok_or(LoadError::TooLarge)?;

        let flags = ph.flags();
        let (read, write, execute) = (flags.is_read(), flags.is_write(), flags.is_execute());

        Ok(Some(LoadRegion {
            vaddr,
            file_offset,
            file_size,
            mem_size,
            pages,
            kind: SegmentKind::classify(read, write, execute),
            permissions: GenericMappingFlags::from_rwx(read, write, execute),
        }))
    }
}

/// An image that passed every check and is ready to be mapped.
///
/// Building one has no side effect on any address space, so a failed
/// `prepare` leaves the calling process exactly as it was.
pub struct PreparedElf<'a> {
    image: &'a [u8],
    word_size: ElfWordSize,
    entry: VirtualAddress,
    regions: Vec<LoadRegion>,
    symbols: Option<DebugSymbols>,
}

impl<'a> PreparedElf<'a> {
    pub fn prepare(image: &'a [u8]) -> Result<Self, LoadError> {
        let word_size = check_identity(image)?;

        // xmas-elf reads headers in place and requires them to be naturally aligned
        let aligned = AlignedImage::copy_from(image)?;
        let elf = ElfFile::new(aligned.as_bytes()).map_err(|e| {
            warn!("Failed to parse ELF header: {e}");
            LoadError::IncompleteExecutable
        })?;

        let pt2 = &elf.header.pt2;
        let entry = usize::try_from(pt2.entry_point())
            .map(VirtualAddress::from_usize)
            .map_err(|_| LoadError::TooLarge)?;

        check_table(
            image.len(),
            pt2.ph_offset(),
            pt2.ph_count() as usize,
            pt2.ph_entry_size() as usize,
            word_size.ph_entry_size(),
            word_size.table_alignment(),
        )
        .ok_or(LoadError::IncompleteExecutable)?;

        let stack = stack_region();
        let mut regions: Vec<LoadRegion> = Vec::new();

        for index in 0..pt2.ph_count() {
            let ph = elf
                .program_header(index)
                .map_err(|_| LoadError::IncompleteExecutable)?;

            match ph.get_type() {
                Ok(program::Type::Load) => (),
                other => {
                    trace!("Skipping program header {index}: {other:?}");
                    continue;
                }
            }

            let Some(region) = LoadRegion::from_header(&ph, image.len())? else {
                trace!("Skipping empty load segment {index}");
                continue;
            };

            if region.pages.end().as_usize() > constants::USER_STACK_TOP {
                return Err(LoadError::TooLarge);
            }

            let conflict = regions
                .iter()
                .map(|r| r.pages)
                .chain(core::iter::once(stack))
                .find(|r| r.intersects(&region.pages));

            if let Some(existing) = conflict {
                warn!(
                    "Load segment {index} at {:?} overlaps {:?}",
                    region.pages, existing
                );
                return Err(LoadError::OverlappingSegments);
            }

            trace!("Load segment {index}: {region:?}");

            regions
                .try_reserve(1)
                .map_err(|_| LoadError::InsufficientMemory)?;
            regions.push(region);
        }

        let symbols = DebugSymbols::locate(&elf, word_size);

        Ok(Self {
            image,
            word_size,
            entry,
            regions,
            symbols,
        })
    }

    pub fn entry(&self) -> VirtualAddress {
        self.entry
    }

    pub fn word_size(&self) -> ElfWordSize {
        self.word_size
    }

    pub fn regions(&self) -> &[LoadRegion] {
        &self.regions
    }

    pub fn symbols(&self) -> Option<&DebugSymbols> {
        self.symbols.as_ref()
    }

    /// Maps every load region into `mmu`, copies its file bytes and zero-fills the tail.
    pub fn load(
        self,
        mmu: &mut dyn IMMU,
        segments: &mut SegmentList,
    ) -> Result<LoadedElf, LoadError> {
        let mut image_end = VirtualAddress::from_usize(constants::PAGE_SIZE);

        for region in self.regions.iter() {
            let segment = Segment::new(region.pages, region.kind, region.permissions)
                .map_err(|e| segment_error(SegmentMapError::Segment(e)))?;

            segments
                .map_and_insert(mmu, segment)
                .map_err(segment_error)?;

            let data = &self.image[region.file_offset..region.file_offset + region.file_size];
            mmu.write_bytes(region.vaddr, data).map_err(mmu_error)?;
            mmu.fill_zero(region.vaddr + region.file_size, region.mem_size - region.file_size)
                .map_err(mmu_error)?;

            image_end = core::cmp::max(image_end, region.pages.end());
        }

        debug!(
            "Loaded {} segment(s), entry {}, image end {}",
            self.regions.len(),
            self.entry,
            image_end
        );

        Ok(LoadedElf {
            entry: self.entry,
            image_end,
            symbols: self.symbols,
        })
    }
}

fn check_identity(image: &[u8]) -> Result<ElfWordSize, LoadError> {
    if image.len() < ELF_MAGIC.len() || image[..ELF_MAGIC.len()] != ELF_MAGIC {
        return Err(LoadError::NotElf);
    }

    if image.len() < EI_NIDENT {
        return Err(LoadError::IncompleteExecutable);
    }

    let word_size = match image[4] {
        ELFCLASS32 => ElfWordSize::Elf32,
        ELFCLASS64 => ElfWordSize::Elf64,
        class => {
            warn!("Unsupported ELF class {class}");
            return Err(LoadError::NotExecutable);
        }
    };

    if image[5] != ELFDATA2LSB || image[6] != EV_CURRENT {
        warn!("Unsupported ELF encoding {} or version {}", image[5], image[6]);
        return Err(LoadError::NotExecutable);
    }

    if image.len() < word_size.header_size() {
        return Err(LoadError::IncompleteExecutable);
    }

    let e_type = u16::from_le_bytes([image[16], image[17]]);
    let e_version = u32::from_le_bytes([image[20], image[21], image[22], image[23]]);

    if e_type != ET_EXEC || e_version != EV_CURRENT as u32 {
        warn!("Unsupported ELF type {e_type} or header version {e_version}");
        return Err(LoadError::NotExecutable);
    }

    Ok(word_size)
}

/// Checks that a header table of `count` entries lies inside the image and can be read in place.
pub(crate) fn check_table(
    image_len: usize,
    offset: u64,
    count: usize,
    entry_size: usize,
    min_entry_size: usize,
    alignment: usize,
) -> Option<()> {
    if count == 0 {
        return Some(());
    }

    let offset = usize::try_from(offset).ok()?;

    if offset == 0 || entry_size < min_entry_size {
        return None;
    }

    if offset % alignment != 0 || entry_size % alignment != 0 {
        return None;
    }

    let end = count.checked_mul(entry_size)?.checked_add(offset)?;

    (end <= image_len).then_some(())
}

pub(crate) fn segment_error(e: SegmentMapError) -> LoadError {
    match e {
        SegmentMapError::Segment(SegmentError::Overlapping { .. }) => {
            LoadError::OverlappingSegments
        }
        SegmentMapError::Segment(SegmentError::OutOfMemory) => LoadError::InsufficientMemory,
        SegmentMapError::Segment(_) => LoadError::FailedToLoad,
        SegmentMapError::Mmu(e) => mmu_error(e),
    }
}

fn mmu_error(e: MMUError) -> LoadError {
    match e {
        MMUError::OutOfMemory => LoadError::InsufficientMemory,
        _ => {
            warn!("Address space rejected load: {e:?}");
            LoadError::FailedToLoad
        }
    }
}

struct AlignedImage {
    words: Vec<u64>,
    len: usize,
}

impl AlignedImage {
    fn copy_from(image: &[u8]) -> Result<Self, LoadError> {
        let count = image.len().div_ceil(8);

        let mut words = Vec::new();
        words
            .try_reserve_exact(count)
            .map_err(|_| LoadError::InsufficientMemory)?;

        words.extend(image.chunks(8).map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes[..chunk.len()].copy_from_slice(chunk);
            u64::from_ne_bytes(bytes)
        }));

        Ok(Self {
            words,
            len: image.len(),
        })
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `len` initialized bytes and u8 has no alignment requirement.
        unsafe { core::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }
}
