//! The memory of the simulated machine.
//!
//! Memory is a sparse, byte-addressable, little-endian store partitioned
//! into five fixed regions ([`Region`]). Every access is validated before
//! any byte moves: zero-page and out-of-bounds accesses, accesses crossing
//! a region boundary, writes to read-only memory, and writes that would
//! collide the stack and the heap all fail without a partial write.
//!
//! Unaligned 4- and 8-byte accesses are architecturally legal and succeed,
//! but are recorded on the [`Mem`] so a display layer can flag them.

use std::collections::HashMap;

use crate::sim::SimErr;

/// The end of the forbidden zero page (exclusive).
pub const ZERO_PAGE_END: u64 = 0x0010_0000;
/// The addressable ceiling (exclusive).
pub const MEM_CEILING: u64 = 0x0800_0000;
/// The base of the heap region.
pub const HEAP_BASE: u64 = 0x0040_0000;
/// The initial stack pointer (one past the top of the stack region).
pub const STACK_TOP: u64 = MEM_CEILING;

/// One of the five fixed memory regions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Region {
    /// Read-only data (`0x00100000..0x00200000`).
    Rodata,
    /// Initialized data (`0x00200000..0x00300000`).
    Data,
    /// Zero-initialized data (`0x00300000..0x00400000`).
    Bss,
    /// The heap, growing upward (`0x00400000..0x07FF0000`).
    Heap,
    /// The stack, growing downward (`0x07FF0000..0x08000000`).
    Stack,
}
impl Region {
    /// The address range of this region.
    pub fn range(self) -> std::ops::Range<u64> {
        match self {
            Region::Rodata => 0x0010_0000..0x0020_0000,
            Region::Data   => 0x0020_0000..0x0030_0000,
            Region::Bss    => 0x0030_0000..0x0040_0000,
            Region::Heap   => 0x0040_0000..0x07FF_0000,
            Region::Stack  => 0x07FF_0000..0x0800_0000,
        }
    }

    /// Whether programs may write to this region.
    pub fn writable(self) -> bool {
        !matches!(self, Region::Rodata)
    }

    /// The region containing the given address (if any).
    pub fn of(addr: u64) -> Option<Region> {
        let all = [Region::Rodata, Region::Data, Region::Bss, Region::Heap, Region::Stack];
        all.into_iter().find(|r| r.range().contains(&addr))
    }
}
impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Rodata => f.write_str("rodata"),
            Region::Data   => f.write_str("data"),
            Region::Bss    => f.write_str("bss"),
            Region::Heap   => f.write_str("heap"),
            Region::Stack  => f.write_str("stack"),
        }
    }
}

/// The context of a memory access.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MemAccessCtx {
    /// The current stack pointer (used for stack/heap collision checks).
    pub sp: u64,
    /// Whether this is an initialization write
    /// (populating data sections before the first instruction runs).
    ///
    /// Initialization bypasses only the read-only check.
    pub init: bool,
}

/// A recorded unaligned 4- or 8-byte access.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UnalignedNote {
    /// The accessed address.
    pub addr: u64,
    /// The access width in bytes.
    pub size: u64,
    /// Whether the access was a write.
    pub write: bool,
}

/// The simulated memory.
#[derive(Debug, Default, Clone)]
pub struct Mem {
    bytes: HashMap<u64, u8>,
    heap_top: u64,
    unaligned: Vec<UnalignedNote>,
}

impl Mem {
    /// Creates an empty memory with an empty heap.
    pub fn new() -> Self {
        Mem {
            bytes: HashMap::new(),
            heap_top: HEAP_BASE,
            unaligned: vec![],
        }
    }

    /// Validates an access of `size` bytes at `addr` without performing it.
    ///
    /// Returns the region the access falls in.
    pub fn validate(&self, addr: u64, size: u64, write: bool, ctx: MemAccessCtx) -> Result<Region, SimErr> {
        if addr < ZERO_PAGE_END {
            return Err(SimErr::ZeroPage { addr });
        }
        let last = addr.checked_add(size - 1)
            .filter(|&last| last < MEM_CEILING)
            .ok_or(SimErr::OutOfBounds { addr })?;

        let region = Region::of(addr)
            .ok_or(SimErr::OutOfBounds { addr })?;
        if Region::of(last) != Some(region) {
            return Err(SimErr::RegionCross { addr, size });
        }

        if write {
            if !region.writable() && !ctx.init {
                return Err(SimErr::ReadOnlyWrite { addr });
            }
            // the stack and the heap grow toward each other
            match region {
                Region::Heap if ctx.sp <= addr => {
                    return Err(SimErr::StackHeapCollision { addr });
                }
                Region::Stack if addr < self.heap_top => {
                    return Err(SimErr::StackHeapCollision { addr });
                }
                _ => {}
            }
        }
        Ok(region)
    }

    /// Reads a little-endian value of `size` bytes (1, 2, 4, or 8) at `addr`.
    ///
    /// Bytes never written read as zero.
    pub fn read(&mut self, addr: u64, size: u64, ctx: MemAccessCtx) -> Result<u64, SimErr> {
        self.validate(addr, size, false, ctx)?;
        self.note_unaligned(addr, size, false);

        let mut value = 0u64;
        for i in (0..size).rev() {
            let byte = self.bytes.get(&(addr + i)).copied().unwrap_or(0);
            value = (value << 8) | u64::from(byte);
        }
        Ok(value)
    }

    /// Writes the low `size` bytes (1, 2, 4, or 8) of `value` at `addr`,
    /// little-endian.
    ///
    /// If validation fails, no byte is written.
    pub fn write(&mut self, addr: u64, value: u64, size: u64, ctx: MemAccessCtx) -> Result<(), SimErr> {
        self.validate(addr, size, true, ctx)?;
        self.note_unaligned(addr, size, true);

        for i in 0..size {
            self.bytes.insert(addr + i, (value >> (8 * i)) as u8);
        }
        Ok(())
    }

    fn note_unaligned(&mut self, addr: u64, size: u64, write: bool) {
        if (size == 4 || size == 8) && addr % size != 0 {
            self.unaligned.push(UnalignedNote { addr, size, write });
        }
    }

    /// Allocates `size` bytes from the heap, returning their base address.
    ///
    /// Allocation only ever advances the heap cursor. It fails if the
    /// heap would grow past its region or reach the current stack pointer.
    pub fn alloc_heap(&mut self, size: u64, sp: u64) -> Result<u64, SimErr> {
        let base = self.heap_top;
        let new_top = base.checked_add(size)
            .filter(|&top| top <= Region::Heap.range().end && top <= sp)
            .ok_or(SimErr::HeapExhausted { size })?;
        self.heap_top = new_top;
        Ok(base)
    }

    /// The current top of the heap (one past the last allocated byte).
    pub fn heap_top(&self) -> u64 {
        self.heap_top
    }

    /// Every unaligned 4- or 8-byte access performed so far.
    pub fn unaligned_accesses(&self) -> &[UnalignedNote] {
        &self.unaligned
    }

    /// The bytes written within the given region, sorted by address.
    ///
    /// Useful for memory displays; unwritten bytes are omitted (they are zero).
    pub fn region_contents(&self, region: Region) -> Vec<(u64, u8)> {
        let range = region.range();
        let mut contents: Vec<_> = self.bytes.iter()
            .filter(|(addr, _)| range.contains(addr))
            .map(|(&addr, &byte)| (addr, byte))
            .collect();
        contents.sort_unstable();
        contents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: MemAccessCtx = MemAccessCtx { sp: STACK_TOP, init: false };
    const INIT: MemAccessCtx = MemAccessCtx { sp: STACK_TOP, init: true };

    #[test]
    fn test_read_write_little_endian() {
        let mut mem = Mem::new();
        let addr = Region::Data.range().start;

        mem.write(addr, 0x1122_3344_5566_7788, 8, CTX).unwrap();
        assert_eq!(mem.read(addr, 8, CTX).unwrap(), 0x1122_3344_5566_7788);
        // little-endian: low byte first
        assert_eq!(mem.read(addr, 1, CTX).unwrap(), 0x88);
        assert_eq!(mem.read(addr + 7, 1, CTX).unwrap(), 0x11);
        assert_eq!(mem.read(addr, 4, CTX).unwrap(), 0x5566_7788);
        assert_eq!(mem.read(addr + 4, 2, CTX).unwrap(), 0x3344);
    }

    #[test]
    fn test_unwritten_reads_zero() {
        let mut mem = Mem::new();
        assert_eq!(mem.read(Region::Bss.range().start, 8, CTX).unwrap(), 0);
    }

    #[test]
    fn test_zero_page() {
        let mut mem = Mem::new();
        assert_eq!(mem.read(0, 1, CTX), Err(SimErr::ZeroPage { addr: 0 }));
        assert_eq!(mem.read(0xFFFFF, 1, CTX), Err(SimErr::ZeroPage { addr: 0xFFFFF }));
        assert_eq!(
            mem.write(0x1000, 1, 1, CTX),
            Err(SimErr::ZeroPage { addr: 0x1000 })
        );
        // first legal address
        assert!(mem.read(ZERO_PAGE_END, 1, CTX).is_ok());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mem = Mem::new();
        assert_eq!(
            mem.read(MEM_CEILING, 1, CTX),
            Err(SimErr::OutOfBounds { addr: MEM_CEILING })
        );
        // range pokes past the ceiling
        assert_eq!(
            mem.read(MEM_CEILING - 4, 8, CTX),
            Err(SimErr::OutOfBounds { addr: MEM_CEILING - 4 })
        );
        // last byte exactly at the ceiling boundary is fine
        assert!(mem.read(MEM_CEILING - 8, 8, CTX).is_ok());
    }

    #[test]
    fn test_region_crossing() {
        let mut mem = Mem::new();
        // every adjacent pair, every multi-byte width
        let boundaries = [
            Region::Data.range().start,
            Region::Bss.range().start,
            Region::Heap.range().start,
            Region::Stack.range().start,
        ];
        for boundary in boundaries {
            for size in [2u64, 4, 8] {
                let addr = boundary - 1;
                assert_eq!(
                    mem.read(addr, size, CTX),
                    Err(SimErr::RegionCross { addr, size }),
                    "read of {size} at {addr:#X}"
                );
            }
            // a 1-byte access at the same spot stays inside its region
            assert!(mem.read(boundary - 1, 1, CTX).is_ok());
        }
    }

    #[test]
    fn test_read_only() {
        let mut mem = Mem::new();
        let addr = Region::Rodata.range().start;
        assert_eq!(mem.write(addr, 1, 1, CTX), Err(SimErr::ReadOnlyWrite { addr }));

        // initialization may populate rodata, and reading it back is fine
        mem.write(addr, 0xAB, 1, INIT).unwrap();
        assert_eq!(mem.read(addr, 1, CTX).unwrap(), 0xAB);
    }

    #[test]
    fn test_stack_heap_collision() {
        let mut mem = Mem::new();

        // a heap write at or above sp collides
        let sp_in_heap = MemAccessCtx { sp: HEAP_BASE + 0x100, init: false };
        assert_eq!(
            mem.write(HEAP_BASE + 0x100, 1, 1, sp_in_heap),
            Err(SimErr::StackHeapCollision { addr: HEAP_BASE + 0x100 })
        );
        assert_eq!(
            mem.write(HEAP_BASE + 0x200, 1, 1, sp_in_heap),
            Err(SimErr::StackHeapCollision { addr: HEAP_BASE + 0x200 })
        );
        // below sp is fine
        assert!(mem.write(HEAP_BASE + 0xF8, 8, 1, sp_in_heap).is_ok());

        // a stack write below the heap top collides
        let stack_addr = Region::Stack.range().start;
        mem.heap_top = stack_addr + 8;
        assert_eq!(
            mem.write(stack_addr, 1, 1, CTX),
            Err(SimErr::StackHeapCollision { addr: stack_addr })
        );

        // reads are never collision-checked
        assert!(mem.read(stack_addr, 1, CTX).is_ok());
    }

    #[test]
    fn test_failed_write_leaves_memory_untouched() {
        let mut mem = Mem::new();
        let boundary = Region::Bss.range().start;
        mem.write(boundary - 1, 0x55, 1, CTX).unwrap();

        assert!(mem.write(boundary - 1, 0xFFFF, 2, CTX).is_err());
        assert_eq!(mem.read(boundary - 1, 1, CTX).unwrap(), 0x55);
        assert_eq!(mem.read(boundary, 1, CTX).unwrap(), 0);
    }

    #[test]
    fn test_unaligned_noted() {
        let mut mem = Mem::new();
        let addr = Region::Data.range().start;

        mem.write(addr, 1, 8, CTX).unwrap();
        assert!(mem.unaligned_accesses().is_empty());

        mem.write(addr + 1, 1, 4, CTX).unwrap();
        mem.read(addr + 2, 8, CTX).unwrap();
        assert_eq!(mem.unaligned_accesses(), &[
            UnalignedNote { addr: addr + 1, size: 4, write: true },
            UnalignedNote { addr: addr + 2, size: 8, write: false },
        ]);

        // 1- and 2-byte accesses are never flagged
        mem.read(addr + 3, 2, CTX).unwrap();
        assert_eq!(mem.unaligned_accesses().len(), 2);
    }

    #[test]
    fn test_alloc_heap() {
        let mut mem = Mem::new();
        assert_eq!(mem.alloc_heap(16, STACK_TOP).unwrap(), HEAP_BASE);
        assert_eq!(mem.alloc_heap(8, STACK_TOP).unwrap(), HEAP_BASE + 16);
        assert_eq!(mem.heap_top(), HEAP_BASE + 24);

        // overrun past the heap region
        let huge = Region::Heap.range().end - mem.heap_top() + 1;
        assert_eq!(mem.alloc_heap(huge, STACK_TOP), Err(SimErr::HeapExhausted { size: huge }));

        // collision with a deep stack pointer
        let sp = mem.heap_top() + 8;
        assert_eq!(mem.alloc_heap(16, sp), Err(SimErr::HeapExhausted { size: 16 }));
        assert!(mem.alloc_heap(8, sp).is_ok());
    }

    #[test]
    fn test_region_of() {
        assert_eq!(Region::of(0), None);
        assert_eq!(Region::of(0x0010_0000), Some(Region::Rodata));
        assert_eq!(Region::of(0x002F_FFFF), Some(Region::Data));
        assert_eq!(Region::of(0x0035_0000), Some(Region::Bss));
        assert_eq!(Region::of(0x0100_0000), Some(Region::Heap));
        assert_eq!(Region::of(0x07FF_8000), Some(Region::Stack));
        assert_eq!(Region::of(MEM_CEILING), None);
    }
}
