//! The [`VirtualMemoryManager`]: owns the canonical heap layout from spec.md §4.4 and backs the
//! guest `Nt*`/`Mm*` allocation family with reserve/commit/protect/release semantics on top of a
//! host primitive backend. Mutating calls serialize through a single write lock; queries take the
//! read path and do not contend with each other, matching the "shared-resource policy" in §5.
use std::sync::RwLock;

use crate::error::VmmError;
use crate::vmm::heap::{CachingMode, Heap, HeapVisibility, PageKind};
use crate::vmm::os_impl::{self, HostMemoryBackend};
use crate::vmm::ProtectionFlags;

bitflags::bitflags! {
    /// Guest `X_MEM_*` allocation-type flags the emitter's kernel-export glue passes through.
    pub struct AllocType: u32 {
        /// Reserve address space without backing storage.
        const RESERVE = 1 << 0;
        /// Commit backing storage over already-reserved (or newly reserved) address space.
        const COMMIT = 1 << 1;
        /// Zero the committed memory immediately. Cleared by `X_MEM_NOZERO`.
        const ZERO = 1 << 2;
        /// Reset previously-written data without changing reservation state. Unimplemented (see
        /// `DESIGN.md` open question).
        const RESET = 1 << 3;
    }
}

/// `{base, allocation_base, allocation_protect, region_size, state, protect}` for
/// `QueryRegionInfo`.
#[derive(Clone, Copy, Debug)]
pub struct RegionInfo {
    /// Start address of the maximal uniform run containing the query address.
    pub base: u32,
    /// Start address of the original reservation this run belongs to.
    pub allocation_base: u32,
    /// Protection the reservation was originally created with.
    pub allocation_protect: ProtectionFlags,
    /// Size in bytes of the maximal uniform run.
    pub region_size: u32,
    /// Whether the run is free, reserved, or committed.
    pub state: PageKind,
    /// Current protection of the run (may differ from `allocation_protect` after `Protect`).
    pub protect: ProtectionFlags,
}

struct HeapSlot {
    heap: Heap,
}

/// Owns every heap in the canonical layout (spec.md §4.4) plus the host backend used to actually
/// reserve/commit/protect/release host memory underneath them.
pub struct VirtualMemoryManager {
    heaps: RwLock<Vec<HeapSlot>>,
    backend: Box<dyn HostMemoryBackend>,
    arena_base: *mut u8,
}

// SAFETY: `arena_base` points at a 4 GiB mapping that outlives the manager; all mutation goes
// through `heaps`' RwLock, and the backend trait objects are themselves `Send + Sync`.
unsafe impl Send for VirtualMemoryManager {}
unsafe impl Sync for VirtualMemoryManager {}

impl VirtualMemoryManager {
    /// Reserves the full 4 GiB arena from the host and partitions it into the canonical heaps.
    pub fn new() -> Result<Self, VmmError> {
        let (arena_base, backend) = os_impl::reserve_arena()?;

        let layout = vec![
            ("virtual-4k", 0x0000_0000u32, 0x4000_0000u32, 0x1000u32, HeapVisibility::Virtual),
            ("virtual-64k", 0x4000_0000, 0x3F00_0000, 0x1_0000, HeapVisibility::Virtual),
            ("image", 0x8000_0000, 0x2000_0000, 0x1000, HeapVisibility::Virtual),
            ("physical-64k", 0xA000_0000, 0x2000_0000, 0x1_0000, HeapVisibility::Physical),
            ("physical-16m", 0xC000_0000, 0x2000_0000, 0x100_0000, HeapVisibility::Physical),
            ("physical-4k", 0xE000_0000, 0x2000_0000, 0x1000, HeapVisibility::Physical),
        ];

        let heaps = layout
            .into_iter()
            .map(|(name, base, size, page_size, visibility)| HeapSlot {
                heap: Heap::new(name, base, size, page_size, visibility),
            })
            .collect();

        Ok(VirtualMemoryManager {
            heaps: RwLock::new(heaps),
            backend,
            arena_base,
        })
    }

    /// Returns the host base pointer `B` for the arena, per the data model's `B + g + phys_offset`
    /// rule.
    pub fn arena_base(&self) -> *mut u8 {
        self.arena_base
    }

    fn heap_index_for(slots: &[HeapSlot], addr: u32) -> Option<usize> {
        slots.iter().position(|s| addr >= s.heap.base && addr < s.heap.base + s.heap.size)
    }

    /// Rejects `X_MEM_RESET` (spec.md §9 open question 3): its semantics were never specified by
    /// the system this crate's guest VMM models, so rather than silently treat it as a no-op (and
    /// risk a caller depending on reset-without-decommit behavior that was never implemented) a
    /// caller that sets it gets a loud failure instead.
    fn reject_reset(alloc_type: AllocType) -> Result<(), VmmError> {
        if alloc_type.contains(AllocType::RESET) {
            return Err(VmmError::InvalidParameter("X_MEM_RESET is unimplemented"));
        }
        Ok(())
    }

    /// Commits or reserves a specific run at `base`.
    pub fn alloc_fixed(
        &self,
        base: u32,
        size: u32,
        alloc_type: AllocType,
        protect: ProtectionFlags,
    ) -> Result<(), VmmError> {
        Self::reject_reset(alloc_type)?;
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, base).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let commit = alloc_type.contains(AllocType::COMMIT);
        slots[idx].heap.alloc_fixed(base, size, commit, protect, CachingMode::Default)?;
        if commit {
            self.backend.commit(base, Self::align_up(size, slots[idx].heap.page_size), protect)?;
            if alloc_type.contains(AllocType::ZERO) {
                self.zero(base, size)?;
            }
        } else {
            self.backend.reserve(base, Self::align_up(size, slots[idx].heap.page_size))?;
        }
        Ok(())
    }

    /// Finds and reserves (and optionally commits) `size` bytes in the heap whose page size
    /// matches `page_size`.
    pub fn alloc(
        &self,
        size: u32,
        page_size: u32,
        alloc_type: AllocType,
        protect: ProtectionFlags,
        top_down: bool,
    ) -> Result<u32, VmmError> {
        Self::reject_reset(alloc_type)?;
        let mut slots = self.heaps.write().unwrap();
        let idx = slots
            .iter()
            .position(|s| s.heap.page_size == page_size && s.heap.visibility == HeapVisibility::Virtual)
            .ok_or(VmmError::InvalidParameter("no virtual heap uses that page size"))?;
        self.alloc_from_slot(&mut slots[idx], None, size, page_size, alloc_type, protect, top_down)
    }

    /// Like [`Self::alloc`] but constrained to `[min, max)`, used for bounded physical allocations.
    #[allow(clippy::too_many_arguments)]
    pub fn alloc_range(
        &self,
        min: u32,
        max: u32,
        size: u32,
        alignment: u32,
        alloc_type: AllocType,
        protect: ProtectionFlags,
        top_down: bool,
    ) -> Result<u32, VmmError> {
        Self::reject_reset(alloc_type)?;
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, min).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let commit = alloc_type.contains(AllocType::COMMIT);
        let base = slots[idx].heap.alloc_in_range(
            min,
            max,
            size,
            alignment,
            commit,
            protect,
            CachingMode::Default,
            top_down,
        )?;
        self.finish_alloc(base, size, commit, protect, alloc_type)?;
        Ok(base)
    }

    #[allow(clippy::too_many_arguments)]
    fn alloc_from_slot(
        &self,
        slot: &mut HeapSlot,
        _min: Option<u32>,
        size: u32,
        _page_size: u32,
        alloc_type: AllocType,
        protect: ProtectionFlags,
        top_down: bool,
    ) -> Result<u32, VmmError> {
        let commit = alloc_type.contains(AllocType::COMMIT);
        let base = slot.heap.alloc(size, slot.heap.page_size, commit, protect, CachingMode::Default, top_down)?;
        self.finish_alloc(base, size, commit, protect, alloc_type)?;
        Ok(base)
    }

    fn finish_alloc(
        &self,
        base: u32,
        size: u32,
        commit: bool,
        protect: ProtectionFlags,
        alloc_type: AllocType,
    ) -> Result<(), VmmError> {
        if commit {
            self.backend.commit(base, size, protect)?;
            if alloc_type.contains(AllocType::ZERO) {
                self.zero(base, size)?;
            }
        } else {
            self.backend.reserve(base, size)?;
        }
        Ok(())
    }

    fn align_up(v: u32, page: u32) -> u32 {
        (v + page - 1) / page * page
    }

    /// Changes protection over `[base, base+size)`, splitting the owning region if needed.
    pub fn protect(&self, base: u32, size: u32, new_protect: ProtectionFlags) -> Result<ProtectionFlags, VmmError> {
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, base).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let old = slots[idx].heap.protect(base, size, new_protect)?;
        self.backend.protect(base, size, new_protect)?;
        Ok(old)
    }

    /// Decommits `[base, base+size)`, leaving the pages reserved.
    pub fn decommit(&self, base: u32, size: u32) -> Result<(), VmmError> {
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, base).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        slots[idx].heap.decommit(base, size)?;
        self.backend.decommit(base, size)
    }

    /// Releases the entire reservation starting at `base`, returning its size.
    pub fn release(&self, base: u32) -> Result<u32, VmmError> {
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, base).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let size = slots[idx].heap.release(base)?;
        self.backend.release(base, size)?;
        Ok(size)
    }

    /// Returns `{base, allocation_base, allocation_protect, region_size, state, protect}` for the
    /// maximal uniform run containing `addr`.
    pub fn query_region_info(&self, addr: u32) -> Result<RegionInfo, VmmError> {
        let slots = self.heaps.read().unwrap();
        let idx = Self::heap_index_for(&slots, addr).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let (range, state) = slots[idx].heap.query(addr).ok_or(VmmError::MemoryNotAllocated(addr))?;
        let reservation = slots[idx]
            .heap
            .reservation_containing(addr)
            .ok_or(VmmError::MemoryNotAllocated(addr))?;
        let allocation = slots[idx]
            .heap
            .query(reservation.base)
            .map(|(_, s)| s.protect)
            .unwrap_or(state.protect);
        Ok(RegionInfo {
            base: range.start,
            allocation_base: reservation.base,
            allocation_protect: allocation,
            region_size: range.end - range.start,
            state: state.kind,
            protect: state.protect,
        })
    }

    /// Returns just the current protection for `addr`.
    pub fn query_protect(&self, addr: u32) -> Result<ProtectionFlags, VmmError> {
        Ok(self.query_region_info(addr)?.protect)
    }

    /// Returns the size of the maximal uniform run containing `addr`.
    pub fn query_size(&self, addr: u32) -> Result<u32, VmmError> {
        Ok(self.query_region_info(addr)?.region_size)
    }

    /// Translates a virtual address in a physical heap to its physical-alias address. Physical
    /// heaps back a single allocation with multiple aliasing virtual windows, so this is address
    /// arithmetic (the offset within the heap), not a copy.
    pub fn get_physical_address(&self, virtual_addr: u32) -> Result<u32, VmmError> {
        let slots = self.heaps.read().unwrap();
        let idx = Self::heap_index_for(&slots, virtual_addr)
            .ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        if slots[idx].heap.visibility != HeapVisibility::Physical {
            return Err(VmmError::InvalidParameter("address is not in a physical heap"));
        }
        Ok(virtual_addr - slots[idx].heap.base)
    }

    /// Zeroes `[addr, addr+size)`, temporarily elevating protection around any non-writable
    /// sub-range and restoring it afterward.
    pub fn zero(&self, addr: u32, size: u32) -> Result<(), VmmError> {
        let mut slots = self.heaps.write().unwrap();
        let idx = Self::heap_index_for(&slots, addr).ok_or(VmmError::InvalidParameter("address has no owning heap"))?;
        let backend = &self.backend;
        let arena_base = self.arena_base;
        slots[idx].heap.zero_with(addr, size, |start, len| unsafe {
            let offset = crate::vmm::phys_offset::phys_offset(start);
            let ptr = arena_base.add(start as usize).add(offset as usize);
            std::ptr::write_bytes(ptr, 0, len as usize);
        })?;
        let _ = backend;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_zero_release_cycle() {
        let vmm = VirtualMemoryManager::new().expect("arena reservation");
        let protect = ProtectionFlags::READ | ProtectionFlags::WRITE;

        let base = vmm
            .alloc(0x10000, 0x1000, AllocType::RESERVE, protect, false)
            .expect("reserve");
        vmm.alloc_fixed(base, 0x10000, AllocType::COMMIT, protect)
            .expect("commit");

        let info = vmm.query_region_info(base).expect("query");
        assert_eq!(info.base, base);
        assert_eq!(info.state, PageKind::Committed);

        let size = vmm.release(base).expect("release");
        assert_eq!(size, 0x10000);
        assert!(vmm.release(base).is_err());
    }

    #[test]
    fn protection_split_scenario() {
        let vmm = VirtualMemoryManager::new().expect("arena reservation");
        let rw = ProtectionFlags::READ | ProtectionFlags::WRITE;
        let ro = ProtectionFlags::READ;

        let base = vmm
            .alloc(0x4000, 0x1000, AllocType::RESERVE | AllocType::COMMIT, rw, false)
            .expect("reserve+commit");

        let old = vmm.protect(base + 0x1000, 0x1000, ro).expect("protect");
        assert_eq!(old, rw);

        let r0 = vmm.query_region_info(base).unwrap();
        assert_eq!(r0.region_size, 0x1000);
        assert_eq!(r0.protect, rw);

        let r1 = vmm.query_region_info(base + 0x1000).unwrap();
        assert_eq!(r1.region_size, 0x1000);
        assert_eq!(r1.protect, ro);

        let r2 = vmm.query_region_info(base + 0x2000).unwrap();
        assert_eq!(r2.region_size, 0x2000);
        assert_eq!(r2.protect, rw);
    }

    #[test]
    fn decommit_leaves_reserved() {
        let vmm = VirtualMemoryManager::new().expect("arena reservation");
        let rw = ProtectionFlags::READ | ProtectionFlags::WRITE;
        let base = vmm
            .alloc(0x1000, 0x1000, AllocType::RESERVE | AllocType::COMMIT, rw, false)
            .expect("reserve+commit");
        vmm.decommit(base, 0x1000).expect("decommit");
        let info = vmm.query_region_info(base).unwrap();
        assert_eq!(info.state, PageKind::Reserved);
    }

    #[test]
    fn mem_reset_is_rejected_rather_than_silently_ignored() {
        let vmm = VirtualMemoryManager::new().expect("arena reservation");
        let rw = ProtectionFlags::READ | ProtectionFlags::WRITE;
        let err = vmm
            .alloc(0x1000, 0x1000, AllocType::RESERVE | AllocType::RESET, rw, false)
            .unwrap_err();
        assert!(matches!(err, VmmError::InvalidParameter(_)));
    }
}
