//! Windows backend for [`super::HostMemoryBackend`]: the VMM's state machine shadows the host's
//! own reserve/commit/decommit/release semantics almost exactly, so `commit`/`decommit`/
//! `protect`/`release` map close to one-to-one onto `VirtualAlloc`/`VirtualProtect`/`VirtualFree`.
use windows::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
};

use crate::error::VmmError;
use crate::vmm::ProtectionFlags;

use super::{to_host_access, HostMemoryBackend};

const ARENA_SIZE: usize = 4 * 1024 * 1024 * 1024;

/// Holds the single `VirtualAlloc(MEM_RESERVE)` reservation backing the whole arena.
pub struct WindowsBackend {
    base: *mut std::ffi::c_void,
}

// SAFETY: the reservation outlives every sub-range operation issued against it; all mutation is
// funneled through the owning `VirtualMemoryManager`'s write lock.
unsafe impl Send for WindowsBackend {}
unsafe impl Sync for WindowsBackend {}

fn page_protect(read: bool, write: bool) -> u32 {
    if write {
        PAGE_READWRITE.0
    } else if read {
        PAGE_READONLY.0
    } else {
        PAGE_NOACCESS.0
    }
}

impl WindowsBackend {
    fn sub_range_ptr(&self, base: u32) -> *mut std::ffi::c_void {
        let offset = crate::vmm::phys_offset::phys_offset(base);
        unsafe { (self.base as *mut u8).add(base as usize).add(offset as usize) as *mut std::ffi::c_void }
    }
}

impl HostMemoryBackend for WindowsBackend {
    fn reserve(&self, base: u32, size: u32) -> Result<(), VmmError> {
        let addr = self.sub_range_ptr(base);
        let result = unsafe { VirtualAlloc(addr, size as usize, MEM_RESERVE, PAGE_NOACCESS) };
        if result.is_null() {
            return Err(VmmError::Windows(windows::Error::from_win32()));
        }
        Ok(())
    }

    fn commit(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError> {
        let (read, write) = to_host_access(protect);
        let addr = self.sub_range_ptr(base);
        let result = unsafe { VirtualAlloc(addr, size as usize, MEM_COMMIT, page_protect(read, write)) };
        if result.is_null() {
            return Err(VmmError::Windows(windows::Error::from_win32()));
        }
        Ok(())
    }

    fn decommit(&self, base: u32, size: u32) -> Result<(), VmmError> {
        let addr = self.sub_range_ptr(base);
        unsafe { VirtualFree(addr, size as usize, MEM_DECOMMIT) }
            .ok()
            .map_err(VmmError::Windows)
    }

    fn protect(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError> {
        let (read, write) = to_host_access(protect);
        let addr = self.sub_range_ptr(base);
        let mut old = 0u32;
        unsafe { VirtualProtect(addr, size as usize, page_protect(read, write), &mut old) }
            .ok()
            .map_err(VmmError::Windows)
    }

    fn release(&self, base: u32, size: u32) -> Result<(), VmmError> {
        self.decommit(base, size)
    }
}

/// Reserves the 4 GiB arena via `VirtualAlloc(MEM_RESERVE)` and returns its base pointer plus the
/// backend that services sub-range requests against it.
pub fn reserve_arena() -> Result<(*mut u8, Box<dyn HostMemoryBackend>), VmmError> {
    let base = unsafe { VirtualAlloc(std::ptr::null(), ARENA_SIZE, MEM_RESERVE, PAGE_NOACCESS) };
    if base.is_null() {
        return Err(VmmError::Windows(windows::Error::from_win32()));
    }
    Ok((base as *mut u8, Box::new(WindowsBackend { base })))
}
