//! POSIX backend (Linux, macOS, FreeBSD) for [`super::HostMemoryBackend`]: the 4 GiB arena is
//! reserved once as a single inaccessible `mmap_rs` mapping so the host base pointer never moves;
//! `commit`/`decommit`/`protect` then mutate sub-ranges of that one mapping directly through
//! `nix::sys::mman`, since `mmap_rs`'s typestate tracks one reservation as a whole and has no
//! sub-range protection API.
use std::ptr::NonNull;

use mmap_rs::MmapOptions;
use nix::sys::mman::{madvise, mprotect, MmapAdvise, ProtFlags};

use crate::error::VmmError;
use crate::vmm::ProtectionFlags;

use super::{to_host_access, HostMemoryBackend};

const ARENA_SIZE: usize = 4 * 1024 * 1024 * 1024;

/// Holds the single long-lived arena reservation; sub-range mutation bypasses `mmap_rs` and goes
/// straight through `nix`.
pub struct PosixBackend {
    // Kept alive for the process lifetime so the reservation is never unmapped out from under us.
    _arena: mmap_rs::MmapNone,
}

fn prot_flags(read: bool, write: bool) -> ProtFlags {
    let mut flags = ProtFlags::PROT_NONE;
    if read {
        flags |= ProtFlags::PROT_READ;
    }
    if write {
        flags |= ProtFlags::PROT_WRITE;
    }
    flags
}

impl HostMemoryBackend for PosixBackend {
    fn reserve(&self, base: u32, size: u32) -> Result<(), VmmError> {
        self.decommit(base, size)
    }

    fn commit(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError> {
        let (read, write) = to_host_access(protect);
        let addr = self.sub_range_ptr(base)?;
        unsafe {
            mprotect(addr, size as usize, prot_flags(read, write))?;
        }
        Ok(())
    }

    fn decommit(&self, base: u32, size: u32) -> Result<(), VmmError> {
        let addr = self.sub_range_ptr(base)?;
        unsafe {
            mprotect(addr, size as usize, ProtFlags::PROT_NONE)?;
            // Best-effort: let the host reclaim physical pages backing a decommitted range. A
            // failure here does not change observable guest semantics, only host residency, so
            // it is not propagated as a VmmError.
            let _ = madvise(addr, size as usize, MmapAdvise::MADV_DONTNEED);
        }
        Ok(())
    }

    fn protect(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError> {
        let (read, write) = to_host_access(protect);
        let addr = self.sub_range_ptr(base)?;
        unsafe {
            mprotect(addr, size as usize, prot_flags(read, write))?;
        }
        Ok(())
    }

    fn release(&self, base: u32, size: u32) -> Result<(), VmmError> {
        self.decommit(base, size)
    }
}

impl PosixBackend {
    fn sub_range_ptr(&self, base: u32) -> Result<NonNull<std::ffi::c_void>, VmmError> {
        let offset = crate::vmm::phys_offset::phys_offset(base);
        let ptr = unsafe {
            (self._arena.as_ptr() as *mut u8)
                .add(base as usize)
                .add(offset as usize)
        };
        NonNull::new(ptr as *mut std::ffi::c_void).ok_or(VmmError::InvalidParameter("address is null"))
    }
}

/// Reserves the 4 GiB arena as a single inaccessible mapping and returns its base pointer plus the
/// backend that services sub-range requests against it.
pub fn reserve_arena() -> Result<(*mut u8, Box<dyn HostMemoryBackend>), VmmError> {
    let mapping = MmapOptions::new()
        .with_size(ARENA_SIZE)
        .map_mut()
        .map_err(|e| VmmError::Host(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    let (arena, base) = match mapping.make_none() {
        Ok(none) => {
            let base = none.as_ptr() as *mut u8;
            (none, base)
        }
        Err((_, e)) => {
            return Err(VmmError::Host(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
        }
    };

    Ok((base, Box::new(PosixBackend { _arena: arena })))
}

/// Parses `/proc/self/maps` to discover the maximal contiguous span starting exactly at `base`
/// with identical backing attributes, used by `Release` on systems that do not remember the
/// original reservation size. This crate's [`crate::vmm::heap::Heap`] tracks reservations
/// directly, so this helper exists for the release-without-tracked-size path the spec documents
/// as a fallback when a caller invokes the lower-level primitive with `size = 0`.
#[cfg(target_os = "linux")]
pub fn maximal_span_from_proc_maps(base: u64) -> std::io::Result<Option<u64>> {
    use std::io::Read;

    let mut contents = String::new();
    std::fs::File::open("/proc/self/maps")?.read_to_string(&mut contents)?;

    let mut current_end: Option<u64> = None;
    for line in contents.lines() {
        let Some(range) = line.split_whitespace().next() else {
            continue;
        };
        let Some((start_str, end_str)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (u64::from_str_radix(start_str, 16), u64::from_str_radix(end_str, 16)) else {
            continue;
        };

        if start == base || Some(start) == current_end {
            current_end = Some(end);
        } else if current_end.is_some() {
            break;
        }
    }

    Ok(current_end.map(|end| end - base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_readwrite_then_decommit() {
        let (base_ptr, backend) = reserve_arena().expect("arena reservation");
        let rw = ProtectionFlags::READ | ProtectionFlags::WRITE;

        backend.commit(0x1000, 0x1000, rw).expect("commit");
        unsafe {
            let ptr = base_ptr.add(0x1000);
            std::ptr::write_volatile(ptr as *mut u32, 0xDEADBEEF);
            assert_eq!(std::ptr::read_volatile(ptr as *const u32), 0xDEADBEEF);
        }
        backend.decommit(0x1000, 0x1000).expect("decommit");
    }
}
