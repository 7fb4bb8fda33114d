//! Host virtual-memory backends, one module per OS family, mirroring the teacher crate's
//! `os_impl/{linux,macos,freebsd,windows}` split — except where that crate abstracts over
//! *hypervisor* backends, this one abstracts over *host virtual memory* backends: reserving the 4
//! GiB guest arena once at startup and servicing the [`crate::vmm::manager::VirtualMemoryManager`]'s
//! commit/decommit/protect/release calls against sub-ranges of it.
use crate::error::VmmError;
use crate::vmm::ProtectionFlags;

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

/// The host primitive operations the VMM needs on any platform: reserve the whole arena once,
/// then commit/decommit/protect/release sub-ranges of it. The arena reservation itself is never
/// torn down mid-process (the data model's "host base pointer is immutable for the process
/// lifetime" invariant); `release` only ever reverts a sub-range to an inaccessible, decommitted
/// state within that one long-lived reservation.
pub trait HostMemoryBackend: Send + Sync {
    /// Marks `[base, base+size)` as reserved (inaccessible, no backing storage).
    fn reserve(&self, base: u32, size: u32) -> Result<(), VmmError>;
    /// Grants `protect` access and backing storage to `[base, base+size)`.
    fn commit(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError>;
    /// Revokes access to `[base, base+size)` and advises the host to drop its backing pages.
    fn decommit(&self, base: u32, size: u32) -> Result<(), VmmError>;
    /// Changes the access protection of `[base, base+size)`.
    fn protect(&self, base: u32, size: u32, protect: ProtectionFlags) -> Result<(), VmmError>;
    /// Reverts `[base, base+size)` to reserved-and-inaccessible after its owning reservation is
    /// released.
    fn release(&self, base: u32, size: u32) -> Result<(), VmmError>;
}

/// Reserves the 4 GiB guest arena and returns its host base pointer plus the platform backend
/// that services sub-range operations against it.
pub fn reserve_arena() -> Result<(*mut u8, Box<dyn HostMemoryBackend>), VmmError> {
    #[cfg(unix)]
    {
        posix::reserve_arena()
    }
    #[cfg(windows)]
    {
        windows::reserve_arena()
    }
}

/// Converts a protection flag set into the coarser `{read, write}` access a host primitive grants;
/// `no-cache`/`write-combine` are caching hints tracked at the heap level (`§4.4`) rather than a
/// distinct host access mode on POSIX.
pub(crate) fn to_host_access(protect: ProtectionFlags) -> (bool, bool) {
    (
        protect.contains(ProtectionFlags::READ),
        protect.contains(ProtectionFlags::WRITE),
    )
}
