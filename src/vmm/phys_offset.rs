//! The physical-host-offset function from the data model's glossary entry: a pure function of
//! the guest address that compensates for allocation-granularity differences in the upper
//! physical heaps. Generated code never caches its result; every load/store macro and every VMM
//! operation recomputes it from the address alone.

/// The allocation granularity a host OS primitive uses for anonymous mappings.
///
/// Linux, macOS and FreeBSD `mmap` grant page-level (4 KiB) granularity; Windows `VirtualAlloc`
/// only grants allocation-granularity (typically 64 KiB) addresses even though individual pages
/// are 4 KiB, which misaligns the 4 KiB physical heap at `0xE0000000` unless compensated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostPageGranularity {
    /// 4 KiB granularity: Linux, macOS, FreeBSD.
    FourKiB,
    /// 64 KiB-class granularity: Windows (`dwAllocationGranularity`, typically 0x10000).
    SixtyFourKiB,
}

impl HostPageGranularity {
    /// Detects the running host's granularity. On POSIX targets this is always [`FourKiB`];
    /// [`SixtyFourKiB`] is the Windows path, read from `GetSystemInfo().dwAllocationGranularity`
    /// at startup in the platform backend and threaded through from there. The `SixtyFourKiB`
    /// variant is kept as a first-class branch here (not `#[cfg(windows)]`-gated) so its behavior
    /// stays testable on every host.
    ///
    /// [`FourKiB`]: HostPageGranularity::FourKiB
    #[cfg(not(windows))]
    pub fn detect() -> Self {
        HostPageGranularity::FourKiB
    }

    /// Detects the running host's granularity on Windows via `GetSystemInfo`.
    #[cfg(windows)]
    pub fn detect() -> Self {
        use windows::Win32::System::SystemInformation::GetSystemInfo;

        unsafe {
            let mut info = std::mem::zeroed();
            GetSystemInfo(&mut info);
            if info.dwAllocationGranularity >= 0x1_0000 {
                HostPageGranularity::SixtyFourKiB
            } else {
                HostPageGranularity::FourKiB
            }
        }
    }
}

/// Lower bound (inclusive) of the 4 KiB-paged physical heap that the 64 KiB-granularity
/// compensation applies to.
const PHYS_4K_HEAP_BASE: u32 = 0xE000_0000;

/// The per-heap-page compensation applied when a 64 KiB-allocation-granularity host backs a 4
/// KiB-paged heap: one 4 KiB guest page is shifted by this many bytes so that consecutive guest
/// pages still land on distinct, non-overlapping host allocation-granularity boundaries.
const SIXTY_FOUR_KIB_COMPENSATION: u32 = 0x1000;

/// Computes the physical-host offset for guest address `g` under the given granularity.
///
/// On a 4 KiB-granular host the offset is always zero: guest pages and host allocation units
/// coincide, so no compensation is needed anywhere in the arena. On a 64 KiB-granular host, the
/// physical 4 KiB heap (`0xE0000000..0xFFFFFFFF`) is shifted by 0x1000 so that the host's
/// allocation granularity does not alias adjacent guest pages.
pub fn phys_offset_for(g: u32, granularity: HostPageGranularity) -> u32 {
    match granularity {
        HostPageGranularity::FourKiB => 0,
        HostPageGranularity::SixtyFourKiB => {
            if g >= PHYS_4K_HEAP_BASE {
                SIXTY_FOUR_KIB_COMPENSATION
            } else {
                0
            }
        }
    }
}

/// Computes the physical-host offset for guest address `g` on the current process's detected
/// host granularity. This is the function generated load/store macros and the VMM call; the
/// granularity is detected once (see [`HostPageGranularity::detect`]) and cached in a static so
/// that repeated calls stay cheap despite never caching the *offset itself* per address.
pub fn phys_offset(g: u32) -> u32 {
    use std::sync::OnceLock;

    static GRANULARITY: OnceLock<HostPageGranularity> = OnceLock::new();
    let granularity = *GRANULARITY.get_or_init(HostPageGranularity::detect);
    phys_offset_for(g, granularity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_kib_host_never_compensates() {
        assert_eq!(phys_offset_for(0x0, HostPageGranularity::FourKiB), 0);
        assert_eq!(phys_offset_for(0xE000_1000, HostPageGranularity::FourKiB), 0);
    }

    #[test]
    fn sixty_four_kib_host_compensates_only_the_4k_phys_heap() {
        assert_eq!(
            phys_offset_for(0x4000_0000, HostPageGranularity::SixtyFourKiB),
            0
        );
        assert_eq!(
            phys_offset_for(0xE000_0000, HostPageGranularity::SixtyFourKiB),
            0x1000
        );
        assert_eq!(
            phys_offset_for(0xFFFF_FFFF, HostPageGranularity::SixtyFourKiB),
            0x1000
        );
    }
}
