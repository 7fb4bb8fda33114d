fn main() {
    #[cfg(target_os = "windows")]
    windows::build! {
        Windows::Win32::System::Memory::*,
        Windows::Win32::System::SystemInformation::GetSystemInfo,
    }
}
