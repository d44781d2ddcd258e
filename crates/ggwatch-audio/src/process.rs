//! Process discovery by executable name. Polled, not subscribed; one
//! snapshot per call.

use sysinfo::{ProcessesToUpdate, System};

/// Point-in-time pid lookup. The supervisor calls `find_pid` twice around
/// every capture open: once to discover and once to re-verify, so a pid
/// recycled to an unrelated process between the two is discarded instead
/// of captured.
pub trait ProcessLocator: Send {
    /// Case-insensitive match on the executable name. O(running
    /// processes) per call.
    fn find_pid(&mut self, exe_name: &str) -> Option<u32>;
}

pub struct SysinfoLocator {
    system: System,
}

impl SysinfoLocator {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLocator for SysinfoLocator {
    fn find_pid(&mut self, exe_name: &str) -> Option<u32> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let wanted = exe_name.to_ascii_lowercase();
        self.system
            .processes()
            .iter()
            .find(|(_, process)| {
                process.name().to_string_lossy().to_ascii_lowercase() == wanted
            })
            .map(|(pid, _)| pid.as_u32())
    }
}
