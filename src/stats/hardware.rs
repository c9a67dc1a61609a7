// src/stats/hardware.rs
//! Host sampling for the periodic stats line
//!
//! Sensors that are missing on the host read as zero rather than failing.

use sysinfo::{Components, System};

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used by the system (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius (0 when no sensor is exposed)
    pub temperature: f32,
}

/// Samples CPU load, memory and temperature for the periodic stats line
pub struct HardwareMonitor {
    /// System information collector
    system: System,
    /// Hardware component information collector
    components: Components,
}

impl HardwareMonitor {
    /// Creates a monitor with freshly loaded sensor lists
    pub fn new() -> Self {
        HardwareMonitor {
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Gets the current hardware statistics
    ///
    /// This refreshes system information before returning the stats.
    pub fn sample(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }
}

impl Default for HardwareMonitor {
    fn default() -> Self {
        Self::new()
    }
}
