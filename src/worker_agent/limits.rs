//! Resource-limit clamping: requested `cpus`/`memory_mb` never exceed host
//! capability, with headroom reserved for the host OS.

const MEMORY_HEADROOM_FACTOR: f64 = 0.9;
const MIN_CPUS: f64 = 1.0;
const MIN_MEMORY_MB: u64 = 1024;

/// Clamp a requested (cpus, memory_mb) pair to host capability, reserving
/// ~10% of host memory for the OS and never going below 1 CPU / 1 GiB.
pub fn clamp_resources(requested_cpus: f64, requested_memory_mb: u64, host_cpus: f64, host_memory_mb: u64) -> (f64, u64) {
    let max_memory = ((host_memory_mb as f64) * MEMORY_HEADROOM_FACTOR) as u64;
    let cpus = requested_cpus.min(host_cpus).max(MIN_CPUS);
    let memory_mb = requested_memory_mb.min(max_memory).max(MIN_MEMORY_MB);
    (cpus, memory_mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_host_capability_with_headroom() {
        let (cpus, mem) = clamp_resources(8.0, 16384, 4.0, 8192);
        assert_eq!(cpus, 4.0);
        assert_eq!(mem, (8192.0 * 0.9) as u64);
    }

    #[test]
    fn never_goes_below_minimums() {
        let (cpus, mem) = clamp_resources(0.1, 100, 8.0, 16384);
        assert_eq!(cpus, 1.0);
        assert_eq!(mem, 1024);
    }

    #[test]
    fn passes_through_requests_within_bounds() {
        let (cpus, mem) = clamp_resources(2.0, 4096, 8.0, 16384);
        assert_eq!(cpus, 2.0);
        assert_eq!(mem, 4096);
    }
}
