//! Host capability probes shared by ContainerManager (local mode) and
//! WorkerAgent (remote mode): both need to know what the machine they're
//! actually running on can offer before handing out sandbox resources.

/// Number of usable CPUs, falling back to 1 if the OS can't report it.
pub fn num_cpus() -> f64 {
    std::thread::available_parallelism().map(|n| n.get() as f64).unwrap_or(1.0)
}

/// Total host memory in MiB, read from `/proc/meminfo`. Falls back to a
/// conservative default on non-Linux hosts or if the file is unreadable.
pub fn total_memory_mb() -> u64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|contents| {
            contents.lines().find_map(|line| {
                line.strip_prefix("MemTotal:").map(|rest| rest.trim_end_matches(" kB").trim().parse::<u64>().unwrap_or(0) / 1024)
            })
        })
        .filter(|&mb| mb > 0)
        .unwrap_or(4096)
}
