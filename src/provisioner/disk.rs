//! Disk-size heuristic by instance type family, per the provisioning policy:
//! GPU families get a large default; otherwise disk scales with the
//! `<family>.<N>xlarge` size index.

const GPU_FAMILIES: &[&str] = &["p2", "p3", "p3dn", "p4d", "p4de", "p5", "g3", "g4dn", "g4ad", "g5", "g5g", "g6"];

pub fn disk_size_gb(instance_type: &str) -> u32 {
    let mut parts = instance_type.splitn(2, '.');
    let family = parts.next().unwrap_or("");
    let size = parts.next().unwrap_or("");

    if GPU_FAMILIES.contains(&family) {
        return 200;
    }

    match size_multiplier(size) {
        m if m >= 24 => 500,
        m if m >= 12 => 200,
        m if m >= 4 => 100,
        _ => 50,
    }
}

fn size_multiplier(size: &str) -> u32 {
    match size.strip_suffix("xlarge") {
        Some("") => 1,
        Some(n) => n.parse().unwrap_or(1),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_family_gets_200() {
        assert_eq!(disk_size_gb("g5.2xlarge"), 200);
        assert_eq!(disk_size_gb("p4d.24xlarge"), 200);
    }

    #[test]
    fn size_index_tiers() {
        assert_eq!(disk_size_gb("m5.24xlarge"), 500);
        assert_eq!(disk_size_gb("m5.12xlarge"), 200);
        assert_eq!(disk_size_gb("m5.4xlarge"), 100);
        assert_eq!(disk_size_gb("m5.xlarge"), 50);
        assert_eq!(disk_size_gb("m5.large"), 50);
    }

    #[test]
    fn unknown_family_falls_back_to_default() {
        assert_eq!(disk_size_gb("m5.medium"), 50);
    }
}
