use cloudlaunch_common::{CloudLaunchError, Result};

/// Base port of the workload's network services on every node.
pub const BASE_PORT: u16 = 54321;

/// Extra runtime arguments handed to the workload JVM.
pub const AUX_RUNTIME_ARGS: &str = "-XX:MaxDirectMemorySize=1g";

// instance type -> heap size in GB, leaving headroom for the OS.
const HEAP_SIZE_GB: &[(&str, u32)] = &[
    ("m1.large", 5),
    ("m1.xlarge", 11),
    ("m2.xlarge", 13),
    ("m2.2xlarge", 30),
    ("m2.4xlarge", 60),
    ("m3.xlarge", 11),
    ("m3.2xlarge", 24),
];

pub fn heap_size_gb(instance_type: &str) -> Result<u32> {
    HEAP_SIZE_GB
        .iter()
        .find(|(name, _)| *name == instance_type)
        .map(|(_, gb)| *gb)
        .ok_or_else(|| CloudLaunchError::UnknownInstanceType {
            instance_type: instance_type.to_string(),
        })
}
