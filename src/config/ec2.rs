//! EC2 instance-type lookup
//!
//! Node classes named after an EC2 instance type and declaring no explicit
//! capacity are filled in from this table: vCPU count and memory rounded to
//! whole GiB, applied to both capacity and allocatable.

use super::nodes::NodeResources;

struct InstanceType {
    name: &'static str,
    vcpu: u32,
    memory_gib: u32,
}

static INSTANCE_TYPES: &[InstanceType] = &[
    InstanceType { name: "t3.micro", vcpu: 2, memory_gib: 1 },
    InstanceType { name: "t3.small", vcpu: 2, memory_gib: 2 },
    InstanceType { name: "t3.medium", vcpu: 2, memory_gib: 4 },
    InstanceType { name: "t3.large", vcpu: 2, memory_gib: 8 },
    InstanceType { name: "t3.xlarge", vcpu: 4, memory_gib: 16 },
    InstanceType { name: "t3.2xlarge", vcpu: 8, memory_gib: 32 },
    InstanceType { name: "m4.large", vcpu: 2, memory_gib: 8 },
    InstanceType { name: "m4.xlarge", vcpu: 4, memory_gib: 16 },
    InstanceType { name: "m4.2xlarge", vcpu: 8, memory_gib: 32 },
    InstanceType { name: "m5.large", vcpu: 2, memory_gib: 8 },
    InstanceType { name: "m5.xlarge", vcpu: 4, memory_gib: 16 },
    InstanceType { name: "m5.2xlarge", vcpu: 8, memory_gib: 32 },
    InstanceType { name: "m5.4xlarge", vcpu: 16, memory_gib: 64 },
    InstanceType { name: "m5.12xlarge", vcpu: 48, memory_gib: 192 },
    InstanceType { name: "m5.24xlarge", vcpu: 96, memory_gib: 384 },
    InstanceType { name: "c5.large", vcpu: 2, memory_gib: 4 },
    InstanceType { name: "c5.xlarge", vcpu: 4, memory_gib: 8 },
    InstanceType { name: "c5.2xlarge", vcpu: 8, memory_gib: 16 },
    InstanceType { name: "c5.4xlarge", vcpu: 16, memory_gib: 32 },
    InstanceType { name: "c5.9xlarge", vcpu: 36, memory_gib: 72 },
    InstanceType { name: "c5.18xlarge", vcpu: 72, memory_gib: 144 },
    InstanceType { name: "r5.large", vcpu: 2, memory_gib: 16 },
    InstanceType { name: "r5.xlarge", vcpu: 4, memory_gib: 32 },
    InstanceType { name: "r5.2xlarge", vcpu: 8, memory_gib: 64 },
    InstanceType { name: "r5.4xlarge", vcpu: 16, memory_gib: 128 },
    InstanceType { name: "i3.large", vcpu: 2, memory_gib: 15 },
    InstanceType { name: "i3.xlarge", vcpu: 4, memory_gib: 30 },
    InstanceType { name: "p3.2xlarge", vcpu: 8, memory_gib: 61 },
    InstanceType { name: "p3.8xlarge", vcpu: 32, memory_gib: 244 },
];

/// Look up default resources for an instance-type name (already lowercased).
pub fn lookup(name: &str) -> Option<NodeResources> {
    let row = INSTANCE_TYPES.iter().find(|t| t.name == name)?;
    let mut resources = NodeResources::default();
    for map in [&mut resources.capacity, &mut resources.allocatable] {
        map.insert("cpu".to_string(), row.vcpu.to_string());
        map.insert("memory".to_string(), format!("{}Gi", row.memory_gib));
    }
    Some(resources)
}
