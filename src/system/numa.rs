//! NUMA (Non-Uniform Memory Access) topology and thread placement
//!
//! Provides the topology queries a transfer needs to keep its workers close
//! to the memory they move:
//! - Usable CPUs per node (online and inside the process affinity mask)
//! - Home node of a memory address
//! - Node of the calling thread
//! - Pinning of the current thread to one CPU

use serde::Serialize;

/// Topology queries consumed by the transfer coordinator
pub trait TopologyProvider: Send + Sync {
    /// CPUs of `node` that workers may run on, in topology order
    fn usable_cpus(&self, node: usize) -> Vec<usize>;

    /// Number of usable CPUs on `node`
    fn cpu_count(&self, node: usize) -> usize {
        self.usable_cpus(node).len()
    }

    /// Node whose memory backs `addr`, if known
    fn node_of_address(&self, _addr: *const u8) -> Option<usize> {
        None
    }

    /// Node of the CPU the calling thread runs on, if known
    fn current_node(&self) -> Option<usize> {
        None
    }
}

/// NUMA node information
#[derive(Debug, Clone, Serialize)]
pub struct NumaNode {
    /// Node ID
    pub id: usize,
    /// Usable CPUs belonging to this node
    pub cpus: Vec<usize>,
    /// Total memory in bytes
    pub memory_total: u64,
    /// Free memory in bytes
    pub memory_free: u64,
}

/// NUMA topology information
#[derive(Debug, Clone, Serialize)]
pub struct NumaTopology {
    /// NUMA nodes, sorted by ID
    pub nodes: Vec<NumaNode>,
    /// Usable CPUs across all nodes
    pub total_cpus: usize,
    /// Is NUMA actually available/meaningful
    pub is_numa_system: bool,
}

impl Default for NumaTopology {
    fn default() -> Self {
        Self::detect()
    }
}

impl NumaTopology {
    /// Build a topology from explicit nodes
    pub fn from_nodes(mut nodes: Vec<NumaNode>) -> Self {
        nodes.sort_by_key(|n| n.id);
        let total_cpus = nodes.iter().map(|n| n.cpus.len()).sum();
        let is_numa_system = nodes.len() > 1;

        Self {
            nodes,
            total_cpus,
            is_numa_system,
        }
    }

    /// Single node holding every CPU the process may use
    fn single_node() -> Self {
        let cpus = ThreadAffinity::allowed_cpus()
            .filter(|cpus| !cpus.is_empty())
            .unwrap_or_else(|| (0..num_cpus::get()).collect());

        Self::from_nodes(vec![NumaNode {
            id: 0,
            cpus,
            memory_total: 0,
            memory_free: 0,
        }])
    }

    /// Detect NUMA topology from the system
    #[cfg(target_os = "linux")]
    pub fn detect() -> Self {
        let allowed = ThreadAffinity::allowed_cpus();
        let mut nodes = Vec::new();

        if let Ok(entries) = std::fs::read_dir("/sys/devices/system/node") {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();

                if !name_str.starts_with("node") {
                    continue;
                }
                let Ok(node_id) = name_str.trim_start_matches("node").parse::<usize>() else {
                    continue;
                };

                let node_path = entry.path();
                let mut cpus = Self::read_node_cpus(&node_path);
                if let Some(allowed) = &allowed {
                    cpus.retain(|cpu| allowed.contains(cpu));
                }
                let (memory_total, memory_free) = Self::read_node_memory(&node_path);

                nodes.push(NumaNode {
                    id: node_id,
                    cpus,
                    memory_total,
                    memory_free,
                });
            }
        }

        if nodes.is_empty() {
            tracing::debug!("No NUMA information in sysfs, assuming a single node");
            return Self::single_node();
        }

        Self::from_nodes(nodes)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Self {
        Self::single_node()
    }

    #[cfg(target_os = "linux")]
    fn read_node_cpus(node_path: &std::path::Path) -> Vec<usize> {
        std::fs::read_to_string(node_path.join("cpulist"))
            .map(|content| Self::parse_cpu_list(content.trim()))
            .unwrap_or_default()
    }

    #[cfg(target_os = "linux")]
    fn read_node_memory(node_path: &std::path::Path) -> (u64, u64) {
        let mut total = 0u64;
        let mut free = 0u64;

        if let Ok(content) = std::fs::read_to_string(node_path.join("meminfo")) {
            for line in content.lines() {
                if line.contains("MemTotal:") {
                    if let Some(kb) = Self::parse_meminfo_value(line) {
                        total = kb * 1024;
                    }
                } else if line.contains("MemFree:") {
                    if let Some(kb) = Self::parse_meminfo_value(line) {
                        free = kb * 1024;
                    }
                }
            }
        }

        (total, free)
    }

    #[cfg(target_os = "linux")]
    fn parse_meminfo_value(line: &str) -> Option<u64> {
        line.split_whitespace()
            .nth(3) // Format: "Node X MemTotal: 12345 kB"
            .and_then(|s| s.parse().ok())
    }

    /// Parse CPU list format (e.g., "0-3,8-11" -> [0,1,2,3,8,9,10,11])
    pub fn parse_cpu_list(s: &str) -> Vec<usize> {
        let mut cpus = Vec::new();

        for part in s.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<usize>() {
                cpus.push(cpu);
            }
        }

        cpus
    }

    /// Find the node a CPU belongs to
    pub fn node_of_cpu(&self, cpu: usize) -> Option<usize> {
        self.nodes
            .iter()
            .find(|n| n.cpus.contains(&cpu))
            .map(|n| n.id)
    }

    /// Print NUMA topology summary
    pub fn print_summary(&self) {
        println!("NUMA Topology:");
        println!("  Nodes: {}", self.nodes.len());
        println!("  Usable CPUs: {}", self.total_cpus);
        println!("  NUMA System: {}", self.is_numa_system);

        for node in &self.nodes {
            println!("  Node {}:", node.id);
            println!("    CPUs: {:?}", node.cpus);
            if node.memory_total > 0 {
                println!(
                    "    Memory: {} / {} free",
                    humansize::format_size(node.memory_free, humansize::BINARY),
                    humansize::format_size(node.memory_total, humansize::BINARY)
                );
            }
        }
    }
}

impl TopologyProvider for NumaTopology {
    fn usable_cpus(&self, node: usize) -> Vec<usize> {
        self.nodes
            .iter()
            .find(|n| n.id == node)
            .map(|n| n.cpus.clone())
            .unwrap_or_default()
    }

    fn node_of_address(&self, addr: *const u8) -> Option<usize> {
        if !self.is_numa_system {
            return self.nodes.first().map(|n| n.id);
        }
        memory_node_of(addr)
    }

    fn current_node(&self) -> Option<usize> {
        ThreadAffinity::current_cpu()
            .and_then(|cpu| self.node_of_cpu(cpu))
            .or_else(|| self.nodes.first().map(|n| n.id))
    }
}

/// Look up the node backing `addr` with get_mempolicy(2)
#[cfg(target_os = "linux")]
fn memory_node_of(addr: *const u8) -> Option<usize> {
    const MPOL_F_NODE: libc::c_ulong = 1;
    const MPOL_F_ADDR: libc::c_ulong = 1 << 1;

    let mut node: libc::c_int = -1;

    // SAFETY: the kernel only inspects the mapping containing `addr` and
    // writes one int into `node`; no nodemask is passed.
    let result = unsafe {
        libc::syscall(
            libc::SYS_get_mempolicy,
            &mut node as *mut libc::c_int,
            std::ptr::null_mut::<libc::c_ulong>(),
            0 as libc::c_ulong,
            addr,
            MPOL_F_NODE | MPOL_F_ADDR,
        )
    };

    if result == 0 && node >= 0 {
        Some(node as usize)
    } else {
        tracing::debug!(
            "get_mempolicy failed for {:p}: {}",
            addr,
            std::io::Error::last_os_error()
        );
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn memory_node_of(_addr: *const u8) -> Option<usize> {
    None
}

/// Thread affinity helper
pub struct ThreadAffinity;

impl ThreadAffinity {
    /// Pin current thread to a specific CPU
    #[cfg(target_os = "linux")]
    pub fn pin_to_cpu(cpu: usize) -> std::io::Result<()> {
        if cpu >= libc::CPU_SETSIZE as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("CPU {} exceeds the affinity mask size", cpu),
            ));
        }

        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            libc::CPU_SET(cpu, &mut set);

            let result = libc::sched_setaffinity(
                0, // current thread
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            );

            if result == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn pin_to_cpu(_cpu: usize) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "thread affinity not supported on this platform",
        ))
    }

    /// CPUs the current thread is allowed to run on
    #[cfg(target_os = "linux")]
    pub fn allowed_cpus() -> Option<Vec<usize>> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            let result =
                libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);

            if result != 0 {
                return None;
            }

            Some(
                (0..libc::CPU_SETSIZE as usize)
                    .filter(|&cpu| libc::CPU_ISSET(cpu, &set))
                    .collect(),
            )
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn allowed_cpus() -> Option<Vec<usize>> {
        None
    }

    /// CPU the current thread is running on
    #[cfg(target_os = "linux")]
    pub fn current_cpu() -> Option<usize> {
        let cpu = unsafe { libc::sched_getcpu() };
        (cpu >= 0).then_some(cpu as usize)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn current_cpu() -> Option<usize> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_topology() -> NumaTopology {
        NumaTopology::from_nodes(vec![
            NumaNode { id: 1, cpus: vec![4, 5, 6, 7], memory_total: 0, memory_free: 0 },
            NumaNode { id: 0, cpus: vec![0, 1, 2, 3], memory_total: 0, memory_free: 0 },
        ])
    }

    #[test]
    fn test_topology_detection() {
        let topology = NumaTopology::detect();
        assert!(!topology.nodes.is_empty());
        assert!(topology.total_cpus >= 1);
    }

    #[test]
    fn test_cpu_list_parsing() {
        assert_eq!(NumaTopology::parse_cpu_list("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(NumaTopology::parse_cpu_list("0,2,4"), vec![0, 2, 4]);
        assert_eq!(NumaTopology::parse_cpu_list("0-2,4-6"), vec![0, 1, 2, 4, 5, 6]);
        assert!(NumaTopology::parse_cpu_list("").is_empty());
    }

    #[test]
    fn test_from_nodes_sorts_and_counts() {
        let topology = two_node_topology();
        assert_eq!(topology.nodes[0].id, 0);
        assert_eq!(topology.total_cpus, 8);
        assert!(topology.is_numa_system);
    }

    #[test]
    fn test_provider_queries() {
        let topology = two_node_topology();
        assert_eq!(topology.usable_cpus(1), vec![4, 5, 6, 7]);
        assert_eq!(topology.cpu_count(0), 4);
        assert!(topology.usable_cpus(7).is_empty());
        assert_eq!(topology.node_of_cpu(5), Some(1));
        assert_eq!(topology.node_of_cpu(42), None);
    }

    #[test]
    fn test_single_node_address_lookup() {
        let topology = NumaTopology::from_nodes(vec![NumaNode {
            id: 0,
            cpus: vec![0],
            memory_total: 0,
            memory_free: 0,
        }]);
        let buf = vec![0u8; 64];
        assert_eq!(topology.node_of_address(buf.as_ptr()), Some(0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_allowed_cpus_include_current() {
        let allowed = ThreadAffinity::allowed_cpus().unwrap();
        assert!(!allowed.is_empty());
        if let Some(cpu) = ThreadAffinity::current_cpu() {
            assert!(allowed.contains(&cpu));
        }
    }
}
