use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use error_stack::Report;
use tracing::debug;
use tracing::warn;

use super::CacheError;
use crate::topology::Topology;

/// Live view of one host: its topology snapshot and which workload holds
/// each device.
///
/// Every host owns its own lock, so work on one host never waits for another.
#[derive(Debug)]
pub struct HostState {
    name: String,
    inner: RwLock<HostInner>,
}

#[derive(Debug, Default)]
struct HostInner {
    topology: Arc<Topology>,
    /// device UUID -> workload key; absent devices are free
    occupants: HashMap<String, String>,
}

impl HostState {
    /// Create a host with no known devices.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_topology(name, Arc::new(Topology::default()))
    }

    pub fn with_topology(name: impl Into<String>, topology: Arc<Topology>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(HostInner {
                topology,
                occupants: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.inner.read().expect("poisoned").topology.clone()
    }

    /// Replace the topology snapshot.
    ///
    /// Occupancy entries for devices missing from the new snapshot are kept;
    /// they never match a device again and are released with their workload.
    pub fn set_topology(&self, topology: Arc<Topology>) {
        let mut inner = self.inner.write().expect("poisoned");
        let stale = inner
            .occupants
            .keys()
            .filter(|uuid| !topology.contains(uuid))
            .count();
        if stale > 0 {
            debug!(
                node = %self.name,
                stale,
                "Occupied devices are missing from the new topology"
            );
        }
        inner.topology = topology;
    }

    /// Record `workload` as the occupant of `device_uuids`.
    ///
    /// UUIDs that are not part of the current topology are skipped. Returns
    /// true if at least one device changed hands.
    pub fn occupy(&self, workload: &str, device_uuids: &[String]) -> bool {
        let mut inner = self.inner.write().expect("poisoned");
        let HostInner {
            topology,
            occupants,
        } = &mut *inner;

        let mut added = false;
        for uuid in device_uuids {
            if !topology.contains(uuid) {
                warn!(
                    node = %self.name,
                    workload,
                    device = %uuid,
                    "Device is not in the node topology, skip"
                );
                continue;
            }
            let previous = occupants.insert(uuid.clone(), workload.to_string());
            if previous.as_deref() != Some(workload) {
                added = true;
            }
        }
        added
    }

    /// Free the devices in `device_uuids` that `workload` still holds.
    ///
    /// Devices that are free, unknown, or held by another workload are left
    /// untouched.
    pub fn release(&self, workload: &str, device_uuids: &[String]) {
        let mut inner = self.inner.write().expect("poisoned");
        for uuid in device_uuids {
            match inner.occupants.get(uuid) {
                Some(occupant) if occupant == workload => {
                    inner.occupants.remove(uuid);
                }
                Some(occupant) => {
                    debug!(
                        node = %self.name,
                        workload,
                        device = %uuid,
                        occupant = %occupant,
                        "Device was taken over by another workload, keep"
                    );
                }
                None => {
                    debug!(node = %self.name, device = %uuid, "Device was not occupied");
                }
            }
        }
    }

    /// Workload currently holding `uuid`, if any.
    pub fn occupant(&self, uuid: &str) -> Option<String> {
        self.inner
            .read()
            .expect("poisoned")
            .occupants
            .get(uuid)
            .cloned()
    }

    /// Run `f` while holding the read lock of this host.
    #[cfg(test)]
    pub(super) fn with_read_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.read().expect("poisoned");
        f()
    }

    pub fn free_devices(&self) -> usize {
        let inner = self.inner.read().expect("poisoned");
        inner
            .topology
            .devices
            .iter()
            .filter(|device| !inner.occupants.contains_key(&device.uuid))
            .count()
    }

    /// Interconnect affinity of this host for a workload needing
    /// `topology_demand` co-located devices.
    ///
    /// Power-of-two demands, which includes 0 and 1, are not scored and yield
    /// -1. Demand 1 therefore never reaches a dedicated single-device score;
    /// whether only powers above one were meant to bypass scoring is an open
    /// question, and the bitwise test is kept as is.
    ///
    /// Otherwise every free device contributes the scores of its links to the
    /// devices after it in the matrix, whether those are free or not, and the
    /// sum is divided by the number of free devices.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NoFreeDevices`] if every device is occupied or the
    ///   topology is empty
    pub fn score(&self, topology_demand: i64) -> Result<i64, Report<CacheError>> {
        if topology_demand & topology_demand.wrapping_sub(1) == 0 {
            return Ok(-1);
        }

        let inner = self.inner.read().expect("poisoned");
        let mut total = 0;
        let mut free = 0;
        for (i, device) in inner.topology.devices.iter().enumerate() {
            if inner.occupants.contains_key(&device.uuid) {
                continue;
            }
            free += 1;
            total += device.upper_link_score(i);
        }

        if free == 0 {
            return Err(Report::new(CacheError::NoFreeDevices {
                node: self.name.clone(),
            }));
        }
        Ok(total / free)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::topology::tests::uniform_topology;
    use crate::topology::P2PLinkType;

    const UUIDS: [&str; 4] = ["GPU-0", "GPU-1", "GPU-2", "GPU-3"];

    fn host(link: P2PLinkType) -> HostState {
        HostState::with_topology("node-a", Arc::new(uniform_topology(&UUIDS, link)))
    }

    fn ids(uuids: &[&str]) -> Vec<String> {
        uuids.iter().map(|uuid| uuid.to_string()).collect()
    }

    #[test]
    fn power_of_two_demand_is_not_scored() {
        // 1 is a power of two too, so the single-device case is unreachable.
        let host = host(P2PLinkType::SameBoard);
        for demand in [0, 1, 2, 4, 8, 16, 1024] {
            assert_eq!(host.score(demand).expect("should score"), -1, "demand {demand}");
        }
    }

    #[test]
    fn all_free_devices_average_upper_triangle() {
        // 6 links of score 6 over 4 free devices.
        assert_eq!(host(P2PLinkType::SameBoard).score(3).expect("should score"), 9);
        assert_eq!(host(P2PLinkType::CrossCpu).score(3).expect("should score"), 1);
        assert_eq!(host(P2PLinkType::SixNvLinks).score(5).expect("should score"), 13);
    }

    #[test]
    fn occupied_devices_leave_the_denominator() {
        let host = host(P2PLinkType::SameBoard);
        assert!(host.occupy("w1", &ids(&["GPU-1", "GPU-2", "GPU-3"])));

        // GPU-0 is the only free device and still counts its links to the
        // occupied ones after it.
        assert_eq!(host.free_devices(), 1);
        assert_eq!(host.score(3).expect("should score"), 18);
    }

    #[test]
    fn last_free_device_has_no_higher_neighbor() {
        let host = host(P2PLinkType::SameBoard);
        host.occupy("w1", &ids(&["GPU-0", "GPU-1", "GPU-2"]));

        assert_eq!(host.score(3).expect("should score"), 0);
    }

    #[test]
    fn no_free_devices_is_an_error() {
        let host = host(P2PLinkType::SameBoard);
        host.occupy("w1", &ids(&UUIDS));

        let err = host.score(3).expect_err("fully occupied host is unscorable");
        assert!(matches!(err.current_context(), CacheError::NoFreeDevices { .. }));

        let empty = HostState::new("node-b");
        let err = empty
            .score(3)
            .expect_err("host without topology is unscorable");
        assert!(matches!(err.current_context(), CacheError::NoFreeDevices { .. }));
    }

    #[test]
    fn occupy_then_release_restores_score() {
        let host = host(P2PLinkType::SameBoard);
        let before = host.score(3).expect("should score");

        assert!(host.occupy("w1", &ids(&["GPU-0", "GPU-2"])));
        assert_ne!(host.score(3).expect("should score"), before);

        host.release("w1", &ids(&["GPU-0", "GPU-2"]));
        assert_eq!(host.score(3).expect("should score"), before);
        assert_eq!(host.free_devices(), 4);
    }

    #[test]
    fn occupy_skips_unknown_devices() {
        let host = host(P2PLinkType::SameBoard);

        assert!(!host.occupy("w1", &ids(&["GPU-9"])));
        assert!(host.occupy("w1", &ids(&["GPU-9", "GPU-1"])));
        assert_eq!(host.occupant("GPU-1").as_deref(), Some("w1"));
        assert_eq!(host.occupant("GPU-9"), None);
    }

    #[test]
    fn occupy_twice_reports_no_change() {
        let host = host(P2PLinkType::SameBoard);
        assert!(host.occupy("w1", &ids(&["GPU-0"])));
        assert!(!host.occupy("w1", &ids(&["GPU-0"])));
        assert!(host.occupy("w2", &ids(&["GPU-0"])));
    }

    #[test]
    fn release_unknown_device_is_noop() {
        let host = host(P2PLinkType::SameBoard);
        host.release("w1", &ids(&["GPU-9", "GPU-0"]));
        assert_eq!(host.free_devices(), 4);
    }

    #[test]
    fn release_keeps_devices_taken_over_by_another_workload() {
        let host = host(P2PLinkType::SameBoard);
        host.occupy("w1", &ids(&["GPU-0", "GPU-1"]));
        host.occupy("w2", &ids(&["GPU-0"]));

        host.release("w1", &ids(&["GPU-0", "GPU-1"]));

        assert_eq!(host.occupant("GPU-0").as_deref(), Some("w2"));
        assert_eq!(host.occupant("GPU-1"), None);
        assert_eq!(host.free_devices(), 3);
    }

    #[test]
    fn stale_occupants_survive_topology_replacement() {
        let host = host(P2PLinkType::SameBoard);
        host.occupy("w1", &ids(&["GPU-3"]));

        host.set_topology(Arc::new(uniform_topology(
            &["GPU-0", "GPU-1", "GPU-2"],
            P2PLinkType::SameBoard,
        )));

        assert_eq!(host.occupant("GPU-3").as_deref(), Some("w1"));
        assert_eq!(host.free_devices(), 3);
        assert_eq!(host.topology().len(), 3);
    }

    #[test]
    fn concurrent_occupy_and_release_do_not_lose_updates() {
        let uuids: Vec<String> = (0..64).map(|i| format!("GPU-{i}")).collect();
        let refs: Vec<&str> = uuids.iter().map(String::as_str).collect();
        let host = HostState::with_topology(
            "node-a",
            Arc::new(uniform_topology(&refs, P2PLinkType::SameCpu)),
        );

        thread::scope(|s| {
            for worker in 0..8 {
                let host = &host;
                let owned: Vec<String> = uuids[worker * 8..(worker + 1) * 8].to_vec();
                s.spawn(move || {
                    let workload = format!("w{worker}");
                    for _ in 0..50 {
                        host.occupy(&workload, &owned);
                        let _ = host.score(3);
                        host.release(&workload, &owned[4..]);
                    }
                });
            }
        });

        for (i, uuid) in uuids.iter().enumerate() {
            let expected = (i % 8 < 4).then(|| format!("w{}", i / 8));
            assert_eq!(host.occupant(uuid), expected, "device {uuid}");
        }
        assert_eq!(host.free_devices(), 32);
    }

    #[test]
    fn hosts_are_independent_under_concurrency() {
        let a = host(P2PLinkType::SameBoard);
        let b = host(P2PLinkType::CrossCpu);

        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..200 {
                    a.occupy("wa", &ids(&["GPU-0"]));
                    a.release("wa", &ids(&["GPU-0"]));
                }
            });
            s.spawn(|| {
                for _ in 0..200 {
                    assert_eq!(b.score(3).expect("should score"), 1);
                }
            });
        });

        assert_eq!(a.free_devices(), 4);
    }
}
