use std::collections::HashSet;

use rand::Rng;

/// Picks a value uniformly in `[start, stop]` while excluding the members of
/// `excluded`, in O(|excluded| log |excluded|) without rejection sampling:
/// draw from the shrunk range `[start, stop - |excluded|]`, then shift the
/// draw past each excluded value in sorted order.
pub fn sample_excluding(start: u16, stop: u16, excluded: &HashSet<u16>) -> u16 {
    let mut sorted: Vec<u16> = excluded.iter().copied().collect();
    sorted.sort_unstable();

    let shrunk_stop = stop - sorted.len() as u16;
    let mut value = rand::rng().random_range(start..=shrunk_stop);

    for &excluded_value in &sorted {
        if value >= excluded_value {
            value += 1;
        }
    }
    value
}

/// Tracks ephemeral ports handed out to server workers so the entry listener
/// never reuses one while its worker is still alive.
pub struct PortAllocator {
    start: u16,
    stop: u16,
    used: HashSet<u16>,
}

impl PortAllocator {
    pub fn new(start: u16, stop: u16) -> Self {
        PortAllocator { start, stop, used: HashSet::new() }
    }

    pub fn allocate(&mut self) -> u16 {
        let port = sample_excluding(self.start, self.stop, &self.used);
        self.used.insert(port);
        port
    }

    pub fn release(&mut self, port: u16) {
        self.used.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_excluding_avoids_excluded_set() {
        let excluded: HashSet<u16> = (49152..49200).collect();
        for _ in 0..500 {
            let v = sample_excluding(49152, 49300, &excluded);
            assert!(!excluded.contains(&v), "{v} should have been excluded");
            assert!((49152..=49300).contains(&v));
        }
    }

    #[test]
    fn sample_excluding_is_roughly_uniform() {
        let excluded = HashSet::new();
        let mut buckets = [0u32; 10];
        for _ in 0..10_000 {
            let v = sample_excluding(0, 9, &excluded);
            buckets[v as usize] += 1;
        }
        for count in buckets {
            assert!((700..1300).contains(&count), "bucket count {count} looks non-uniform");
        }
    }

    #[test]
    fn allocator_never_hands_out_a_live_port_twice() {
        let mut allocator = PortAllocator::new(49152, 49200);
        let mut seen = HashSet::new();
        for _ in 0..40 {
            let port = allocator.allocate();
            assert!(seen.insert(port), "port {port} handed out twice while still live");
        }
    }
}
