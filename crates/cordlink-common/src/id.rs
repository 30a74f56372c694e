use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation id generator for one client connection.
///
/// Ids are `req_1`, `req_2`, ... and never repeat for the lifetime of the
/// generator, across reconnects included.
#[derive(Debug, Default)]
pub struct RequestIds {
    seq: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_start_at_one() {
        let ids = RequestIds::new();
        assert_eq!(ids.next_id(), "req_1");
        assert_eq!(ids.next_id(), "req_2");
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let ids = Arc::new(RequestIds::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
