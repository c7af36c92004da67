//! Point-to-point and collective messaging abstraction for L6. Production
//! deployments back this with MPI; `InProcessTransport` backs it with a
//! shared mailbox for same-process multi-rank tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::MeshResult;

/// Reserved phase id for `all_gather`'s internal send/recv pairs, distinct
/// from any caller-chosen phase so an interleaved exchange can't collide
/// with it.
const ALL_GATHER_PHASE: u32 = 0;

pub trait Transport: Send + Sync {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;
    fn send(&self, to: i32, phase: u32, data: Vec<u8>) -> MeshResult<()>;
    fn recv(&self, from: i32, phase: u32) -> MeshResult<Vec<u8>>;

    /// Gather one buffer per rank (including the caller's own), ordered by rank.
    fn all_gather(&self, data: Vec<u8>) -> MeshResult<Vec<Vec<u8>>> {
        for to in 0..self.size() {
            if to != self.rank() {
                self.send(to, ALL_GATHER_PHASE, data.clone())?;
            }
        }
        let mut out = vec![Vec::new(); self.size() as usize];
        out[self.rank() as usize] = data;
        for from in 0..self.size() {
            if from != self.rank() {
                out[from as usize] = self.recv(from, ALL_GATHER_PHASE)?;
            }
        }
        Ok(out)
    }
}

type Mailbox = Mutex<HashMap<(i32, i32, u32), VecDeque<Vec<u8>>>>;

/// Linked transport handles sharing one mailbox, one per simulated rank.
/// Each rank is expected to drive its handle from its own OS thread; `recv`
/// blocks on a condvar until the matching `send` arrives, the same
/// synchronous rendezvous a blocking MPI call provides.
pub struct InProcessTransport {
    rank: i32,
    size: i32,
    mailbox: Arc<Mailbox>,
    signal: Arc<Condvar>,
}

impl InProcessTransport {
    pub fn new_cluster(size: i32) -> Vec<InProcessTransport> {
        let mailbox = Arc::new(Mutex::new(HashMap::new()));
        let signal = Arc::new(Condvar::new());
        (0..size).map(|rank| InProcessTransport { rank, size, mailbox: mailbox.clone(), signal: signal.clone() }).collect()
    }
}

impl Transport for InProcessTransport {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn send(&self, to: i32, phase: u32, data: Vec<u8>) -> MeshResult<()> {
        let mut mailbox = self.mailbox.lock();
        mailbox.entry((self.rank, to, phase)).or_default().push_back(data);
        self.signal.notify_all();
        Ok(())
    }

    fn recv(&self, from: i32, phase: u32) -> MeshResult<Vec<u8>> {
        let mut mailbox = self.mailbox.lock();
        loop {
            if let Some(msg) = mailbox.get_mut(&(from, self.rank, phase)).and_then(VecDeque::pop_front) {
                return Ok(msg);
            }
            self.signal.wait(&mut mailbox);
        }
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;
    use std::thread;

    #[test]
    fn send_then_recv_round_trips_within_one_thread() {
        let mut cluster = InProcessTransport::new_cluster(2);
        let r1 = cluster.pop().unwrap();
        let r0 = cluster.pop().unwrap();
        r0.send(1, 7, vec![1, 2, 3]).unwrap();
        assert_eq!(r1.recv(0, 7).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn recv_blocks_until_peer_thread_sends() {
        let mut cluster = InProcessTransport::new_cluster(2);
        let r1 = cluster.pop().unwrap();
        let r0 = cluster.pop().unwrap();
        let handle = thread::spawn(move || r1.recv(0, 3).unwrap());
        thread::sleep(std::time::Duration::from_millis(20));
        r0.send(1, 3, vec![9]).unwrap();
        assert_eq!(handle.join().unwrap(), vec![9]);
    }

    #[test]
    fn all_gather_collects_every_rank_in_order() {
        let cluster = InProcessTransport::new_cluster(3);
        let handles: Vec<_> = cluster
            .into_iter()
            .map(|t| thread::spawn(move || t.all_gather(vec![t.rank() as u8]).unwrap()))
            .collect();
        for h in handles {
            let gathered = h.join().unwrap();
            assert_eq!(gathered, vec![vec![0], vec![1], vec![2]]);
        }
    }
}
