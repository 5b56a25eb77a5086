use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads draining one unbounded job queue.
/// Dropping the pool closes the queue and joins the workers.
pub struct TaskPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(workers: usize, name_prefix: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let shared_rx: Arc<Mutex<Receiver<Job>>> = Arc::new(Mutex::new(rx));
        let mut handles = Vec::new();
        for idx in 0..workers.max(1) {
            let worker_rx = Arc::clone(&shared_rx);
            let name = format!("{name_prefix}-{idx}");
            let spawned = thread::Builder::new().name(name).spawn(move || {
                loop {
                    let job = {
                        let guard = match worker_rx.lock() {
                            Ok(guard) => guard,
                            Err(_) => break,
                        };
                        match guard.recv() {
                            Ok(job) => job,
                            Err(_) => break,
                        }
                    };
                    job();
                }
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => glue_rt::log::error(&format!("failed to spawn worker: {err}")),
            }
        }
        Self {
            tx: Some(tx),
            workers: handles,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(job));
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, mpsc};
    use std::time::Duration;

    use super::TaskPool;

    #[test]
    fn runs_multiple_jobs_concurrently() {
        let pool = TaskPool::new(2, "glue-worker-test");
        let barrier = Arc::new(Barrier::new(3));
        let (tx, rx) = mpsc::channel::<String>();

        for name in ["a", "b"] {
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            pool.submit(move || {
                let _ = tx.send(format!("start:{name}"));
                barrier.wait();
                let _ = tx.send(format!("done:{name}"));
            });
        }

        let mut started = HashSet::new();
        while started.len() < 2 {
            let msg = rx
                .recv_timeout(Duration::from_secs(2))
                .expect("expected both jobs to start");
            if let Some(name) = msg.strip_prefix("start:") {
                started.insert(name.to_string());
            }
        }

        barrier.wait();

        let mut finished = HashSet::new();
        while finished.len() < 2 {
            let msg = rx
                .recv_timeout(Duration::from_secs(2))
                .expect("expected both jobs to finish");
            if let Some(name) = msg.strip_prefix("done:") {
                finished.insert(name.to_string());
            }
        }
        assert_eq!(finished.len(), 2, "expected two distinct finished jobs");
    }

    #[test]
    fn drop_drains_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = TaskPool::new(1, "glue-worker-drain");
            assert_eq!(pool.size(), 1);
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn workers_carry_the_name_prefix() {
        let pool = TaskPool::new(1, "glue-worker");
        let (tx, rx) = mpsc::channel();
        pool.submit(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        });
        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("glue-worker-0"));
    }
}
