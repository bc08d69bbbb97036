// Fixed-size worker pool and per-step work partitioning
//
// The pool is created once at orchestrator construction and torn down at
// destruction; no dynamic resizing. Its task queue is the only
// lock-protected structure touched during stepping: each worker task reads
// the shared read buffer and writes only vertex indices assigned
// exclusively to it, so cell data itself needs no locks.

use crate::params::{ParamPartition, ReactionParams};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    jobs: VecDeque<Job>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

/// Fixed pool of OS worker threads with a mutex + condvar task queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// `size` of zero selects the hardware concurrency.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            size
        };

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let workers = (0..size)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("morphsim-worker-{}", i))
                    .spawn(move || worker_loop(shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        log::debug!("thread pool started with {} workers", size);
        Self { shared, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    fn submit(&self, job: Job) {
        let mut state = self.shared.queue.lock().unwrap();
        state.jobs.push_back(job);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Fork-join dispatch: run the closures submitted through the scope and
    /// block until every one of them has completed. Borrowed data outlives
    /// the call, so tasks may capture references into the caller's frame.
    pub fn scope<'scope, F>(&self, f: F)
    where
        F: FnOnce(&Scope<'_, 'scope>),
    {
        let scope = Scope {
            pool: self,
            wait: WaitGroup::new(),
            _marker: PhantomData,
        };
        f(&scope);
        // The barrier wait happens in Scope's Drop, which also runs when
        // `f` unwinds, so submitted tasks never outlive the caller's frame.
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.queue.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.available.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.queue.lock().unwrap();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = shared.available.wait(state).unwrap();
            }
        };
        // The wait-group signal lives in a drop guard inside the job, so a
        // panicking task still signals; catching the unwind here keeps the
        // worker alive for the next task.
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
            log::error!("worker task panicked");
        }
    }
}

/// Handle for submitting borrowed tasks inside `ThreadPool::scope`.
pub struct Scope<'pool, 'scope> {
    pool: &'pool ThreadPool,
    wait: WaitGroup,
    _marker: PhantomData<&'scope mut &'scope ()>,
}

impl<'pool, 'scope> Scope<'pool, 'scope> {
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        self.wait.add(1);
        let signal = DoneGuard(self.wait.clone());
        let job: Box<dyn FnOnce() + Send + 'scope> = Box::new(move || {
            let _signal = signal;
            job();
        });
        // Erase the scope lifetime. Sound because dropping the scope blocks
        // on the wait group (including during unwinding), so every borrow
        // captured by the job outlives its execution, and the guard signals
        // completion even when the job panics.
        let job: Job = unsafe { std::mem::transmute(job) };
        self.pool.submit(job);
    }
}

impl Drop for Scope<'_, '_> {
    fn drop(&mut self) {
        self.wait.wait();
    }
}

// Signals the wait group when dropped, panicking task or not.
struct DoneGuard(WaitGroup);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Counter + condvar barrier for fork-join completion.
#[derive(Clone)]
pub struct WaitGroup {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    pub fn add(&self, n: usize) {
        *self.inner.0.lock().unwrap() += n;
    }

    pub fn done(&self) {
        let mut count = self.inner.0.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.inner.1.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.inner.0.lock().unwrap();
        while *count > 0 {
            count = self.inner.1.wait(count).unwrap();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsynchronized writer into the step's write buffer. Safe to share across
/// workers because the work partition assigns every vertex index to exactly
/// one worker.
pub struct CellWriter {
    ptr: *mut f64,
    len: usize,
}

unsafe impl Send for CellWriter {}
unsafe impl Sync for CellWriter {}

impl CellWriter {
    pub fn new(buffer: &mut [f64]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
        }
    }

    /// # Safety
    /// Callers must write disjoint index sets from different threads.
    #[inline]
    pub unsafe fn write(&self, index: usize, value: f64) {
        debug_assert!(index < self.len);
        *self.ptr.add(index) = value;
    }
}

/// One (parameter set, index subset) assignment within a worker's list.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub params: ReactionParams,
    pub indices: Vec<u32>,
}

/// Ordered work list for one worker.
pub type ThreadWork = Vec<WorkItem>;

/// Rebuild the per-worker work lists: vertex indices are consumed from the
/// parameter partition in order and packed into `ceil(n / workers)`-sized
/// chunks, splitting a partition entry across chunk boundaries when needed.
///
/// Invariant (debug-checked): every vertex index appears in exactly one
/// worker's list and the union covers [0, vertex_count).
pub fn compute_thread_work(
    partition: &ParamPartition,
    vertex_count: usize,
    workers: usize,
) -> Vec<ThreadWork> {
    let workers = workers.max(1);
    let mut out: Vec<ThreadWork> = vec![Vec::new(); workers];
    if vertex_count == 0 {
        return out;
    }

    let budget = vertex_count.div_ceil(workers);
    let mut worker = 0;
    let mut remaining = budget;

    for region in &partition.regions {
        let mut offset = 0;
        while offset < region.indices.len() {
            if remaining == 0 {
                worker += 1;
                remaining = budget;
            }
            let take = remaining.min(region.indices.len() - offset);
            out[worker].push(WorkItem {
                params: region.params,
                indices: region.indices[offset..offset + take].to_vec(),
            });
            offset += take;
            remaining -= take;
        }
    }

    if cfg!(debug_assertions) {
        let mut seen = vec![false; vertex_count];
        for work in &out {
            for item in work {
                for &i in &item.indices {
                    assert!(!seen[i as usize], "vertex {} assigned twice", i);
                    seen[i as usize] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s), "work lists do not cover all vertices");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamOverrides, ReactionParams};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_runs_scoped_tasks() {
        let pool = ThreadPool::new(4);
        let counter = AtomicUsize::new(0);

        pool.scope(|scope| {
            for _ in 0..32 {
                scope.execute(|| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_scoped_tasks_borrow_and_complete_before_return() {
        let pool = ThreadPool::new(2);
        let mut data = vec![0u64; 100];

        {
            let chunks: Vec<&mut [u64]> = data.chunks_mut(25).collect();
            pool.scope(|scope| {
                for chunk in chunks {
                    scope.execute(move || {
                        for x in chunk.iter_mut() {
                            *x = 7;
                        }
                    });
                }
            });
        }

        assert!(data.iter().all(|&x| x == 7));
    }

    #[test]
    fn test_panicking_task_neither_hangs_scope_nor_kills_workers() {
        let pool = ThreadPool::new(2);
        let counter = AtomicUsize::new(0);

        pool.scope(|scope| {
            scope.execute(|| panic!("task failure"));
            for _ in 0..8 {
                scope.execute(|| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 8);

        // Workers survive the panic and serve later scopes
        pool.scope(|scope| {
            scope.execute(|| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_unwinding_caller_still_joins_submitted_tasks() {
        let pool = ThreadPool::new(2);
        let data = std::sync::Mutex::new(vec![0u8; 64]);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.scope(|scope| {
                scope.execute(|| {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    data.lock().unwrap().fill(1);
                });
                panic!("caller failure");
            });
        }));
        assert!(result.is_err());

        // The borrowed task ran to completion before the scope unwound
        assert!(data.lock().unwrap().iter().all(|&b| b == 1));
    }

    #[test]
    fn test_thread_work_is_perfect_cover() {
        let mut partition = ParamPartition::new(ReactionParams::default(), 103);
        partition.update_params(
            &[5, 6, 7, 50, 51, 99],
            &ParamOverrides {
                feed: Some(0.02),
                ..Default::default()
            },
        );

        for workers in [1, 2, 3, 4, 7] {
            let work = compute_thread_work(&partition, 103, workers);
            assert_eq!(work.len(), workers);

            let mut seen = vec![false; 103];
            for list in &work {
                for item in list {
                    for &i in &item.indices {
                        assert!(!seen[i as usize]);
                        seen[i as usize] = true;
                    }
                }
            }
            assert!(seen.iter().all(|&s| s));

            // Chunks are balanced: no worker exceeds the ceil budget
            let budget = 103usize.div_ceil(workers);
            for list in &work {
                let n: usize = list.iter().map(|i| i.indices.len()).sum();
                assert!(n <= budget);
            }
        }
    }

    #[test]
    fn test_thread_work_splits_region_across_workers() {
        let partition = ParamPartition::new(ReactionParams::default(), 10);
        let work = compute_thread_work(&partition, 10, 3);
        // ceil(10/3) = 4: the single region splits into chunks of 4, 4, 2
        let sizes: Vec<usize> = work
            .iter()
            .map(|l| l.iter().map(|i| i.indices.len()).sum())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_empty_vertex_range() {
        let partition = ParamPartition::new(ReactionParams::default(), 0);
        let work = compute_thread_work(&partition, 0, 4);
        assert!(work.iter().all(|l| l.is_empty()));
    }
}
