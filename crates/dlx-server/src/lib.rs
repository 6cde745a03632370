//! Concurrent TCP server for DLX problems.
//!
//! Two loopback listeners: the request port accepts DLXB problem streams
//! (multiple concatenated problems per connection allowed), the solution
//! port serves DLXS frames to any number of subscribers. Four long-lived
//! threads (request-accept, solution-accept, problem worker, and output
//! broadcaster) communicate through two Condvar-backed queues, plus one
//! short-lived intake thread per inbound problem connection.
//!
//! Per problem, every subscriber sees one DLXS header, the solution rows in
//! engine emission order, then the `{0, 0}` sentinel; the same socket is
//! reused across successive problems. A failed subscriber write removes
//! that subscriber only.

use std::collections::VecDeque;
use std::io::BufReader;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use dlx_codec::SolutionStreamWriter;
use dlx_engine::{CoverMatrix, SolutionSink, SolutionView, Solver};
use dlx_error::{DlxError, Result};
use dlx_types::{Problem, SolutionHeader};

/// Listener configuration. A port of 0 binds an ephemeral port; the
/// effective port is observable after `start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConfig {
    pub request_port: u16,
    pub solution_port: u16,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Relaxed atomic counters for server activity. Stale reads are fine; torn
/// values are not possible.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub problems_received: AtomicU64,
    pub problems_solved: AtomicU64,
    pub problems_aborted: AtomicU64,
    pub rows_broadcast: AtomicU64,
    pub subscribers_joined: AtomicU64,
    pub subscribers_dropped: AtomicU64,
}

impl ServerMetrics {
    /// Read a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            problems_received: self.problems_received.load(Ordering::Relaxed),
            problems_solved: self.problems_solved.load(Ordering::Relaxed),
            problems_aborted: self.problems_aborted.load(Ordering::Relaxed),
            rows_broadcast: self.rows_broadcast.load(Ordering::Relaxed),
            subscribers_joined: self.subscribers_joined.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of [`ServerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerMetricsSnapshot {
    pub problems_received: u64,
    pub problems_solved: u64,
    pub problems_aborted: u64,
    pub rows_broadcast: u64,
    pub subscribers_joined: u64,
    pub subscribers_dropped: u64,
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// Mutex-protected deque with a condition variable. `pop` blocks until an
/// item arrives or shutdown is signaled.
struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> TaskQueue<T> {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    fn push(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    fn pop(&self, shutdown: &AtomicBool) -> Option<T> {
        let mut items = self.items.lock();
        loop {
            if shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            self.available.wait(&mut items);
        }
    }

    fn wake_all(&self) {
        self.available.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Subscribers and events
// ---------------------------------------------------------------------------

struct Subscriber {
    writer: SolutionStreamWriter<TcpStream>,
    header_sent: bool,
    failed: bool,
}

struct SubscriberSet {
    clients: Vec<Subscriber>,
    /// Column count of the problem currently in flight, if any. A
    /// subscriber joining while this is set receives a fresh header
    /// immediately, under the same lock used by row broadcasts.
    active_column_count: Option<u32>,
}

enum SolutionEvent {
    Begin { column_count: u32 },
    Row { row_ids: Vec<u32> },
    End,
}

struct ServerShared {
    shutdown: AtomicBool,
    request_port: u16,
    solution_port: u16,
    problem_queue: TaskQueue<Problem>,
    event_queue: TaskQueue<SolutionEvent>,
    subscribers: Mutex<SubscriberSet>,
    metrics: ServerMetrics,
}

impl ServerShared {
    fn begin_solution_stream(&self, column_count: u32) {
        let mut set = self.subscribers.lock();
        set.active_column_count = Some(column_count);
        let header = SolutionHeader::new(column_count);
        for client in &mut set.clients {
            if client.writer.start(&header).is_err() {
                client.failed = true;
            } else {
                client.header_sent = true;
            }
        }
        self.purge_failed(&mut set);
    }

    fn broadcast_row(&self, row_ids: &[u32]) {
        if row_ids.is_empty() {
            return;
        }
        let mut set = self.subscribers.lock();
        for client in &mut set.clients {
            if !client.header_sent {
                continue;
            }
            if client.writer.write_row(row_ids).is_err() {
                client.failed = true;
            }
        }
        self.purge_failed(&mut set);
        self.metrics.rows_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_solution_stream(&self) {
        let mut set = self.subscribers.lock();
        set.active_column_count = None;
        for client in &mut set.clients {
            if !client.header_sent {
                continue;
            }
            if client.writer.finish().is_err() {
                client.failed = true;
            }
            client.header_sent = false;
        }
        self.purge_failed(&mut set);
    }

    /// Marked-for-removal subscribers are purged at the end of the current
    /// broadcast; the caller holds the set lock.
    fn purge_failed(&self, set: &mut SubscriberSet) {
        let before = set.clients.len();
        set.clients.retain(|client| !client.failed);
        let dropped = before - set.clients.len();
        if dropped > 0 {
            self.metrics
                .subscribers_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::debug!(target: "dlx::server", dropped, "subscribers removed");
        }
    }
}

/// Sink installed by the worker: forwards each solution as a `Row` event.
struct EventSink<'a> {
    shared: &'a ServerShared,
}

impl SolutionSink for EventSink<'_> {
    fn on_solution(&mut self, view: &SolutionView<'_>) {
        if view.row_ids.is_empty() {
            return;
        }
        self.shared.event_queue.push(SolutionEvent::Row {
            row_ids: view.row_ids.to_vec(),
        });
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The running server. Dropping it stops and joins every thread.
pub struct DlxTcpServer {
    shared: Arc<ServerShared>,
    threads: Vec<JoinHandle<()>>,
}

impl DlxTcpServer {
    /// Bind both loopback listeners and launch the four long-lived threads.
    pub fn start(config: ServerConfig) -> Result<Self> {
        let request_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, config.request_port))?;
        let solution_listener = TcpListener::bind((Ipv4Addr::LOCALHOST, config.solution_port))?;
        let request_port = request_listener.local_addr()?.port();
        let solution_port = solution_listener.local_addr()?.port();

        let shared = Arc::new(ServerShared {
            shutdown: AtomicBool::new(false),
            request_port,
            solution_port,
            problem_queue: TaskQueue::new(),
            event_queue: TaskQueue::new(),
            subscribers: Mutex::new(SubscriberSet {
                clients: Vec::new(),
                active_column_count: None,
            }),
            metrics: ServerMetrics::default(),
        });

        tracing::info!(
            target: "dlx::server",
            request_port,
            solution_port,
            "server listening"
        );

        let mut threads = Vec::with_capacity(4);
        {
            let shared = Arc::clone(&shared);
            threads.push(std::thread::spawn(move || {
                accept_request_loop(&shared, &request_listener);
            }));
        }
        {
            let shared = Arc::clone(&shared);
            threads.push(std::thread::spawn(move || {
                accept_solution_loop(&shared, &solution_listener);
            }));
        }
        {
            let shared = Arc::clone(&shared);
            threads.push(std::thread::spawn(move || process_problem_queue(&shared)));
        }
        {
            let shared = Arc::clone(&shared);
            threads.push(std::thread::spawn(move || process_solution_queue(&shared)));
        }

        Ok(Self { shared, threads })
    }

    /// Effective request-port after binding.
    #[must_use]
    pub fn request_port(&self) -> u16 {
        self.shared.request_port
    }

    /// Effective solution-port after binding.
    #[must_use]
    pub fn solution_port(&self) -> u16 {
        self.shared.solution_port
    }

    /// Point-in-time activity counters.
    #[must_use]
    pub fn metrics(&self) -> ServerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Idempotent shutdown: wakes both accept loops and both queue waiters,
    /// then drops every subscriber. Nothing is drained.
    pub fn stop(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(target: "dlx::server", "server stopping");

        // Accept loops block in accept(); a throwaway loopback connection
        // wakes each so it can observe the flag and drop its listener.
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.shared.request_port));
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.shared.solution_port));

        self.shared.problem_queue.wake_all();
        self.shared.event_queue.wake_all();

        let mut set = self.shared.subscribers.lock();
        set.active_column_count = None;
        set.clients.clear();
    }

    /// Join all long-lived threads. Blocks until the loops end.
    pub fn wait(&mut self) {
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for DlxTcpServer {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn accept_request_loop(shared: &Arc<ServerShared>, listener: &TcpListener) {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let shared = Arc::clone(shared);
                std::thread::spawn(move || process_problem_connection(&shared, stream));
            }
            Err(_) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }
}

/// Per-connection intake: decode consecutive DLXB frames until the peer
/// closes. A format error drops this connection but keeps the server up.
fn process_problem_connection(shared: &ServerShared, stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    loop {
        match dlx_codec::read_problem(&mut reader) {
            Ok(problem) => {
                shared
                    .metrics
                    .problems_received
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "dlx::server",
                    columns = problem.header.column_count,
                    rows = problem.rows.len(),
                    "problem enqueued"
                );
                shared.problem_queue.push(problem);
            }
            // Clean EOF at a frame boundary: the peer is done.
            Err(DlxError::ShortRead { actual: 0, .. }) => break,
            Err(error) => {
                tracing::warn!(
                    target: "dlx::server",
                    %error,
                    "dropping problem connection"
                );
                break;
            }
        }
    }
}

fn accept_solution_loop(shared: &Arc<ServerShared>, listener: &TcpListener) {
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let _ = stream.set_nodelay(true);
                let mut client = Subscriber {
                    writer: SolutionStreamWriter::new(stream),
                    header_sent: false,
                    failed: false,
                };

                let mut set = shared.subscribers.lock();
                // Joining mid-problem: send this problem's header now, in
                // the same critical section row broadcasts use, so the
                // newcomer participates from the next row.
                if let Some(column_count) = set.active_column_count {
                    if client.writer.start(&SolutionHeader::new(column_count)).is_ok() {
                        client.header_sent = true;
                    } else {
                        client.failed = true;
                    }
                }
                if !client.failed {
                    set.clients.push(client);
                    shared
                        .metrics
                        .subscribers_joined
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
        }
    }
}

/// Worker: pop problems FIFO, solve one at a time, bracket each with
/// `Begin`/`End` events. A build failure aborts the problem (no `Begin`).
fn process_problem_queue(shared: &Arc<ServerShared>) {
    while let Some(problem) = shared.problem_queue.pop(&shared.shutdown) {
        let matrix = match CoverMatrix::build(&problem) {
            Ok(matrix) => matrix,
            Err(error) => {
                shared
                    .metrics
                    .problems_aborted
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "dlx::server", %error, "problem aborted");
                continue;
            }
        };

        let column_count = matrix.column_count() as u32;
        shared
            .event_queue
            .push(SolutionEvent::Begin { column_count });

        let mut solver = Solver::new(matrix);
        let mut sink = EventSink {
            shared: shared.as_ref(),
        };
        solver.solve(&mut sink);

        shared
            .metrics
            .problems_solved
            .fetch_add(1, Ordering::Relaxed);
        shared.event_queue.push(SolutionEvent::End);
    }
}

/// Broadcaster: consume events in order and fan them out.
fn process_solution_queue(shared: &Arc<ServerShared>) {
    while let Some(event) = shared.event_queue.pop(&shared.shutdown) {
        match event {
            SolutionEvent::Begin { column_count } => shared.begin_solution_stream(column_count),
            SolutionEvent::Row { row_ids } => shared.broadcast_row(&row_ids),
            SolutionEvent::End => shared.finish_solution_stream(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_delivers_fifo() {
        let queue = TaskQueue::new();
        let shutdown = AtomicBool::new(false);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(&shutdown), Some(1));
        assert_eq!(queue.pop(&shutdown), Some(2));
        assert_eq!(queue.pop(&shutdown), Some(3));
    }

    #[test]
    fn queue_pop_observes_shutdown() {
        let queue: TaskQueue<u32> = TaskQueue::new();
        let shutdown = AtomicBool::new(true);
        assert_eq!(queue.pop(&shutdown), None);
    }

    #[test]
    fn queue_wakes_blocked_popper_on_shutdown() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let popper = {
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || queue.pop(&shutdown))
        };

        std::thread::sleep(std::time::Duration::from_millis(50));
        shutdown.store(true, Ordering::Release);
        queue.wake_all();
        assert_eq!(popper.join().unwrap(), None);
    }

    #[test]
    fn metrics_snapshot_counts() {
        let metrics = ServerMetrics::default();
        metrics.problems_received.fetch_add(2, Ordering::Relaxed);
        metrics.rows_broadcast.fetch_add(5, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.problems_received, 2);
        assert_eq!(snapshot.rows_broadcast, 5);
        assert_eq!(snapshot.subscribers_dropped, 0);
    }
}
