use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{DbError, Result};

use super::DiskManager;

/// A disk I/O request. Each request carries its own reply channel.
pub enum DiskRequest {
    Read {
        page_no: u32,
        reply: Sender<Result<Vec<u8>>>,
    },
    Write {
        page_no: u32,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler runs a background worker thread that performs page I/O for
/// one file, fed through a request queue. Dropping the scheduler closes the
/// queue; the worker finishes the requests already queued and exits.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// None once shutdown has begun
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .as_ref()
            .ok_or_else(|| DbError::DiskScheduler("scheduler is shut down".into()))?
            .send(request)
            .map_err(|e| DbError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Reads a page and waits for the result.
    pub fn schedule_read_sync(&self, page_no: u32) -> Result<Vec<u8>> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_no, reply: tx })?;
        Self::wait(rx)
    }

    /// Writes a page and waits until it is durable.
    pub fn schedule_write_sync(&self, page_no: u32, data: Bytes) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_no,
            data,
            reply: tx,
        })?;
        Self::wait(rx)
    }

    fn wait<T>(rx: Receiver<Result<T>>) -> Result<T> {
        rx.recv()
            .map_err(|e| DbError::DiskScheduler(format!("failed to receive completion: {}", e)))?
    }

    fn start_worker_thread(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        // Queued requests are still delivered after the sender is dropped
        while let Ok(request) = receiver.recv() {
            Self::process_request(&disk_manager, request);
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        // A dropped receiver means the requester gave up; nothing to report
        match request {
            DiskRequest::Read { page_no, reply } => {
                let _ = reply.send(disk_manager.read_page(page_no));
            }
            DiskRequest::Write {
                page_no,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_no, &data));
            }
        }
    }

    /// Returns the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
