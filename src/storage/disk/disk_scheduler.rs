use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, StratumError, PAGE_SIZE};

use super::DiskManager;

/// A single disk I/O request handed to the worker thread.
pub struct DiskRequest {
    /// Write (true) or read (false)
    pub is_write: bool,
    pub page_id: PageId,
    /// Buffer of PAGE_SIZE bytes: destination for reads, source for writes.
    pub data: *mut u8,
    /// Completion signal
    pub callback: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: the request is consumed by the worker thread only, and the
// sync wrappers below keep the buffer alive until completion is signalled.
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            callback: None,
        }
    }

    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: std::sync::mpsc::Sender<bool>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// DiskScheduler owns a background worker thread that drains a bounded
/// request queue and performs the actual block I/O. The buffer pool routes
/// all its reads and writes through the synchronous wrappers.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let shutdown_flag = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm, receiver, shutdown_flag);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| StratumError::DiskScheduler(format!("failed to schedule request: {}", e)))
    }

    /// Schedules a read and blocks until the worker completes it.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        let request = DiskRequest::read(page_id, data.as_mut_ptr()).with_callback(tx);
        self.schedule(request)?;

        let ok = rx
            .recv()
            .map_err(|e| StratumError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(StratumError::DiskScheduler(format!(
                "read of {} failed",
                page_id
            )));
        }
        Ok(())
    }

    /// Schedules a write and blocks until the worker completes it.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // The worker only reads through the pointer for writes.
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_callback(tx);
        self.schedule(request)?;

        let ok = rx
            .recv()
            .map_err(|e| StratumError::DiskScheduler(format!("completion lost: {}", e)))?;
        if !ok {
            return Err(StratumError::DiskScheduler(format!(
                "write of {} failed",
                page_id
            )));
        }
        Ok(())
    }

    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain what is already queued before exiting.
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let success = if request.is_write {
            // Safety: the scheduling side keeps the buffer alive until the
            // completion callback fires.
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data).is_ok()
        } else {
            // Safety: as above.
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data).is_ok()
        };

        if let Some(callback) = request.callback {
            let _ = callback.send(success);
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = PageId::new(0);
        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_multiple_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let data1 = [1u8; PAGE_SIZE];
        let data2 = [2u8; PAGE_SIZE];
        scheduler.schedule_write_sync(PageId::new(0), &data1).unwrap();
        scheduler.schedule_write_sync(PageId::new(1), &data2).unwrap();

        let mut read1 = [0u8; PAGE_SIZE];
        let mut read2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(PageId::new(0), &mut read1).unwrap();
        scheduler.schedule_read_sync(PageId::new(1), &mut read2).unwrap();

        assert_eq!(read1[0], 1);
        assert_eq!(read2[0], 2);
    }
}
