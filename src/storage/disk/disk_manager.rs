use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::Result;

/// DiskManager reads and writes fixed-size pages of a single file.
/// Page `n` lives at byte offset `n * page_size`.
pub struct DiskManager {
    /// The backing file
    file: Mutex<File>,
    /// Path to the backing file
    path: PathBuf,
    /// Page size in bytes
    page_size: usize,
    /// Number of whole pages in the file
    num_pages: AtomicU32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the file at `path`, creating it if it doesn't exist.
    /// A trailing partial page is not counted.
    pub fn new<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / page_size as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads up to one page starting at the page's offset.
    /// The result is shorter than `page_size` if the file ends early.
    pub fn read_page(&self, page_no: u32) -> Result<Vec<u8>> {
        let offset = page_no as u64 * self.page_size as u64;
        let mut data = vec![0u8; self.page_size];

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < data.len() {
            match file.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        data.truncate(filled);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    /// Writes one page and flushes it to stable storage before returning.
    pub fn write_page(&self, page_no: u32, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        self.write_locked(&mut file, page_no, data)?;

        // Writing past the end grows the file
        self.num_pages.fetch_max(page_no + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Appends a zeroed page to the file and returns its page number.
    /// The page count only advances once the zeros are on disk.
    pub fn allocate_page(&self) -> Result<u32> {
        let mut file = self.file.lock();
        let page_no = self.num_pages.load(Ordering::SeqCst);

        let zeros = vec![0u8; self.page_size];
        self.write_locked(&mut file, page_no, &zeros)?;

        self.num_pages.store(page_no + 1, Ordering::SeqCst);
        Ok(page_no)
    }

    fn write_locked(&self, file: &mut File, page_no: u32, data: &[u8]) -> Result<()> {
        let offset = page_no as u64 * self.page_size as u64;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        file.sync_data()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the number of whole pages in the file.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Returns the page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}
