//! Disk Manager - durable page I/O behind the buffer pool.
//!
//! The [`DiskManager`] trait is everything the buffer pool needs from
//! storage: read a block, write a block, extend an object by one block.
//! [`FileDiskManager`] implements it over plain files.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::common::{BufferTag, Error, Result};

/// Storage collaborator of the buffer pool.
///
/// Implementations must be callable from many threads at once; the pool
/// never holds its own metadata lock while calling into the disk manager.
///
/// Errors are reported with the offending tag (`Error::Io`,
/// `Error::PageNotFound`).
pub trait DiskManager: Send + Sync {
    /// Size of every block this manager stores.
    fn page_size(&self) -> u16;

    /// Read block `tag` into `buf` (exactly `page_size` bytes).
    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()>;

    /// Write `data` (exactly `page_size` bytes) to block `tag`.
    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()>;

    /// Extend `object_id` by one zeroed block and return its tag.
    fn allocate_page(&self, object_id: u32) -> Result<BufferTag>;
}

/// One open object file plus its length in blocks.
struct ObjectFile {
    file: File,
    block_count: u32,
}

/// Stores each database object in its own file inside a directory.
///
/// # File Layout
/// Object `oid` lives in `<dir>/<oid>.dat`, blocks laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │
/// └─────────┴─────────┴─────────┴─────────┘
/// Offset:  0     P       2P       ...
/// ```
/// where `P` is the page size. Block `b` is at offset `b × P`.
///
/// # Thread Safety
/// Files are opened lazily and kept behind a single mutex, so I/O through
/// one `FileDiskManager` is serialised.
///
/// # Durability
/// All writes are followed by `fsync()`.
pub struct FileDiskManager {
    dir: PathBuf,
    page_size: u16,
    files: Mutex<HashMap<u32, ObjectFile>>,
}

impl FileDiskManager {
    /// Create a new, empty data directory.
    ///
    /// # Errors
    /// Returns an error if the directory already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(dir: P, page_size: u16) -> Result<Self> {
        fs::create_dir(dir.as_ref())?;
        Ok(Self::with_dir(dir.as_ref(), page_size))
    }

    /// Open an existing data directory.
    ///
    /// # Errors
    /// Returns an error if the directory doesn't exist.
    pub fn open<P: AsRef<Path>>(dir: P, page_size: u16) -> Result<Self> {
        let metadata = fs::metadata(dir.as_ref())?;
        if !metadata.is_dir() {
            return Err(Error::Fs(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", dir.as_ref().display()),
            )));
        }
        Ok(Self::with_dir(dir.as_ref(), page_size))
    }

    /// Open an existing data directory, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(dir: P, page_size: u16) -> Result<Self> {
        if dir.as_ref().exists() {
            Self::open(dir, page_size)
        } else {
            Self::create(dir, page_size)
        }
    }

    fn with_dir(dir: &Path, page_size: u16) -> Self {
        Self {
            dir: dir.to_path_buf(),
            page_size,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the file backing `object_id`.
    pub fn object_path(&self, object_id: u32) -> PathBuf {
        self.dir.join(format!("{}.dat", object_id))
    }

    /// Number of blocks currently allocated for `object_id`.
    pub fn block_count(&self, object_id: u32) -> Result<u32> {
        let mut files = self.files.lock();
        let tag = BufferTag::new(object_id, 0);
        Ok(self.object_file(&mut files, tag)?.block_count)
    }

    /// Get (opening if needed) the file for `tag.object_id`.
    fn object_file<'a>(
        &self,
        files: &'a mut HashMap<u32, ObjectFile>,
        tag: BufferTag,
    ) -> Result<&'a mut ObjectFile> {
        use std::collections::hash_map::Entry;

        match files.entry(tag.object_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(self.object_path(tag.object_id))
                    .map_err(|e| Error::io(tag, e))?;
                let len = file.metadata().map_err(|e| Error::io(tag, e))?.len();
                let block_count = (len / self.page_size as u64) as u32;
                Ok(entry.insert(ObjectFile { file, block_count }))
            }
        }
    }

    #[inline]
    fn offset_of(&self, tag: BufferTag) -> u64 {
        (tag.block_number as u64) * (self.page_size as u64)
    }
}

impl DiskManager for FileDiskManager {
    fn page_size(&self) -> u16 {
        self.page_size
    }

    fn read_page(&self, tag: BufferTag, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), self.page_size as usize, "read buffer size");

        let mut files = self.files.lock();
        let object = self.object_file(&mut files, tag)?;
        if tag.block_number >= object.block_count {
            return Err(Error::PageNotFound(tag));
        }

        let offset = self.offset_of(tag);
        object
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| object.file.read_exact(buf))
            .map_err(|e| Error::io(tag, e))
    }

    fn write_page(&self, tag: BufferTag, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size as usize, "write buffer size");

        let mut files = self.files.lock();
        let object = self.object_file(&mut files, tag)?;
        if tag.block_number >= object.block_count {
            return Err(Error::PageNotFound(tag));
        }

        let offset = self.offset_of(tag);
        object
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| object.file.write_all(data))
            .and_then(|_| object.file.sync_all())
            .map_err(|e| Error::io(tag, e))
    }

    fn allocate_page(&self, object_id: u32) -> Result<BufferTag> {
        let mut files = self.files.lock();
        let first_block = BufferTag::new(object_id, 0);
        let object = self.object_file(&mut files, first_block)?;

        let tag = BufferTag::new(object_id, object.block_count);
        let offset = self.offset_of(tag);
        let zeros = vec![0u8; self.page_size as usize];

        object
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| object.file.write_all(&zeros))
            .and_then(|_| object.file.sync_all())
            .map_err(|e| Error::io(tag, e))?;

        object.block_count += 1;
        Ok(tag)
    }
}
