use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs4::FileExt;

use crate::backend::{frame_io, StorageBackend};
use crate::codec::{Frame, Key};
use crate::crypto::Cipher;
use crate::error::{HiveError, Result};
use crate::keystore::Keystore;
use crate::registry::TypeRegistry;
use crate::value::Value;

const BOX_FILE_EXTENSION: &str = "hive";
const COMPACT_FILE_EXTENSION: &str = "hivec";
const LOCK_FILE_EXTENSION: &str = "lock";

/// File-backed storage for one box.
///
/// Owns a positional read handle, an append write handle, and an exclusive
/// lock on `<name>.lock` that keeps other processes out. Writes go straight
/// to the file in one batch per operation; reads serialize on the read
/// handle, and mutating operations take `&mut self`, so readers and the
/// writer exclude each other.
pub struct FileBackend {
    name: String,
    path: PathBuf,
    compact_path: PathBuf,
    lock_path: PathBuf,
    reader: Mutex<BufReaderWithPos<File>>,
    writer: WriteHandle,
    lock_file: File,
    cipher: Option<Cipher>,
}

impl FileBackend {
    /// Opens or creates the box file `<name>.hive` under `dir`.
    ///
    /// A leftover `.hivec` next to an intact `.hive` is a compaction that
    /// died before its rename and is discarded; a `.hivec` on its own is a
    /// compaction whose rename died and is moved into place.
    ///
    /// # Errors
    ///
    /// [`HiveError::BoxLocked`] when another process holds the lock file.
    pub fn open(dir: &Path, name: &str, encryption_key: Option<[u8; 32]>) -> Result<FileBackend> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", name, BOX_FILE_EXTENSION));
        let compact_path = dir.join(format!("{}.{}", name, COMPACT_FILE_EXTENSION));
        let lock_path = dir.join(format!("{}.{}", name, LOCK_FILE_EXTENSION));

        if compact_path.exists() {
            if path.exists() {
                debug!("discarding interrupted compaction of box {:?}", name);
                fs::remove_file(&compact_path)?;
            } else {
                debug!("finishing interrupted compaction of box {:?}", name);
                fs::rename(&compact_path, &path)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| HiveError::BoxLocked(name.to_owned()))?;

        let write_file = OpenOptions::new().create(true).write(true).open(&path)?;
        let writer = WriteHandle::new(write_file)?;
        let reader = Mutex::new(BufReaderWithPos::new(File::open(&path)?)?);

        Ok(FileBackend {
            name: name.to_owned(),
            path,
            compact_path,
            lock_path,
            reader,
            writer,
            lock_file,
            cipher: encryption_key.map(Cipher::new),
        })
    }

    /// Path of the box file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_reader(&self) -> std::sync::MutexGuard<'_, BufReaderWithPos<File>> {
        self.reader.lock().expect("backend reader lock poisoned")
    }
}

impl StorageBackend for FileBackend {
    fn initialize(
        &mut self,
        registry: &TypeRegistry,
        keystore: &mut Keystore,
        lazy: bool,
        crash_recovery: bool,
    ) -> Result<()> {
        let file_len = self.file_len()?;
        let recovered = {
            let mut reader = self.lock_reader();
            reader.seek(SeekFrom::Start(0))?;
            frame_io::scan(
                &mut *reader,
                file_len,
                registry,
                self.cipher.as_ref(),
                keystore,
                lazy,
            )?
        };

        if let Some(offset) = recovered {
            if !crash_recovery {
                return Err(HiveError::CorruptBox);
            }
            warn!(
                "box {:?} has a damaged tail, truncating {} to {} bytes",
                self.name, file_len, offset
            );
            self.writer.truncate(offset)?;
        }
        debug!(
            "opened box {:?} with {} entries and {} dead frames",
            self.name,
            keystore.len(),
            keystore.deleted_entries()
        );
        Ok(())
    }

    fn read_value(
        &self,
        registry: &TypeRegistry,
        offset: u64,
        length: u32,
    ) -> Result<Option<Value>> {
        let mut buf = vec![0; length as usize];
        {
            let mut reader = self.lock_reader();
            reader.seek(SeekFrom::Start(offset))?;
            reader.read_exact(&mut buf)?;
        }
        let frame = Frame::decode(&buf, registry, self.cipher.as_ref(), false)?;
        Ok(frame.value)
    }

    fn write_frames(&mut self, registry: &TypeRegistry, frames: &mut [Frame]) -> Result<()> {
        let start = self.writer.pos;
        let mut buf = Vec::new();
        let mut positions = Vec::with_capacity(frames.len());
        for frame in frames.iter() {
            let offset = start + buf.len() as u64;
            let length = frame.encode_into(&mut buf, registry, self.cipher.as_ref())?;
            positions.push((offset, length));
        }

        if let Err(err) = self.writer.append(&buf) {
            // Cut the file back so a torn batch never reaches the scan.
            if let Err(truncate_err) = self.writer.truncate(start) {
                error!(
                    "failed to roll back a torn write on box {:?}: {}",
                    self.name, truncate_err
                );
            }
            return Err(err.into());
        }

        for (frame, (offset, length)) in frames.iter_mut().zip(positions) {
            frame.offset = offset;
            frame.length = length;
        }
        Ok(())
    }

    fn compact(&mut self, keystore: &mut Keystore) -> Result<()> {
        let live = keystore.frames_by_offset();
        let mut moved: Vec<(Key, u64)> = Vec::with_capacity(live.len());

        {
            let compact_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.compact_path)?;
            let mut writer = BufWriter::new(compact_file);
            let mut reader = self.lock_reader();

            let mut new_offset = 0u64;
            for (key, offset, length) in live {
                reader.seek(SeekFrom::Start(offset))?;
                let copied = io::copy(&mut (&mut *reader).take(u64::from(length)), &mut writer)?;
                if copied != u64::from(length) {
                    return Err(HiveError::corrupt(
                        "live frame ended early during compaction",
                    ));
                }
                moved.push((key, new_offset));
                new_offset += u64::from(length);
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&self.compact_path, &self.path)?;

        {
            let mut reader = self.lock_reader();
            *reader = BufReaderWithPos::new(File::open(&self.path)?)?;
        }
        let write_file = OpenOptions::new().write(true).open(&self.path)?;
        self.writer = WriteHandle::new(write_file)?;

        for (key, offset) in moved {
            keystore.update_offset(&key, offset);
        }
        keystore.reset_deleted_entries();
        debug!(
            "compacted box {:?} down to {} bytes",
            self.name, self.writer.pos
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.writer.truncate(0)?;
        self.lock_reader().seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.file.sync_data()?;
        Ok(())
    }

    fn file_len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.lock_file.unlock()?;
        fs::remove_file(&self.lock_path)?;
        Ok(())
    }

    fn delete_from_disk(self: Box<Self>) -> Result<()> {
        let path = self.path.clone();
        let compact_path = self.compact_path.clone();
        let lock_path = self.lock_path.clone();
        self.lock_file.unlock()?;
        drop(self);

        fs::remove_file(&path)?;
        if compact_path.exists() {
            fs::remove_file(&compact_path)?;
        }
        fs::remove_file(&lock_path)?;
        Ok(())
    }
}

/// Flush written frames to disk when the backend goes away.
impl Drop for FileBackend {
    fn drop(&mut self) {
        if let Err(err) = self.writer.file.sync_all() {
            error!("failed to sync box {:?} on close: {}", self.name, err);
        }
    }
}

/// Append handle with a tracked position.
struct WriteHandle {
    file: File,
    pos: u64,
}

impl WriteHandle {
    fn new(mut file: File) -> io::Result<WriteHandle> {
        let pos = file.seek(SeekFrom::End(0))?;
        Ok(WriteHandle { file, pos })
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.pos = self.file.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

/// Buffered reader that remembers its position.
struct BufReaderWithPos<R: Read + Seek> {
    reader: BufReader<R>,
    pos: u64,
}

impl<R: Read + Seek> BufReaderWithPos<R> {
    fn new(mut inner: R) -> io::Result<BufReaderWithPos<R>> {
        let pos = inner.stream_position()?;
        Ok(BufReaderWithPos {
            reader: BufReader::new(inner),
            pos,
        })
    }
}

impl<R: Read + Seek> Read for BufReaderWithPos<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.reader.read(buf)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl<R: Read + Seek> Seek for BufReaderWithPos<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = self.reader.seek(pos)?;
        Ok(self.pos)
    }
}
