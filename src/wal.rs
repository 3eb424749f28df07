use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Frames claiming more than this are treated as corruption.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Write one frame: `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the file ended first.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Where the log's bytes go. `File` outside of tests.
pub trait LogFile: Write + Sized {
    fn sync(&self) -> io::Result<()>;
    fn truncate(&self, len: u64) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    /// Open `path` for appends the same way `self` was opened.
    fn reopen(&self, path: &Path) -> io::Result<Self>;
}

impl LogFile for File {
    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn reopen(&self, path: &Path) -> io::Result<Self> {
        OpenOptions::new().create(true).append(true).open(path)
    }
}

fn compact_tmp_path(path: &Path) -> PathBuf {
    path.with_extension("wal.compact")
}

/// Write a compacted log beside the live one and fsync it.
fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(compact_tmp_path(path))?);
    for event in events {
        encode_event(&mut writer, event)?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Append-only ledger log.
///
/// Every accepted mutation is one frame. Frames are staged in memory and only
/// reach the file in `flush_sync`. A flush that fails cuts the file back to
/// the last committed length, so nothing a caller was told failed can
/// resurface on replay. If that cut fails too the log is poisoned and refuses
/// every later append until a compaction rewrites it.
pub struct Wal<F: LogFile = File> {
    file: F,
    path: PathBuf,
    pending: Vec<u8>,
    pending_frames: u64,
    /// File length covered by successful flushes.
    committed_len: u64,
    appends_since_compact: u64,
    poisoned: bool,
}

impl Wal<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::with_file(path, file)
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap an already opened log file positioned for appends.
    pub fn with_file(path: &Path, file: F) -> io::Result<Self> {
        Ok(Self {
            committed_len: file.size()?,
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_frames: 0,
            appends_since_compact: 0,
            poisoned: false,
        })
    }

    /// Replace the log with `events` (temp file + rename) and reopen it for
    /// appends. A poisoned log is healthy again afterwards.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        write_compact_file(&self.path, events)?;
        fs::rename(compact_tmp_path(&self.path), &self.path)?;
        let file = self.file.reopen(&self.path)?;
        self.committed_len = file.size()?;
        self.file = file;
        self.pending.clear();
        self.pending_frames = 0;
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage a frame. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.check_poisoned()?;
        encode_event(&mut self.pending, event)?;
        self.pending_frames += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Write and fsync every staged frame. On failure the staged frames are
    /// dropped and the file is cut back to its last committed length.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.check_poisoned()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync());
        match result {
            Ok(()) => {
                self.committed_len += self.pending.len() as u64;
                self.pending.clear();
                self.pending_frames = 0;
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    /// Forget staged frames and remove any of their bytes that already hit
    /// the file.
    pub fn rollback(&mut self) {
        self.appends_since_compact = self.appends_since_compact.saturating_sub(self.pending_frames);
        self.pending.clear();
        self.pending_frames = 0;
        let cut = self
            .file
            .truncate(self.committed_len)
            .and_then(|()| self.file.sync());
        if let Err(e) = cut {
            tracing::error!(
                path = %self.path.display(),
                committed_len = self.committed_len,
                error = %e,
                "WAL rollback failed, refusing further appends"
            );
            self.poisoned = true;
        }
    }

    fn check_poisoned(&self) -> io::Result<()> {
        if self.poisoned {
            Err(io::Error::other("WAL poisoned by a failed rollback"))
        } else {
            Ok(())
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

impl Wal {
    /// All intact events in order. A missing file is an empty log.
    ///
    /// A torn or corrupt tail is cut off so later appends land right after
    /// the last good frame.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut good_len: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                break;
            }
            let mut payload = vec![0u8; len];
            if !read_or_eof(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(
                    path = %path.display(),
                    recovered = events.len(),
                    "WAL checksum mismatch, discarding tail"
                );
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
            good_len += 8 + len as u64;
        }

        if good_len < file_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = file_len - good_len,
                "truncating WAL tail"
            );
            OpenOptions::new().write(true).open(path)?.set_len(good_len)?;
        }

        Ok(events)
    }
}

/// A real log file that can be told to fail like a full disk.
#[cfg(test)]
pub(crate) mod faulty {
    use std::fs::{File, OpenOptions};
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::LogFile;

    #[derive(Clone, Default)]
    pub(crate) struct Faults {
        writes: Arc<AtomicBool>,
        truncate: Arc<AtomicBool>,
    }

    impl Faults {
        pub(crate) fn fail_writes(&self, on: bool) {
            self.writes.store(on, Ordering::SeqCst);
        }

        pub(crate) fn fail_truncate(&self, on: bool) {
            self.truncate.store(on, Ordering::SeqCst);
        }
    }

    pub(crate) struct FaultyFile {
        file: File,
        faults: Faults,
    }

    impl FaultyFile {
        pub(crate) fn open(path: &Path) -> (Self, Faults) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap();
            let faults = Faults::default();
            (
                Self {
                    file,
                    faults: faults.clone(),
                },
                faults,
            )
        }
    }

    impl Write for FaultyFile {
        /// When failing, half of the buffer lands before the error.
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.faults.writes.load(Ordering::SeqCst) {
                self.file.write_all(&buf[..buf.len() / 2])?;
                return Err(io::Error::other("no space left on device"));
            }
            self.file.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl LogFile for FaultyFile {
        fn sync(&self) -> io::Result<()> {
            self.file.sync_all()
        }

        fn truncate(&self, len: u64) -> io::Result<()> {
            if self.faults.truncate.load(Ordering::SeqCst) {
                return Err(io::Error::other("read-only file system"));
            }
            self.file.set_len(len)
        }

        fn size(&self) -> io::Result<u64> {
            Ok(self.file.metadata()?.len())
        }

        fn reopen(&self, path: &Path) -> io::Result<Self> {
            Ok(Self {
                file: self.file.reopen(path)?,
                faults: self.faults.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innledger_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn room_created(number: &str) -> Event {
        Event::RoomCreated {
            room: Room {
                id: Ulid::new(),
                number: number.into(),
                room_type: RoomType {
                    name: "Single".into(),
                    capacity: 1,
                },
                price: 7_500,
                status: RoomStatus::Available,
                description: None,
                image_url: None,
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            room_created("101"),
            Event::RoomStatusChanged {
                id: Ulid::new(),
                status: RoomStatus::Maintenance,
            },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = room_created("102");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap(); // length says 9, only 2 bytes follow
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event.clone()]);

        // Appends after recovery must stay readable.
        let next = room_created("105");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&next).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![event, next]);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        let good = room_created("103");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&Event::RoomDeleted { id: Ulid::new() }).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let room = room_created("104");
        let Event::RoomCreated { room: ref r } = room else {
            unreachable!()
        };
        let room_id = r.id;
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&room).unwrap();
            for _ in 0..20 {
                wal.append(&Event::RoomStatusChanged {
                    id: room_id,
                    status: RoomStatus::Maintenance,
                })
                .unwrap();
                wal.append(&Event::RoomStatusChanged {
                    id: room_id,
                    status: RoomStatus::Available,
                })
                .unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let follow_up = Event::RoomDeleted { id: room_id };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(std::slice::from_ref(&room)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&follow_up).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap(), vec![room, follow_up]);
    }

    #[test]
    fn buffered_appends_count_until_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|i| room_created(&format!("2{i:02}"))).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn failed_flush_leaves_no_partial_frame() {
        let path = tmp_path("failed_flush.wal");
        let (file, faults) = faulty::FaultyFile::open(&path);
        let mut wal = Wal::with_file(&path, file).unwrap();

        let kept = room_created("401");
        wal.append(&kept).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        faults.fail_writes(true);
        assert!(wal.append(&room_created("402")).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(wal.appends_since_compact(), 1);

        faults.fail_writes(false);
        let next = room_created("403");
        wal.append(&next).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, next]);
    }

    #[test]
    fn failed_rollback_poisons_until_compaction() {
        let path = tmp_path("poisoned.wal");
        let (file, faults) = faulty::FaultyFile::open(&path);
        let mut wal = Wal::with_file(&path, file).unwrap();
        let kept = room_created("501");
        wal.append(&kept).unwrap();

        faults.fail_writes(true);
        faults.fail_truncate(true);
        assert!(wal.append(&room_created("502")).is_err());

        // The disk recovered, but the torn frame is still on it.
        faults.fail_writes(false);
        faults.fail_truncate(false);
        assert!(wal.append_buffered(&room_created("503")).is_err());
        assert!(wal.flush_sync().is_err());

        wal.compact(std::slice::from_ref(&kept)).unwrap();
        let next = room_created("504");
        wal.append(&next).unwrap();
        drop(wal);
        assert_eq!(Wal::replay(&path).unwrap(), vec![kept, next]);
    }
}
