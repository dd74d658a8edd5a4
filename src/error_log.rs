//! Append-only error log shared by all stages.
//!
//! Every entry is one line: `<UTC timestamp> : <message>`. Lines are
//! formatted completely before they're written with a single `write_all`
//! while holding the lock, so entries from different tasks never interleave.

use std::{
    fmt::Display,
    fs::{
        File,
        OpenOptions,
    },
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        atomic::{
            AtomicUsize,
            Ordering,
        },
    },
};

use chrono::Utc;
use parking_lot::Mutex;

pub const ERROR_LOG_FILE_NAME: &str = "0_Log_Errors.txt";

const NUM_ERROR_CODES: usize = 9;

/// All errors the pipeline reports. None of them is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `1a`: connecting or reading from the socket failed. The reader
    /// reconnects.
    ConnectionFailed,
    /// `1b`: a read returned no data.
    EmptyRead,
    /// `1c`: a read filled the whole buffer.
    ReadBufferSaturated,
    /// `1d`: the reader couldn't send frames to the decoder.
    ForwardFrames,
    /// `1e`: reconnecting gave up. The reader starts over.
    ReconnectFailed,
    /// `2a`: the decoder couldn't receive frames.
    DecoderReceive,
    /// `2b`: the decoder couldn't send records to the sink.
    DecoderForward,
    /// `3a`: the sink couldn't receive records.
    SinkReceive,
    /// `3b`: the sink couldn't write a record.
    SinkWrite,
}

impl ErrorCode {
    pub const ALL: [Self; NUM_ERROR_CODES] = [
        Self::ConnectionFailed,
        Self::EmptyRead,
        Self::ReadBufferSaturated,
        Self::ForwardFrames,
        Self::ReconnectFailed,
        Self::DecoderReceive,
        Self::DecoderForward,
        Self::SinkReceive,
        Self::SinkWrite,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "1a",
            Self::EmptyRead => "1b",
            Self::ReadBufferSaturated => "1c",
            Self::ForwardFrames => "1d",
            Self::ReconnectFailed => "1e",
            Self::DecoderReceive => "2a",
            Self::DecoderForward => "2b",
            Self::SinkReceive => "3a",
            Self::SinkWrite => "3b",
        }
    }

    /// The message written to the log file. Existing tooling greps for
    /// these, so don't change them.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "ERROR : Socket connection error. Reconnecting...",
            Self::EmptyRead => "ERROR : Message length received is zero at socket",
            Self::ReadBufferSaturated => "ERROR : There is no margin at 16384 buffer length",
            Self::ForwardFrames => "ERROR : Parent send error",
            Self::ReconnectFailed => "ERROR : Parent receive error",
            Self::DecoderReceive => "ERROR : Decode receive error",
            Self::DecoderForward => "ERROR : Decode send error",
            Self::SinkReceive => "ERROR : Endpoint receive error",
            Self::SinkWrite => "ERROR : Endpoint write error",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Handle to the error log. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ErrorLog {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
    counts: [AtomicUsize; NUM_ERROR_CODES],
}

impl ErrorLog {
    /// Opens (or creates) the log file for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self::new(Some(path.to_owned()), Some(file)))
    }

    /// An error log that only counts and traces errors, without writing them
    /// to a file.
    pub fn without_file() -> Self {
        Self::new(None, None)
    }

    fn new(path: Option<PathBuf>, file: Option<File>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                file: Mutex::new(file),
                counts: Default::default(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Counts, traces and appends one line to the log file.
    ///
    /// The file write is a blocking `write_all` of a single short line. The
    /// reader waits the retry delay between connections, which bounds how
    /// often this is called.
    pub fn report(&self, code: ErrorCode) {
        self.inner.counts[code.index()].fetch_add(1, Ordering::Relaxed);
        tracing::warn!(%code, "{}", code.message());

        let line = format!(
            "{} : {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            code.message()
        );

        let mut file = self.inner.file.lock();
        if let Some(file) = &mut *file {
            if let Err(error) = file.write_all(line.as_bytes()) {
                tracing::error!(?error, path = ?self.inner.path, "failed to write error log");
            }
        }
    }

    /// How often `code` was reported.
    pub fn count(&self, code: ErrorCode) -> usize {
        self.inner.counts[code.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        ErrorCode::ALL.iter().map(|code| self.count(*code)).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::error_log::{
        ERROR_LOG_FILE_NAME,
        ErrorCode,
        ErrorLog,
    };

    #[test]
    fn codes_are_unique() {
        let codes = ErrorCode::ALL
            .iter()
            .map(|code| code.code())
            .collect::<HashSet<_>>();
        assert_eq!(codes.len(), ErrorCode::ALL.len());

        for (i, code) in ErrorCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), i);
        }
    }

    #[test]
    fn it_appends_lines() {
        let dir = std::env::temp_dir().join(format!("mlat-feed-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(ERROR_LOG_FILE_NAME);

        let error_log = ErrorLog::open(&path).unwrap();
        error_log.report(ErrorCode::ConnectionFailed);
        error_log.report(ErrorCode::SinkWrite);
        drop(error_log);

        // reopening must not truncate
        let error_log = ErrorLog::open(&path).unwrap();
        error_log.report(ErrorCode::ConnectionFailed);
        assert_eq!(error_log.count(ErrorCode::ConnectionFailed), 1);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" : ERROR : Socket connection error. Reconnecting..."));
        assert!(lines[1].ends_with(" : ERROR : Endpoint write error"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn concurrent_reports_dont_interleave() {
        let dir = std::env::temp_dir().join(format!("mlat-feed-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(ERROR_LOG_FILE_NAME);
        let error_log = ErrorLog::open(&path).unwrap();

        let threads = ErrorCode::ALL
            .into_iter()
            .map(|code| {
                let error_log = error_log.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        error_log.report(code);
                    }
                })
            })
            .collect::<Vec<_>>();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(error_log.total(), 900);

        let contents = std::fs::read_to_string(&path).unwrap();
        let messages = ErrorCode::ALL
            .iter()
            .map(|code| code.message())
            .collect::<Vec<_>>();
        let mut num_lines = 0;
        for line in contents.lines() {
            let (_timestamp, message) = line.split_once(" : ").unwrap();
            assert!(messages.contains(&message), "garbled line: {line}");
            num_lines += 1;
        }
        assert_eq!(num_lines, 900);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
