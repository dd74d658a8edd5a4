//! Writes records to one file per second of receiver time.
//!
//! Only one file is open at a time. A record from a different second than the
//! open file closes it and opens (or reopens) the file for its own second.

use std::path::{
    Path,
    PathBuf,
};

use tokio::{
    fs::{
        File,
        OpenOptions,
    },
    io::{
        AsyncWriteExt,
        BufWriter,
    },
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::{
    decoder::DecodedRecord,
    error_log::{
        ErrorCode,
        ErrorLog,
    },
};

pub type RecordReceiver = mpsc::UnboundedReceiver<Vec<DecodedRecord>>;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("timestamp can't name a file: {0}")]
    InvalidTimestamp(f64),
    #[error("io error")]
    Io(#[from] std::io::Error),
}

pub fn segment_file_name(second: u64) -> String {
    format!("{second}.txt")
}

#[derive(Debug)]
struct Segment {
    second: u64,
    writer: BufWriter<File>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SinkStats {
    pub num_records: usize,
    pub num_rejected: usize,
    pub num_segments_opened: usize,
}

#[derive(Debug)]
pub struct Sink {
    output_dir: PathBuf,
    segment: Option<Segment>,
    record_receiver: RecordReceiver,
    error_log: ErrorLog,
    shutdown: CancellationToken,
    stats: SinkStats,
}

impl Sink {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        record_receiver: RecordReceiver,
        error_log: ErrorLog,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            segment: None,
            record_receiver,
            error_log,
            shutdown,
            stats: SinkStats::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// The second of the currently open file.
    pub fn current_second(&self) -> Option<u64> {
        self.segment.as_ref().map(|segment| segment.second)
    }

    /// Writes a batch in order and flushes it. Records that can't be written
    /// are reported and skipped.
    pub async fn write_batch(&mut self, records: &[DecodedRecord]) {
        for record in records {
            if let Err(error) = self.write_record(record).await {
                tracing::warn!(%error, ?record, "dropping record");
                self.error_log.report(ErrorCode::SinkWrite);
                self.stats.num_rejected += 1;
            }
        }

        if let Some(segment) = &mut self.segment {
            if let Err(error) = segment.writer.flush().await {
                tracing::warn!(?error, second = segment.second, "flush failed");
                self.error_log.report(ErrorCode::SinkWrite);
            }
        }
    }

    async fn write_record(&mut self, record: &DecodedRecord) -> Result<(), WriteError> {
        let second = record
            .segment_second()
            .ok_or(WriteError::InvalidTimestamp(record.timestamp_value))?;

        let segment = match self.segment.take() {
            Some(segment) if segment.second == second => segment,
            previous => {
                if let Some(previous) = previous {
                    self.close_segment(previous).await;
                }
                self.open_segment(second).await?
            }
        };
        let segment = self.segment.insert(segment);

        let line = format!("{record}\n");
        segment.writer.write_all(line.as_bytes()).await?;
        self.stats.num_records += 1;

        Ok(())
    }

    async fn open_segment(&mut self, second: u64) -> Result<Segment, std::io::Error> {
        let path = self.output_dir.join(segment_file_name(second));
        tracing::debug!(?path, "opening segment");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        self.stats.num_segments_opened += 1;

        Ok(Segment {
            second,
            writer: BufWriter::new(file),
        })
    }

    async fn close_segment(&self, mut segment: Segment) {
        if let Err(error) = segment.writer.shutdown().await {
            tracing::warn!(?error, second = segment.second, "closing segment failed");
            self.error_log.report(ErrorCode::SinkWrite);
        }
    }

    /// Writes batches until `shutdown` is cancelled.
    pub async fn run(mut self) -> SinkStats {
        let mut upstream_closed = false;

        loop {
            let records = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                records = self.record_receiver.recv(), if !upstream_closed => records,
            };

            let Some(records) = records
            else {
                tracing::warn!("record channel closed");
                self.error_log.report(ErrorCode::SinkReceive);
                upstream_closed = true;
                continue;
            };

            self.write_batch(&records).await;
        }

        if let Some(segment) = self.segment.take() {
            self.close_segment(segment).await;
        }

        tracing::info!(
            num_records = self.stats.num_records,
            num_rejected = self.stats.num_rejected,
            num_segments_opened = self.stats.num_segments_opened,
            "sink stopped"
        );

        self.stats
    }
}
