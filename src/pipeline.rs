use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    Error,
    config::FeedConfig,
    decoder::{
        Decoder,
        DecoderStats,
    },
    error_log::ErrorLog,
    sink::{
        Sink,
        SinkStats,
    },
    source::{
        Connector,
        connection::{
            ConnectionManager,
            ReaderStats,
        },
    },
};

#[derive(Debug)]
struct Stage<T> {
    name: &'static str,
    shutdown: CancellationToken,
    join_handle: JoinHandle<T>,
}

impl<T: Send + 'static> Stage<T> {
    fn spawn<F>(name: &'static str, run: impl FnOnce(CancellationToken) -> F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let shutdown = CancellationToken::new();
        let join_handle = tokio::spawn(run(shutdown.clone()));
        Self {
            name,
            shutdown,
            join_handle,
        }
    }

    fn cancel(&self) {
        tracing::debug!(stage = self.name, "stopping");
        self.shutdown.cancel();
    }

    async fn join(self) -> Result<T, Error> {
        self.join_handle.await.map_err(|error| {
            tracing::error!(stage = self.name, %error, "stage failed");
            error.into()
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineStats {
    pub reader: ReaderStats,
    pub decoder: DecoderStats,
    pub sink: SinkStats,
    pub num_errors: usize,
}

/// The running reader, decoder and sink tasks.
///
/// Each stage has its own cancellation token. Stopping one doesn't stop the
/// others, use [`Pipeline::shutdown`] to stop all of them.
#[derive(Debug)]
pub struct Pipeline {
    reader: Stage<ReaderStats>,
    decoder: Stage<DecoderStats>,
    sink: Stage<SinkStats>,
    error_log: ErrorLog,
}

impl Pipeline {
    pub fn spawn<C>(connector: C, config: &FeedConfig, error_log: ErrorLog) -> Self
    where
        C: Connector + 'static,
    {
        let (frame_sender, frame_receiver) = mpsc::unbounded_channel();
        let (record_sender, record_receiver) = mpsc::unbounded_channel();

        let sink = Stage::spawn("sink", |shutdown| {
            Sink::new(
                config.output_dir.clone(),
                record_receiver,
                error_log.clone(),
                shutdown,
            )
            .run()
        });

        let decoder = Stage::spawn("decoder", |shutdown| {
            Decoder::new(frame_receiver, record_sender, error_log.clone(), shutdown).run()
        });

        let reader = Stage::spawn("reader", |shutdown| {
            ConnectionManager::new(
                connector,
                config,
                error_log.clone(),
                frame_sender,
                shutdown,
            )
            .run()
        });

        tracing::info!(address = %config.address, output_dir = ?config.output_dir, "pipeline started");

        Self {
            reader,
            decoder,
            sink,
            error_log,
        }
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Stops all stages and waits for them, even if one of them failed.
    pub async fn shutdown(self) -> Result<PipelineStats, Error> {
        self.reader.cancel();
        self.decoder.cancel();
        self.sink.cancel();

        let reader = self.reader.join().await;
        let decoder = self.decoder.join().await;
        let sink = self.sink.join().await;

        Ok(PipelineStats {
            reader: reader?,
            decoder: decoder?,
            sink: sink?,
            num_errors: self.error_log.total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Error,
        config::FeedConfig,
        error_log::ErrorLog,
        pipeline::Pipeline,
        source::Connector,
    };

    struct PanickingConnector;

    impl Connector for PanickingConnector {
        type Stream = tokio::io::Empty;

        async fn connect(&self) -> Result<Self::Stream, std::io::Error> {
            panic!("connector failed");
        }
    }

    #[tokio::test]
    async fn a_failed_stage_does_not_keep_the_others_running() {
        let pipeline = Pipeline::spawn(
            PanickingConnector,
            &FeedConfig::default(),
            ErrorLog::without_file(),
        );
        while !pipeline.reader.join_handle.is_finished() {
            tokio::task::yield_now().await;
        }

        let decoder_shutdown = pipeline.decoder.shutdown.clone();
        let sink_shutdown = pipeline.sink.shutdown.clone();
        let result = pipeline.shutdown().await;

        assert!(matches!(result, Err(Error::Join(_))));
        assert!(decoder_shutdown.is_cancelled());
        assert!(sink_shutdown.is_cancelled());
    }
}
