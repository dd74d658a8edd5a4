use std::{
    num::NonZeroUsize,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    Error,
    beast::reader::READ_BUFFER_SIZE,
};

/// Settings for the pipeline.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// `host:port` of the BEAST server.
    pub address: String,

    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,

    /// Time to wait after a failed connection attempt.
    pub retry_delay: Duration,

    /// Give up reconnecting after this many failed attempts in a row and
    /// start over. `None` retries forever.
    pub max_connect_attempts: Option<NonZeroUsize>,

    pub read_buffer_size: usize,

    /// Number of consecutive empty reads after which the connection is
    /// considered closed by the peer.
    pub max_empty_reads: usize,

    /// Directory the per-second files and the error log are written to.
    pub output_dir: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            address: "localhost:10003".to_owned(),
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(3),
            max_connect_attempts: None,
            read_buffer_size: READ_BUFFER_SIZE,
            max_empty_reads: 3,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Per-station configuration read by the aggregator.
///
/// This lives next to the per-second files as `0_station_config.yml`. The
/// feeder itself only reports it, but makes sure it exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Whether the aggregator should use this station.
    #[serde(rename = "Feed_to_base")]
    pub feed_to_base: bool,

    #[serde(rename = "Location name")]
    pub location_name: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            feed_to_base: false,
            location_name: "Unspecified".to_owned(),
        }
    }
}

impl StationConfig {
    pub const FILE_NAME: &'static str = "0_station_config.yml";

    /// Reads the station config from `directory`. Returns `None` if there
    /// is none.
    pub fn load(directory: impl AsRef<Path>) -> Result<Option<Self>, Error> {
        let path = directory.as_ref().join(Self::FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(yaml) => Ok(Some(serde_yaml_ng::from_str(&yaml)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    pub fn store(&self, directory: impl AsRef<Path>) -> Result<(), Error> {
        let path = directory.as_ref().join(Self::FILE_NAME);
        let yaml = serde_yaml_ng::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Reads the station config, writing the default one if `directory`
    /// doesn't have one yet.
    pub fn load_or_create(directory: impl AsRef<Path>) -> Result<Self, Error> {
        let directory = directory.as_ref();
        if let Some(config) = Self::load(directory)? {
            Ok(config)
        }
        else {
            let config = Self::default();
            tracing::info!(?directory, "creating default station config");
            config.store(directory)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StationConfig;

    #[test]
    fn it_parses_the_aggregator_format() {
        let yaml = r#"
Feed_to_base: true
Location name: Rooftop North
Antenna height: 12
"#;
        let config: StationConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(config.feed_to_base);
        assert_eq!(config.location_name, "Rooftop North");
    }

    #[test]
    fn it_creates_a_default_config_once() {
        let dir = std::env::temp_dir().join(format!("mlat-feed-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        assert_eq!(StationConfig::load(&dir).unwrap(), None);
        let created = StationConfig::load_or_create(&dir).unwrap();
        assert_eq!(created, StationConfig::default());

        let custom = StationConfig {
            feed_to_base: true,
            location_name: "Hangar 2".to_owned(),
        };
        custom.store(&dir).unwrap();
        assert_eq!(StationConfig::load_or_create(&dir).unwrap(), custom);

        let yaml = std::fs::read_to_string(dir.join(StationConfig::FILE_NAME)).unwrap();
        assert!(yaml.contains("Feed_to_base: true"));
        assert!(yaml.contains("Location name: Hangar 2"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
