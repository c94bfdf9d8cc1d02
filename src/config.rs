use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub lookup: LookupConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Timing knobs for the refresh scheduler
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Steady-state polling period
    pub poll_interval_secs: u64,
    /// Minimum spacing between two accepted lookups, whatever triggered them
    pub min_time_between_checks_secs: u64,
    /// Settle delay between a network-available event and the lookup
    pub network_event_refresh_delay_secs: u64,
    /// Upper bound on a single lookup call
    pub lookup_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub identity_url: String,
    pub asn_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where flags and maps are stored; platform cache dir when unset
    pub dir: Option<PathBuf>,
    /// Flag URL template, `{key}` is the lowercase country code
    pub flag_url: String,
    /// Map URL template with `{lat}` and `{lon}` placeholders
    pub map_url: String,
    pub maps: bool,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_interval_secs: u64,
    /// Remote address used to find the outbound route (no packets are sent)
    pub probe_target: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub debug: bool,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.schedule.validate()?;

        if self.lookup.identity_url.is_empty() {
            anyhow::bail!("lookup.identity_url must not be empty");
        }
        if self.lookup.request_timeout_secs == 0 {
            anyhow::bail!("lookup.request_timeout_secs must be positive");
        }
        if !self.cache.flag_url.contains("{key}") {
            anyhow::bail!("cache.flag_url must contain a {{key}} placeholder");
        }
        if self.cache.maps
            && !(self.cache.map_url.contains("{lat}") && self.cache.map_url.contains("{lon}"))
        {
            anyhow::bail!("cache.map_url must contain {{lat}} and {{lon}} placeholders");
        }
        if self.cache.fetch_timeout_secs == 0 {
            anyhow::bail!("cache.fetch_timeout_secs must be positive");
        }
        if self.network.probe_interval_secs == 0 {
            anyhow::bail!("network.probe_interval_secs must be positive");
        }
        Ok(())
    }

    /// Effective tracing filter directive
    pub fn log_filter(&self) -> &str {
        if self.logging.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("min_time_between_checks_secs", self.min_time_between_checks_secs),
            (
                "network_event_refresh_delay_secs",
                self.network_event_refresh_delay_secs,
            ),
            ("lookup_timeout_secs", self.lookup_timeout_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                anyhow::bail!("schedule.{} must be positive", name);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn min_time_between_checks(&self) -> Duration {
        Duration::from_secs(self.min_time_between_checks_secs)
    }

    pub fn network_event_refresh_delay(&self) -> Duration {
        Duration::from_secs(self.network_event_refresh_delay_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

impl CacheConfig {
    /// Configured directory, or `<platform cache>/extip-watch`
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("extip-watch")
        })
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 600,
            min_time_between_checks_secs: 4,
            network_event_refresh_delay_secs: 4,
            lookup_timeout_secs: 10,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            identity_url: "https://thisipcan.cyou/json".to_string(),
            asn_url: "https://ipinfo.io/json".to_string(),
            user_agent: format!("extip-watch/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 8,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            flag_url: "https://flagcdn.com/w80/{key}.png".to_string(),
            map_url: "https://staticmap.openstreetmap.de/staticmap.php?center={lat},{lon}&zoom=9&size=400x200"
                .to_string(),
            maps: true,
            fetch_timeout_secs: 15,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 5,
            probe_target: "1.1.1.1:53".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
        }
    }
}
