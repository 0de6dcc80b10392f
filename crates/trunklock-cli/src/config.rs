//! Configuration Vault – reads/writes `~/.trunklock/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

/// Persisted user configuration stored in `~/.trunklock/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Prefix for every lock service name (e.g. "Roadster Front Trunk").
    #[serde(default = "default_vehicle_name")]
    pub vehicle_name: String,

    /// Delay between accepting a target state and confirming it.  Values
    /// below [`MIN_DEBOUNCE_MS`] are raised to it.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Optional bound on each wake / telemetry / command call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_call_timeout_secs: Option<u64>,

    /// Round-trip latency of the simulated vehicle.
    #[serde(default = "default_sim_latency_ms")]
    pub sim_latency_ms: u64,

    /// Whether the simulated vehicle starts asleep.
    #[serde(default = "default_sim_starts_asleep")]
    pub sim_starts_asleep: bool,

    /// Vehicle API access token.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
}

impl Drop for Config {
    fn drop(&mut self) {
        self.access_token.zeroize();
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("vehicle_name", &self.vehicle_name)
            .field("debounce_ms", &self.debounce_ms)
            .field("remote_call_timeout_secs", &self.remote_call_timeout_secs)
            .field("sim_latency_ms", &self.sim_latency_ms)
            .field("sim_starts_asleep", &self.sim_starts_asleep)
            .field(
                "access_token",
                if self.access_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

/// The lock protocol drops a current-state push that lands in the same
/// response cycle as the target write, so the debounce never goes below this.
pub const MIN_DEBOUNCE_MS: u64 = 100;

fn default_vehicle_name() -> String {
    "Tesla".to_string()
}
fn default_debounce_ms() -> u64 {
    1000
}
fn default_sim_latency_ms() -> u64 {
    1500
}
fn default_sim_starts_asleep() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vehicle_name: default_vehicle_name(),
            debounce_ms: default_debounce_ms(),
            remote_call_timeout_secs: None,
            sim_latency_ms: default_sim_latency_ms(),
            sim_starts_asleep: default_sim_starts_asleep(),
            access_token: String::new(),
        }
    }
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(MIN_DEBOUNCE_MS))
    }

    pub fn remote_call_timeout(&self) -> Option<Duration> {
        self.remote_call_timeout_secs.map(Duration::from_secs)
    }

    pub fn sim_latency(&self) -> Duration {
        Duration::from_millis(self.sim_latency_ms)
    }
}

/// Return the path to `~/.trunklock/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".trunklock").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `TRUNKLOCK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TRUNKLOCK_VEHICLE_NAME` | `vehicle_name` |
/// | `TRUNKLOCK_DEBOUNCE_MS` | `debounce_ms` |
/// | `TRUNKLOCK_REMOTE_TIMEOUT_SECS` | `remote_call_timeout_secs` |
/// | `TRUNKLOCK_SIM_LATENCY_MS` | `sim_latency_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TRUNKLOCK_VEHICLE_NAME") {
        cfg.vehicle_name = v;
    }
    if let Ok(v) = std::env::var("TRUNKLOCK_DEBOUNCE_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.debounce_ms = ms;
    }
    if let Ok(v) = std::env::var("TRUNKLOCK_REMOTE_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.remote_call_timeout_secs = Some(secs);
    }
    if let Ok(v) = std::env::var("TRUNKLOCK_SIM_LATENCY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.sim_latency_ms = ms;
    }
}

/// Save the config to disk, creating `~/.trunklock/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // The file may hold an access token: owner-only directory (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
