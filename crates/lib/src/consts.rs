//! Crate-wide constants.

/// Application name, used for directory names and environment prefixes.
pub const APP_NAME: &str = "stowage";

/// Name of the configuration file looked up next to the graph and in the config dir.
pub const CONFIG_FILENAME: &str = "stowage.toml";

/// File name of a committed artifact inside its entry directory.
pub const ARTIFACT_FILENAME: &str = "artifact";

/// File name of the metadata record inside an entry directory.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Directory (per category) holding in-progress writes.
pub const STAGING_DIRNAME: &str = ".staging";

/// Artifacts at or above this size are uploaded with the multipart protocol.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Size of each multipart part (the last part may be smaller).
pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of parts uploaded concurrently for one artifact.
pub const DEFAULT_PART_CONCURRENCY: usize = 4;

/// Attempts per multipart part before the part counts as failed.
pub const DEFAULT_PART_ATTEMPTS: u32 = 3;

/// Timeout applied to every remote request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Header carrying the base64 Ed25519 signature of a cache response.
pub const SIGNATURE_HEADER: &str = "x-cache-signature";

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "STOWAGE_";
