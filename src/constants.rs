// Centralized constants for regmigrate to avoid magic numbers

/// Default tracing filter when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "regmigrate=info";

/// Default maximum number of attempts for a registry request
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default initial backoff for registry requests in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default maximum backoff limit in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5000;

/// Page size requested from `_catalog` and `tags/list`
pub const REGISTRY_PAGE_SIZE: usize = 100;

/// Graph size above which shared-byte weights are computed with rayon
pub const PARALLEL_INSERT_THRESHOLD: usize = 64;

/// File the emitted script appends finished images to
pub const DONE_LOG_FILE: &str = "migration.done";

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Manifest media types accepted when resolving a tag
pub const MANIFEST_ACCEPT: &[&str] = &[
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
    "application/vnd.oci.image.index.v1+json",
];
