//! Tunable constants shared across the crate.

/// Default size of one logical file block, in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Default permission mask applied to newly created files and directories.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Length, in bytes, of the per-chunk salt fed into the key derivation function.
pub const SALT_LEN: usize = 16;

/// Length, in bytes, of the AEAD nonce (IV).
pub const IV_LEN: usize = 12;

/// Length, in bytes, of the AEAD authentication tag.
pub const AUTH_TAG_LEN: usize = 16;

/// Length, in bytes, of the derived per-chunk AES-256 key.
pub const DERIVED_KEY_LEN: usize = 32;

/// Length, in bytes, of the filesystem master key.
pub const MASTER_KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA512 iteration count used to derive per-chunk keys.
///
/// Chosen to keep block encrypt/decrypt latency low: this key derivation
/// happens on every single block read and write, not just at mount time.
pub const PBKDF2_ITERATIONS: u32 = 1_000;

/// Maximum path length accepted by the resolver (mirrors common POSIX limits).
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum length of a single path component.
pub const MAX_NAME_LEN: usize = 255;

/// Inode index of the filesystem root. Persisted at mount; restarts must agree on it.
pub const ROOT_INO: u64 = 1;

/// Largest file size this filesystem will grow a file to, mirroring the
/// signed 64-bit `off_t` ceiling most POSIX tooling assumes. A write that
/// would push a file's size past this returns `file-too-big`.
pub const MAX_FILE_SIZE: u64 = i64::MAX as u64;
