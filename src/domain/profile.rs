//! Platform profiles
//!
//! Maps the host platform name to the parameters the transfer engine uses.
//! Printer firmware timing depends on these exact values.

use serde::{Deserialize, Serialize};

/// How a chunk is represented when handed to the host write primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// Binary buffer, bytes unchanged.
    Raw,
    /// Two lowercase hex digits per byte, as text.
    HexText,
}

/// Transfer parameters for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub max_chunk_bytes: usize,
    pub pace_millis_per_chunk: u64,
    pub encoding: Encoding,
}

impl PlatformProfile {
    pub const IOS: Self = Self {
        max_chunk_bytes: 300,
        pace_millis_per_chunk: 0,
        encoding: Encoding::Raw,
    };

    pub const ANDROID: Self = Self {
        max_chunk_bytes: 19,
        pace_millis_per_chunk: 200,
        encoding: Encoding::HexText,
    };

    pub const DEFAULT: Self = Self {
        max_chunk_bytes: 20,
        pace_millis_per_chunk: 0,
        encoding: Encoding::Raw,
    };
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Resolve the profile for a platform name (case-insensitive).
///
/// Unknown platforms get [`PlatformProfile::DEFAULT`].
pub fn resolve(platform_id: &str) -> PlatformProfile {
    match platform_id.trim().to_lowercase().as_str() {
        "ios" => PlatformProfile::IOS,
        "android" => PlatformProfile::ANDROID,
        _ => PlatformProfile::DEFAULT,
    }
}

/// Platform identifier of the running system, unless overridden.
pub fn query_platform(override_id: Option<&str>) -> String {
    match override_id {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => std::env::consts::OS.to_string(),
    }
}
