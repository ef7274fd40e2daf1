//! Release packages of lua-language-server.

use regex::Regex;
use std::collections::HashMap;

use super::types::{Archiver, Channel, PlatformPackage, Repository};

/// GitHub repository lua-language-server is released from.
pub const LUA_LS_REPO: &str = "LuaLS/lua-language-server";

/// Install directory name of the server.
pub const LUA_LS_NAME: &str = "lua-language-server";

lazy_static::lazy_static! {
    static ref PACKAGES: HashMap<&'static str, PlatformPackage> = {
        let mut packs = HashMap::new();
        packs.insert("win-x64", package(r"lua-language-server-.*-win32-x64\.zip", Archiver::Zip, "bin/lua-language-server.exe"));
        packs.insert("linux-x64", package(r"lua-language-server-.*-linux-x64\.tar\.gz", Archiver::TarGzip, "bin/lua-language-server"));
        packs.insert("linux-arm64", package(r"lua-language-server-.*-linux-arm64\.tar\.gz", Archiver::TarGzip, "bin/lua-language-server"));
        packs.insert("osx-x64", package(r"lua-language-server-.*-darwin-x64\.tar\.gz", Archiver::TarGzip, "bin/lua-language-server"));
        packs.insert("osx-arm64", package(r"lua-language-server-.*-darwin-arm64\.tar\.gz", Archiver::TarGzip, "bin/lua-language-server"));
        packs
    };
}

#[allow(clippy::unwrap_used)]
fn package(pattern: &str, archiver: Archiver, executable: &str) -> PlatformPackage {
    PlatformPackage {
        // patterns are literals above
        platform_filename: Regex::new(pattern).unwrap(),
        archiver,
        executable: executable.to_string(),
    }
}

/// All platform packages.
pub fn packages() -> HashMap<&'static str, PlatformPackage> {
    PACKAGES.clone()
}

/// Repository descriptor for a configured version string.
pub fn repository(version: &str) -> Repository {
    Repository {
        repo: LUA_LS_REPO.to_string(),
        channel: Channel::from_version(version),
    }
}

/// Package key of the running platform.
pub fn platform_key() -> String {
    let os = if cfg!(target_os = "windows") {
        "win"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    };

    let arch = if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x64"
    };

    format!("{}-{}", os, arch)
}
