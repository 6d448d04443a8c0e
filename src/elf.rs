//! ELF introspection for dependency and provider discovery.
//!
//! Wraps `goblin`'s ELF parser to pull the three facts the Dependency
//! Scanner needs: a shared object's `SONAME` (what it provides), an
//! executable's dynamic loader interpreter (a runtime dependency in its own
//! right), and the list of libraries it was linked against (`DT_NEEDED`,
//! what it requires). None of this touches dynamic section parsing by hand;
//! `goblin::elf::Elf` already surfaces all three as plain fields.

use std::fs;
use std::path::Path;

use goblin::elf::Elf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElfError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ELF in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: goblin::error::Error,
    },
}

/// The facts extracted from one ELF object relevant to dependency resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElfInfo {
    /// `DT_SONAME`, if the object carries one. Shared objects normally do.
    pub soname: Option<String>,
    /// `PT_INTERP`, the requested dynamic loader path, if any.
    pub interpreter: Option<String>,
    /// `DT_NEEDED` entries, in the order the linker recorded them.
    pub needed: Vec<String>,
}

/// Parse the ELF object at `path`. Returns `Ok(None)` if `path` does not
/// start with the ELF magic bytes, so callers can probe arbitrary staged
/// files without special-casing non-ELF content themselves.
pub fn inspect(path: &Path) -> Result<Option<ElfInfo>, ElfError> {
    let bytes = fs::read(path).map_err(|source| ElfError::Io {
        path: path.display().to_string(),
        source,
    })?;
    inspect_bytes(&bytes, path)
}

/// Parse already-loaded ELF bytes, e.g. read once by a caller that also
/// needs the raw bytes for hashing.
pub fn inspect_bytes(bytes: &[u8], path: &Path) -> Result<Option<ElfInfo>, ElfError> {
    if bytes.len() < 4 || &bytes[0..4] != b"\x7fELF" {
        return Ok(None);
    }

    let elf = Elf::parse(bytes).map_err(|source| ElfError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    Ok(Some(ElfInfo {
        soname: elf.soname.map(str::to_string),
        interpreter: elf.interpreter.map(str::to_string),
        needed: elf.libraries.iter().map(|s| (*s).to_string()).collect(),
    }))
}

/// Rewrite a loader interpreter path the way `apk-tools` does when recording
/// it as a `so:` dependency: musl's loader is itself provided by `libc`, not
/// a file named after the loader, so `ld-musl-x86_64.so.1` becomes
/// `libc.musl-x86_64.so.1` for dependency purposes.
pub fn musl_loader_provider(interpreter_basename: &str) -> String {
    if let Some(rest) = interpreter_basename.strip_prefix("ld-musl") {
        format!("libc.musl{rest}")
    } else {
        interpreter_basename.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_bytes_rejects_non_elf_content() {
        let result = inspect_bytes(b"not an elf file at all", Path::new("whatever")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn inspect_bytes_rejects_truncated_magic() {
        let result = inspect_bytes(b"\x7fEL", Path::new("short")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn musl_loader_provider_rewrites_ld_musl_prefix() {
        assert_eq!(
            musl_loader_provider("ld-musl-x86_64.so.1"),
            "libc.musl-x86_64.so.1"
        );
    }

    #[test]
    fn musl_loader_provider_leaves_other_loaders_untouched() {
        assert_eq!(
            musl_loader_provider("ld-linux-x86-64.so.2"),
            "ld-linux-x86-64.so.2"
        );
    }
}
