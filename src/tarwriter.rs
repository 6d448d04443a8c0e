//! Deterministic tar construction.
//!
//! Every archive entry is pinned to the same mtime, uid/gid 0, and
//! `root`/`root` owner names so that two builds of the same inputs produce
//! byte-identical tar streams. Entries must be appended in sorted order by
//! the caller; this writer does not sort.
//!
//! In [`Mode::Data`], each regular file is preceded by a PAX extended header
//! carrying its SHA-1 under the `APK-TOOLS.checksum.SHA1` key, exactly as
//! `apk-tools` expects when it verifies an installed file against `.PKGINFO`.
//! [`Mode::Control`] entries carry no such header.

use std::io::{self, Read, Write};

use sha1::{Digest, Sha1};
use tar::{Builder, EntryType, Header};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Control,
    Data,
}

/// Wraps a [`tar::Builder`], fixing every header field an apk tar entry must
/// share across builds and optionally emitting the per-file checksum
/// extension `apk-tools` relies on to detect corrupted installs.
pub struct TarWriter<W: Write> {
    inner: Builder<W>,
    mode: Mode,
    mtime: u64,
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W, mode: Mode, source_date_epoch: u64) -> Self {
        let mut inner = Builder::new(writer);
        inner.mode(tar::HeaderMode::Deterministic);
        Self {
            inner,
            mode,
            mtime: source_date_epoch,
        }
    }

    fn base_header(&self, path: &str, entry_type: EntryType, unix_mode: u32, size: u64) -> Header {
        let mut header = Header::new_ustar();
        header.set_path(path).expect("path fits in a ustar header");
        header.set_entry_type(entry_type);
        header.set_mode(unix_mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(self.mtime);
        header.set_size(size);
        header.set_username("root").ok();
        header.set_groupname("root").ok();
        header
    }

    /// Append a directory entry. No trailing slash is required in `path`;
    /// the tar format adds one.
    pub fn add_directory(&mut self, path: &str, unix_mode: u32) -> io::Result<()> {
        let mut header = self.base_header(path, EntryType::Directory, unix_mode, 0);
        header.set_cksum();
        self.inner.append(&header, io::empty())
    }

    /// Append a symlink entry pointing at `target`.
    pub fn add_symlink(&mut self, path: &str, target: &str, unix_mode: u32) -> io::Result<()> {
        let mut header = self.base_header(path, EntryType::Symlink, unix_mode, 0);
        header
            .set_link_name(target)
            .expect("symlink target fits in a ustar header");
        header.set_cksum();
        self.inner.append(&header, io::empty())
    }

    /// Append a regular file's contents, reading all of `data`. In
    /// [`Mode::Data`] this writes a PAX extended header with the file's
    /// SHA-1 immediately before the file entry itself.
    pub fn add_file(&mut self, path: &str, unix_mode: u32, mut data: impl Read) -> io::Result<()> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)?;

        if self.mode == Mode::Data {
            let mut hasher = Sha1::new();
            hasher.update(&buf);
            let digest = hasher.finalize();
            self.write_checksum_extension(path, &hex::encode(digest))?;
        }

        let mut header = self.base_header(path, EntryType::Regular, unix_mode, buf.len() as u64);
        header.set_cksum();
        self.inner.append(&header, buf.as_slice())
    }

    fn write_checksum_extension(&mut self, path: &str, sha1_hex: &str) -> io::Result<()> {
        let mut pax_data = Vec::new();
        write_pax_record(&mut pax_data, "APK-TOOLS.checksum.SHA1", sha1_hex);

        let mut header = Header::new_ustar();
        header.set_entry_type(EntryType::XHeader);
        header
            .set_path(format!("{path}.paxheader"))
            .expect("synthetic pax path fits in a ustar header");
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(self.mtime);
        header.set_size(pax_data.len() as u64);
        header.set_cksum();
        self.inner.append(&header, pax_data.as_slice())
    }

    /// Finish writing entries without emitting the standard tar end-of-archive
    /// trailer (two zeroed 512-byte blocks), so the returned writer's bytes
    /// can be concatenated with a following archive and still gzip-decompress
    /// as one continuous member stream the way `apk-tools` expects control
    /// and data sections to. Standard tar readers that require the trailer
    /// should instead call [`Self::finish`].
    pub fn into_inner_without_trailer(self) -> io::Result<W> {
        self.inner.into_inner()
    }

    /// Finish writing a conventional, trailer-terminated tar stream.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.finish()?;
        self.inner.into_inner()
    }
}

/// Writes one PAX record: `"{len} {key}={value}\n"`, where `len` includes its
/// own decimal width. Per the PAX spec the record length must describe
/// itself, so this grows the guessed width until it's self-consistent.
fn write_pax_record(out: &mut Vec<u8>, key: &str, value: &str) {
    let suffix = format!(" {key}={value}\n");
    let mut len = suffix.len();
    loop {
        let total = len.to_string().len() + suffix.len();
        if total == len {
            break;
        }
        len = total;
    }
    out.extend_from_slice(format!("{len}{suffix}").as_bytes());
}
