//! Stream packaging and root filesystem snapshots
//!
//! Provides:
//! - `pack` / `unpack` through a selectable codec (none, gzip, bzip2, xz, zstd)
//! - Snapshot of a jail root into a compressed tar stream
//! - Restore of such a stream into a jail root

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tar::{Archive, Builder, EntryType};

/// Directory name jail roots are stored under inside a snapshot
const ROOT_PREFIX: &str = "rootfs";

/// Compression codec for packaged streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    None,
    #[default]
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl Codec {
    /// Infer the codec from an archive file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        [
            (".tar", Codec::None),
            (".tar.gz", Codec::Gzip),
            (".tgz", Codec::Gzip),
            (".tar.bz2", Codec::Bzip2),
            (".tbz", Codec::Bzip2),
            (".tar.xz", Codec::Xz),
            (".txz", Codec::Xz),
            (".tar.zst", Codec::Zstd),
        ]
        .into_iter()
        .find(|(ext, _)| name.ends_with(ext))
        .map(|(_, codec)| codec)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Xz => "xz",
            Codec::Zstd => "zstd",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "tar" => Ok(Codec::None),
            "gzip" | "gz" => Ok(Codec::Gzip),
            "bzip2" | "bz2" => Ok(Codec::Bzip2),
            "xz" => Ok(Codec::Xz),
            "zstd" | "zst" => Ok(Codec::Zstd),
            _ => Err(Error::UnknownCodec(s.to_string())),
        }
    }
}

/// Compressing writer for one codec
enum Encoder<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    fn new(codec: Codec, dst: W) -> io::Result<Self> {
        Ok(match codec {
            Codec::None => Encoder::None(dst),
            Codec::Gzip => {
                Encoder::Gzip(flate2::write::GzEncoder::new(dst, flate2::Compression::default()))
            }
            Codec::Bzip2 => {
                Encoder::Bzip2(bzip2::write::BzEncoder::new(dst, bzip2::Compression::default()))
            }
            Codec::Xz => Encoder::Xz(xz2::write::XzEncoder::new(dst, 6)),
            Codec::Zstd => Encoder::Zstd(zstd::stream::write::Encoder::new(dst, 3)?),
        })
    }

    /// Flush trailing codec frames and hand back the inner writer
    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::None(w) => Ok(w),
            Encoder::Gzip(e) => e.finish(),
            Encoder::Bzip2(e) => e.finish(),
            Encoder::Xz(e) => e.finish(),
            Encoder::Zstd(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::None(w) => w.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Bzip2(e) => e.write(buf),
            Encoder::Xz(e) => e.write(buf),
            Encoder::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::None(w) => w.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Bzip2(e) => e.flush(),
            Encoder::Xz(e) => e.flush(),
            Encoder::Zstd(e) => e.flush(),
        }
    }
}

/// Decompressing reader for one codec
fn decoder<'a, R: Read + 'a>(codec: Codec, src: R) -> io::Result<Box<dyn Read + 'a>> {
    Ok(match codec {
        Codec::None => Box::new(src),
        Codec::Gzip => Box::new(flate2::read::GzDecoder::new(src)),
        Codec::Bzip2 => Box::new(bzip2::read::BzDecoder::new(src)),
        Codec::Xz => Box::new(xz2::read::XzDecoder::new(src)),
        Codec::Zstd => Box::new(zstd::stream::read::Decoder::new(src)?),
    })
}

/// Compress `src` into `dst`, returning `dst` once the stream is complete
pub fn pack<R: Read, W: Write>(codec: Codec, mut src: R, dst: W) -> Result<W> {
    let mut encoder = Encoder::new(codec, dst)
        .map_err(|e| Error::Archive(format!("Failed to create {} compressor: {}", codec, e)))?;
    io::copy(&mut src, &mut encoder)
        .map_err(|e| Error::Archive(format!("Failed to compress ({}): {}", codec, e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finish compression ({}): {}", codec, e)))
}

/// Decompress `src` into `dst`, returning the number of bytes written
pub fn unpack<R: Read, W: Write>(codec: Codec, src: R, mut dst: W) -> Result<u64> {
    let mut reader = decoder(codec, src)
        .map_err(|e| Error::Archive(format!("Failed to create {} decompressor: {}", codec, e)))?;
    io::copy(&mut reader, &mut dst)
        .map_err(|e| Error::Archive(format!("Failed to decompress ({}): {}", codec, e)))
}

/// Tar a jail root through `codec` into `dst`
pub fn snapshot<W: Write>(root: &Path, codec: Codec, dst: W) -> Result<W> {
    if !root.is_dir() {
        return Err(Error::Archive(format!(
            "Jail root '{}' is not a directory",
            root.display()
        )));
    }

    let encoder = Encoder::new(codec, dst)
        .map_err(|e| Error::Archive(format!("Failed to create {} compressor: {}", codec, e)))?;
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(ROOT_PREFIX, root)
        .map_err(|e| Error::Archive(format!("Failed to add jail files: {}", e)))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("Failed to finalize archive: {}", e)))?;
    let dst = encoder
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finish compression: {}", e)))?;

    tracing::info!(root = %root.display(), %codec, "snapshot complete");
    Ok(dst)
}

/// Extract a snapshot stream into `root`
///
/// Entries outside the snapshot's root directory, absolute paths and `..`
/// components are rejected before anything is written for them. Nothing is
/// ever written through a symlink, and hard links must point at entries
/// inside the snapshot.
pub fn restore<R: Read>(codec: Codec, src: R, root: &Path) -> Result<usize> {
    fs::create_dir_all(root)?;

    let reader = decoder(codec, src)
        .map_err(|e| Error::Archive(format!("Failed to create {} decompressor: {}", codec, e)))?;
    let mut archive = Archive::new(reader);
    let mut restored = 0;

    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(format!("Failed to read archive entries: {}", e)))?
    {
        let mut entry =
            entry.map_err(|e| Error::Archive(format!("Failed to read archive entry: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| Error::Archive(format!("Failed to read entry path: {}", e)))?
            .to_path_buf();

        let rel = relative_entry_path(&path)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        ensure_no_symlinks(root, &rel, &path)?;

        let dest = root.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        // Replace rather than follow a symlink already at the destination
        if fs::symlink_metadata(&dest).is_ok_and(|m| m.file_type().is_symlink()) {
            fs::remove_file(&dest)?;
        }

        if entry.header().entry_type() == EntryType::Link {
            let target = entry
                .link_name()
                .map_err(|e| Error::Archive(format!("Failed to read link target: {}", e)))?
                .ok_or_else(|| {
                    Error::Archive(format!("Hard link without target: {}", path.display()))
                })?
                .to_path_buf();
            let target_rel = relative_entry_path(&target)?;
            ensure_no_symlinks(root, &target_rel, &target)?;
            fs::hard_link(root.join(&target_rel), &dest).map_err(|e| {
                Error::Archive(format!("Failed to link {}: {}", path.display(), e))
            })?;
        } else {
            entry.unpack(&dest).map_err(|e| {
                Error::Archive(format!("Failed to extract {}: {}", path.display(), e))
            })?;
        }
        restored += 1;
    }

    tracing::info!(root = %root.display(), entries = restored, "restore complete");
    Ok(restored)
}

/// Reject `rel` if any of its parent directories under `root` is a symlink
fn ensure_no_symlinks(root: &Path, rel: &Path, entry: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    let Some(parent) = rel.parent() else {
        return Ok(());
    };
    for component in parent.components() {
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(Error::Archive(format!(
                "Archive entry passes through symlink {}: {}",
                current.display(),
                entry.display()
            )));
        }
    }
    Ok(())
}

/// Path of an entry relative to the snapshot root directory
fn relative_entry_path(path: &Path) -> Result<PathBuf> {
    let rel = path.strip_prefix(ROOT_PREFIX).map_err(|_| {
        Error::Archive(format!(
            "Archive entry outside {}/: {}",
            ROOT_PREFIX,
            path.display()
        ))
    })?;

    let mut clean = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::Archive(format!(
                    "Archive entry escapes destination: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_parsing() {
        assert_eq!("zstd".parse::<Codec>().unwrap(), Codec::Zstd);
        assert_eq!("GZ".parse::<Codec>().unwrap(), Codec::Gzip);
        assert!(matches!("lz4".parse::<Codec>(), Err(Error::UnknownCodec(_))));

        assert_eq!(Codec::from_path(Path::new("/tmp/web1.tar.zst")), Some(Codec::Zstd));
        assert_eq!(Codec::from_path(Path::new("web1.tgz")), Some(Codec::Gzip));
        assert_eq!(Codec::from_path(Path::new("web1.tar")), Some(Codec::None));
        assert_eq!(Codec::from_path(Path::new("web1.zip")), None);
        assert_eq!(Codec::default(), Codec::Gzip);
    }

    #[test]
    fn test_pack_writes_codec_magic() {
        let gz = pack(Codec::Gzip, &b"hello"[..], Vec::new()).unwrap();
        assert_eq!(&gz[..2], &[0x1f, 0x8b]);

        let xz = pack(Codec::Xz, &b"hello"[..], Vec::new()).unwrap();
        assert_eq!(&xz[..6], &[0xfd, b'7', b'z', b'X', b'Z', 0x00]);

        let plain = pack(Codec::None, &b"hello"[..], Vec::new()).unwrap();
        assert_eq!(plain, b"hello");
    }

    #[test]
    fn test_unpack_bzip2() {
        let data = b"jail root contents ".repeat(64);
        let packed = pack(Codec::Bzip2, &data[..], Vec::new()).unwrap();
        assert!(packed.len() < data.len());

        let mut out = Vec::new();
        let n = unpack(Codec::Bzip2, &packed[..], &mut out).unwrap();
        assert_eq!(n as usize, data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_unpack_wrong_codec() {
        let packed = pack(Codec::Zstd, &b"hello"[..], Vec::new()).unwrap();
        assert!(unpack(Codec::Gzip, &packed[..], Vec::new()).is_err());
    }

    #[test]
    fn test_snapshot_restore() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("etc")).unwrap();
        fs::write(src.path().join("etc/rc.conf"), "sshd_enable=YES\n").unwrap();
        fs::write(src.path().join("README"), "jail\n").unwrap();

        let archive = snapshot(src.path(), Codec::Zstd, Vec::new()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        let root = dst.path().join("web1");
        let restored = restore(Codec::Zstd, &archive[..], &root).unwrap();

        assert!(restored >= 3);
        assert_eq!(
            fs::read_to_string(root.join("etc/rc.conf")).unwrap(),
            "sshd_enable=YES\n"
        );
        assert_eq!(fs::read_to_string(root.join("README")).unwrap(), "jail\n");
    }

    #[test]
    fn test_snapshot_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(snapshot(&dir.path().join("missing"), Codec::None, Vec::new()).is_err());
    }

    #[test]
    fn test_restore_rejects_traversal() {
        let mut header = tar::Header::new_gnu();
        let name = b"rootfs/../evil";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut builder = Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let archive = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("web1");
        let err = restore(Codec::None, &archive[..], &root).unwrap_err();

        assert!(matches!(err, Error::Archive(_)));
        assert!(!dir.path().join("evil").exists());
    }

    fn symlink_header(target: &Path) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_link_name(target).unwrap();
        header
    }

    fn file_header(size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(0o644);
        header
    }

    #[test]
    fn test_restore_refuses_writes_through_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("host");
        fs::create_dir(&outside).unwrap();

        let mut builder = Builder::new(Vec::new());
        builder
            .append_data(&mut symlink_header(&outside), "rootfs/escape", io::empty())
            .unwrap();
        builder
            .append_data(&mut file_header(5), "rootfs/escape/pwned", &b"pwned"[..])
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let root = dir.path().join("web1");
        let err = restore(Codec::None, &archive[..], &root).unwrap_err();

        assert!(matches!(err, Error::Archive(_)));
        assert!(!outside.join("pwned").exists());
        assert!(fs::symlink_metadata(root.join("escape")).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_restore_replaces_symlink_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("host.conf");
        fs::write(&outside, "host").unwrap();

        let mut builder = Builder::new(Vec::new());
        builder
            .append_data(&mut symlink_header(&outside), "rootfs/rc.conf", io::empty())
            .unwrap();
        builder
            .append_data(&mut file_header(4), "rootfs/rc.conf", &b"jail"[..])
            .unwrap();
        let archive = builder.into_inner().unwrap();

        let root = dir.path().join("web1");
        assert_eq!(restore(Codec::None, &archive[..], &root).unwrap(), 2);
        assert_eq!(fs::read_to_string(&outside).unwrap(), "host");
        assert_eq!(fs::read_to_string(root.join("rc.conf")).unwrap(), "jail");
    }

    #[test]
    fn test_restore_hard_links() {
        let mut builder = Builder::new(Vec::new());
        builder
            .append_data(&mut file_header(2), "rootfs/a", &b"hi"[..])
            .unwrap();
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Link);
        link.set_size(0);
        link.set_link_name("rootfs/a").unwrap();
        builder.append_data(&mut link, "rootfs/b", io::empty()).unwrap();
        let archive = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("web1");
        restore(Codec::None, &archive[..], &root).unwrap();
        assert_eq!(fs::read_to_string(root.join("b")).unwrap(), "hi");

        let mut builder = Builder::new(Vec::new());
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(EntryType::Link);
        link.set_size(0);
        link.set_link_name("/etc/passwd").unwrap();
        builder.append_data(&mut link, "rootfs/passwd", io::empty()).unwrap();
        let archive = builder.into_inner().unwrap();

        let other = dir.path().join("web2");
        assert!(restore(Codec::None, &archive[..], &other).is_err());
        assert!(!other.join("passwd").exists());
    }

    #[test]
    fn test_relative_entry_path() {
        assert_eq!(
            relative_entry_path(Path::new("rootfs/etc/rc.conf")).unwrap(),
            PathBuf::from("etc/rc.conf")
        );
        assert_eq!(relative_entry_path(Path::new("rootfs")).unwrap(), PathBuf::new());
        assert!(relative_entry_path(Path::new("etc/passwd")).is_err());
    }
}
