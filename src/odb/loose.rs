//! odb::loose
//!
//! One zlib-compressed file per object under `objects/<2 hex>/<rest>`.
//!
//! # Invariants
//!
//! - A file is written once: to a temp file in the fan-out directory,
//!   fsynced, then renamed into place. Readers never see partial files.
//! - Reads re-derive the digest from the inflated bytes and compare it with
//!   the id the file is stored under.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::ObjectBackend;
use super::encoding;
use crate::core::paths::RepoPaths;
use crate::core::types::{HashAlgorithm, ObjectType, Oid};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct LooseBackend {
    dir: PathBuf,
    algorithm: HashAlgorithm,
    compression: Compression,
}

impl LooseBackend {
    /// Backend over `dir` (usually `<repo>/objects`) with zlib `level` 0-9.
    pub fn new(dir: impl Into<PathBuf>, algorithm: HashAlgorithm, level: u32) -> Self {
        Self {
            dir: dir.into(),
            algorithm,
            compression: Compression::new(level.min(9)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, oid: &Oid) -> PathBuf {
        RepoPaths::loose_object_path(&self.dir, oid)
    }

    fn inflate(&self, oid: &Oid, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut inflated = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut inflated)
            .map_err(|e| {
                warn!(%oid, error = %e, "loose object failed to inflate");
                Error::corrupt(format!("object {oid}"), format!("zlib: {e}"))
            })?;
        Ok(inflated)
    }

    fn read_file(path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::at_path(path)(e)),
        }
    }

    fn parse_hex_name(&self, fan_out: &str, rest: &str) -> Option<Oid> {
        if rest.starts_with('.') || fan_out.len() + rest.len() != self.algorithm.hex_len() {
            return None;
        }
        Oid::from_hex(&format!("{fan_out}{rest}")).ok()
    }

    fn list_fan_out(&self, fan_out: &str, rest_prefix: &str, out: &mut Vec<Oid>) -> Result<()> {
        let dir = self.dir.join(fan_out);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::at_path(&dir)(e)),
        };
        for entry in entries {
            let entry = entry.map_err(Error::at_path(&dir))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !name.starts_with(rest_prefix) {
                continue;
            }
            if let Some(oid) = self.parse_hex_name(fan_out, &name) {
                out.push(oid);
            }
        }
        Ok(())
    }
}

impl ObjectBackend for LooseBackend {
    fn name(&self) -> &'static str {
        "loose"
    }

    fn put(&self, oid: &Oid, kind: ObjectType, payload: &[u8]) -> Result<bool> {
        let path = self.path_of(oid);
        if path.exists() {
            return Ok(false);
        }
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidState(format!("no fan-out directory for {oid}")))?;
        fs::create_dir_all(parent).map_err(Error::at_path(parent))?;

        let temp = parent.join(format!(".tmp-{}", Uuid::new_v4().simple()));
        let write_temp = || -> io::Result<()> {
            let file = OpenOptions::new().write(true).create_new(true).open(&temp)?;
            let mut encoder = ZlibEncoder::new(file, self.compression);
            encoder.write_all(&encoding::header(kind, payload.len()))?;
            encoder.write_all(payload)?;
            let file = encoder.finish()?;
            file.sync_all()
        };
        if let Err(e) = write_temp() {
            let _ = fs::remove_file(&temp);
            return Err(Error::at_path(&temp)(e));
        }
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            // Lost a race against an identical writer.
            if path.exists() {
                return Ok(false);
            }
            return Err(Error::at_path(&path)(e));
        }
        debug!(%oid, %kind, size = payload.len(), "wrote loose object");
        Ok(true)
    }

    fn get(&self, oid: &Oid) -> Result<Option<(ObjectType, Vec<u8>)>> {
        let Some(compressed) = Self::read_file(&self.path_of(oid))? else {
            return Ok(None);
        };
        let inflated = self.inflate(oid, &compressed)?;
        let actual = self.algorithm.digest(&[&inflated]);
        if actual != *oid {
            warn!(%oid, %actual, "loose object digest mismatch");
            return Err(Error::corrupt(
                format!("object {oid}"),
                format!("content hashes to {actual}"),
            ));
        }
        let (kind, payload) = encoding::decode(&inflated)?;
        Ok(Some((kind, payload.to_vec())))
    }

    fn header(&self, oid: &Oid) -> Result<Option<(ObjectType, usize)>> {
        let path = self.path_of(oid);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::at_path(&path)(e)),
        };
        let mut head = Vec::with_capacity(encoding::MAX_HEADER_LEN);
        ZlibDecoder::new(file)
            .take(encoding::MAX_HEADER_LEN as u64)
            .read_to_end(&mut head)
            .map_err(|e| Error::corrupt(format!("object {oid}"), format!("zlib: {e}")))?;
        let (kind, size, _) = encoding::parse_header(&head)?;
        Ok(Some((kind, size)))
    }

    fn contains(&self, oid: &Oid) -> Result<bool> {
        Ok(self.path_of(oid).is_file())
    }

    fn ids_with_prefix(&self, prefix: &str) -> Result<Vec<Oid>> {
        let mut out = Vec::new();
        if prefix.len() < 2 {
            for oid in self.ids()? {
                if oid.matches_prefix(prefix) {
                    out.push(oid);
                }
            }
            return Ok(out);
        }
        self.list_fan_out(&prefix[..2], &prefix[2..], &mut out)?;
        out.sort();
        Ok(out)
    }

    fn ids(&self) -> Result<Vec<Oid>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(Error::at_path(&self.dir)(e)),
        };
        for entry in entries {
            let entry = entry.map_err(Error::at_path(&self.dir))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit()) {
                self.list_fan_out(&name, "", &mut out)?;
            }
        }
        out.sort();
        Ok(out)
    }
}
