//! Provides a general interface to a physical OPC package.
//!
//! A package on disk is either a ZIP archive (`.docx`, `.dotx`, ...) or a
//! directory holding the same member tree, which is handy for fixtures and
//! for inspecting an unpacked document. Readers hide the difference behind
//! [`PhysPkgReader`]; [`PhysPkgWriter`] always produces a ZIP archive.

use crate::opc::error::{OpcError, Result};
use crate::opc::packuri::{CONTENT_TYPES_URI, PackURI};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Physical package reader over a ZIP archive or an unpacked directory.
#[derive(Debug)]
pub enum PhysPkgReader {
    Zip(ZipPkgReader),
    Dir(DirPkgReader),
}

impl PhysPkgReader {
    /// Open a package from the filesystem.
    ///
    /// A directory is read member by member; a file must be a ZIP archive.
    ///
    /// # Errors
    /// `PackageNotFound` when nothing exists at `path`, a ZIP error when the
    /// file is not a readable archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.is_dir() {
            return Ok(PhysPkgReader::Dir(DirPkgReader::new(path)));
        }

        if !path.exists() {
            return Err(OpcError::PackageNotFound(path.display().to_string()));
        }

        let file = fs::File::open(path)?;
        Ok(PhysPkgReader::Zip(ZipPkgReader::from_archive(file)?))
    }

    /// Read a ZIP package held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Ok(PhysPkgReader::Zip(ZipPkgReader::from_archive(Cursor::new(data))?))
    }

    /// Read a ZIP package from a stream.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data)
    }

    /// Binary content of the member for `pack_uri`.
    pub fn blob_for(&self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        match self {
            PhysPkgReader::Zip(zip) => zip.blob_for(pack_uri).map(<[u8]>::to_vec),
            PhysPkgReader::Dir(dir) => dir.blob_for(pack_uri),
        }
    }

    /// Like [`blob_for`](Self::blob_for), but hands over ownership of the
    /// member's bytes. A ZIP member can only be taken once.
    pub fn take_blob(&mut self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        match self {
            PhysPkgReader::Zip(zip) => zip.take_blob(pack_uri),
            PhysPkgReader::Dir(dir) => dir.blob_for(pack_uri),
        }
    }

    /// Member content decoded as UTF-8 text.
    pub fn text_for(&self, pack_uri: &PackURI) -> Result<String> {
        let blob = self.blob_for(pack_uri)?;
        String::from_utf8(blob).map_err(|e| OpcError::Utf8Error(e.utf8_error()))
    }

    /// The `[Content_Types].xml` content, which every package must have.
    pub fn content_types_xml(&self) -> Result<Vec<u8>> {
        let content_types_uri = PackURI::new(CONTENT_TYPES_URI)?;
        self.blob_for(&content_types_uri).map_err(|e| match e {
            OpcError::PartNotFound(_) => {
                OpcError::PackageNotFound(format!("no {} in package", CONTENT_TYPES_URI))
            },
            other => other,
        })
    }

    /// Relationships XML for a source partname, or `None` when the source
    /// has no `.rels` member.
    pub fn rels_xml_for(&self, source_uri: &PackURI) -> Result<Option<Vec<u8>>> {
        match self.blob_for(&source_uri.rels_uri()) {
            Ok(blob) => Ok(Some(blob)),
            Err(OpcError::PartNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All member names in the package, without a leading slash.
    pub fn member_names(&self) -> Result<Vec<String>> {
        match self {
            PhysPkgReader::Zip(zip) => Ok(zip.member_names().map(String::from).collect()),
            PhysPkgReader::Dir(dir) => dir.member_names(),
        }
    }

    /// Whether a member exists for `pack_uri`.
    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        match self {
            PhysPkgReader::Zip(zip) => zip.contains(pack_uri),
            PhysPkgReader::Dir(dir) => dir.contains(pack_uri),
        }
    }
}

/// ZIP-backed reader. Every member is decompressed once, up front.
#[derive(Debug, Default)]
pub struct ZipPkgReader {
    /// Member names in archive order
    names: Vec<String>,
    members: HashMap<String, Vec<u8>>,
    /// lower-cased member name -> member name
    folded: HashMap<String, String>,
}

impl ZipPkgReader {
    pub fn from_archive<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut pkg = Self {
            names: Vec::with_capacity(archive.len()),
            members: HashMap::with_capacity(archive.len()),
            folded: HashMap::with_capacity(archive.len()),
        };

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)?;

            pkg.folded.insert(name.to_lowercase(), name.clone());
            pkg.names.push(name.clone());
            pkg.members.insert(name, content);
        }

        log::debug!("read {} members from zip package", pkg.names.len());
        Ok(pkg)
    }

    /// Partnames match case-insensitively, so fall back to a folded lookup
    /// when the exact member name is absent.
    fn resolve<'a>(&'a self, pack_uri: &'a PackURI) -> Option<&'a str> {
        let membername = pack_uri.membername();
        if self.members.contains_key(membername) {
            return Some(membername);
        }
        self.folded
            .get(&membername.to_lowercase())
            .map(String::as_str)
    }

    pub fn blob_for(&self, pack_uri: &PackURI) -> Result<&[u8]> {
        self.resolve(pack_uri)
            .and_then(|name| self.members.get(name))
            .map(Vec::as_slice)
            .ok_or_else(|| OpcError::PartNotFound(pack_uri.to_string()))
    }

    pub fn take_blob(&mut self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        let name = self
            .resolve(pack_uri)
            .map(str::to_string)
            .ok_or_else(|| OpcError::PartNotFound(pack_uri.to_string()))?;
        self.members
            .remove(&name)
            .ok_or_else(|| OpcError::PartNotFound(pack_uri.to_string()))
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        self.resolve(pack_uri).is_some()
    }
}

/// Reader over a directory laid out like an unzipped package.
#[derive(Debug, Clone)]
pub struct DirPkgReader {
    root: PathBuf,
}

impl DirPkgReader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, pack_uri: &PackURI) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(pack_uri.membername().split('/'));
        path
    }

    /// File holding the member for `pack_uri`. Like the ZIP reader, an
    /// exact name wins and a case-insensitive match is the fallback.
    fn resolve(&self, pack_uri: &PackURI) -> Option<PathBuf> {
        let path = self.path_for(pack_uri);
        if path.is_file() {
            return Some(path);
        }

        let wanted = pack_uri.membername().to_lowercase();
        let names = self.member_names().ok()?;
        names
            .iter()
            .find(|name| name.to_lowercase() == wanted)
            .map(|name| {
                let mut path = self.root.clone();
                path.extend(name.split('/'));
                path
            })
    }

    pub fn blob_for(&self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        let path = self
            .resolve(pack_uri)
            .ok_or_else(|| OpcError::PartNotFound(pack_uri.to_string()))?;
        Ok(fs::read(&path)?)
    }

    pub fn contains(&self, pack_uri: &PackURI) -> bool {
        self.resolve(pack_uri).is_some()
    }

    /// Relative paths of every file under the root, `/`-separated and sorted.
    pub fn member_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let name: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect();
                    names.push(name.join("/"));
                }
            }
        }

        names.sort_unstable();
        Ok(names)
    }
}

/// Compression applied to every member of a written package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

/// Physical package writer that produces a ZIP archive.
pub struct PhysPkgWriter<W: Write + Seek> {
    archive: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl PhysPkgWriter<Cursor<Vec<u8>>> {
    /// Create a new package writer that writes to memory.
    pub fn new() -> Self {
        Self::in_memory(Compression::default())
    }

    pub fn in_memory(compression: Compression) -> Self {
        Self::with_writer(Cursor::new(Vec::new()), compression)
    }

    /// Finish writing and return the package bytes.
    pub fn finish_to_bytes(self) -> Result<Vec<u8>> {
        Ok(self.finish()?.into_inner())
    }

    /// Finish the archive in memory, then write it to `path` in one go.
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let bytes = self.finish_to_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for PhysPkgWriter<Cursor<Vec<u8>>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Seek> PhysPkgWriter<W> {
    pub fn with_writer(writer: W, compression: Compression) -> Self {
        Self {
            archive: ZipWriter::new(writer),
            options: SimpleFileOptions::default().compression_method(compression.method()),
        }
    }

    /// Write `blob` as the member for `pack_uri`.
    pub fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        self.archive.start_file(pack_uri.membername(), self.options)?;
        self.archive.write_all(blob)?;
        Ok(())
    }

    /// Write the central directory and return the underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.archive.finish()?)
    }
}
