//! Temp artifacts for file- and directory-typed parameters.
//!
//! Every request gets its own directory under the shared output root, created
//! on first use. Uploads are written there, output placeholders are created
//! there and output directories are zipped there after the process exits.
//! Nothing is removed afterwards; cleaning the output root is left to
//! external housekeeping.

use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::bridge::field_id::{FieldId, FormKind, ValueType};
use crate::{Error, Result};

/// URL prefix under which the output root is served.
pub const RESULTS_MOUNT: &str = "/static/results";

/// Suffix for output files when the user did not name them.
const DEFAULT_OUT_SUFFIX: &str = ".out";

/// Per-request scratch space inside the shared output root.
#[derive(Debug)]
pub struct RequestWorkspace {
    output_root: PathBuf,
    dir: Option<PathBuf>,
}

impl RequestWorkspace {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            dir: None,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// The request directory, created on first call.
    pub fn dir(&mut self) -> io::Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }
        fs::create_dir_all(&self.output_root)?;
        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.output_root)?
            .keep();
        tracing::debug!(dir = %dir.display(), "created request directory");
        self.dir = Some(dir.clone());
        Ok(dir)
    }

    /// Create an empty, persistent file in the request directory.
    pub fn temp_file(&mut self, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
        let dir = self.dir()?;
        let (_, path) = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?
            .keep()?;
        Ok(path)
    }

    /// Create an empty, persistent directory in the request directory.
    pub fn temp_dir(&mut self, prefix: &str) -> io::Result<PathBuf> {
        let dir = self.dir()?;
        Ok(tempfile::Builder::new().prefix(prefix).tempdir_in(dir)?.keep())
    }

    /// URL under [`RESULTS_MOUNT`] for a file inside the output root.
    pub fn download_url(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.output_root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(format!("{}/{}", RESULTS_MOUNT, parts.join("/")))
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("static pattern"))
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Separators and whitespace become underscores, anything outside
/// `[A-Za-z0-9_.-]` is dropped and leading/trailing dots and underscores are
/// trimmed, so `../../etc/passwd` becomes `etc_passwd`.
pub fn sanitize_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Split a sanitized file name into a prefix and a dotted suffix.
fn split_name(name: &str) -> (String, String) {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, suffix)
}

/// Extract a zip archive into a fresh directory of the workspace.
pub fn unpack_zip(workspace: &mut RequestWorkspace, archive: &Path) -> Result<PathBuf> {
    let dir = workspace.temp_dir("unzipped-")?;
    tracing::debug!(archive = %archive.display(), dir = %dir.display(), "extracting upload");
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    zip.extract(&dir)?;
    Ok(dir)
}

/// Zip the contents of `dir` into a new `<prefix>*.zip` in the workspace.
pub fn pack_dir(workspace: &mut RequestWorkspace, prefix: &str, dir: &Path) -> Result<PathBuf> {
    let target = workspace.temp_file(prefix, ".zip")?;
    let mut zip = ZipWriter::new(File::create(&target)?);
    add_dir_to_zip(&mut zip, dir, dir, SimpleFileOptions::default())?;
    zip.finish()?;
    tracing::debug!(dir = %dir.display(), archive = %target.display(), "packed directory");
    Ok(target)
}

fn add_dir_to_zip<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    base: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let rel = path
            .strip_prefix(base)
            .map_err(|e| Error::Other(format!("{}: {}", path.display(), e)))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type()?.is_dir() {
            zip.add_directory(name, options)?;
            add_dir_to_zip(zip, base, &path, options)?;
        } else {
            zip.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, &mut *zip)?;
        }
    }
    Ok(())
}

/// What a path-typed field does with the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    /// Uploaded file passed by path
    InputFile,
    /// Empty file the process writes into, offered for download
    OutputFile,
    /// Uploaded zip unpacked into a directory, re-zipped afterwards
    InputDir,
    /// Empty directory the process writes into, zipped afterwards
    OutputDir,
}

impl ArtifactRole {
    pub fn for_value_type(value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::File { writable: false } => Some(Self::InputFile),
            ValueType::File { writable: true } => Some(Self::OutputFile),
            ValueType::Path { writable: false } => Some(Self::InputDir),
            ValueType::Path { writable: true } => Some(Self::OutputDir),
            _ => None,
        }
    }
}

/// A file uploaded with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Encoded field name the file was posted under
    pub field: String,
    /// File name as chosen by the client; empty when nothing was selected
    pub filename: String,
    pub data: Vec<u8>,
}

/// Filesystem state of one path-typed field.
#[derive(Debug)]
pub struct Artifact {
    pub role: ArtifactRole,
    /// Safe file-name prefix derived from the field name
    prefix: String,
    cli_name: String,
    /// File name typed by the user for optional output files
    requested_name: Option<String>,
    upload: Option<Upload>,
    path: Option<PathBuf>,
    link_name: Option<String>,
    downloadable: bool,
}

impl Artifact {
    /// Build the artifact for a field. `values` are the submitted text values,
    /// used as the requested name when an output file is shown as text.
    pub fn new(id: &FieldId, role: ArtifactRole, values: &[String], upload: Option<Upload>) -> Self {
        let requested_name = match (role, id.form_kind) {
            (ArtifactRole::OutputFile, FormKind::Text) => {
                Some(values.first().cloned().unwrap_or_default())
            }
            _ => None,
        };
        Self {
            role,
            prefix: sanitize_filename(&id.encode()),
            cli_name: id.cli_name.clone(),
            requested_name,
            upload,
            path: None,
            link_name: None,
            downloadable: false,
        }
    }

    /// The path handed to the process, once the pre-hook has run.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_downloadable(&self) -> bool {
        self.downloadable
    }

    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    /// Prepare the filesystem before the process starts.
    pub fn before_execute(&mut self, workspace: &mut RequestWorkspace) -> Result<()> {
        match self.role {
            ArtifactRole::InputFile => {
                self.path = Some(self.save_upload(workspace)?);
            }
            ArtifactRole::InputDir => {
                let archive = self.save_upload(workspace)?;
                self.path = Some(unpack_zip(workspace, &archive)?);
            }
            ArtifactRole::OutputFile => {
                let (suffix, link_name) = match &self.requested_name {
                    // An empty name leaves the optional output off the command line.
                    Some(name) if sanitize_filename(name).is_empty() => return Ok(()),
                    Some(name) => {
                        let safe = sanitize_filename(name);
                        (safe.clone(), safe)
                    }
                    None => (
                        DEFAULT_OUT_SUFFIX.to_string(),
                        format!("{}{}", self.cli_name, DEFAULT_OUT_SUFFIX),
                    ),
                };
                let path = workspace.temp_file(&self.prefix, &suffix)?;
                tracing::debug!(field = %self.cli_name, path = %path.display(), "created output file");
                self.path = Some(path);
                self.link_name = Some(link_name);
                self.downloadable = true;
            }
            ArtifactRole::OutputDir => {
                let path = workspace.temp_dir("out-")?;
                tracing::debug!(field = %self.cli_name, path = %path.display(), "created output directory");
                self.path = Some(path);
            }
        }
        Ok(())
    }

    /// Package results once the process has exited.
    pub fn after_execute(&mut self, workspace: &mut RequestWorkspace) -> Result<()> {
        if !matches!(self.role, ArtifactRole::InputDir | ArtifactRole::OutputDir) {
            return Ok(());
        }
        let Some(dir) = self.path.clone() else {
            return Ok(());
        };
        let archive = pack_dir(workspace, &self.prefix, &dir)?;
        self.path = Some(archive);
        self.link_name = Some(format!("{}.zip", self.cli_name));
        self.downloadable = true;
        Ok(())
    }

    fn save_upload(&mut self, workspace: &mut RequestWorkspace) -> Result<PathBuf> {
        let upload = match self.upload.take() {
            Some(upload) if !upload.filename.is_empty() => upload,
            _ => return Err(Error::MissingUpload(self.cli_name.clone())),
        };
        let safe = sanitize_filename(&upload.filename);
        let (stem, suffix) = split_name(&safe);
        let path = workspace.temp_file(&stem, &suffix)?;
        fs::write(&path, &upload.data)?;
        tracing::debug!(field = %self.cli_name, path = %path.display(), bytes = upload.data.len(), "saved upload");
        Ok(path)
    }
}
