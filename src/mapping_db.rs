//! Controller mapping database
//!
//! Unmapped hardware would quietly report the wrong buttons, so there is no
//! fallback to an empty database: the bundled copy ships inside the binary and
//! a database that is missing, unreadable or malformed aborts startup.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SDL_GameControllerDB-format mappings compiled into the binary.
pub const BUNDLED_MAPPINGS: &str = include_str!("../assets/gamecontrollerdb.txt");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    Bundled,
    File(PathBuf),
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSource::Bundled => write!(f, "bundled database"),
            MappingSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MappingDbError {
    #[error("Failed to read mapping database {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Mapping database {0} contains no mappings")]
    Empty(MappingSource),

    #[error("Invalid mapping in {origin} at line {line}: {reason}")]
    InvalidLine {
        origin: MappingSource,
        line: usize,
        reason: String,
    },
}

/// One controller entry of the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub guid: String,
    pub name: String,
    pub platform: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MappingDatabase {
    source: MappingSource,
    text: String,
    entries: Vec<MappingEntry>,
}

impl MappingDatabase {
    pub fn bundled() -> Result<Self, MappingDbError> {
        Self::parse(MappingSource::Bundled, BUNDLED_MAPPINGS)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MappingDbError> {
        let path = path.as_ref();
        debug!("Reading controller mappings from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| MappingDbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(MappingSource::File(path.to_path_buf()), &content)
    }

    /// Loads `path` if given, the bundled database otherwise.
    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self, MappingDbError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::bundled(),
        }
    }

    pub fn parse(source: MappingSource, content: &str) -> Result<Self, MappingDbError> {
        let mut entries = Vec::new();
        let mut lines = Vec::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let entry = parse_entry(line).map_err(|reason| MappingDbError::InvalidLine {
                origin: source.clone(),
                line: index + 1,
                reason,
            })?;
            entries.push(entry);
            lines.push(line);
        }

        if entries.is_empty() {
            return Err(MappingDbError::Empty(source));
        }

        info!("Loaded {} controller mappings from {}", entries.len(), source);
        Ok(Self {
            source,
            text: lines.join("\n"),
            entries,
        })
    }

    pub fn source(&self) -> &MappingSource {
        &self.source
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_guid(&self, guid: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.guid.eq_ignore_ascii_case(guid))
    }

    /// Validated mapping lines, one per entry, ready for the input subsystem.
    pub fn as_sdl_text(&self) -> &str {
        &self.text
    }
}

fn parse_entry(line: &str) -> Result<MappingEntry, String> {
    let mut fields = line.split(',');

    let guid = fields.next().unwrap_or_default().trim();
    let is_hex_guid = guid.len() == 32 && guid.chars().all(|c| c.is_ascii_hexdigit());
    if !is_hex_guid && guid != "xinput" {
        return Err(format!("'{guid}' is not a controller GUID"));
    }

    let name = fields.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err("missing controller name".to_string());
    }

    let mut platform = None;
    let mut bindings = 0;
    for field in fields.map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = field
            .split_once(':')
            .ok_or_else(|| format!("'{field}' is not a key:value binding"))?;
        if key == "platform" {
            platform = Some(value.to_string());
        } else {
            bindings += 1;
        }
    }

    if bindings == 0 {
        return Err(format!("'{name}' has no bindings"));
    }

    Ok(MappingEntry {
        guid: guid.to_string(),
        name: name.to_string(),
        platform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const X360: &str = "030000005e0400008e02000014010000,X360 Controller,a:b0,b:b1,platform:Linux,";

    #[test]
    fn bundled_database_loads() {
        let db = MappingDatabase::bundled().unwrap();
        assert!(!db.is_empty());
        assert_eq!(db.source(), &MappingSource::Bundled);
        assert!(db.contains_guid("xinput"));
        assert!(!db.as_sdl_text().contains('#'));
        assert_eq!(db.as_sdl_text().lines().count(), db.len());
    }

    #[test]
    fn parses_platform_and_skips_comments() {
        let content = format!("# header\n\n{X360}\n");
        let db = MappingDatabase::parse(MappingSource::Bundled, &content).unwrap();

        assert_eq!(db.len(), 1);
        let entry = &db.entries()[0];
        assert_eq!(entry.name, "X360 Controller");
        assert_eq!(entry.platform.as_deref(), Some("Linux"));
        assert!(db.contains_guid("030000005E0400008E02000014010000"));
    }

    #[test]
    fn empty_database_is_fatal() {
        let err = MappingDatabase::parse(MappingSource::Bundled, "# only comments\n").unwrap_err();
        assert!(matches!(err, MappingDbError::Empty(MappingSource::Bundled)));
    }

    #[test]
    fn malformed_line_reports_its_position() {
        let content = format!("{X360}\nnot-a-guid,Broken,a:b0\n");
        let err = MappingDatabase::parse(MappingSource::Bundled, &content).unwrap_err();
        assert!(matches!(err, MappingDbError::InvalidLine { line: 2, .. }));
    }

    #[test]
    fn entry_without_bindings_is_rejected() {
        let err = MappingDatabase::parse(
            MappingSource::Bundled,
            "030000005e0400008e02000014010000,Bare,platform:Linux,",
        )
        .unwrap_err();
        assert!(matches!(err, MappingDbError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = MappingDatabase::load("/definitely/not/here/gamecontrollerdb.txt").unwrap_err();
        assert!(matches!(err, MappingDbError::Io { .. }));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("padhub-mappings-{}.txt", std::process::id()));
        std::fs::write(&path, X360).unwrap();

        let db = MappingDatabase::load_or_bundled(Some(&path)).unwrap();
        assert_eq!(db.source(), &MappingSource::File(path.clone()));
        assert_eq!(db.len(), 1);

        std::fs::remove_file(&path).unwrap();
    }
}
