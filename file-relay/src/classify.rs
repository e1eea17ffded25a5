//! File classification by extension.
//!
//! Every routing decision in the system starts here: the extension after the
//! final `.` of a filename decides which node physically owns the file.
//!
//! | Extension | Class                      | Owning store |
//! |-----------|----------------------------|--------------|
//! | `.c`      | [`FileClass::Source`]      | `smain`      |
//! | `.txt`    | [`FileClass::Text`]        | `stext`      |
//! | `.pdf`    | [`FileClass::Pdf`]         | `spdf`       |
//! | other     | [`FileClass::Unsupported`] | none         |

use std::fmt;

/// Storage class of a file, derived purely from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileClass {
    Source,
    Text,
    Pdf,
    Unsupported,
}

impl FileClass {
    /// Every class that some node can store, in listing order.
    pub const STORED: [FileClass; 3] = [FileClass::Source, FileClass::Text, FileClass::Pdf];

    /// Classify `filename` by the substring after its final `.`.
    ///
    /// A name without a dot, or whose only dot is the leading one of its
    /// final path component (`.c`, `docs/.txt`), is [`FileClass::Unsupported`].
    pub fn of(filename: &str) -> Self {
        let Some((stem, ext)) = filename.rsplit_once('.') else {
            return FileClass::Unsupported;
        };
        if stem.is_empty() || stem.ends_with('/') {
            return FileClass::Unsupported;
        }
        Self::from_extension(ext)
    }

    /// Parse an archive selector such as `.txt` or `txt`.
    pub fn from_marker(marker: &str) -> Self {
        Self::from_extension(marker.strip_prefix('.').unwrap_or(marker))
    }

    fn from_extension(ext: &str) -> Self {
        match ext {
            "c" => FileClass::Source,
            "txt" => FileClass::Text,
            "pdf" => FileClass::Pdf,
            _ => FileClass::Unsupported,
        }
    }

    /// Extension including the leading dot, `None` for unsupported files.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            FileClass::Source => Some(".c"),
            FileClass::Text => Some(".txt"),
            FileClass::Pdf => Some(".pdf"),
            FileClass::Unsupported => None,
        }
    }

    /// Name of the storage root that owns this class (`~/<name>`).
    pub fn store_name(self) -> Option<&'static str> {
        match self {
            FileClass::Source => Some("smain"),
            FileClass::Text => Some("stext"),
            FileClass::Pdf => Some("spdf"),
            FileClass::Unsupported => None,
        }
    }

    /// File name used when the whole class is downloaded as one archive.
    pub fn archive_name(self) -> Option<&'static str> {
        match self {
            FileClass::Source => Some("cfiles.tar"),
            FileClass::Text => Some("text.tar"),
            FileClass::Pdf => Some("pdf.tar"),
            FileClass::Unsupported => None,
        }
    }

    pub fn is_supported(self) -> bool {
        self != FileClass::Unsupported
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileClass::Source => write!(f, "source"),
            FileClass::Text => write!(f, "text"),
            FileClass::Pdf => write!(f, "pdf"),
            FileClass::Unsupported => write!(f, "unsupported"),
        }
    }
}
