//! Schema statement extraction
//!
//! Reads a schema file from storage and returns its DDL text: decompressed,
//! decoded with the configured character set, with comment-only and blank
//! lines dropped.

use std::borrow::Cow;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{Compression, FileInfo};
use crate::error::{LoaderError, LoaderResult};
use crate::storage::StorageBackend;

/// Character set of schema files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CharacterSet {
    /// UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8
    #[default]
    Auto,
    Utf8,
    Latin1,
    /// Raw bytes, invalid UTF-8 sequences are replaced
    Binary,
}

impl FromStr for CharacterSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "auto" => Ok(CharacterSet::Auto),
            "utf8" | "utf8mb4" => Ok(CharacterSet::Utf8),
            "latin1" => Ok(CharacterSet::Latin1),
            "binary" => Ok(CharacterSet::Binary),
            _ => Err(format!(
                "unsupported character set '{}', use auto, utf8mb4, latin1 or binary",
                s
            )),
        }
    }
}

impl TryFrom<String> for CharacterSet {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CharacterSet> for String {
    fn from(value: CharacterSet) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CharacterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterSet::Auto => write!(f, "auto"),
            CharacterSet::Utf8 => write!(f, "utf8mb4"),
            CharacterSet::Latin1 => write!(f, "latin1"),
            CharacterSet::Binary => write!(f, "binary"),
        }
    }
}

impl CharacterSet {
    fn decode<'a>(&self, path: &str, data: &'a [u8]) -> LoaderResult<Cow<'a, str>> {
        match self {
            CharacterSet::Utf8 => std::str::from_utf8(data).map(Cow::Borrowed).map_err(|e| {
                LoaderError::Decode {
                    path: path.to_string(),
                    charset: self.to_string(),
                    message: e.to_string(),
                }
            }),
            CharacterSet::Auto => Ok(std::str::from_utf8(data)
                .map(Cow::Borrowed)
                .unwrap_or_else(|_| decode_latin1(data))),
            CharacterSet::Latin1 => Ok(decode_latin1(data)),
            CharacterSet::Binary => Ok(String::from_utf8_lossy(data)),
        }
    }
}

fn decode_latin1(data: &[u8]) -> Cow<'_, str> {
    Cow::Owned(data.iter().map(|&b| char::from(b)).collect::<String>())
}

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn decompress(path: &str, compression: Compression, data: Vec<u8>) -> LoaderResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(data.len() * 4);
            GzDecoder::new(data.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| LoaderError::Decompress {
                    path: path.to_string(),
                    compression: compression.to_string(),
                    message: e.to_string(),
                })?;
            Ok(out)
        }
        other => Err(LoaderError::UnsupportedCompression {
            path: path.to_string(),
            compression: other.to_string(),
        }),
    }
}

/// Strip blank and comment-only lines from a dumped schema script.
fn clean_statement(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the DDL text of a schema file.
pub async fn export_statement<B: StorageBackend + ?Sized>(
    storage: &B,
    file: &FileInfo,
    charset: CharacterSet,
    cancel: &CancellationToken,
) -> LoaderResult<String> {
    let path = &file.file_meta.path;
    let data = cancel
        .run_until_cancelled(storage.read_file(path))
        .await
        .ok_or(LoaderError::Cancelled)?
        .map_err(|e| LoaderError::storage(format!("read schema file '{}'", path), e))?;

    let data = decompress(path, file.file_meta.compression, data)?;
    let text = charset.decode(path, &data)?;
    Ok(clean_statement(&text))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression as GzLevel;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::source::{SourceFileMeta, SourceType, TableName};
    use crate::storage::MemoryStorageBackend;

    fn schema_file(path: &str, compression: Compression) -> FileInfo {
        FileInfo::new(
            TableName::new("db", "t"),
            SourceFileMeta {
                path: path.to_string(),
                source_type: SourceType::TableSchema,
                compression,
                sort_key: String::new(),
                file_size: 0,
            },
        )
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("db"), "`db`");
        assert_eq!(escape_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_clean_statement_drops_comments() {
        let text = "-- dumped by mydumper\n\n/*!40101 SET NAMES binary*/;\n# note\n  CREATE TABLE t (\n  id INT\n);\n";
        assert_eq!(
            clean_statement(text),
            "/*!40101 SET NAMES binary*/;\nCREATE TABLE t (\nid INT\n);"
        );
    }

    #[test]
    fn test_character_sets() {
        assert_eq!("UTF8MB4".parse::<CharacterSet>().unwrap(), CharacterSet::Utf8);
        assert!("gbk".parse::<CharacterSet>().is_err());

        let latin = [b'c', 0xE9];
        assert!(CharacterSet::Utf8.decode("f", &latin).is_err());
        assert_eq!(CharacterSet::Auto.decode("f", &latin).unwrap(), "cé");
        assert_eq!(CharacterSet::Latin1.decode("f", &latin).unwrap(), "cé");
    }

    #[tokio::test]
    async fn test_export_plain_statement() {
        let storage = MemoryStorageBackend::with_files([(
            "db.t-schema.sql",
            "-- header\nCREATE TABLE t (id INT);\n",
        )]);
        let stmt = export_statement(
            &storage,
            &schema_file("db.t-schema.sql", Compression::None),
            CharacterSet::Auto,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(stmt, "CREATE TABLE t (id INT);");
    }

    #[tokio::test]
    async fn test_export_gzip_statement() {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::fast());
        encoder.write_all(b"CREATE TABLE t (id INT);").unwrap();
        let storage =
            MemoryStorageBackend::with_files([("db.t-schema.sql.gz", encoder.finish().unwrap())]);

        let stmt = export_statement(
            &storage,
            &schema_file("db.t-schema.sql.gz", Compression::Gzip),
            CharacterSet::Utf8,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(stmt, "CREATE TABLE t (id INT);");
    }

    #[tokio::test]
    async fn test_export_corrupt_gzip() {
        let storage = MemoryStorageBackend::with_files([("db.t-schema.sql.gz", "not gzip")]);
        let err = export_statement(
            &storage,
            &schema_file("db.t-schema.sql.gz", Compression::Gzip),
            CharacterSet::Auto,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoaderError::Decompress { ref compression, .. } if compression == "gzip"));
        assert!(err.to_string().starts_with("failed to decompress 'db.t-schema.sql.gz' (gzip)"));
    }

    #[tokio::test]
    async fn test_export_unsupported_compression() {
        let storage = MemoryStorageBackend::with_files([("db.t-schema.sql.zst", "x")]);
        let err = export_statement(
            &storage,
            &schema_file("db.t-schema.sql.zst", Compression::Zstd),
            CharacterSet::Auto,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedCompression { .. }));
    }

    #[tokio::test]
    async fn test_export_cancelled() {
        let storage = MemoryStorageBackend::with_files([("db.t-schema.sql", "x")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = export_statement(
            &storage,
            &schema_file("db.t-schema.sql", Compression::None),
            CharacterSet::Auto,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoaderError::Cancelled));
    }
}
