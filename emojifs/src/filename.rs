//! Mapping between emoji names and the filenames shown in the mount.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::content_type::ContentTypeResolver;
use crate::error::{EmojiFsError, Result};
use crate::remote::Emoji;

/// MIME type -> filename suffix. Mattermost accepts GIF, JPEG and PNG emoji.
#[derive(Debug, Clone)]
pub struct SuffixTable {
    suffixes: HashMap<String, String>,
}

impl Default for SuffixTable {
    fn default() -> Self {
        let mut table = Self {
            suffixes: HashMap::new(),
        };
        table.insert("image/gif", ".gif");
        table.insert("image/jpeg", ".jpg");
        table.insert("image/png", ".png");
        table
    }
}

impl SuffixTable {
    pub fn insert(&mut self, mime: &str, suffix: &str) {
        let suffix = if suffix.starts_with('.') {
            suffix.to_string()
        } else {
            format!(".{suffix}")
        };
        self.suffixes.insert(essence(mime), suffix);
    }

    /// Suffix for a `Content-Type` value; parameters such as `; charset=` are ignored.
    pub fn suffix_for(&self, content_type: &str) -> Option<&str> {
        self.suffixes.get(&essence(content_type)).map(String::as_str)
    }

    /// Parse a `MIME=.ext` mapping as given on the command line.
    pub fn parse_mapping(raw: &str) -> Result<(String, String)> {
        let invalid = || EmojiFsError::InvalidConfig(format!("expected MIME=.ext, got '{raw}'"));
        let (mime, suffix) = raw.split_once('=').ok_or_else(invalid)?;
        let (mime, suffix) = (mime.trim(), suffix.trim());
        if !mime.contains('/') || suffix.trim_start_matches('.').is_empty() || suffix.contains('/')
        {
            return Err(invalid());
        }
        Ok((mime.to_string(), suffix.to_string()))
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Catalog lookup key for a path: the basename without its extension.
/// Never fails; a miss is detected by whoever looks the key up.
pub fn logical_name_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct FilenameMapper {
    resolver: Arc<ContentTypeResolver>,
    suffixes: SuffixTable,
}

impl FilenameMapper {
    pub fn new(resolver: Arc<ContentTypeResolver>, suffixes: SuffixTable) -> Self {
        Self { resolver, suffixes }
    }

    /// Display filename of an emoji: its name plus the suffix of its current type.
    pub async fn filename_for(&self, entry: &Emoji) -> Result<String> {
        let content_type = self.resolver.resolve(&entry.id).await?;
        let suffix = self.suffixes.suffix_for(&content_type).ok_or_else(|| {
            EmojiFsError::UnsupportedType {
                name: entry.name.clone(),
                content_type: content_type.clone(),
            }
        })?;
        Ok(format!("{}{suffix}", entry.name))
    }

    pub fn resolver(&self) -> &ContentTypeResolver {
        &self.resolver
    }
}
