// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Extension values and the files they are matched against.

use std::collections::HashSet;
use std::fmt;

use super::error::LocalValidationError;

/// Longest extension accepted, counted in characters.
pub const MAX_EXTENSION_LEN: usize = 20;

/// Most custom extensions a blocklist may hold.
pub const MAX_CUSTOM_EXTENSIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Predefined, toggled on and off.
    Fixed,
    /// Added and removed by the user.
    Custom,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Fixed => f.pad("fixed"),
            Origin::Custom => f.pad("custom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockedExtension {
    pub value: String,
    pub origin: Origin,
}

impl BlockedExtension {
    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: Origin::Fixed,
        }
    }

    pub fn custom(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            origin: Origin::Custom,
        }
    }
}

impl fmt::Display for BlockedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A file the user picked, before it reaches the upload queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    pub size: Option<u64>,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

/// Text after the last `.` of `name`, lowercased. Empty when there is no dot.
pub fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Trims, lowercases and strips one leading dot, then checks emptiness and length.
pub fn normalize_extension(raw: &str) -> Result<String, LocalValidationError> {
    let lowered = raw.trim().to_lowercase();
    let ext = lowered.strip_prefix('.').unwrap_or(&lowered);

    if ext.is_empty() {
        return Err(LocalValidationError::EmptyInput);
    }
    if ext.chars().count() > MAX_EXTENSION_LEN {
        return Err(LocalValidationError::TooLong);
    }
    Ok(ext.to_string())
}

/// The set of extensions blocked at the moment a selection is made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    entries: HashSet<String>,
}

impl Blocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ext: &str) {
        self.entries.insert(ext.to_lowercase());
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.entries.contains(&ext.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Blocklist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Blocklist::new();
        for ext in iter {
            list.insert(ext.as_ref());
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.txt"), "txt");
        assert_eq!(extension_of("b.BAT"), "bat");
        assert_eq!(extension_of("archive.tar.GZ"), "gz");
        assert_eq!(extension_of("d"), "");
        assert_eq!(extension_of("trailing."), "");
        assert_eq!(extension_of(".gitignore"), "gitignore");
    }

    #[test]
    fn test_normalize_strips_whitespace_case_and_dot() {
        assert_eq!(normalize_extension(" .SH ").unwrap(), "sh");
        assert_eq!(normalize_extension("PHP").unwrap(), "php");
        // only a single leading dot is stripped
        assert_eq!(normalize_extension("..sh").unwrap(), ".sh");
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert_eq!(normalize_extension(""), Err(LocalValidationError::EmptyInput));
        assert_eq!(normalize_extension("   "), Err(LocalValidationError::EmptyInput));
        assert_eq!(normalize_extension(" . "), Err(LocalValidationError::EmptyInput));
    }

    #[test]
    fn test_normalize_length_limit() {
        let twenty = "a".repeat(MAX_EXTENSION_LEN);
        assert_eq!(normalize_extension(&twenty).unwrap(), twenty);

        let twenty_one = "a".repeat(MAX_EXTENSION_LEN + 1);
        assert_eq!(
            normalize_extension(&twenty_one),
            Err(LocalValidationError::TooLong)
        );
        // the stripped dot does not count towards the limit
        assert!(normalize_extension(&format!(".{twenty}")).is_ok());
    }

    #[test]
    fn test_blocklist_is_case_insensitive() {
        let list: Blocklist = ["BAT", "sh"].into_iter().collect();
        assert!(list.contains("bat"));
        assert!(list.contains("SH"));
        assert!(!list.contains("txt"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_blocklist_collapses_duplicates() {
        let list: Blocklist = ["exe", "EXE", "exe"].into_iter().collect();
        assert_eq!(list.len(), 1);
    }
}
