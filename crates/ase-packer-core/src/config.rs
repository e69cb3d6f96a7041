use serde::{Deserialize, Serialize};

use crate::error::{AsePackerError, Result};

/// Per-page packing options, persisted in the page document and in `PageOptions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PageOptions {
    /// Side length of the square page texture in pixels.
    pub size: u32,
    /// Gutter between packed images. Half of it sits on each side of the content; edge pixels
    /// are extruded into it when it is at least 2.
    pub padding: u32,
    /// Store sprites as palette rows instead of colors (see [`crate::palette`]).
    pub pack_indexed: bool,
    /// Sprites that keep their colors on an indexed page.
    pub indexing_excluded_names: Vec<String>,
    /// Largest per-channel distance still treated as an exact palette match.
    pub indexing_equality_threshold: u8,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            size: 2048,
            padding: 2,
            pack_indexed: false,
            indexing_excluded_names: Vec::new(),
            indexing_equality_threshold: 16,
        }
    }
}

impl PageOptions {
    /// Validates the options.
    ///
    /// Returns an error if the page is empty or the padding leaves no room for content.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(AsePackerError::InvalidConfig(
                "page size must be greater than zero".into(),
            ));
        }
        if self.padding >= self.size {
            return Err(AsePackerError::InvalidConfig(format!(
                "padding ({}) leaves no usable space on a {}px page",
                self.padding, self.size
            )));
        }
        Ok(())
    }

    /// Whether `sprite` is stored as palette rows on this page.
    pub fn is_indexed(&self, sprite: &str) -> bool {
        self.pack_indexed && !self.indexing_excluded_names.iter().any(|n| n == sprite)
    }

    /// Create a fluent builder for `PageOptions`.
    pub fn builder() -> PageOptionsBuilder {
        PageOptionsBuilder::new()
    }
}

/// Builder for `PageOptions` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct PageOptionsBuilder {
    opts: PageOptions,
}

impl PageOptionsBuilder {
    pub fn new() -> Self {
        Self {
            opts: PageOptions::default(),
        }
    }
    pub fn size(mut self, v: u32) -> Self {
        self.opts.size = v;
        self
    }
    pub fn padding(mut self, v: u32) -> Self {
        self.opts.padding = v;
        self
    }
    pub fn pack_indexed(mut self, v: bool) -> Self {
        self.opts.pack_indexed = v;
        self
    }
    pub fn exclude_from_indexing(mut self, name: impl Into<String>) -> Self {
        self.opts.indexing_excluded_names.push(name.into());
        self
    }
    pub fn indexing_equality_threshold(mut self, v: u8) -> Self {
        self.opts.indexing_equality_threshold = v;
        self
    }
    pub fn build(self) -> PageOptions {
        self.opts
    }
}
