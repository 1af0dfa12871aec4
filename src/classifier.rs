//! Backend error classification
//!
//! Maps raw failure text to a closed [`ErrorCategory`] by ordered,
//! case-insensitive substring matching, and supplies the message shown
//! to the user for each category.
//!
//! # Example
//!
//! ```rust
//! use whisper_fallback::classifier::{ErrorCategory, ErrorClassifier};
//!
//! let classifier = ErrorClassifier::new();
//! let category = classifier.categorize("MPS backend out of memory (MPS allocated: 9 GB)");
//! assert_eq!(category, ErrorCategory::OutOfMemory);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::FallbackError;

/// Category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The sparse tensor backend cannot run the operation
    #[serde(rename = "sparse_backend")]
    SparseBackendUnsupported,
    /// Tensor memory layout not supported by the backend
    #[serde(rename = "memory_format")]
    MemoryFormatMismatch,
    /// Backend ran out of device memory
    OutOfMemory,
    /// Operation not implemented on this backend
    UnsupportedOperation,
    /// Nothing in the pattern table matched
    Unknown,
}

impl ErrorCategory {
    /// All categories, in counter order
    pub const ALL: [ErrorCategory; 5] = [
        ErrorCategory::SparseBackendUnsupported,
        ErrorCategory::MemoryFormatMismatch,
        ErrorCategory::OutOfMemory,
        ErrorCategory::UnsupportedOperation,
        ErrorCategory::Unknown,
    ];

    /// Stable snake_case name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SparseBackendUnsupported => "sparse_backend",
            Self::MemoryFormatMismatch => "memory_format",
            Self::OutOfMemory => "out_of_memory",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the failing backend should lose the capability for good
    #[must_use]
    pub const fn is_backend_fatal(&self) -> bool {
        matches!(
            self,
            Self::SparseBackendUnsupported | Self::MemoryFormatMismatch
        )
    }

    const fn index(self) -> usize {
        match self {
            Self::SparseBackendUnsupported => 0,
            Self::MemoryFormatMismatch => 1,
            Self::OutOfMemory => 2,
            Self::UnsupportedOperation => 3,
            Self::Unknown => 4,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered pattern table; the first category with a matching substring wins.
/// Patterns are lowercase.
const ERROR_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::SparseBackendUnsupported,
        &[
            "sparsemps backend",
            "could not run 'aten::empty.memory_format' with arguments from the 'sparsemps' backend",
        ],
    ),
    (
        ErrorCategory::MemoryFormatMismatch,
        &["aten::empty.memory_format", "memory_format"],
    ),
    (
        ErrorCategory::OutOfMemory,
        &["mps backend out of memory", "metal out of memory", "out of memory"],
    ),
    (
        ErrorCategory::UnsupportedOperation,
        &[
            "operation not supported",
            "not implemented for mps",
            "not currently implemented for the mps device",
        ],
    ),
];

/// Language of user-facing messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageLocale {
    /// English
    #[default]
    English,
    /// Polish
    Polish,
}

impl FromStr for MessageLocale {
    type Err = FallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "pl" | "polish" => Ok(Self::Polish),
            other => Err(FallbackError::UnknownLocale(other.to_string())),
        }
    }
}

fn english_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::SparseBackendUnsupported => {
            "GPU compatibility problem detected. Switching backend for stability."
        }
        ErrorCategory::MemoryFormatMismatch => {
            "GPU memory format problem. Using an alternative backend."
        }
        ErrorCategory::OutOfMemory => "GPU is out of memory. Switching backend.",
        ErrorCategory::UnsupportedOperation => {
            "Operation not supported by the GPU. Using an alternative backend."
        }
        ErrorCategory::Unknown => "Unknown GPU problem. Switching backend to be safe.",
    }
}

fn polish_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::SparseBackendUnsupported => {
            "Wykryto problem kompatybilności z GPU. Przełączam na CPU dla stabilności."
        }
        ErrorCategory::MemoryFormatMismatch => {
            "Problem z formatem pamięci GPU. Używam CPU jako alternatywy."
        }
        ErrorCategory::OutOfMemory => "Brak pamięci GPU. Przełączam na CPU.",
        ErrorCategory::UnsupportedOperation => "Operacja nieobsługiwana przez GPU. Używam CPU.",
        ErrorCategory::Unknown => "Nieznany problem z GPU. Przełączam na CPU dla bezpieczeństwa.",
    }
}

/// Error classifier with per-category occurrence counters
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    locale: MessageLocale,
    retained: BTreeSet<ErrorCategory>,
    counts: [AtomicU64; 5],
}

impl ErrorClassifier {
    /// Classifier with English messages where every category triggers fallback
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message locale
    #[must_use]
    pub fn with_locale(mut self, locale: MessageLocale) -> Self {
        self.locale = locale;
        self
    }

    /// Keep the current backend for `category` instead of falling back.
    ///
    /// Backend-fatal categories always fall back and are ignored here.
    #[must_use]
    pub fn with_retained(mut self, category: ErrorCategory) -> Self {
        if !category.is_backend_fatal() {
            self.retained.insert(category);
        }
        self
    }

    /// Message locale
    #[must_use]
    pub fn locale(&self) -> MessageLocale {
        self.locale
    }

    /// Categorize raw error text and bump that category's counter
    pub fn categorize(&self, error_text: &str) -> ErrorCategory {
        let category = categorize_text(error_text);
        self.counts[category.index()].fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%category, "categorized backend error");
        category
    }

    /// Whether `category` should move work to another backend
    #[must_use]
    pub fn should_trigger_fallback(&self, category: ErrorCategory) -> bool {
        !self.retained.contains(&category)
    }

    /// User-facing explanation for `category`
    #[must_use]
    pub fn user_message(&self, category: ErrorCategory) -> &'static str {
        match self.locale {
            MessageLocale::English => english_message(category),
            MessageLocale::Polish => polish_message(category),
        }
    }

    /// Occurrences of one category so far
    #[must_use]
    pub fn count(&self, category: ErrorCategory) -> u64 {
        self.counts[category.index()].load(Ordering::Relaxed)
    }

    /// Occurrence counters keyed by category name
    #[must_use]
    pub fn error_statistics(&self) -> BTreeMap<String, u64> {
        ErrorCategory::ALL
            .iter()
            .map(|category| (category.name().to_string(), self.count(*category)))
            .collect()
    }
}

/// Pure categorization over lower-cased text, without counting
#[must_use]
pub fn categorize_text(error_text: &str) -> ErrorCategory {
    let normalized = error_text.to_lowercase();
    ERROR_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| normalized.contains(p)))
        .map_or(ErrorCategory::Unknown, |(category, _)| *category)
}
