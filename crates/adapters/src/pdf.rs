// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PDF rendering seam. Rendering itself happens outside the core; the
//! export stage only stores what comes back.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf rendering failed: {0}")]
    Render(String),
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(
        &self,
        report: &serde_json::Value,
        variant: &str,
    ) -> Result<Vec<u8>, PdfError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePdfRenderer;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Renderer returning a canned PDF header plus the report summary.
    pub struct FakePdfRenderer {
        calls: Mutex<Vec<String>>,
        fail: Mutex<bool>,
    }

    impl FakePdfRenderer {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: Mutex::new(false),
            }
        }

        pub fn fail_next(&self) {
            *self.fail.lock() = true;
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl Default for FakePdfRenderer {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl PdfRenderer for FakePdfRenderer {
        async fn render(
            &self,
            report: &serde_json::Value,
            variant: &str,
        ) -> Result<Vec<u8>, PdfError> {
            self.calls.lock().push(variant.to_string());
            if std::mem::take(&mut *self.fail.lock()) {
                return Err(PdfError::Render("injected render failure".to_string()));
            }
            let summary = report
                .get("summary")
                .and_then(|s| s.as_str())
                .unwrap_or("");
            Ok(format!("%PDF-1.7\n{summary}").into_bytes())
        }
    }
}
