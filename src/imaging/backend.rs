//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the one operation the media store
//! needs from an imaging library: an in-place optimize pass.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked into the binary.

use super::params::OptimizeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// The media store only talks to this trait, so downloads can be tested
/// without decoding real pixels.
pub trait ImageBackend: Send + Sync {
    /// Execute an optimize pass (flatten + bound width + JPEG re-encode).
    fn optimize(&self, params: &OptimizeParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::Quality;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, every optimize call fails with this message.
        pub fail_optimize: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Optimize {
            source: String,
            output: String,
            max_width: u32,
            quality: u32,
            background: [u8; 3],
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: &str) -> Self {
            Self {
                fail_optimize: Some(message.to_string()),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn optimize(&self, params: &OptimizeParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Optimize {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                max_width: params.max_width,
                quality: params.quality.value(),
                background: params.background,
            });
            match &self.fail_optimize {
                Some(message) => Err(BackendError::ProcessingFailed(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn mock_records_optimize() {
        let backend = MockBackend::new();

        backend
            .optimize(&OptimizeParams {
                source: "/static/images/a.png".into(),
                output: "/static/images/a.png".into(),
                max_width: 1920,
                quality: Quality::new(85),
                background: [255, 255, 255],
            })
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Optimize {
                max_width: 1920,
                quality: 85,
                background: [255, 255, 255],
                ..
            }
        ));
    }

    #[test]
    fn failing_mock_still_records() {
        let backend = MockBackend::failing("corrupt");
        let result = backend.optimize(&OptimizeParams {
            source: "/a.jpg".into(),
            output: "/a.jpg".into(),
            max_width: 0,
            quality: Quality::default(),
            background: [0, 0, 0],
        });
        assert!(result.is_err());
        assert_eq!(backend.get_operations().len(), 1);
    }
}
