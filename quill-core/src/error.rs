use quill_ir::Position;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("SPIR-V generation error: {0}")]
    SpirvError(String, Option<Position>),

    #[error("Unsupported feature: {0}")]
    Unsupported(String, Option<Position>),

    #[error("Layout error: {0}")]
    LayoutError(String, Option<Position>),

    #[error("{} error(s) during SPIR-V generation", .0.len())]
    Diagnostics(Vec<CompilerError>),

    #[error("SPIR-V builder error: {0}")]
    SpirvBuilderError(#[from] rspirv::dr::Error),
}

impl CompilerError {
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::SpirvError(_, position) => *position,
            Self::Unsupported(_, position) => *position,
            Self::LayoutError(_, position) => *position,
            Self::Diagnostics(errors) => errors.first().and_then(CompilerError::position),
            Self::SpirvBuilderError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;

#[macro_export]
macro_rules! bail_spirv {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::SpirvError(format!($($arg)*), None))
    };
}

/// Collects recoverable errors so one pass can surface all of them.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Vec<CompilerError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: CompilerError) {
        log::debug!("reported: {}", error);
        self.errors.push(error);
    }

    pub fn layout_error(&mut self, position: Position, message: impl Into<String>) {
        self.report(CompilerError::LayoutError(message.into(), Some(position)));
    }

    pub fn unsupported(&mut self, position: Position, message: impl Into<String>) {
        self.report(CompilerError::Unsupported(message.into(), Some(position)));
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CompilerError] {
        &self.errors
    }

    /// `Err(Diagnostics)` if anything was reported.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CompilerError::Diagnostics(self.errors))
        }
    }
}
