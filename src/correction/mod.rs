// SQL correction pipeline.
//
// Each corrector enforces one structural invariant on a statement's SQL
// text and is idempotent. The pipeline runs correctors in a fixed order; a
// corrector that cannot handle the statement reports an error and the
// pipeline continues with the statement unchanged.

pub mod keyword;
pub mod select_field;

pub use keyword::KeywordCorrector;
pub use select_field::{InjectionOrder, SelectFieldAppendCorrector};

use crate::models::QueryStatement;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("statement is not parseable: {0}")]
    Unparseable(String),
}

pub trait Corrector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite the statement's SQL in place. Implementations must be
    /// idempotent and must not modify the statement when returning an error.
    fn correct(&self, statement: &mut QueryStatement) -> Result<(), CorrectionError>;
}

/// Ordered chain of correctors applied to every planned statement
pub struct CorrectionPipeline {
    correctors: Vec<Box<dyn Corrector>>,
}

impl CorrectionPipeline {
    pub fn new(correctors: Vec<Box<dyn Corrector>>) -> Self {
        Self { correctors }
    }

    /// The default chain: select-field completion, then keyword casing
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(SelectFieldAppendCorrector::default()),
            Box::new(KeywordCorrector),
        ])
    }

    /// Run every corrector in order; correction failures are absorbed and
    /// the statement passes through unchanged
    pub fn apply(&self, statement: &mut QueryStatement) {
        for corrector in &self.correctors {
            if let Err(e) = corrector.correct(statement) {
                tracing::warn!(
                    corrector = corrector.name(),
                    "correction skipped, statement unchanged: {}",
                    e
                );
            }
        }
    }
}
