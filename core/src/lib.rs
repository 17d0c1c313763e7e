pub mod bandwagon;
pub mod blend;
pub mod consensus;
pub mod error;
pub mod extract;
pub mod media;
pub mod omega;
pub mod policy;
pub mod result;
pub mod scores;
pub mod threshold;

pub use bandwagon::{ControversySignal, detect_bandwagon};
pub use blend::{AbbfInputs, AbbfReport, BlendMode, BlendOutcome, DimensionAudit, blend, reconcile};
pub use consensus::{ConsensusReliability, base_omega};
pub use error::{DecodeError, EngineError, ExtractError, ScoreError};
pub use media::{Language, Medium};
pub use omega::{OmegaPolicy, OmegaSource, OmegaVector, ResolvedOmega, resolve_omega};
pub use result::{AnalysisResult, GroundingCitation, SourceAnalysis};
pub use scores::{Dimension, DimensionClass, ScoreVector};
pub use threshold::{ThresholdOutcome, ThresholdRule, ThresholdSignals, Verdict, VerdictBasis};
