//! # relay-pipe: select, relay, finalize
//!
//! The transfer engine of the audio relay service. Given an asset id it:
//!
//! 1. asks a [`Catalog`] for the asset's variants and picks the
//!    lowest-bitrate one of the requested kind,
//! 2. relays the variant's bytes into a storage sink with backpressure,
//! 3. makes the stored object public and reads back its metadata,
//! 4. answers the request exactly once.
//!
//! Transport, catalog and storage are all injected, so the whole flow runs
//! in-process against doubles.
//!
//! ```rust
//! use relay_pipe::{select, SelectionPolicy, StreamVariant};
//!
//! let variants = vec![
//!     StreamVariant::audio("hi", "webm", "audio/webm").with_bitrate(160),
//!     StreamVariant::audio("lo", "webm", "audio/webm").with_bitrate(48),
//! ];
//! let chosen = select(&variants, &SelectionPolicy::audio_only()).unwrap();
//! assert_eq!(chosen.handle, "lo");
//! ```

pub mod coordinator;
mod error;
pub mod finalizer;
mod outcome;
pub mod pipeline;
pub mod progress;
pub mod response;
pub mod selector;
pub mod source;
mod variant;

pub use coordinator::{CoordinatorConfig, RequestCoordinator, TransferPayload, TransferRequest};
pub use error::TransferError;
pub use finalizer::{FinalizationError, FinalizationResult, FinalizeStage, Finalizer};
pub use outcome::{TransferOutcome, TransferStage};
pub use pipeline::{PipelineConfig, RelayPipeline};
pub use progress::{Checkpoint, CheckpointTracker, ProgressReporter, TracingReporter};
pub use response::{Reply, ResponseState};
pub use selector::{select, SelectError, SelectionPolicy};
pub use source::{Catalog, CatalogError, SourceError, SourceFactory};
pub use variant::{AssetCatalog, MediaKind, StreamVariant};

pub mod prelude {
    pub use crate::{
        AssetCatalog, Catalog, CoordinatorConfig, MediaKind, RequestCoordinator, ResponseState,
        SourceFactory, StreamVariant, TransferError, TransferPayload, TransferRequest,
    };
}
