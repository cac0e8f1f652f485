//! Spanlink tagging-scheme codecs
//!
//! Encoding of annotated text into the target tensors of span, relation and
//! event extraction heads, and decoding of model scores back into
//! deduplicated char-space results. Tensors are Candle tensors; tokenization
//! goes through Hugging Face `tokenizers`.
//!
//! # Schemes
//! - Handshaking NER: symmetric `(seq, seq, labels)` span matrix
//! - GPLinker: sparse entity / head / tail pointer pairs for relations
//! - GRTE: one tag per `(subject token, object token, predicate)` cell
//! - PFN: dense entity / head / tail tables
//! - TPLinker-plus: multi-label upper-triangular shaking sequence
//! - GPLinker events: role arguments linked into events by clique search
//! - Pointer: UIE-style start/end pointers over a `(prompt, content)` pair
//!
//! # Example
//! ```rust
//! use spanlink_codec::{segment, SegmenterConfig};
//!
//! let config = SegmenterConfig { max_length: 8, split_sentence: true };
//! let segmentation = segment(&["北京今天下雨。上海明天晴。"], &config);
//! assert_eq!(segmentation.texts(), vec!["北京今天下雨。", "上海明天晴。"]);
//! assert_eq!(segmentation.chunks[1].char_offset, 7);
//! ```

pub mod align;
pub mod classification;
pub mod collate;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod labels;
pub mod schemes;
pub mod segment;
pub mod tensor;
pub mod types;

pub use align::{HfTokenizer, OffsetMapping, TextTokenizer, TokenizedText};
pub use classification::Classification;
pub use collate::{Collated, DataCollator, InferenceBatch, ModelInputs, TrainBatch};
pub use config::{CollatorConfig, DecodeConfig, FeatureConfig, PaddingStrategy, SegmenterConfig};
pub use encoder::{load_bert, select_device, Encoder};
pub use error::{CodecError, Result};
pub use features::{Feature, FeatureConverter, Split};
pub use labels::{LabelRegistry, LabelSpace};
pub use schemes::{
    DecodeBatch, GpLinker, GpLinkerEvent, Grte, HandshakingNer, Pfn, Pointer, SchemeCollator, SchemeDecoder,
    TargetLayout, TargetTensors, TpLinkerPlus,
};
pub use segment::{segment, Segmentation};
pub use types::{
    DecodedEntity, DecodedEvent, DecodedTriple, EntitySet, EventRecord, EventSet, RelationTriple, Span, TextSpan,
    TripleSet,
};
