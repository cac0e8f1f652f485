//! Segment a long document, decode handshaking scores per chunk and fold the
//! entities back onto the document.
//!
//! ```bash
//! RUST_LOG=spanlink_codec=debug cargo run -p spanlink-codec --example segment_and_decode
//! ```

use candle_core::{DType, Device, Tensor};
use spanlink_codec::schemes::DecodeBatch;
use spanlink_codec::{segment, HandshakingNer, LabelRegistry, OffsetMapping, SchemeDecoder, SegmenterConfig, Span};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// One offset per char between `[CLS]` and `[SEP]`.
fn char_offsets(text: &str) -> OffsetMapping {
    let mut offsets = vec![(0, 0)];
    offsets.extend((0..text.chars().count()).map(|i| (i, i + 1)));
    offsets.push((0, 0));
    OffsetMapping::new(offsets)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spanlink_codec=debug,info")))
        .init();

    let document = "张三在北京工作。李四在上海读书。";
    let segmentation = segment(&[document], &SegmenterConfig { max_length: 12, split_sentence: true });

    let mut registry = LabelRegistry::new();
    registry.prepare(["PER", "LOC"]);
    let codec = HandshakingNer::new(&registry)?;
    let per = registry.get()?.require_id("PER")?;
    let loc = registry.get()?.require_id("LOC")?;

    // Stand-in for model output: every chunk starts with a person and names a place at chars 3..5.
    let seq = segmentation.chunks.iter().map(|c| c.text.chars().count() + 2).max().unwrap_or(2);
    let spans = [Span::new(per, 1, 2), Span::new(loc, 4, 5)];
    let tables = segmentation
        .chunks
        .iter()
        .map(|_| codec.encode(&spans, seq).into_tensor(&Device::Cpu))
        .collect::<Result<Vec<_>, _>>()?;
    let scores = Tensor::stack(&tables, 0)?.to_dtype(DType::F32)?;

    let texts: Vec<String> = segmentation.texts().into_iter().map(str::to_string).collect();
    let offsets: Vec<OffsetMapping> = texts.iter().map(|t| char_offsets(t)).collect();
    let lengths: Vec<u32> = texts
        .iter()
        .flat_map(|t| {
            let n = t.chars().count() + 2;
            (0..seq).map(move |i| u32::from(i < n))
        })
        .collect();
    let mask = Tensor::from_vec(lengths, (texts.len(), seq), &Device::Cpu)?;

    let per_chunk = codec.decode(&scores, &DecodeBatch::new(&mask, &texts, &offsets))?;
    for entities in segmentation.remap_entities(per_chunk)? {
        for e in entities {
            info!("{} [{}, {}) {}", e.label, e.start, e.end, e.text);
        }
    }
    Ok(())
}
