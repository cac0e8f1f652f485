//! Dataset rows to handshaking targets and back.

mod common;

use candle_core::DType;
use pretty_assertions::assert_eq;
use spanlink_codec::features::{ner_labels, ner_targets, NerExample};
use spanlink_codec::{
    CodecError, Collated, CollatorConfig, DataCollator, FeatureConfig, FeatureConverter, HandshakingNer,
    LabelRegistry, SchemeDecoder, Split,
};

use common::{load_jsonl, CharTokenizer};

const DATA: &str = r#"
{"text": "张三在北京工作", "entities": [{"label": "PER", "start_offset": 0, "end_offset": 2, "entity": "张三"}, {"label": "LOC", "start_offset": 3, "end_offset": 5, "entity": "北京"}]}
{"text": "李四去了上海", "entities": [{"label": "PER", "start_offset": 0, "end_offset": 2, "entity": "李四"}, {"label": "LOC", "start_offset": 4, "end_offset": 6, "entity": "上海"}, {"label": "LOC", "start_offset": 4, "end_offset": 5, "entity": "上"}]}
"#;

#[test]
fn test_unprepared_registry_is_rejected() {
    let registry = LabelRegistry::new();
    assert!(matches!(HandshakingNer::new(&registry), Err(CodecError::LabelsNotPrepared)));
}

#[test]
fn test_targets_decode_back_to_annotations() {
    let examples: Vec<NerExample> = load_jsonl(DATA);
    let mut registry = LabelRegistry::new();
    registry.prepare(ner_labels(&examples));
    let labels = registry.get().unwrap().clone();
    assert_eq!(labels.names(), &["LOC", "PER"]);

    let codec = HandshakingNer::new(&registry).unwrap();
    let converter = FeatureConverter::new(&CharTokenizer, FeatureConfig::default());
    let collator = DataCollator::new(codec.clone(), CollatorConfig::default());

    let train = converter
        .convert_all(&examples, |c, e| c.ner(e, &labels, Split::Train))
        .unwrap();
    let train = collator.collate(train).unwrap().into_train().unwrap();
    let targets = train.targets.get("labels").unwrap();
    assert_eq!(targets.dims(), &[2, 9, 9, 2]);

    // the second example is one token shorter; its padding row holds the pad value
    let padded = targets.to_dtype(DType::F32).unwrap();
    let row = padded.get(1).unwrap().get(8).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(row.iter().all(|v| *v == -100.0));

    let eval = converter
        .convert_all(&examples, |c, e| c.ner(e, &labels, Split::Validation))
        .unwrap();
    let batch = match collator.collate(eval).unwrap() {
        Collated::Inference(batch) => batch,
        Collated::Train(_) => panic!("validation features must not carry labels"),
    };
    let decoded = codec.decode(&padded, &batch.decode_batch()).unwrap();

    assert_eq!(decoded.len(), 2);
    for (found, example) in decoded.iter().zip(&examples) {
        assert_eq!(found, &ner_targets(example, false));
    }
}

#[test]
fn test_collated_shaking_targets_decode_back() {
    let examples: Vec<NerExample> = load_jsonl(DATA);
    let labels = spanlink_codec::LabelSpace::from_labels(ner_labels(&examples));
    let codec = HandshakingNer::from_space(labels.clone());
    let converter = FeatureConverter::new(&CharTokenizer, FeatureConfig::default());

    let feature = converter.ner(&examples[0], &labels, Split::Train).unwrap();
    let train = DataCollator::new(codec.clone().shaking(), CollatorConfig::default())
        .collate(vec![feature])
        .unwrap()
        .into_train()
        .unwrap();
    let targets = train.targets.get("labels").unwrap();
    let seq_len = train.inputs.seq_len().unwrap();
    assert_eq!(targets.dims(), &[1, seq_len * (seq_len + 1) / 2, labels.len()]);
    let shaking = targets.to_dtype(DType::F32).unwrap();

    let unlabelled = converter.ner(&examples[0], &labels, Split::Test).unwrap();
    let batch = DataCollator::new(codec.clone(), CollatorConfig::default())
        .collate(vec![unlabelled])
        .unwrap()
        .into_inference()
        .unwrap();
    let decoded = codec.decode(&shaking, &batch.decode_batch()).unwrap();
    assert_eq!(decoded[0], ner_targets(&examples[0], false));
}
