//! Event rows to GPLinker pointers, and dense scores back to events.

mod common;

use std::collections::BTreeSet;

use candle_core::{Device, Tensor};
use pretty_assertions::assert_eq;
use spanlink_codec::features::{event_labels, EventExample};
use spanlink_codec::schemes::EventScores;
use spanlink_codec::types::{DecodedArgument, DecodedEvent};
use spanlink_codec::{
    CollatorConfig, DataCollator, FeatureConfig, FeatureConverter, GpLinkerEvent, LabelSpace, SchemeDecoder, Split,
    TextSpan,
};

use common::{load_jsonl, CharTokenizer};

const DATA: &str = r#"
{"text": "公司今天宣布裁员", "event_list": [{"event_type": "组织行为-裁员", "trigger": "裁员", "trigger_start_index": 6, "arguments": [{"role": "裁员方", "argument": "公司", "argument_start_index": 0}, {"role": "时间", "argument": "今天", "argument_start_index": 2}]}]}
"#;

/// Light up the `(start, end)` cell of every non-padding pointer pair.
fn densify(pointers: &Tensor, seq: usize) -> Tensor {
    let (bs, channels, slots, _) = pointers.dims4().unwrap();
    let flat = pointers.flatten_all().unwrap().to_vec1::<i64>().unwrap();
    let mut dense = vec![0f32; bs * channels * seq * seq];
    for b in 0..bs {
        for c in 0..channels {
            for s in 0..slots {
                let at = ((b * channels + c) * slots + s) * 2;
                let (i, j) = (flat[at] as usize, flat[at + 1] as usize);
                if i == 0 && j == 0 {
                    continue;
                }
                dense[((b * channels + c) * seq + i) * seq + j] = 1.0;
            }
        }
    }
    Tensor::from_vec(dense, (bs, channels, seq, seq), &Device::Cpu).unwrap()
}

fn argument(role: &str, start: usize, end: usize, text: &str) -> DecodedArgument {
    DecodedArgument {
        role: role.to_string(),
        span: TextSpan {
            start,
            end,
            text: text.to_string(),
        },
    }
}

#[test]
fn test_event_round_trip() {
    let examples: Vec<EventExample> = load_jsonl(DATA);
    let roles = LabelSpace::from_labels(event_labels(&examples));
    assert_eq!(roles.len(), 3);

    let codec = GpLinkerEvent::from_space(roles.clone());
    let converter = FeatureConverter::new(&CharTokenizer, FeatureConfig::default());
    let collator = DataCollator::new(codec.clone(), CollatorConfig::default());

    let train = converter
        .convert_all(&examples, |c, e| c.event(e, &roles, Split::Train))
        .unwrap();
    let targets = collator.collate(train).unwrap().into_train().unwrap().targets;
    let argu = targets.get("argu_labels").unwrap();
    assert_eq!(argu.dims(), &[1, 3, 1, 2]);
    // three arguments give three unordered head pairs
    assert_eq!(targets.get("head_labels").unwrap().dims(), &[1, 1, 3, 2]);

    let seq = 10;
    let scores = EventScores {
        argu: densify(argu, seq),
        head: densify(targets.get("head_labels").unwrap(), seq),
        tail: densify(targets.get("tail_labels").unwrap(), seq),
    };

    let eval = converter
        .convert_all(&examples, |c, e| c.event(e, &roles, Split::Test))
        .unwrap();
    let batch = collator.collate(eval).unwrap().into_inference().unwrap();
    let decoded = codec.decode(&scores, &batch.decode_batch()).unwrap();

    let expected = DecodedEvent {
        event_type: "组织行为-裁员".to_string(),
        arguments: BTreeSet::from([
            argument("触发词", 6, 8, "裁员"),
            argument("裁员方", 0, 2, "公司"),
            argument("时间", 2, 4, "今天"),
        ]),
    };
    assert_eq!(decoded, vec![BTreeSet::from([expected])]);
}
