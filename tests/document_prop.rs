//! ドキュメントモデルのプロパティテスト
//!
//! 文字列モデルとの比較と、変更セットの代数的な性質を検証する

use altre_doc::{ChangeSet, ChangeSpec, RangeSet, RangeValue, Side, Text};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

type Edit = (usize, usize, String);

fn doc_strategy() -> impl Strategy<Value = String> {
    "[a-cé\n]{0,40}"
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    (0usize..64, 0usize..64, "[xyü\n]{0,4}")
}

fn edits_strategy() -> impl Strategy<Value = Vec<Edit>> {
    proptest::collection::vec(edit_strategy(), 0..4)
}

/// 複数の葉と分岐を持つ大きさのドキュメント
fn large_doc_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-dé]{0,12}", 100..2_000).prop_map(|lines| lines.join("\n"))
}

/// 位置は文書長で剰余を取る。挿入は数行から数十行
fn large_edit_strategy() -> impl Strategy<Value = Edit> {
    (
        0usize..100_000,
        0usize..100_000,
        proptest::collection::vec("[xyü]{0,6}", 1..80).prop_map(|lines| lines.join("\n")),
    )
}

fn char_slice(s: &str, from: usize, to: usize) -> String {
    s.chars().skip(from).take(to - from).collect()
}

fn char_to_byte_index(s: &str, char_pos: usize) -> usize {
    s.char_indices().nth(char_pos).map(|(idx, _)| idx).unwrap_or(s.len())
}

fn clamp(edit: &Edit, length: usize) -> (usize, usize) {
    let a = edit.0 % (length + 1);
    let b = edit.1 % (length + 1);
    (a.min(b), a.max(b))
}

fn make_change(length: usize, edits: &[Edit]) -> ChangeSet {
    let specs: Vec<ChangeSpec> = edits
        .iter()
        .map(|edit| {
            let (from, to) = clamp(edit, length);
            ChangeSpec::replace(from, to, edit.2.as_str())
        })
        .collect();
    ChangeSet::of(specs, length, None).unwrap()
}

fn text(s: &str) -> Text {
    s.parse().unwrap()
}

#[derive(Debug, Clone, PartialEq)]
struct Tag(u8);

impl RangeValue for Tag {
    fn start_side(&self) -> Side {
        Side::new(i32::from(self.0 % 3) - 1)
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn rope_replace_matches_string_model(
        initial in doc_strategy(),
        edits in proptest::collection::vec(edit_strategy(), 0..12)
    ) {
        let mut rope = text(&initial);
        let mut model = initial.clone();
        for edit in &edits {
            let (from, to) = clamp(edit, rope.len());
            rope = rope.replace(from, to, &text(&edit.2)).unwrap();
            let start = char_to_byte_index(&model, from);
            let end = char_to_byte_index(&model, to);
            model.replace_range(start..end, &edit.2);
            prop_assert_eq!(rope.len(), model.chars().count());
            prop_assert_eq!(rope.to_string(), model.clone());
        }
        prop_assert_eq!(rope.lines(), model.split('\n').count());
    }

    #[test]
    fn large_rope_queries_match_string_model(
        initial in large_doc_strategy(),
        edits in proptest::collection::vec(large_edit_strategy(), 1..6),
        queries in proptest::collection::vec((0usize..100_000, 0usize..100_000), 4)
    ) {
        let mut rope = text(&initial);
        let mut model = initial.clone();
        prop_assert_eq!(rope.to_string(), model.clone());
        for edit in &edits {
            let previous = rope.clone();
            let previous_model = model.clone();
            let (from, to) = clamp(edit, rope.len());
            rope = rope.replace(from, to, &text(&edit.2)).unwrap();
            let start = char_to_byte_index(&model, from);
            let end = char_to_byte_index(&model, to);
            model.replace_range(start..end, &edit.2);

            prop_assert_eq!(rope.len(), model.chars().count());
            prop_assert_eq!(rope.to_string(), model.clone());
            prop_assert!(rope == text(&model));
            prop_assert_eq!(rope == previous, model == previous_model);
        }

        let model_lines: Vec<&str> = model.split('\n').collect();
        prop_assert_eq!(rope.lines(), model_lines.len());
        for &(a, _) in &queries {
            let n = a % model_lines.len() + 1;
            let line = rope.line(n).unwrap();
            prop_assert_eq!(line.text, model_lines[n - 1]);
            prop_assert_eq!(line.number, n);
            prop_assert_eq!(line.len(), model_lines[n - 1].chars().count());
        }
        for query in &queries {
            let (from, to) = clamp(&(query.0, query.1, String::new()), rope.len());
            let expected = char_slice(&model, from, to);
            let iterated: String = rope.iter_range(from, to).unwrap().map(|token| token.as_str()).collect();
            prop_assert_eq!(&iterated, &expected);
            prop_assert_eq!(rope.slice(from, to).unwrap().to_string(), expected.clone());
            prop_assert!(rope.slice(from, to).unwrap() == text(&expected));
        }
    }

    #[test]
    fn text_json_round_trip(lines in proptest::collection::vec("[a-zé ]{0,6}", 1..80)) {
        let rope = Text::of(lines.clone()).unwrap();
        prop_assert_eq!(rope.to_json(), lines);
        prop_assert_eq!(Text::of(rope.to_json()).unwrap(), rope);
    }

    #[test]
    fn single_edit_change_matches_rope_replace(initial in doc_strategy(), edit in edit_strategy()) {
        let doc = text(&initial);
        let (from, to) = clamp(&edit, doc.len());
        let changes = make_change(doc.len(), &[edit.clone()]);
        prop_assert_eq!(changes.apply(&doc).unwrap(), doc.replace(from, to, &text(&edit.2)).unwrap());
    }

    #[test]
    fn change_lengths_are_consistent(initial in doc_strategy(), edits in edits_strategy()) {
        let doc = text(&initial);
        let changes = make_change(doc.len(), &edits);
        prop_assert_eq!(changes.len(), doc.len());
        let result = changes.apply(&doc).unwrap();
        prop_assert_eq!(changes.new_len(), result.len());
        let inverse = changes.invert(&doc).unwrap();
        prop_assert_eq!(inverse.len(), changes.new_len());
        prop_assert_eq!(inverse.new_len(), changes.len());
    }

    #[test]
    fn composed_and_mapped_lengths_match_results(
        initial in doc_strategy(),
        ea in edits_strategy(),
        eb in edits_strategy(),
        ec in edits_strategy()
    ) {
        let doc = text(&initial);
        let a = make_change(doc.len(), &ea);
        let after_a = a.apply(&doc).unwrap();

        let b = make_change(a.new_len(), &eb);
        let composed = a.compose(&b).unwrap();
        prop_assert_eq!(composed.len(), doc.len());
        let result = composed.apply(&doc).unwrap();
        prop_assert_eq!(composed.new_len(), result.len());
        prop_assert_eq!(composed.desc().new_len(), result.len());

        let c = make_change(doc.len(), &ec);
        for before in [false, true] {
            let mapped = c.map(&a, before).unwrap();
            prop_assert_eq!(mapped.len(), a.new_len());
            let result = mapped.apply(&after_a).unwrap();
            prop_assert_eq!(mapped.new_len(), result.len());
            let mapped_desc = c.desc().map_desc(a.desc(), before).unwrap();
            prop_assert_eq!(mapped_desc.len(), a.new_len());
            prop_assert_eq!(mapped_desc.new_len(), result.len());
        }
    }

    #[test]
    fn change_json_round_trip(initial in doc_strategy(), edits in edits_strategy()) {
        let doc = text(&initial);
        let changes = make_change(doc.len(), &edits);
        let restored = ChangeSet::from_json(&changes.to_json()).unwrap();
        prop_assert_eq!(restored.apply(&doc).unwrap(), changes.apply(&doc).unwrap());
    }

    #[test]
    fn invert_restores_document(initial in doc_strategy(), edits in edits_strategy()) {
        let doc = text(&initial);
        let changes = make_change(doc.len(), &edits);
        let edited = changes.apply(&doc).unwrap();
        let restored = changes.invert(&doc).unwrap().apply(&edited).unwrap();
        prop_assert_eq!(restored, doc);
    }

    #[test]
    fn compose_is_associative(
        initial in doc_strategy(),
        ea in edits_strategy(),
        eb in edits_strategy(),
        ec in edits_strategy()
    ) {
        let doc = text(&initial);
        let a = make_change(doc.len(), &ea);
        let b = make_change(a.new_len(), &eb);
        let c = make_change(b.new_len(), &ec);
        let left = a.compose(&b).unwrap().compose(&c).unwrap();
        let right = a.compose(&b.compose(&c).unwrap()).unwrap();
        let sequential = c.apply(&b.apply(&a.apply(&doc).unwrap()).unwrap()).unwrap();
        prop_assert_eq!(left.apply(&doc).unwrap(), sequential.clone());
        prop_assert_eq!(right.apply(&doc).unwrap(), sequential);
    }

    #[test]
    fn concurrent_changes_converge(initial in doc_strategy(), ea in edits_strategy(), eb in edits_strategy()) {
        let doc = text(&initial);
        let a = make_change(doc.len(), &ea);
        let b = make_change(doc.len(), &eb);
        let left = a.compose(&b.map(&a, false).unwrap()).unwrap();
        let right = b.compose(&a.map(&b, true).unwrap()).unwrap();
        prop_assert_eq!(left.apply(&doc).unwrap(), right.apply(&doc).unwrap());
    }

    #[test]
    fn range_set_iterates_in_order(
        ranges in proptest::collection::vec((0usize..500, 0usize..20, any::<u8>()), 0..600)
    ) {
        let input = ranges
            .iter()
            .map(|&(from, len, tag)| Tag(tag).range(from, from + len));
        let set = RangeSet::of(input, true).unwrap();
        prop_assert_eq!(set.size(), ranges.len());
        let keys: Vec<(usize, Side)> = set.iter(0).map(|r| (r.from, r.value.start_side())).collect();
        prop_assert_eq!(keys.len(), ranges.len());
        prop_assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn range_set_mapping_matches_position_mapping(
        initial in doc_strategy(),
        edits in edits_strategy(),
        marks in proptest::collection::vec((0usize..64, 1usize..8), 0..20)
    ) {
        let doc = text(&initial);
        prop_assume!(doc.len() > 0);
        let changes = make_change(doc.len(), &edits);
        let input: Vec<_> = marks
            .iter()
            .map(|&(from, len)| {
                let from = from % doc.len();
                Tag(1).range(from, (from + len).min(doc.len()))
            })
            .collect();
        let set = RangeSet::of(input.clone(), true).unwrap();
        let mapped = set.map(changes.desc()).unwrap();
        for range in mapped.iter(0) {
            prop_assert!(range.from <= range.to);
            prop_assert!(range.to <= changes.new_len());
        }
        prop_assert!(mapped.size() <= input.len());
    }
}
