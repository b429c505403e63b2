//! Derives the relation lists shown next to a definition.

use crate::lexicon::{RelationKind, SynsetView};
use crate::normalize::display_form;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Related lemmas of one synset, in display form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSet {
    pub synonyms: Vec<String>,
    pub antonyms: Vec<String>,
    pub similar: Vec<String>,
    pub also_sees: Vec<String>,
}

impl RelationSet {
    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
            && self.antonyms.is_empty()
            && self.similar.is_empty()
            && self.also_sees.is_empty()
    }

    pub fn lists(&self) -> [(&'static str, &[String]); 4] {
        [
            ("synonyms", &self.synonyms),
            ("antonyms", &self.antonyms),
            ("similar", &self.similar),
            ("also see", &self.also_sees),
        ]
    }
}

/// Builds the [`RelationSet`] of `synset` as seen from `matched_lemma`.
///
/// Every list keeps first-seen order, drops case-insensitive duplicates and
/// never contains the matched lemma. Relations are followed one hop only, so
/// self-referential or cyclic edges cannot loop.
pub fn extract(synset: &SynsetView<'_>, matched_lemma: &str) -> RelationSet {
    let synonyms = collect(matched_lemma, synset.lemmas());

    let antonyms = collect(
        matched_lemma,
        synset
            .senses()
            .flat_map(|sense| sense.related(RelationKind::Antonym).map(|target| target.lemma()))
            .collect::<Vec<_>>(),
    );

    let similar = collect(matched_lemma, related_lemmas(synset, RelationKind::Similar));
    let also_sees = collect(matched_lemma, related_lemmas(synset, RelationKind::Also));

    RelationSet {
        synonyms,
        antonyms,
        similar,
        also_sees,
    }
}

fn related_lemmas<'a>(synset: &SynsetView<'a>, kind: RelationKind) -> Vec<&'a str> {
    synset
        .related(kind)
        .flat_map(|target| target.lemmas())
        .collect()
}

fn collect<'a, I>(matched_lemma: &str, lemmas: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let excluded = display_form(matched_lemma).to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for lemma in lemmas {
        let form = display_form(lemma);
        if form.is_empty() {
            continue;
        }
        let key = form.to_lowercase();
        if key == excluded || !seen.insert(key) {
            continue;
        }
        out.push(form);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn relations_for(term: &str, synset_id: &str) -> RelationSet {
        let fixture = fixtures::store();
        let table = fixture
            .store
            .lookup(term)
            .expect("store ready")
            .expect("term present");
        table
            .entries()
            .find(|entry| entry.synset_id == synset_id)
            .map(|entry| entry.relations.clone())
            .expect("synset present")
    }

    #[test]
    fn synonyms_exclude_matched_lemma() {
        let relations = relations_for("cat", "cat.n.01");
        assert_eq!(relations.synonyms, vec!["true cat", "house cat"]);
    }

    #[test]
    fn antonyms_follow_sense_edges() {
        let relations = relations_for("hot", "hot.a.01");
        assert_eq!(relations.antonyms, vec!["cold"]);
        assert!(relations.synonyms.is_empty());
    }

    #[test]
    fn similar_and_also_collect_related_synset_lemmas() {
        let relations = relations_for("hot", "hot.a.01");
        assert_eq!(relations.similar, vec!["scorching", "sizzling", "warm"]);
        assert_eq!(relations.also_sees, vec!["heated"]);
    }

    #[test]
    fn self_referential_edges_terminate_without_self() {
        let relations = relations_for("recursion", "recursion.n.01");
        for (_, list) in relations.lists() {
            assert!(
                !list.iter().any(|lemma| lemma.eq_ignore_ascii_case("recursion")),
                "matched lemma leaked into {list:?}"
            );
        }
        assert_eq!(relations.synonyms, vec!["recursive definition"]);
        assert_eq!(relations.similar, vec!["recursive definition"]);
    }

    #[test]
    fn no_list_contains_matched_lemma_for_any_fixture_synset() {
        let fixture = fixtures::store();
        for word in fixture.store.all_lemmas().expect("store ready") {
            let Some(table) = fixture.store.lookup(&word).expect("store ready") else {
                continue;
            };
            for entry in table.entries() {
                let matched = entry.matched_lemma.to_lowercase();
                for (name, list) in entry.relations.lists() {
                    assert!(
                        !list.iter().any(|lemma| lemma.to_lowercase() == matched),
                        "{name} of {} contains {matched}",
                        entry.synset_id
                    );
                }
            }
        }
    }

    #[test]
    fn collect_dedupes_case_insensitively() {
        let out = collect("Cat", ["cat", "Kitty", "kitty", "true_cat", "True cat"]);
        assert_eq!(out, vec!["Kitty", "true cat"]);
    }
}
