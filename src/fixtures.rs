//! Small hand-made lexicon shared by the unit tests.

use crate::builder::{LexiconBuilder, SynsetSource, write_artifact, write_database};
use crate::data::LexiconData;
use crate::lexicon::LexiconStore;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const VERSION: &str = "test-1";

pub struct FixtureStore {
    pub store: Arc<LexiconStore>,
    _dir: TempDir,
}

pub fn lexicon(version: &str) -> LexiconData {
    let synsets = [
        SynsetSource::new("cat.n.01", "n")
            .definition("feline mammal usually having thick soft fur")
            .example("the cat curled up on the rug")
            .lemma("cat")
            .lemma("true_cat")
            .lemma("house_cat"),
        SynsetSource::new("cat.n.02", "n")
            .definition("a method of examining body organs by scanning them with X rays")
            .lemma("CAT")
            .lemma("computerized_tomography"),
        SynsetSource::new("cat.v.01", "v")
            .definition("beat with a cat-o'-nine-tails")
            .lemma("cat")
            .lemma("flog"),
        SynsetSource::new("dog.n.01", "n")
            .definition("a member of the genus Canis")
            .example("the dog barked all night")
            .lemma("dog")
            .lemma("domestic_dog"),
        SynsetSource::new("ice_cream.n.01", "n")
            .definition("frozen dessert containing cream and sugar and flavoring")
            .lemma("ice_cream")
            .lemma("icecream"),
        SynsetSource::new("hot.a.01", "a")
            .definition("used of physical heat; having a high or higher than desirable temperature")
            .lemma("hot")
            .antonym("cold.a.01", "cold")
            .similar("scorching.s.01")
            .similar("warm.a.01")
            .also("heated.a.01"),
        SynsetSource::new("cold.a.01", "a")
            .definition("having a low or inadequate temperature")
            .lemma("cold")
            .antonym("hot.a.01", "hot"),
        SynsetSource::new("scorching.s.01", "s")
            .definition("hot and dry enough to burn")
            .lemma("scorching")
            .lemma("sizzling"),
        SynsetSource::new("warm.a.01", "a")
            .definition("having or producing a comfortable degree of heat")
            .lemma("warm")
            .lemma("Hot"),
        SynsetSource::new("heated.a.01", "a")
            .definition("made warm or hot")
            .lemma("heated"),
        SynsetSource::new("recursion.n.01", "n")
            .definition("a formula that generates successive terms of a sequence")
            .lemma("recursion")
            .antonym("recursion.n.01", "recursion")
            .lemma("recursive_definition")
            .similar("recursion.n.01")
            .also("recursion.n.01"),
        SynsetSource::new("blorp.q.01", "q")
            .definition("an entry tagged with a part of speech nobody knows")
            .lemma("blorp"),
    ];
    let mut builder = LexiconBuilder::new(version);
    for synset in synsets {
        builder.add_synset(synset).expect("fixture synset ids are unique");
    }
    builder.finish().expect("fixture lexicon builds")
}

pub fn store() -> FixtureStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lexicon.db");
    write_database(&lexicon(VERSION), &path).expect("write fixture database");
    let store = LexiconStore::open(&path).expect("open fixture database");
    FixtureStore {
        store: Arc::new(store),
        _dir: dir,
    }
}

/// Writes the fixture artifact for `version` into `dir`.
pub fn artifact(dir: &std::path::Path, version: &str) -> PathBuf {
    write_artifact(&lexicon(version), dir).expect("write fixture artifact")
}
