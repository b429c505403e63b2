//! Packs synset sources into the on-disk lexicon archive and its zstd artifact.

use crate::data::{
    LemmaRecord, LexiconData, PackedStrings, RELATION_ALSO, RELATION_ANTONYM, RELATION_SIMILAR,
    Range, RelationRecord, SenseRecord, StringId, SynsetRecord,
};
use crate::error::BuildError;
use crate::normalize::search_key;
use fst::MapBuilder;
use rkyv::{rancor::Error as RkyvError, to_bytes};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

const ARTIFACT_COMPRESSION_LEVEL: i32 = 19;

/// One synset as exported from the source lexicon.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SynsetSource {
    pub id: String,
    pub pos: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub senses: Vec<SenseSource>,
    #[serde(default)]
    pub similar: Vec<String>,
    #[serde(default)]
    pub also: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenseSource {
    pub lemma: String,
    #[serde(default)]
    pub antonyms: Vec<SenseRef>,
}

/// Addresses a sense by its synset id and lemma.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenseRef {
    pub synset: String,
    pub lemma: String,
}

impl SynsetSource {
    pub fn new(id: impl Into<String>, pos: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pos: pos.into(),
            ..Self::default()
        }
    }

    pub fn definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn lemma(mut self, lemma: impl Into<String>) -> Self {
        self.senses.push(SenseSource {
            lemma: lemma.into(),
            antonyms: Vec::new(),
        });
        self
    }

    /// Adds an antonym edge from the most recently added lemma.
    pub fn antonym(mut self, synset: impl Into<String>, lemma: impl Into<String>) -> Self {
        if let Some(sense) = self.senses.last_mut() {
            sense.antonyms.push(SenseRef {
                synset: synset.into(),
                lemma: lemma.into(),
            });
        }
        self
    }

    pub fn similar(mut self, synset: impl Into<String>) -> Self {
        self.similar.push(synset.into());
        self
    }

    pub fn also(mut self, synset: impl Into<String>) -> Self {
        self.also.push(synset.into());
        self
    }
}

/// Accumulates synsets and produces a [`LexiconData`] archive.
pub struct LexiconBuilder {
    version: String,
    synsets: Vec<SynsetSource>,
    synset_ids: HashMap<String, u32>,
}

impl LexiconBuilder {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            synsets: Vec::new(),
            synset_ids: HashMap::new(),
        }
    }

    pub fn add_synset(&mut self, synset: SynsetSource) -> Result<(), BuildError> {
        if self.synset_ids.contains_key(&synset.id) {
            return Err(BuildError::DuplicateSynset(synset.id));
        }
        self.synset_ids
            .insert(synset.id.clone(), self.synsets.len() as u32);
        self.synsets.push(synset);
        Ok(())
    }

    /// Reads one JSON synset per line; blank lines are skipped.
    pub fn add_jsonl<R: BufRead>(&mut self, reader: R) -> Result<usize, BuildError> {
        let mut added = 0usize;
        for (line_idx, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            if line.trim().is_empty() {
                continue;
            }
            let synset: SynsetSource =
                serde_json::from_str(&line).map_err(|source| BuildError::Parse {
                    line: line_idx + 1,
                    source,
                })?;
            self.add_synset(synset)?;
            added += 1;
        }
        Ok(added)
    }

    pub fn add_jsonl_file(&mut self, path: &Path) -> Result<usize, BuildError> {
        let file = BufReader::new(File::open(path)?);
        self.add_jsonl(file)
    }

    pub fn finish(self) -> Result<LexiconData, BuildError> {
        let mut strings = StringTable::default();
        let mut senses: Vec<SenseRecord> = Vec::new();
        let mut sense_ids: HashMap<(u32, &str), u32> = HashMap::new();
        let mut synset_members: Vec<u32> = Vec::new();
        let mut member_ranges: Vec<Range> = Vec::with_capacity(self.synsets.len());
        let mut lemma_groups: BTreeMap<String, (StringId, Vec<u32>)> = BTreeMap::new();

        for (synset_idx, synset) in self.synsets.iter().enumerate() {
            let synset_idx = synset_idx as u32;
            let start = synset_members.len() as u32;
            for sense in &synset.senses {
                let key = search_key(&sense.lemma);
                if key.is_empty() {
                    warn!(synset = %synset.id, "skipping sense with empty lemma");
                    continue;
                }
                let sense_idx = senses.len() as u32;
                let lemma = strings.intern(&sense.lemma);
                senses.push(SenseRecord {
                    lemma,
                    synset: synset_idx,
                    relations: Range::default(),
                });
                sense_ids.insert((synset_idx, sense.lemma.as_str()), sense_idx);
                synset_members.push(sense_idx);
                lemma_groups
                    .entry(key)
                    .or_insert_with(|| (lemma, Vec::new()))
                    .1
                    .push(sense_idx);
            }
            member_ranges.push(Range::new(start, synset_members.len() as u32 - start));
        }

        let mut sense_relations: Vec<RelationRecord> = Vec::new();
        let mut sense_cursor = 0usize;
        for synset in &self.synsets {
            for sense in &synset.senses {
                if search_key(&sense.lemma).is_empty() {
                    continue;
                }
                let start = sense_relations.len() as u32;
                for target in &sense.antonyms {
                    let resolved = self
                        .synset_ids
                        .get(&target.synset)
                        .and_then(|idx| sense_ids.get(&(*idx, target.lemma.as_str())));
                    match resolved {
                        Some(&target_idx) => sense_relations.push(RelationRecord {
                            kind: RELATION_ANTONYM,
                            target: target_idx,
                        }),
                        None => warn!(
                            synset = %synset.id,
                            target = %target.synset,
                            lemma = %target.lemma,
                            "dropping antonym to unknown sense"
                        ),
                    }
                }
                senses[sense_cursor].relations =
                    Range::new(start, sense_relations.len() as u32 - start);
                sense_cursor += 1;
            }
        }

        let mut synset_records = Vec::with_capacity(self.synsets.len());
        let mut synset_examples: Vec<StringId> = Vec::new();
        let mut synset_relations: Vec<RelationRecord> = Vec::new();
        for (synset, members) in self.synsets.iter().zip(member_ranges) {
            let examples_start = synset_examples.len() as u32;
            for example in &synset.examples {
                synset_examples.push(strings.intern(example));
            }
            let relations_start = synset_relations.len() as u32;
            self.push_synset_edges(
                &mut synset_relations,
                synset,
                &synset.similar,
                RELATION_SIMILAR,
            );
            self.push_synset_edges(&mut synset_relations, synset, &synset.also, RELATION_ALSO);

            synset_records.push(SynsetRecord {
                id: strings.intern(&synset.id),
                part_of_speech: strings.intern(&synset.pos),
                definition: synset.definition.as_deref().map(|d| strings.intern(d)),
                examples: Range::new(
                    examples_start,
                    synset_examples.len() as u32 - examples_start,
                ),
                members,
                relations: Range::new(
                    relations_start,
                    synset_relations.len() as u32 - relations_start,
                ),
            });
        }

        let mut index = MapBuilder::memory();
        let mut lemmas = Vec::with_capacity(lemma_groups.len());
        let mut lemma_senses: Vec<u32> = Vec::new();
        for (key, (form, group)) in lemma_groups {
            index.insert(&key, lemmas.len() as u64)?;
            let start = lemma_senses.len() as u32;
            lemma_senses.extend(group);
            lemmas.push(LemmaRecord {
                form,
                senses: Range::new(start, lemma_senses.len() as u32 - start),
            });
        }

        Ok(LexiconData {
            version: self.version,
            strings: strings.into_store(),
            lemma_index: index.into_inner()?,
            lemmas,
            lemma_senses,
            senses,
            sense_relations,
            synsets: synset_records,
            synset_members,
            synset_examples,
            synset_relations,
        })
    }

    fn push_synset_edges(
        &self,
        target: &mut Vec<RelationRecord>,
        synset: &SynsetSource,
        ids: &[String],
        kind: u8,
    ) {
        for id in ids {
            match self.synset_ids.get(id) {
                Some(&idx) => target.push(RelationRecord { kind, target: idx }),
                None => warn!(synset = %synset.id, target = %id, "dropping edge to unknown synset"),
            }
        }
    }
}

/// Serializes `data` to the uncompressed database file at `path`.
pub fn write_database(data: &LexiconData, path: &Path) -> Result<(), BuildError> {
    let bytes = serialize(data)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "wrote lexicon database");
    Ok(())
}

/// Writes `wn-<version>.db.zst` into `dir` and returns its path.
pub fn write_artifact(data: &LexiconData, dir: &Path) -> Result<std::path::PathBuf, BuildError> {
    let bytes = serialize(data)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(artifact_file_name(&data.version));
    let mut writer = BufWriter::new(File::create(&path)?);
    zstd::stream::copy_encode(bytes.as_slice(), &mut writer, ARTIFACT_COMPRESSION_LEVEL)?;
    writer.flush()?;
    info!(path = %path.display(), raw_bytes = bytes.len(), "wrote lexicon artifact");
    Ok(path)
}

/// File name of the compressed artifact for `version`.
pub fn artifact_file_name(version: &str) -> String {
    format!("wn-{version}.db.zst")
}

fn serialize(data: &LexiconData) -> Result<rkyv::util::AlignedVec, BuildError> {
    to_bytes::<RkyvError>(data).map_err(|err| BuildError::Serialize(err.to_string()))
}

#[derive(Default)]
struct StringTable {
    map: HashMap<Box<str>, StringId>,
    offsets: Vec<u32>,
    lengths: Vec<u32>,
    data: Vec<u8>,
}

impl StringTable {
    fn intern(&mut self, value: &str) -> StringId {
        if let Some(&id) = self.map.get(value) {
            return id;
        }
        let id = self.offsets.len() as u32;
        self.offsets.push(self.data.len() as u32);
        self.lengths.push(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
        self.map.insert(value.into(), id);
        id
    }

    fn into_store(self) -> PackedStrings {
        PackedStrings {
            offsets: self.offsets,
            lengths: self.lengths,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LexiconStore;

    #[test]
    fn duplicate_synset_ids_are_rejected() {
        let mut builder = LexiconBuilder::new("t");
        builder
            .add_synset(SynsetSource::new("a.n.01", "n").lemma("a"))
            .unwrap();
        let err = builder
            .add_synset(SynsetSource::new("a.n.01", "n").lemma("b"))
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateSynset(id) if id == "a.n.01"));
    }

    #[test]
    fn jsonl_input_round_trips_through_the_store() {
        let input = r#"
{"id":"hot.a.01","pos":"a","definition":"high temperature","senses":[{"lemma":"hot","antonyms":[{"synset":"cold.a.01","lemma":"cold"}]}]}

{"id":"cold.a.01","pos":"a","definition":"low temperature","senses":[{"lemma":"cold"}],"also":["missing.a.01"]}
"#;
        let mut builder = LexiconBuilder::new("jsonl");
        assert_eq!(builder.add_jsonl(input.as_bytes()).unwrap(), 2);
        let data = builder.finish().unwrap();
        assert_eq!(data.synset_relations.len(), 0, "unresolved edges are dropped");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.db");
        write_database(&data, &path).unwrap();
        let store = LexiconStore::open(&path).unwrap();
        let table = store.lookup("hot").unwrap().unwrap();
        let entry = table.entries().next().unwrap();
        assert_eq!(entry.definition, "high temperature");
        assert_eq!(entry.relations.antonyms, vec!["cold"]);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"id\":\"a\",\"pos\":\"n\"}\nnot json\n";
        let mut builder = LexiconBuilder::new("bad");
        let err = builder.add_jsonl(input.as_bytes()).unwrap_err();
        assert!(matches!(err, BuildError::Parse { line: 2, .. }));
    }

    #[test]
    fn artifact_is_named_by_version_and_decompresses() {
        let mut builder = LexiconBuilder::new("2024.1");
        builder
            .add_synset(SynsetSource::new("a.n.01", "n").lemma("alpha"))
            .unwrap();
        let data = builder.finish().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(&data, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "wn-2024.1.db.zst");
        let raw = zstd::stream::decode_all(File::open(&path).unwrap()).unwrap();
        assert_eq!(raw, serialize(&data).unwrap().as_slice());
    }
}
