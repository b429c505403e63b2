use crate::data::{
    ArchivedLexiconData, ArchivedPackedStrings, ArchivedRange, ArchivedRelationRecord,
    ArchivedSenseRecord, ArchivedStringId, ArchivedSynsetRecord, RELATION_ALSO, RELATION_ANTONYM,
    RELATION_SIMILAR,
};
use crate::error::LexiconError;
use crate::matcher::best_match;
use crate::normalize::{display_form, search_key};
use crate::relations::{RelationSet, extract};
use fst::Map;
use parking_lot::Mutex;
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{access, access_unchecked};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str;
use tracing::{debug, info, warn};

/// Part-of-speech categories used to group definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    Adjective,
    AdjectiveSatellite,
    Adverb,
    Conjunction,
    Adposition,
    Unknown,
}

impl PartOfSpeech {
    pub const ALL: [PartOfSpeech; 8] = [
        PartOfSpeech::Noun,
        PartOfSpeech::Verb,
        PartOfSpeech::Adjective,
        PartOfSpeech::AdjectiveSatellite,
        PartOfSpeech::Adverb,
        PartOfSpeech::Conjunction,
        PartOfSpeech::Adposition,
        PartOfSpeech::Unknown,
    ];

    /// Maps a database tag to a category; unrecognized tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "n" => Some(PartOfSpeech::Noun),
            "v" => Some(PartOfSpeech::Verb),
            "a" => Some(PartOfSpeech::Adjective),
            "s" => Some(PartOfSpeech::AdjectiveSatellite),
            "r" => Some(PartOfSpeech::Adverb),
            "c" => Some(PartOfSpeech::Conjunction),
            "p" => Some(PartOfSpeech::Adposition),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PartOfSpeech::Noun => "noun",
            PartOfSpeech::Verb => "verb",
            PartOfSpeech::Adjective => "adjective",
            PartOfSpeech::AdjectiveSatellite => "adjective satellite",
            PartOfSpeech::Adverb => "adverb",
            PartOfSpeech::Conjunction => "conjunction",
            PartOfSpeech::Adposition => "adposition",
            PartOfSpeech::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PartOfSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Antonym,
    Similar,
    Also,
}

impl RelationKind {
    pub fn code(self) -> u8 {
        match self {
            RelationKind::Antonym => RELATION_ANTONYM,
            RelationKind::Similar => RELATION_SIMILAR,
            RelationKind::Also => RELATION_ALSO,
        }
    }
}

/// One sense group as presented to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    pub synset_id: String,
    pub matched_lemma: String,
    pub definition: String,
    pub examples: Vec<String>,
    pub relations: RelationSet,
}

/// Definitions grouped by part of speech. Every category is present, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionTable(BTreeMap<PartOfSpeech, Vec<DefinitionEntry>>);

impl DefinitionTable {
    fn empty() -> Self {
        Self(PartOfSpeech::ALL.into_iter().map(|pos| (pos, Vec::new())).collect())
    }

    fn push(&mut self, pos: PartOfSpeech, entry: DefinitionEntry) {
        self.0.entry(pos).or_default().push(entry);
    }

    pub fn get(&self, pos: PartOfSpeech) -> &[DefinitionEntry] {
        self.0.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories in display order, including empty ones.
    pub fn categories(&self) -> impl Iterator<Item = (PartOfSpeech, &[DefinitionEntry])> + '_ {
        self.0.iter().map(|(pos, entries)| (*pos, entries.as_slice()))
    }

    /// Categories that have at least one definition.
    pub fn populated(&self) -> impl Iterator<Item = (PartOfSpeech, &[DefinitionEntry])> + '_ {
        self.categories().filter(|(_, entries)| !entries.is_empty())
    }

    pub fn entries(&self) -> impl Iterator<Item = &DefinitionEntry> + '_ {
        self.0.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive owner of an opened, validated lexicon archive.
pub struct LexiconHandle {
    path: PathBuf,
    bytes: AlignedVec,
}

impl LexiconHandle {
    /// Reads and validates the database file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LexiconError> {
        let path = path.into();
        let raw = fs::read(&path).map_err(|source| LexiconError::Io {
            path: path.clone(),
            source,
        })?;
        let mut bytes = AlignedVec::with_capacity(raw.len());
        bytes.extend_from_slice(&raw);
        drop(raw);

        let data = access::<ArchivedLexiconData, RkyvError>(bytes.as_slice()).map_err(|err| {
            LexiconError::Corrupt {
                path: path.clone(),
                reason: err.to_string(),
            }
        })?;
        Map::new(data.lemma_index.as_slice()).map_err(|err| LexiconError::Corrupt {
            path: path.clone(),
            reason: format!("lemma index: {err}"),
        })?;
        info!(
            path = %path.display(),
            version = data.version.as_str(),
            synsets = data.synsets.len(),
            "opened lexicon"
        );
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn data(&self) -> &ArchivedLexiconData {
        // SAFETY: the buffer was validated by `access` in `open` and is never mutated.
        unsafe { access_unchecked::<ArchivedLexiconData>(self.bytes.as_slice()) }
    }

    fn lemma_index(&self) -> Option<Map<&[u8]>> {
        Map::new(self.data().lemma_index.as_slice()).ok()
    }

    pub fn version(&self) -> &str {
        self.data().version.as_str()
    }

    /// Synsets containing a lemma whose search key equals that of `term`, in database order.
    pub fn synsets_for(&self, term: &str) -> Vec<SynsetView<'_>> {
        let data = self.data();
        let Some(index) = self.lemma_index() else {
            return Vec::new();
        };
        let Some(lemma_idx) = index.get(search_key(term)) else {
            return Vec::new();
        };
        let Some(lemma) = data.lemmas.get(lemma_idx as usize) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        range_slice(data.lemma_senses.as_slice(), &lemma.senses)
            .iter()
            .filter_map(|sense_idx| data.senses.get(sense_idx.to_native() as usize))
            .map(|sense| sense.synset.to_native())
            .filter(|synset_idx| seen.insert(*synset_idx))
            .filter_map(|synset_idx| SynsetView::new(data, synset_idx))
            .collect()
    }

    pub fn lemma_forms(&self) -> Vec<String> {
        let data = self.data();
        data.lemmas
            .iter()
            .map(|lemma| display_form(data.strings.get(lemma.form)))
            .filter(|form| !form.is_empty())
            .collect()
    }
}

impl fmt::Debug for LexiconHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconHandle")
            .field("path", &self.path)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Serialized access to the lexical database.
///
/// Every query holds the store lock for its whole duration and nothing longer.
#[derive(Debug, Default)]
pub struct LexiconStore {
    handle: Mutex<Option<LexiconHandle>>,
}

impl LexiconStore {
    /// A store with no database yet; queries fail with `NotReady`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LexiconError> {
        let store = Self::new();
        store.load(path)?;
        Ok(store)
    }

    /// Opens `path` and replaces the current handle, if any.
    pub fn load(&self, path: impl Into<PathBuf>) -> Result<(), LexiconError> {
        let handle = LexiconHandle::open(path)?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub fn close(&self) {
        if let Some(handle) = self.handle.lock().take() {
            debug!(path = %handle.path().display(), "closed lexicon");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn version(&self) -> Option<String> {
        self.handle
            .lock()
            .as_ref()
            .map(|handle| handle.version().to_string())
    }

    /// Resolves `term` to its definitions, or `None` when no lemma matches.
    pub fn lookup(&self, term: &str) -> Result<Option<DefinitionTable>, LexiconError> {
        let guard = self.handle.lock();
        let handle = guard.as_ref().ok_or(LexiconError::NotReady)?;

        let mut table = DefinitionTable::empty();
        for synset in handle.synsets_for(term) {
            let lemmas = synset.lemmas();
            if lemmas.is_empty() {
                continue;
            }
            let tag = synset.part_of_speech_tag();
            let pos = PartOfSpeech::from_tag(tag).unwrap_or_else(|| {
                warn!(tag, synset = synset.id(), "unrecognized part of speech");
                PartOfSpeech::Unknown
            });
            let matched_lemma = best_match(term, &lemmas);
            let relations = extract(&synset, &matched_lemma);
            table.push(
                pos,
                DefinitionEntry {
                    synset_id: synset.id().to_string(),
                    matched_lemma,
                    definition: synset.definition().unwrap_or_default().to_string(),
                    examples: synset.examples().map(str::to_string).collect(),
                    relations,
                },
            );
        }
        drop(guard);

        if table.is_empty() {
            return Ok(None);
        }
        Ok(Some(table))
    }

    /// Every lemma in the database. Full scan; callers cache the result.
    pub fn all_lemmas(&self) -> Result<Vec<String>, LexiconError> {
        let guard = self.handle.lock();
        let handle = guard.as_ref().ok_or(LexiconError::NotReady)?;
        Ok(handle.lemma_forms())
    }

    #[cfg(test)]
    pub(crate) fn lock_for_test(&self) -> parking_lot::MutexGuard<'_, Option<LexiconHandle>> {
        self.handle.lock()
    }
}

#[derive(Clone, Copy)]
pub struct SynsetView<'a> {
    data: &'a ArchivedLexiconData,
    record: &'a ArchivedSynsetRecord,
}

impl<'a> SynsetView<'a> {
    fn new(data: &'a ArchivedLexiconData, index: u32) -> Option<Self> {
        data.synsets
            .get(index as usize)
            .map(|record| Self { data, record })
    }

    pub fn id(&self) -> &'a str {
        self.data.strings.get(self.record.id)
    }

    pub fn part_of_speech_tag(&self) -> &'a str {
        self.data.strings.get(self.record.part_of_speech)
    }

    pub fn definition(&self) -> Option<&'a str> {
        self.record
            .definition
            .as_ref()
            .map(|id| self.data.strings.get(*id))
    }

    pub fn examples(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        let data = self.data;
        range_slice(data.synset_examples.as_slice(), &self.record.examples)
            .iter()
            .map(move |id| data.strings.get(*id))
    }

    pub fn senses(&self) -> impl Iterator<Item = SenseView<'a>> + use<'a> {
        let data = self.data;
        range_slice(data.synset_members.as_slice(), &self.record.members)
            .iter()
            .filter_map(move |idx| SenseView::new(data, idx.to_native()))
    }

    /// Raw lemma forms of the member senses, in member order.
    pub fn lemmas(&self) -> Vec<&'a str> {
        self.senses()
            .map(|sense| sense.lemma())
            .filter(|lemma| !lemma.trim().is_empty())
            .collect()
    }

    pub fn related(&self, kind: RelationKind) -> impl Iterator<Item = SynsetView<'a>> + use<'a> {
        let data = self.data;
        relation_targets(
            range_slice(data.synset_relations.as_slice(), &self.record.relations),
            kind,
        )
        .filter_map(move |target| SynsetView::new(data, target))
    }
}

#[derive(Clone, Copy)]
pub struct SenseView<'a> {
    data: &'a ArchivedLexiconData,
    record: &'a ArchivedSenseRecord,
}

impl<'a> SenseView<'a> {
    fn new(data: &'a ArchivedLexiconData, index: u32) -> Option<Self> {
        data.senses
            .get(index as usize)
            .map(|record| Self { data, record })
    }

    pub fn lemma(&self) -> &'a str {
        self.data.strings.get(self.record.lemma)
    }

    pub fn related(&self, kind: RelationKind) -> impl Iterator<Item = SenseView<'a>> + use<'a> {
        let data = self.data;
        relation_targets(
            range_slice(data.sense_relations.as_slice(), &self.record.relations),
            kind,
        )
        .filter_map(move |target| SenseView::new(data, target))
    }
}

fn relation_targets<'a>(
    edges: &'a [ArchivedRelationRecord],
    kind: RelationKind,
) -> impl Iterator<Item = u32> + 'a {
    let code = kind.code();
    edges
        .iter()
        .filter(move |edge| edge.kind == code)
        .map(|edge| edge.target.to_native())
}

fn range_slice<'a, T>(data: &'a [T], range: &ArchivedRange) -> &'a [T] {
    let start = range.start.to_native() as usize;
    let len = range.len.to_native() as usize;
    data.get(start..start.saturating_add(len)).unwrap_or(&[])
}

impl ArchivedPackedStrings {
    fn get(&self, id: ArchivedStringId) -> &str {
        let idx = id.to_native() as usize;
        let (Some(start), Some(len)) = (self.offsets.get(idx), self.lengths.get(idx)) else {
            return "";
        };
        let start = start.to_native() as usize;
        let len = len.to_native() as usize;
        self.data
            .as_slice()
            .get(start..start.saturating_add(len))
            .and_then(|bytes| str::from_utf8(bytes).ok())
            .unwrap_or("")
    }
}
