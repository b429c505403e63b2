use rkyv::{Archive, Serialize};

pub type StringId = u32;
pub type ArchivedStringId = <StringId as Archive>::Archived;

pub const RELATION_ANTONYM: u8 = 0;
pub const RELATION_SIMILAR: u8 = 1;
pub const RELATION_ALSO: u8 = 2;

#[derive(Archive, Serialize, Debug, Clone, Copy, Default)]
pub struct Range {
    pub start: u32,
    pub len: u32,
}

impl Range {
    pub const fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }
}

/// Directed edge; `target` is a sense index for antonyms and a synset index otherwise.
#[derive(Archive, Serialize, Debug, Clone, Copy)]
pub struct RelationRecord {
    pub kind: u8,
    pub target: u32,
}

#[derive(Archive, Serialize, Debug)]
pub struct LemmaRecord {
    pub form: StringId,
    pub senses: Range,
}

#[derive(Archive, Serialize, Debug)]
pub struct SenseRecord {
    pub lemma: StringId,
    pub synset: u32,
    pub relations: Range,
}

#[derive(Archive, Serialize, Debug)]
pub struct SynsetRecord {
    pub id: StringId,
    pub part_of_speech: StringId,
    pub definition: Option<StringId>,
    pub examples: Range,
    pub members: Range,
    pub relations: Range,
}

#[derive(Archive, Serialize, Debug, Default)]
pub struct PackedStrings {
    pub offsets: Vec<u32>,
    pub lengths: Vec<u32>,
    pub data: Vec<u8>,
}

#[derive(Archive, Serialize, Debug)]
pub struct LexiconData {
    pub version: String,
    pub strings: PackedStrings,
    /// Serialized `fst::Map` from search key to `lemmas` index.
    pub lemma_index: Vec<u8>,
    pub lemmas: Vec<LemmaRecord>,
    pub lemma_senses: Vec<u32>,
    pub senses: Vec<SenseRecord>,
    pub sense_relations: Vec<RelationRecord>,
    pub synsets: Vec<SynsetRecord>,
    pub synset_members: Vec<u32>,
    pub synset_examples: Vec<StringId>,
    pub synset_relations: Vec<RelationRecord>,
}
