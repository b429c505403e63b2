//! Picks the lemma of a synset that best corresponds to the searched term.

use crate::normalize::display_form;
use rapidfuzz::fuzz;

/// Minimum normalized similarity for an approximate match.
pub const FUZZY_THRESHOLD: f64 = 0.8;

/// Returns the display form of the candidate that best matches `term`.
///
/// Exact matches always win over approximate ones: a case-sensitive match is
/// preferred, then a case-insensitive one, then the highest similarity ratio
/// at or above [`FUZZY_THRESHOLD`] (earliest candidate on ties). With no match
/// at all the first candidate is returned, or an empty string when there are
/// no candidates.
pub fn best_match<S: AsRef<str>>(term: &str, candidates: &[S]) -> String {
    let term = display_form(term);
    let forms: Vec<String> = candidates
        .iter()
        .map(|candidate| display_form(candidate.as_ref()))
        .collect();

    if let Some(exact) = forms.iter().find(|form| **form == term) {
        return exact.clone();
    }
    let folded = term.to_lowercase();
    if let Some(exact) = forms.iter().find(|form| form.to_lowercase() == folded) {
        return exact.clone();
    }

    let mut best: Option<(f64, &String)> = None;
    for form in &forms {
        let score = fuzz::ratio(folded.chars(), form.to_lowercase().chars());
        if score < FUZZY_THRESHOLD {
            continue;
        }
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, form));
        }
    }
    if let Some((_, form)) = best {
        return form.clone();
    }

    forms.into_iter().next().unwrap_or_default()
}
