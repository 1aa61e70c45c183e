use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::parser::{Clipping, ClippingKind};

/// Ordering key used everywhere clippings are sorted: location first, then
/// creation time. Absent values sort to the front.
fn sort_key(c: &Clipping) -> (u32, NaiveDateTime) {
    (c.loc_start.unwrap_or(0), c.date.unwrap_or(NaiveDateTime::MIN))
}

/// Drop note snapshots that are prefixes of a longer note at the same
/// location.
///
/// While a note is being typed, the device periodically saves the text
/// entered so far, so the export ends up with "Hi", "Hi there", "Hi there!"
/// all at one location. Only the longest version per location survives. The
/// prefix check is exact string containment on the raw body.
pub fn dedup_partial_notes(notes: Vec<Clipping>) -> Vec<Clipping> {
    let mut groups: Vec<Vec<Clipping>> = Vec::new();
    let mut by_location: HashMap<(Option<u32>, Option<u32>), usize> = HashMap::new();

    for note in notes {
        let key = (note.loc_start, note.loc_end);
        match by_location.get(&key) {
            Some(&idx) => groups[idx].push(note),
            None => {
                by_location.insert(key, groups.len());
                groups.push(vec![note]);
            }
        }
    }

    let mut result = Vec::new();
    for mut group in groups {
        if group.len() == 1 {
            result.append(&mut group);
            continue;
        }
        group.sort_by_key(|n| std::cmp::Reverse(n.content.len()));

        let mut kept: Vec<Clipping> = Vec::new();
        for note in group {
            let is_prefix = kept.iter().any(|longer| longer.content.starts_with(&note.content));
            if !is_prefix {
                kept.push(note);
            }
        }
        result.append(&mut kept);
    }

    result
}

/// Nest notes under the highlights they annotate and order everything by
/// location.
///
/// A note attaches to every highlight whose inclusive location range contains
/// the note's start; overlapping highlight ranges therefore each get a copy.
/// Notes that match no highlight come through as standalone items.
pub fn link_notes_to_highlights(clippings: Vec<Clipping>) -> Vec<Clipping> {
    let mut highlights = Vec::new();
    let mut notes = Vec::new();
    for c in clippings {
        match c.kind {
            ClippingKind::Highlight => highlights.push(c),
            ClippingKind::Note => notes.push(c),
            // Excluded at parse time; nothing to do even if one slips in.
            ClippingKind::Bookmark => {}
        }
    }

    let notes = dedup_partial_notes(notes);
    highlights.sort_by_key(sort_key);

    let mut linked: HashSet<String> = HashSet::new();
    for highlight in &mut highlights {
        let Some(start) = highlight.loc_start else {
            continue;
        };
        let end = highlight.loc_end.unwrap_or(start);
        for note in &notes {
            let Some(note_start) = note.loc_start else {
                continue;
            };
            if start <= note_start && note_start <= end {
                linked.insert(note.identity.clone());
                highlight.notes.push(note.clone());
            }
        }
    }

    let mut result = highlights;
    result.extend(notes.into_iter().filter(|n| !linked.contains(&n.identity)));
    result.sort_by_key(sort_key);
    result
}
