use std::collections::HashMap;

/// True once every currently connected player has cast a vote. Disconnected
/// players never block a round from concluding.
pub fn concluded(distinct_voters: usize, connected_players: usize) -> bool {
    connected_players > 0 && distinct_voters >= connected_players
}

/// Returns the suspect with the strictly highest vote count.
///
/// Ties are broken by roster order: the tied suspect with the lowest roster
/// index wins. `votes` pairs are (voter, suspect); `roster_order` is the
/// room's player ids in insertion order.
pub fn plurality(votes: &[(String, String)], roster_order: &[String]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, suspect) in votes {
        *counts.entry(suspect.as_str()).or_insert(0) += 1;
    }

    let mut best: Option<(&String, usize)> = None;
    for id in roster_order {
        if let Some(&count) = counts.get(id.as_str()) {
            // Strictly greater keeps the earliest roster entry on ties.
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((id, count));
            }
        }
    }

    best.map(|(id, _)| id.clone())
}
