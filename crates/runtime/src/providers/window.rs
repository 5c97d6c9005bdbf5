//! History windowing for transmitted context.

use crate::model::{Role, Turn};

/// Select the turns to transmit, keeping at most `limit` non-system turns.
///
/// System turns are always kept. The cut never leaves a `tool` turn at the
/// start of the window, since its request would be missing.
pub fn window(turns: &[Turn], limit: Option<usize>) -> Vec<&Turn> {
    let Some(limit) = limit else {
        return turns.iter().collect();
    };

    let conversational: Vec<usize> = turns
        .iter()
        .enumerate()
        .filter(|(_, turn)| turn.role != Role::System)
        .map(|(i, _)| i)
        .collect();

    let mut start = conversational.len().saturating_sub(limit);
    while start < conversational.len() && turns[conversational[start]].role == Role::Tool {
        start += 1;
    }
    let cutoff = conversational.get(start).copied().unwrap_or(turns.len());

    turns
        .iter()
        .enumerate()
        .filter(|(i, turn)| turn.role == Role::System || *i >= cutoff)
        .map(|(_, turn)| turn)
        .collect()
}
