//! Fuzzy string similarity used to pre-group likely duplicate tracks.

use std::collections::BTreeSet;

/// Indel distance between two strings: insertions and deletions cost 1,
/// substitutions cost 2.
pub fn indel_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 2 };

            curr_row[j + 1] = (prev_row[j + 1] + 1) // deletion
                .min(curr_row[j] + 1) // insertion
                .min(prev_row[j] + cost); // substitution
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Normalised similarity in `0..=100`. Two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> u8 {
    let len_sum = a.chars().count() + b.chars().count();
    if len_sum == 0 {
        return 100;
    }
    let dist = indel_distance(a, b);
    (100.0 * (len_sum - dist) as f64 / len_sum as f64).round() as u8
}

/// Lowercases and turns every non-alphanumeric character into a separator.
fn process(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
}

fn tokens(s: &str) -> BTreeSet<String> {
    process(s).split_whitespace().map(str::to_string).collect()
}

fn join(tokens: &[&String]) -> String {
    tokens
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set similarity: compares the shared tokens against each side's
/// shared-plus-remaining tokens, so word order and repeated words don't matter.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let a_tokens = tokens(a);
    let b_tokens = tokens(b);
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0;
    }

    let intersection: Vec<&String> = a_tokens.intersection(&b_tokens).collect();
    let a_only: Vec<&String> = a_tokens.difference(&b_tokens).collect();
    let b_only: Vec<&String> = b_tokens.difference(&a_tokens).collect();

    let t0 = join(&intersection);
    let t1 = format!("{} {}", t0, join(&a_only)).trim().to_string();
    let t2 = format!("{} {}", t0, join(&b_only)).trim().to_string();

    let mut best = ratio(&t1, &t2);
    if !t0.is_empty() {
        best = best.max(ratio(&t0, &t1)).max(ratio(&t0, &t2));
    }
    best
}
