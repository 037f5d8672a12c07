/// Substring matching with span claiming: longer terms claim their byte
/// spans first, so a short term nested inside an already-matched longer
/// one ("conversion" inside "conversion rate") does not match again.
/// Works on mixed-script text because everything is byte offsets over
/// valid UTF-8 substrings.
pub(crate) fn match_positions(text: &str, terms: &[&str]) -> Vec<Option<usize>> {
    let mut order: Vec<usize> = (0..terms.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(terms[i].len()));

    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut positions = vec![None; terms.len()];

    for i in order {
        let term = terms[i];
        if term.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(found) = text[from..].find(term) {
            let start = from + found;
            let end = start + term.len();
            if !claimed.iter().any(|&(s, e)| start < e && s < end) {
                if positions[i].is_none() {
                    positions[i] = Some(start);
                }
                claimed.push((start, end));
            }
            from = end;
        }
    }
    positions
}

pub(crate) fn matched(text: &str, terms: &[&str]) -> Vec<bool> {
    match_positions(text, terms)
        .into_iter()
        .map(|p| p.is_some())
        .collect()
}
