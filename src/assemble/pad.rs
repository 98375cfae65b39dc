// src/assemble/pad.rs
//! Padded stage: top up short paragraphs with bank fragments, always before the closer.

use super::draft::Paragraph;
use super::render::{char_len, contains_normalized, push_sentence};
use crate::phrase::{select_excluding, PhraseBank};

/// Append fragments from `categories` (in order) until `min_chars` is reached.
/// Fragments already present, or equal to the closer, are skipped. When every
/// category is exhausted the bank's safe sentence is added once.
///
/// A paragraph that already meets the minimum is returned unchanged.
pub fn pad_paragraph(
    para: &Paragraph,
    min_chars: usize,
    categories: &[String],
    bank: &PhraseBank,
    subject: &str,
    date_key: &str,
) -> Paragraph {
    if char_len(&para.text()) >= min_chars {
        return para.clone();
    }
    let mut out = para.clone();
    let closer = para.closer.clone().unwrap_or_default();
    let short = |p: &Paragraph| char_len(&p.text()) < min_chars;

    for cat in categories {
        while short(&out) {
            let body = &out.body;
            let picked = select_excluding(cat, subject, date_key, bank.get(cat), |c| {
                contains_normalized(body, c) || (!closer.is_empty() && contains_normalized(&closer, c))
            });
            match picked {
                Ok(fragment) => {
                    let fragment = fragment.to_string();
                    push_sentence(&mut out.body, &fragment);
                }
                Err(exhausted) => {
                    tracing::debug!(%exhausted, "padding category exhausted");
                    break;
                }
            }
        }
    }

    let safe = bank.safe_sentence();
    if short(&out) && !contains_normalized(&out.body, safe) && !contains_normalized(&closer, safe) {
        push_sentence(&mut out.body, safe);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn bank() -> PhraseBank {
        let mut m = BTreeMap::new();
        m.insert("fill".to_string(), vec!["一つ目の補足。".to_string(), "二つ目の補足。".to_string()]);
        m.insert("safe_fallback".to_string(), vec!["市場の振れに留意したい。".to_string()]);
        PhraseBank::from_categories(m)
    }

    fn para(body: &str) -> Paragraph {
        Paragraph {
            body: body.into(),
            closer: Some("行方を注視したい。".into()),
        }
    }

    #[test]
    fn fillers_go_before_the_closer() {
        let p = pad_paragraph(&para("本文。"), 20, &["fill".into()], &bank(), "USDJPY", "2025-03-03");
        assert!(p.text().ends_with("行方を注視したい。"));
        assert!(p.body.contains("補足"));
        assert!(char_len(&p.text()) >= 20);
    }

    #[test]
    fn sufficient_paragraph_is_untouched() {
        let p = para("本文。");
        assert_eq!(pad_paragraph(&p, 5, &["fill".into()], &bank(), "USDJPY", "2025-03-03"), p);
    }

    #[test]
    fn exhaustion_adds_safe_sentence_once() {
        let cats = vec!["fill".to_string()];
        let once = pad_paragraph(&para("本文。"), 500, &cats, &bank(), "USDJPY", "2025-03-03");
        assert_eq!(once.body.matches("市場の振れに留意したい。").count(), 1);
        assert_eq!(once.body.matches("一つ目の補足。").count(), 1);
        let twice = pad_paragraph(&once, 500, &cats, &bank(), "USDJPY", "2025-03-03");
        assert_eq!(once, twice);
    }
}
